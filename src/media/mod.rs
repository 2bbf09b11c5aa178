//! Media negotiation for one call at a time.
//!
//! # Architecture
//!
//! - [`NegotiationEngine`]: acquisition, peer-connection lifetime and
//!   offer/answer/ICE handling for the single active call
//! - [`MediaSession`]: the owned local-stream + connection resource
//! - [`MediaDevices`], [`PeerConnectionFactory`], [`PeerConnection`]: seams
//!   the host platform implements
//! - [`PeerEvent`] / [`EngineEvent`]: observation flow from the platform up
//!   to the call manager

mod engine;
mod platform;
mod session;

pub use engine::{EngineEvent, EngineEventKind, NegotiationEngine, Role};
pub use platform::{
    IceConfig, LocalMedia, MediaConstraints, MediaDevices, MediaError, PeerConnection,
    PeerConnectionFactory, PeerConnectionState, PeerEvent, RemoteStream, TrackInfo, TrackKind,
};
pub use session::MediaSession;
