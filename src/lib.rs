//! Client-side call subsystem for relay-signaled peer-to-peer calls.
//!
//! Two authenticated users establish a voice or video call mediated by a thin
//! signaling relay. The relay owns call record creation and fans status out to
//! both parties; this crate owns everything the client does with those pushes.
//!
//! # Architecture
//!
//! - [`CallManager`]: orchestrates the call lifecycle and is the sole writer
//!   of call status
//! - [`ActiveCall`] & [`CallStatus`]: call state machine for tracking the
//!   single in-flight call
//! - [`NegotiationEngine`]: media acquisition, peer connection lifetime and
//!   offer/answer/ICE exchange for exactly one call at a time
//! - [`DurationClock`]: elapsed-time ticker gated by connection state
//! - [`SignalingRelay`]: consumer contract for the relay (implemented by the
//!   host application's transport layer)
//! - [`RelayEvent`] & [`CallSignaling`]: wire types for relay pushes and
//!   negotiation payloads
//!
//! # Protocol Overview
//!
//! A caller asks the relay to create a call record and only initializes media
//! once the relay confirms the call id (two-phase start). Offer, answer and
//! ICE candidates then flow through the relay as opaque payloads until the
//! low-level connection reports connected, at which point the duration clock
//! starts. Either side may end the call; the relay broadcasts the terminal
//! status to both.

pub mod clock;
pub mod error;
pub mod manager;
pub mod media;
pub mod relay;
pub mod signaling;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use clock::DurationClock;
pub use error::CallError;
pub use manager::{CallEvent, CallManager, CallManagerConfig};
pub use media::{
    EngineEvent, EngineEventKind, IceConfig, LocalMedia, MediaConstraints, MediaDevices,
    MediaError, NegotiationEngine, PeerConnection, PeerConnectionFactory, PeerConnectionState,
    PeerEvent, RemoteStream, Role, TrackInfo, TrackKind,
};
pub use relay::{RelayError, SignalingRelay};
pub use signaling::{CallSignaling, IceCandidateInit, RelayEvent, SessionDescription, SignalPayload};
pub use state::{ActiveCall, CallSnapshot, InvalidTransition};
pub use types::{Call, CallDirection, CallId, CallStatus, CallType, ConversationId, UserId};
