//! Platform seams for media acquisition and the peer connection.
//!
//! The host application implements these traits over whatever negotiation
//! primitives its platform provides; tests implement them as mocks. The
//! engine is deliberately payload-agnostic: descriptions and candidates pass
//! through as opaque blobs.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::signaling::{IceCandidateInit, SessionDescription};
use crate::types::CallType;

#[derive(Debug, Error)]
pub enum MediaError {
    /// The user refused the microphone/camera prompt.
    #[error("media permission denied")]
    PermissionDenied,

    #[error("media device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Offer/answer/candidate application failed in the platform.
    #[error("negotiation error: {0}")]
    Negotiation(String),

    /// The negotiation context was already torn down.
    #[error("media session closed")]
    Closed,
}

/// What to ask the platform for. Microphone always, camera only for video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub fn for_call(call_type: CallType) -> Self {
        Self {
            audio: true,
            video: call_type.is_video(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Descriptor for a single media track, local or remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub kind: TrackKind,
}

/// Remote media exposed to the presentation adapter when the peer's tracks
/// arrive.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStream {
    pub id: String,
    pub tracks: Vec<TrackInfo>,
}

/// Locally captured media. Exclusively owned by the negotiation engine for
/// one call's lifetime; `stop` releases the devices.
pub trait LocalMedia: Send + Sync {
    fn tracks(&self) -> Vec<TrackInfo>;
    fn stop(&self);
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Request capture devices from the platform. This can be slow (a
    /// permission prompt) or rejected by the user; rejection propagates as a
    /// negotiation failure, never a silent no-op.
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Box<dyn LocalMedia>, MediaError>;
}

/// Low-level connection state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    /// States that end the media path for good.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

/// Observations pushed by the platform's peer connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// A local candidate was discovered and should be signaled to the peer.
    IceCandidate(IceCandidateInit),
    /// Remote media arrived.
    Track(RemoteStream),
    ConnectionState(PeerConnectionState),
}

/// ICE server configuration. Public STUN is sufficient; no TURN fallback is
/// in scope.
#[derive(Debug, Clone)]
pub struct IceConfig {
    pub stun_servers: Vec<String>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
        }
    }
}

pub trait PeerConnectionFactory: Send + Sync {
    /// Create a peer connection wired to push its observations into `events`.
    fn create(
        &self,
        config: &IceConfig,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Box<dyn PeerConnection>, MediaError>;
}

/// The platform's negotiation primitive. One instance per call.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, MediaError>;
    async fn create_answer(&self) -> Result<SessionDescription, MediaError>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), MediaError>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), MediaError>;
    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<(), MediaError>;
    async fn add_track(&self, track: TrackInfo) -> Result<(), MediaError>;
    /// Must be safe to call more than once.
    async fn close(&self);
}
