//! The owned media resource for one call.

use log::debug;

use super::platform::{LocalMedia, PeerConnection};

/// Local stream plus peer connection, bundled so they are acquired and
/// released together. Created once by [`NegotiationEngine::start`] and
/// destroyed by exactly one [`close`](MediaSession::close); the engine's
/// `Option::take` around it is what makes teardown idempotent.
///
/// [`NegotiationEngine::start`]: super::NegotiationEngine::start
pub struct MediaSession {
    pub(super) local: Box<dyn LocalMedia>,
    pub(super) connection: Box<dyn PeerConnection>,
}

impl MediaSession {
    pub(super) fn new(local: Box<dyn LocalMedia>, connection: Box<dyn PeerConnection>) -> Self {
        Self { local, connection }
    }

    /// Stop capture and close the connection, consuming the session.
    pub(super) async fn close(self) {
        self.local.stop();
        self.connection.close().await;
        debug!(target: "Call/Media", "Media session closed");
    }
}
