//! Media negotiation engine.
//!
//! Owns exactly one peer connection and one local stream for the lifetime of
//! one call. The initiator creates the offer; the non-initiator waits for
//! one and answers. Splitting offer creation by role (instead of negotiating
//! who goes first) sidesteps glare: role is unambiguous because it is derived
//! from which side started the call.

use log::{debug, warn};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::platform::{
    IceConfig, MediaConstraints, MediaDevices, MediaError, PeerConnectionFactory, PeerEvent,
    RemoteStream,
};
use super::session::MediaSession;
use crate::signaling::{CallSignaling, SignalPayload};
use crate::types::{CallId, CallType};

/// Which side of the offer/answer handshake this engine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The original caller: creates and sends the offer.
    Initiator,
    /// The answering side: waits for an inbound offer.
    Responder,
}

/// What the engine reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEventKind {
    /// An outbound negotiation payload to forward through the relay.
    Signal(SignalPayload),
    /// The peer's media arrived.
    RemoteStream(RemoteStream),
    /// Low-level transport reached connected.
    Connected,
    /// Low-level transport reported disconnected/failed/closed.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub call_id: CallId,
    pub kind: EngineEventKind,
}

struct EngineInner {
    session: MediaSession,
    pump: JoinHandle<()>,
}

/// Negotiation context for one call.
pub struct NegotiationEngine {
    call_id: CallId,
    role: Role,
    events: mpsc::UnboundedSender<EngineEvent>,
    inner: Mutex<Option<EngineInner>>,
}

impl NegotiationEngine {
    /// Acquire local media, create the peer connection, attach tracks and,
    /// for the initiator, send exactly one offer.
    ///
    /// Any failure on the way tears the partially built session down before
    /// returning; a successful return hands the caller sole ownership of the
    /// negotiation context.
    pub async fn start(
        call_id: CallId,
        role: Role,
        call_type: CallType,
        devices: &dyn MediaDevices,
        factory: &dyn PeerConnectionFactory,
        ice: &IceConfig,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Self, MediaError> {
        let local = devices
            .get_user_media(MediaConstraints::for_call(call_type))
            .await?;
        debug!(target: "Call/Engine", "Acquired local media for call {} ({} tracks)", call_id, local.tracks().len());

        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let connection = match factory.create(ice, peer_tx) {
            Ok(c) => c,
            Err(e) => {
                local.stop();
                return Err(e);
            }
        };

        let pump = tokio::spawn(pump_peer_events(call_id.clone(), peer_rx, events.clone()));
        let engine = Self {
            call_id,
            role,
            events,
            inner: Mutex::new(Some(EngineInner {
                session: MediaSession::new(local, connection),
                pump,
            })),
        };

        if let Err(e) = engine.setup().await {
            warn!(target: "Call/Engine", "Negotiation setup failed for call {}: {}", engine.call_id, e);
            engine.teardown().await;
            return Err(e);
        }
        Ok(engine)
    }

    async fn setup(&self) -> Result<(), MediaError> {
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(MediaError::Closed)?;

        for track in inner.session.local.tracks() {
            inner.session.connection.add_track(track).await?;
        }

        if self.role == Role::Initiator {
            let offer = inner.session.connection.create_offer().await?;
            inner
                .session
                .connection
                .set_local_description(offer.clone())
                .await?;
            self.emit(EngineEventKind::Signal(SignalPayload::Offer(offer)));
            debug!(target: "Call/Engine", "Sent offer for call {}", self.call_id);
        }
        Ok(())
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Apply an inbound negotiation payload.
    ///
    /// Messages for a different call id never mutate engine state; they are
    /// stale or misrouted and are dropped quietly. Likewise an `answer`
    /// arriving at the non-initiator is a protocol violation and is ignored.
    pub async fn handle_signal(&self, signal: CallSignaling) -> Result<(), MediaError> {
        if signal.call_id != self.call_id {
            debug!(
                target: "Call/Engine",
                "Dropping {} signal for call {} (active call is {})",
                signal.payload.kind(), signal.call_id, self.call_id
            );
            return Ok(());
        }

        let guard = self.inner.lock().await;
        let Some(inner) = guard.as_ref() else {
            debug!(target: "Call/Engine", "Signal for call {} after teardown, dropping", self.call_id);
            return Ok(());
        };
        let connection = &inner.session.connection;

        match signal.payload {
            SignalPayload::Offer(desc) => {
                if self.role == Role::Initiator {
                    debug!(target: "Call/Engine", "Ignoring offer at initiator for call {}", self.call_id);
                    return Ok(());
                }
                connection.set_remote_description(desc).await?;
                let answer = connection.create_answer().await?;
                connection.set_local_description(answer.clone()).await?;
                self.emit(EngineEventKind::Signal(SignalPayload::Answer(answer)));
                debug!(target: "Call/Engine", "Sent answer for call {}", self.call_id);
            }
            SignalPayload::Answer(desc) => {
                if self.role != Role::Initiator {
                    debug!(target: "Call/Engine", "Ignoring answer at non-initiator for call {}", self.call_id);
                    return Ok(());
                }
                connection.set_remote_description(desc).await?;
            }
            SignalPayload::IceCandidate(candidate) => {
                connection.add_ice_candidate(candidate).await?;
            }
        }
        Ok(())
    }

    /// Stop local tracks, close the connection and discard all engine state.
    /// Safe to call any number of times, on every exit path.
    pub async fn teardown(&self) {
        let inner = self.inner.lock().await.take();
        if let Some(inner) = inner {
            inner.pump.abort();
            inner.session.close().await;
            debug!(target: "Call/Engine", "Engine torn down for call {}", self.call_id);
        }
    }

    fn emit(&self, kind: EngineEventKind) {
        let _ = self.events.send(EngineEvent {
            call_id: self.call_id.clone(),
            kind,
        });
    }
}

/// Map platform observations onto engine events for the owner. Ends when the
/// peer connection (or the owner) goes away.
async fn pump_peer_events(
    call_id: CallId,
    mut peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    events: mpsc::UnboundedSender<EngineEvent>,
) {
    while let Some(event) = peer_rx.recv().await {
        let kind = match event {
            PeerEvent::IceCandidate(candidate) => {
                EngineEventKind::Signal(SignalPayload::IceCandidate(candidate))
            }
            PeerEvent::Track(stream) => EngineEventKind::RemoteStream(stream),
            PeerEvent::ConnectionState(state) => {
                debug!(target: "Call/Engine", "Connection state for call {}: {:?}", call_id, state);
                if state == super::platform::PeerConnectionState::Connected {
                    EngineEventKind::Connected
                } else if state.is_failure() {
                    EngineEventKind::Failed
                } else {
                    continue;
                }
            }
        };
        if events
            .send(EngineEvent {
                call_id: call_id.clone(),
                kind,
            })
            .is_err()
        {
            break;
        }
    }
}
