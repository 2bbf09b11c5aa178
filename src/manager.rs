//! Call manager: orchestrates the call lifecycle.
//!
//! The manager is the sole writer of call status. It mediates between the
//! relay's pushes, the user-facing imperative actions (start, answer,
//! decline, end) and the negotiation engine, and it owns the duration clock.
//!
//! The central race-avoidance decision is the two-phase start: `start_call`
//! only asks the relay for a call record and parks an id-less placeholder.
//! Media is initialized when `call:initiated` delivers the confirmed id,
//! because negotiating against an unconfirmed id would bind offer/ICE
//! messages to nothing.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc, watch};

use crate::clock::DurationClock;
use crate::error::CallError;
use crate::media::{
    EngineEvent, EngineEventKind, IceConfig, MediaDevices, NegotiationEngine,
    PeerConnectionFactory, RemoteStream, Role,
};
use crate::relay::SignalingRelay;
use crate::signaling::{CallSignaling, RelayEvent};
use crate::state::{ActiveCall, CallSnapshot, InvalidTransition};
use crate::types::{CallDirection, CallId, CallStatus, CallType, ConversationId, UserId};

/// Configuration for the call manager.
#[derive(Debug, Clone)]
pub struct CallManagerConfig {
    /// ICE servers handed to the platform when a peer connection is created.
    pub ice: IceConfig,
    /// Capacity of the presentation event channel.
    pub event_capacity: usize,
}

impl Default for CallManagerConfig {
    fn default() -> Self {
        Self {
            ice: IceConfig::default(),
            event_capacity: 64,
        }
    }
}

/// Updates consumed by the presentation adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// The current call changed; `None` means idle.
    State(Option<CallSnapshot>),
    /// The peer's media arrived.
    RemoteStream(RemoteStream),
}

/// Everything that must live and die with the current call.
#[derive(Default)]
struct CallCtx {
    active: Option<ActiveCall>,
    engine: Option<Arc<NegotiationEngine>>,
    /// Signals that arrived after answering but before the engine finished
    /// initializing; drained once it is installed.
    pending_signals: Vec<CallSignaling>,
    /// Bumped on every teardown and call replacement. Async work started for
    /// an earlier epoch discards its result instead of touching fresh state.
    epoch: u64,
}

/// Orchestrates the single in-flight call.
pub struct CallManager {
    user_id: UserId,
    relay: Arc<dyn SignalingRelay>,
    devices: Arc<dyn MediaDevices>,
    factory: Arc<dyn PeerConnectionFactory>,
    config: CallManagerConfig,
    ctx: Mutex<CallCtx>,
    clock: DurationClock,
    events: broadcast::Sender<CallEvent>,
    engine_tx: mpsc::UnboundedSender<EngineEvent>,
}

impl CallManager {
    pub fn new(
        user_id: UserId,
        relay: Arc<dyn SignalingRelay>,
        devices: Arc<dyn MediaDevices>,
        factory: Arc<dyn PeerConnectionFactory>,
        config: CallManagerConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_capacity);
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            user_id,
            relay,
            devices,
            factory,
            config,
            ctx: Mutex::new(CallCtx::default()),
            clock: DurationClock::new(),
            events,
            engine_tx,
        });
        tokio::spawn(Arc::clone(&manager).engine_event_loop(engine_rx));
        manager
    }

    /// Observe lifecycle and remote-stream updates.
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Observe the call duration in seconds. Zero whenever no call is
    /// connected.
    pub fn duration(&self) -> watch::Receiver<u64> {
        self.clock.subscribe()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.clock.elapsed_secs()
    }

    pub async fn snapshot(&self) -> Option<CallSnapshot> {
        self.ctx.lock().await.active.as_ref().map(|a| a.snapshot())
    }

    /// Ask the relay to create a call record and park the placeholder.
    ///
    /// Rejected with [`CallError::Busy`] while any call is in flight. Media
    /// is not touched here; it starts once the relay confirms the call id.
    pub async fn start_call(
        &self,
        receiver_id: UserId,
        call_type: CallType,
        conversation_id: ConversationId,
    ) -> Result<(), CallError> {
        let epoch = {
            let mut ctx = self.ctx.lock().await;
            if ctx.active.is_some() {
                return Err(CallError::Busy);
            }
            let call = ActiveCall::new_outgoing(
                self.user_id.clone(),
                receiver_id.clone(),
                call_type,
                conversation_id.clone(),
            );
            self.publish_state(Some(call.snapshot()));
            ctx.active = Some(call);
            ctx.epoch
        };

        info!(target: "Call/Manager", "Requesting {:?} call to {}", call_type, receiver_id);
        if let Err(e) = self
            .relay
            .initiate_call(&receiver_id, call_type, &conversation_id)
            .await
        {
            warn!(target: "Call/Manager", "Call initiation rejected by relay: {}", e);
            let mut ctx = self.ctx.lock().await;
            if ctx.epoch == epoch
                && let Some(active) = ctx.active.as_mut()
                && active.is_unconfirmed()
            {
                let _ = active.apply_status(CallStatus::Failed);
                self.publish_state(Some(active.snapshot()));
                self.teardown_locked(&mut ctx).await;
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Pick up the ringing incoming call, then initialize media as the
    /// non-initiating party.
    pub async fn answer_call(self: &Arc<Self>) -> Result<(), CallError> {
        let (call_id, call_type, epoch) = {
            let mut ctx = self.ctx.lock().await;
            let Some(active) = ctx.active.as_mut() else {
                return Err(CallError::NoActiveCall);
            };
            if active.direction != CallDirection::Incoming
                || active.status != CallStatus::Ringing
            {
                return Err(InvalidTransition {
                    from: active.status,
                    to: CallStatus::Answered,
                }
                .into());
            }
            let Some(call_id) = active.id.clone() else {
                return Err(CallError::NoActiveCall);
            };
            active.apply_status(CallStatus::Answered)?;
            self.publish_state(Some(active.snapshot()));
            (call_id, active.call_type, ctx.epoch)
        };

        info!(target: "Call/Manager", "Answering call {}", call_id);
        if let Err(e) = self.relay.answer_call(&call_id).await {
            warn!(target: "Call/Manager", "Relay refused answer for call {}: {}", call_id, e);
            self.fail_call(&call_id).await;
            return Err(e.into());
        }

        self.spawn_engine_init(call_id, Role::Responder, call_type, epoch);
        Ok(())
    }

    /// Refuse the ringing incoming call and return to idle.
    pub async fn decline_call(&self) -> Result<(), CallError> {
        let call_id = {
            let mut ctx = self.ctx.lock().await;
            let Some(active) = ctx.active.as_mut() else {
                return Err(CallError::NoActiveCall);
            };
            if active.direction != CallDirection::Incoming
                || active.status != CallStatus::Ringing
            {
                return Err(InvalidTransition {
                    from: active.status,
                    to: CallStatus::Declined,
                }
                .into());
            }
            let Some(call_id) = active.id.clone() else {
                return Err(CallError::NoActiveCall);
            };
            active.apply_status(CallStatus::Declined)?;
            self.publish_state(Some(active.snapshot()));
            call_id
        };

        info!(target: "Call/Manager", "Declining call {}", call_id);
        let result = self.relay.decline_call(&call_id).await;

        let mut ctx = self.ctx.lock().await;
        if ctx.active.as_ref().is_some_and(|a| a.matches(&call_id)) {
            self.teardown_locked(&mut ctx).await;
        }
        result.map_err(Into::into)
    }

    /// Hang up. Valid from any state; a no-op when idle. Tells the relay
    /// when a confirmed call id exists, then tears everything down.
    pub async fn end_call(&self) -> Result<(), CallError> {
        let (call_id, epoch) = {
            let mut ctx = self.ctx.lock().await;
            let Some(active) = ctx.active.as_mut() else {
                return Ok(());
            };
            if !active.is_terminal() {
                let _ = active.apply_status(CallStatus::Ended);
                self.publish_state(Some(active.snapshot()));
            }
            (active.id.clone(), ctx.epoch)
        };

        let result = match &call_id {
            Some(id) => {
                info!(target: "Call/Manager", "Ending call {}", id);
                self.relay.end_call(id).await
            }
            // The relay never learned about this call; nothing to tell it.
            None => Ok(()),
        };

        let mut ctx = self.ctx.lock().await;
        if ctx.epoch == epoch {
            self.teardown_locked(&mut ctx).await;
        }
        result.map_err(Into::into)
    }

    /// Entry point for relay pushes, driven by the host's transport layer.
    pub async fn handle_event(self: &Arc<Self>, event: RelayEvent) {
        match event {
            RelayEvent::Incoming { call } => self.handle_incoming(call).await,
            RelayEvent::Initiated { call, status } => self.handle_initiated(call, status).await,
            RelayEvent::Status { call_id, status } => self.handle_status(call_id, status).await,
            RelayEvent::Signal { signal } => self.handle_signal(signal).await,
        }
    }

    async fn handle_incoming(self: &Arc<Self>, call: crate::types::Call) {
        let mut ctx = self.ctx.lock().await;
        match ctx.active.as_ref() {
            None => {}
            Some(active) if active.is_unconfirmed() => {
                // Both sides dialed at once and the peer's record won the
                // race to the relay. The confirmed record replaces our
                // still-unconfirmed attempt.
                debug!(
                    target: "Call/Manager",
                    "Incoming call {} supersedes unconfirmed outgoing attempt", call.id
                );
            }
            Some(active) => {
                warn!(
                    target: "Call/Manager",
                    "Ignoring incoming call {} while busy with {:?}", call.id, active.id
                );
                return;
            }
        }
        // Invalidate anything still in flight for the superseded attempt.
        ctx.epoch += 1;

        info!(
            target: "Call/Manager",
            "Incoming {:?} call {} from {}", call.call_type, call.id, call.caller_id
        );
        let active = ActiveCall::new_incoming(call);
        self.publish_state(Some(active.snapshot()));
        ctx.active = Some(active);
    }

    async fn handle_initiated(self: &Arc<Self>, call: crate::types::Call, status: CallStatus) {
        let (call_id, call_type, epoch) = {
            let mut ctx = self.ctx.lock().await;
            let Some(active) = ctx.active.as_mut() else {
                debug!(target: "Call/Manager", "call:initiated with no outgoing call, ignoring");
                return;
            };
            if active.direction != CallDirection::Outgoing || !active.is_unconfirmed() {
                debug!(target: "Call/Manager", "Unexpected call:initiated for {}, ignoring", call.id);
                return;
            }

            let call_id = call.id.clone();
            let call_type = call.call_type;
            active.confirm(call, status);
            info!(target: "Call/Manager", "Relay confirmed call {} ({})", call_id, status);
            self.publish_state(Some(active.snapshot()));
            if active.is_terminal() {
                self.teardown_locked(&mut ctx).await;
                return;
            }
            (call_id, call_type, ctx.epoch)
        };

        self.spawn_engine_init(call_id, Role::Initiator, call_type, epoch);
    }

    async fn handle_status(self: &Arc<Self>, call_id: CallId, status: CallStatus) {
        let mut ctx = self.ctx.lock().await;
        let Some(active) = ctx.active.as_mut() else {
            debug!(target: "Call/Manager", "Status {} for call {} with no active call", status, call_id);
            return;
        };
        if !active.matches(&call_id) {
            debug!(
                target: "Call/Manager",
                "Dropping status {} for call {} (not the active call)", status, call_id
            );
            return;
        }

        if let Err(e) = active.apply_status(status) {
            warn!(target: "Call/Manager", "Ignoring status update for call {}: {}", call_id, e);
            return;
        }
        debug!(target: "Call/Manager", "Call {} status is now {}", call_id, active.status);
        self.publish_state(Some(active.snapshot()));

        if active.is_terminal() {
            self.teardown_locked(&mut ctx).await;
        } else if active.status == CallStatus::Answered && active.media_connected {
            self.clock.start().await;
        }
    }

    async fn handle_signal(self: &Arc<Self>, signal: CallSignaling) {
        let engine = {
            let mut ctx = self.ctx.lock().await;
            let Some(active) = ctx.active.as_ref() else {
                debug!(target: "Call/Manager", "Signal for call {} with no active call", signal.call_id);
                return;
            };
            if !active.matches(&signal.call_id) {
                debug!(
                    target: "Call/Manager",
                    "Dropping {} signal for call {} (not the active call)",
                    signal.payload.kind(), signal.call_id
                );
                return;
            }
            match ctx.engine.clone() {
                Some(engine) => engine,
                None => {
                    debug!(
                        target: "Call/Manager",
                        "Buffering {} signal for call {} until media is ready",
                        signal.payload.kind(), signal.call_id
                    );
                    ctx.pending_signals.push(signal);
                    return;
                }
            }
        };

        let call_id = signal.call_id.clone();
        if let Err(e) = engine.handle_signal(signal).await {
            warn!(target: "Call/Manager", "Negotiation failed for call {}: {}", call_id, e);
            self.fail_call(&call_id).await;
        }
    }

    /// Initialize the negotiation engine off the event path. Media
    /// acquisition can be slow (a permission prompt); a call-ending event
    /// arriving meanwhile must still win, so the result is only committed if
    /// the same call is still active.
    fn spawn_engine_init(
        self: &Arc<Self>,
        call_id: CallId,
        role: Role,
        call_type: CallType,
        epoch: u64,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let result = NegotiationEngine::start(
                call_id.clone(),
                role,
                call_type,
                this.devices.as_ref(),
                this.factory.as_ref(),
                &this.config.ice,
                this.engine_tx.clone(),
            )
            .await;

            let engine = match result {
                Ok(engine) => Arc::new(engine),
                Err(e) => {
                    warn!(target: "Call/Manager", "Media initialization failed for call {}: {}", call_id, e);
                    this.fail_call(&call_id).await;
                    return;
                }
            };

            let queued = {
                let mut ctx = this.ctx.lock().await;
                let still_active = ctx.epoch == epoch
                    && ctx
                        .active
                        .as_ref()
                        .is_some_and(|a| a.matches(&call_id) && !a.is_terminal());
                if !still_active {
                    drop(ctx);
                    debug!(
                        target: "Call/Manager",
                        "Call {} ended during media setup, discarding engine", call_id
                    );
                    engine.teardown().await;
                    return;
                }
                ctx.engine = Some(Arc::clone(&engine));
                std::mem::take(&mut ctx.pending_signals)
            };

            for signal in queued {
                if let Err(e) = engine.handle_signal(signal).await {
                    warn!(target: "Call/Manager", "Negotiation failed for call {}: {}", call_id, e);
                    this.fail_call(&call_id).await;
                    return;
                }
            }
        });
    }

    /// Consume engine observations for the lifetime of the manager.
    async fn engine_event_loop(
        self: Arc<Self>,
        mut engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        while let Some(event) = engine_rx.recv().await {
            match event.kind {
                EngineEventKind::Signal(payload) => {
                    let still_active = {
                        let ctx = self.ctx.lock().await;
                        ctx.active
                            .as_ref()
                            .is_some_and(|a| a.matches(&event.call_id) && !a.is_terminal())
                    };
                    if !still_active {
                        continue;
                    }
                    let signal = CallSignaling::new(payload, event.call_id.clone());
                    if let Err(e) = self.relay.send_signal(signal).await {
                        warn!(target: "Call/Manager", "Failed to relay signal for call {}: {}", event.call_id, e);
                        self.fail_call(&event.call_id).await;
                    }
                }
                EngineEventKind::RemoteStream(stream) => {
                    let still_active = {
                        let ctx = self.ctx.lock().await;
                        ctx.active.as_ref().is_some_and(|a| a.matches(&event.call_id))
                    };
                    if still_active {
                        let _ = self.events.send(CallEvent::RemoteStream(stream));
                    }
                }
                EngineEventKind::Connected => {
                    let mut ctx = self.ctx.lock().await;
                    if let Some(active) = ctx.active.as_mut()
                        && active.matches(&event.call_id)
                        && !active.is_terminal()
                    {
                        info!(target: "Call/Manager", "Media connected for call {}", event.call_id);
                        active.media_connected = true;
                        let answered = active.status == CallStatus::Answered;
                        self.publish_state(Some(active.snapshot()));
                        if answered {
                            self.clock.start().await;
                        }
                    }
                }
                EngineEventKind::Failed => {
                    self.fail_call(&event.call_id).await;
                }
            }
        }
    }

    /// Funnel for every failure source: permission/device errors,
    /// negotiation errors, connection loss and relay rejections. Handled
    /// identically to a user-initiated hangup, except the status is
    /// `failed`. Does nothing if the call already reached a terminal state
    /// (a dying transport after a deliberate hangup is not a failure).
    async fn fail_call(&self, call_id: &CallId) {
        let mut ctx = self.ctx.lock().await;
        let Some(active) = ctx.active.as_mut() else {
            return;
        };
        if !active.matches(call_id) || active.is_terminal() {
            return;
        }

        warn!(target: "Call/Manager", "Call {} failed", call_id);
        let _ = active.apply_status(CallStatus::Failed);
        self.publish_state(Some(active.snapshot()));
        self.teardown_locked(&mut ctx).await;
    }

    /// Shared teardown for every exit path. Idempotent: a second run finds
    /// nothing left to release.
    async fn teardown_locked(&self, ctx: &mut CallCtx) {
        if let Some(engine) = ctx.engine.take() {
            engine.teardown().await;
        }
        self.clock.reset().await;
        ctx.pending_signals.clear();
        ctx.active = None;
        ctx.epoch += 1;
        self.publish_state(None);
    }

    fn publish_state(&self, snapshot: Option<CallSnapshot>) {
        let _ = self.events.send(CallEvent::State(snapshot));
    }
}
