//! Shared mocks for exercising the call subsystem without a real relay or
//! media platform.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::manager::{CallEvent, CallManager, CallManagerConfig};
use crate::media::{
    IceConfig, LocalMedia, MediaConstraints, MediaDevices, MediaError, PeerConnection,
    PeerConnectionFactory, PeerEvent, TrackInfo, TrackKind,
};
use crate::relay::{RelayError, SignalingRelay};
use crate::signaling::{CallSignaling, IceCandidateInit, SessionDescription};
use crate::types::{Call, CallId, CallType, ConversationId, UserId};

// -- Relay --

#[derive(Default)]
pub struct MockRelay {
    initiated: StdMutex<Vec<(UserId, CallType, ConversationId)>>,
    answered: StdMutex<Vec<CallId>>,
    declined: StdMutex<Vec<CallId>>,
    ended: StdMutex<Vec<CallId>>,
    signals: StdMutex<Vec<CallSignaling>>,
    offline: AtomicBool,
}

impl MockRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent request fail.
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), RelayError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RelayError::Unavailable("relay offline".into()));
        }
        Ok(())
    }

    pub fn initiated(&self) -> Vec<(UserId, CallType, ConversationId)> {
        self.initiated.lock().unwrap().clone()
    }

    pub fn answered_calls(&self) -> Vec<CallId> {
        self.answered.lock().unwrap().clone()
    }

    pub fn declined_calls(&self) -> Vec<CallId> {
        self.declined.lock().unwrap().clone()
    }

    pub fn ended_calls(&self) -> Vec<CallId> {
        self.ended.lock().unwrap().clone()
    }

    pub fn sent_signals(&self) -> Vec<CallSignaling> {
        self.signals.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalingRelay for MockRelay {
    async fn initiate_call(
        &self,
        receiver_id: &UserId,
        call_type: CallType,
        conversation_id: &ConversationId,
    ) -> Result<(), RelayError> {
        self.check_online()?;
        self.initiated.lock().unwrap().push((
            receiver_id.clone(),
            call_type,
            conversation_id.clone(),
        ));
        Ok(())
    }

    async fn answer_call(&self, call_id: &CallId) -> Result<(), RelayError> {
        self.check_online()?;
        self.answered.lock().unwrap().push(call_id.clone());
        Ok(())
    }

    async fn decline_call(&self, call_id: &CallId) -> Result<(), RelayError> {
        self.check_online()?;
        self.declined.lock().unwrap().push(call_id.clone());
        Ok(())
    }

    async fn end_call(&self, call_id: &CallId) -> Result<(), RelayError> {
        self.check_online()?;
        self.ended.lock().unwrap().push(call_id.clone());
        Ok(())
    }

    async fn send_signal(&self, signal: CallSignaling) -> Result<(), RelayError> {
        self.check_online()?;
        self.signals.lock().unwrap().push(signal);
        Ok(())
    }
}

// -- Media devices --

struct MockLocalMedia {
    tracks: Vec<TrackInfo>,
    stops: Arc<AtomicUsize>,
}

impl LocalMedia for MockLocalMedia {
    fn tracks(&self) -> Vec<TrackInfo> {
        self.tracks.clone()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockDevices {
    deny: AtomicBool,
    delay: StdMutex<Option<Duration>>,
    acquired: AtomicUsize,
    stops: Arc<AtomicUsize>,
}

impl MockDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the user refusing the permission prompt.
    pub fn deny(&self) {
        self.deny.store(true, Ordering::SeqCst);
    }

    /// Simulate a slow permission prompt.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn streams_acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Total `stop` calls across every stream ever handed out.
    pub fn stopped_streams(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevices for MockDevices {
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Box<dyn LocalMedia>, MediaError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.deny.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied);
        }

        let mut tracks = vec![TrackInfo {
            id: "local-audio".into(),
            kind: TrackKind::Audio,
        }];
        if constraints.video {
            tracks.push(TrackInfo {
                id: "local-video".into(),
                kind: TrackKind::Video,
            });
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockLocalMedia {
            tracks,
            stops: Arc::clone(&self.stops),
        }))
    }
}

// -- Peer connection --

pub struct MockConnection {
    events: mpsc::UnboundedSender<PeerEvent>,
    offers: AtomicUsize,
    answers: AtomicUsize,
    local: StdMutex<Vec<SessionDescription>>,
    remote: StdMutex<Vec<SessionDescription>>,
    candidates: StdMutex<Vec<IceCandidateInit>>,
    tracks: StdMutex<Vec<TrackInfo>>,
    closed: AtomicUsize,
    fail_negotiation: AtomicBool,
}

impl MockConnection {
    /// Drive an observation into the engine, as the platform would.
    pub fn push_event(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    /// Make every subsequent negotiation primitive fail.
    pub fn break_negotiation(&self) {
        self.fail_negotiation.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), MediaError> {
        if self.fail_negotiation.load(Ordering::SeqCst) {
            return Err(MediaError::Negotiation("mock negotiation failure".into()));
        }
        Ok(())
    }

    pub fn offers_created(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }

    pub fn answers_created(&self) -> usize {
        self.answers.load(Ordering::SeqCst)
    }

    pub fn local_descriptions(&self) -> Vec<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidateInit> {
        self.candidates.lock().unwrap().clone()
    }

    pub fn tracks_added(&self) -> usize {
        self.tracks.lock().unwrap().len()
    }

    pub fn times_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct ConnHandle(Arc<MockConnection>);

#[async_trait]
impl PeerConnection for ConnHandle {
    async fn create_offer(&self) -> Result<SessionDescription, MediaError> {
        self.0.check()?;
        self.0.offers.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription {
            kind: "offer".into(),
            sdp: "v=0 mock offer".into(),
        })
    }

    async fn create_answer(&self) -> Result<SessionDescription, MediaError> {
        self.0.check()?;
        self.0.answers.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription {
            kind: "answer".into(),
            sdp: "v=0 mock answer".into(),
        })
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), MediaError> {
        self.0.check()?;
        self.0.local.lock().unwrap().push(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), MediaError> {
        self.0.check()?;
        self.0.remote.lock().unwrap().push(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<(), MediaError> {
        self.0.check()?;
        self.0.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn add_track(&self, track: TrackInfo) -> Result<(), MediaError> {
        self.0.check()?;
        self.0.tracks.lock().unwrap().push(track);
        Ok(())
    }

    async fn close(&self) {
        self.0.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockPeerFactory {
    connections: StdMutex<Vec<Arc<MockConnection>>>,
}

impl MockPeerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connections_created(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// The most recently created connection.
    pub fn last(&self) -> Arc<MockConnection> {
        self.connections
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no peer connection created yet")
    }
}

impl PeerConnectionFactory for MockPeerFactory {
    fn create(
        &self,
        _config: &IceConfig,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Box<dyn PeerConnection>, MediaError> {
        let conn = Arc::new(MockConnection {
            events,
            offers: AtomicUsize::new(0),
            answers: AtomicUsize::new(0),
            local: StdMutex::new(Vec::new()),
            remote: StdMutex::new(Vec::new()),
            candidates: StdMutex::new(Vec::new()),
            tracks: StdMutex::new(Vec::new()),
            closed: AtomicUsize::new(0),
            fail_negotiation: AtomicBool::new(false),
        });
        self.connections.lock().unwrap().push(Arc::clone(&conn));
        Ok(Box::new(ConnHandle(conn)))
    }
}

// -- Harness --

/// Records every presentation event the manager publishes.
pub struct EventLog {
    events: Arc<StdMutex<Vec<CallEvent>>>,
}

impl EventLog {
    pub fn attach(manager: &CallManager) -> Self {
        let mut rx = manager.subscribe();
        let events: Arc<StdMutex<Vec<CallEvent>>> = Arc::default();
        let sink = Arc::clone(&events);
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                sink.lock().unwrap().push(event);
            }
        });
        Self { events }
    }

    pub fn all(&self) -> Vec<CallEvent> {
        self.events.lock().unwrap().clone()
    }

    /// The statuses seen in state updates, `None` for idle.
    pub fn statuses(&self) -> Vec<Option<crate::types::CallStatus>> {
        self.all()
            .into_iter()
            .filter_map(|event| match event {
                CallEvent::State(snapshot) => Some(snapshot.map(|s| s.status)),
                CallEvent::RemoteStream(_) => None,
            })
            .collect()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.statuses().last(), Some(None))
    }
}

pub struct Harness {
    pub manager: Arc<CallManager>,
    pub relay: Arc<MockRelay>,
    pub devices: Arc<MockDevices>,
    pub factory: Arc<MockPeerFactory>,
    pub log: EventLog,
}

impl Harness {
    pub fn new(user_id: &str) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let relay = MockRelay::new();
        let devices = Arc::new(MockDevices::new());
        let factory = Arc::new(MockPeerFactory::new());
        let manager = CallManager::new(
            UserId::new(user_id),
            Arc::clone(&relay) as Arc<dyn SignalingRelay>,
            Arc::clone(&devices) as Arc<dyn MediaDevices>,
            Arc::clone(&factory) as Arc<dyn PeerConnectionFactory>,
            CallManagerConfig::default(),
        );
        let log = EventLog::attach(&manager);
        Self {
            manager,
            relay,
            devices,
            factory,
            log,
        }
    }
}

/// Relay-side view of a call record, for driving pushes in tests.
pub fn call_record(id: &str) -> Call {
    Call {
        id: CallId::new(id),
        caller_id: UserId::new("alice"),
        receiver_id: UserId::new("bob"),
        call_type: CallType::Voice,
        conversation_id: ConversationId::new("conv1"),
    }
}

/// Poll `condition` until it holds or a short deadline passes.
pub async fn eventually(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
