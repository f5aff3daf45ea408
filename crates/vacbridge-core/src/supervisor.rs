// ── Connection supervisor ──
//
// Full lifecycle management for one device session: token, broker
// connection, subscription, periodic state queries, inbound routing into
// the state store, and debounced listener fan-out.

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use secrecy::ExposeSecret;
use tokio::sync::{OnceCell, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use vacbridge_api::mqtt::ReconnectConfig;
use vacbridge_api::{
    CloudClient, Envelope, InboundEvent, MqttSession, SessionHandler, SessionLink, SessionOptions,
    TokenManager,
};

use crate::config::SessionConfig;
use crate::debounce::Debouncer;
use crate::error::CoreError;
use crate::listeners::{ListenerHandle, ListenerSet};
use crate::model::{DeviceIdentity, DeviceInfo, DeviceState};
use crate::store::StateStore;

/// How long `disconnect` waits for the DISCONNECT packet to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The broker connection dropped; the transport is re-dialing.
    Reconnecting,
    /// The last `connect` attempt failed.
    Failed,
}

// ── Topics ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct DeviceTopics {
    /// Commands to the robot.
    outbound: String,
    /// Status from the robot.
    inbound: String,
}

impl DeviceTopics {
    fn for_device(device_id: &str) -> Self {
        Self {
            outbound: format!("device/{device_id}/robot"),
            inbound: format!("device/{device_id}/app"),
        }
    }
}

// ── ConnectionSupervisor ─────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SupervisorInner>`. Exposes the state
/// snapshot, listener registration, connection lifecycle and (through
/// `dispatcher.rs`) the command surface.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    config: SessionConfig,
    tokens: Arc<TokenManager>,
    cloud: CloudClient,
    topics: DeviceTopics,
    store: Arc<StateStore>,
    listeners: Arc<ListenerSet>,
    debouncer: Debouncer,
    connection_state: watch::Sender<ConnectionState>,
    user_id: OnceCell<String>,
    device_info: RwLock<DeviceInfo>,
    cancel: CancellationToken,
    /// Held for the whole of `connect`/`disconnect` so they never interleave.
    session: tokio::sync::Mutex<Option<MqttSession>>,
    /// Outbound handle for the live session, readable without awaiting.
    link: RwLock<Option<SessionLink>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    /// Create a supervisor from configuration. Does NOT connect; call
    /// [`connect()`](Self::connect) to authenticate and open the session.
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        let http = config.account.transport().build_client()?;
        let tokens = Arc::new(TokenManager::new(
            http.clone(),
            &config.account.cloud_url,
            config.account.client_credentials(),
            config.account.email.clone(),
            config.account.password.clone(),
        )?);
        let cloud = CloudClient::new(http, config.account.cloud_url.clone(), Arc::clone(&tokens));
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            inner: Arc::new(SupervisorInner {
                topics: DeviceTopics::for_device(&config.device_id),
                user_id: OnceCell::new_with(config.user_id.clone()),
                device_info: RwLock::new(DeviceInfo::fallback(config.device_id.clone())),
                debouncer: Debouncer::new(config.debounce),
                store: Arc::new(StateStore::new()),
                listeners: ListenerSet::new(),
                connection_state,
                cancel: CancellationToken::new(),
                session: tokio::sync::Mutex::new(None),
                link: RwLock::new(None),
                poll_task: Mutex::new(None),
                tokens,
                cloud,
                config,
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The cloud client sharing this supervisor's credentials.
    pub fn cloud(&self) -> &CloudClient {
        &self.inner.cloud
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Authenticate, open the broker session and start the poll task.
    ///
    /// Resolves once the broker has accepted CONNECT and the post-connect
    /// frames are queued. Calling it while a session is open is a no-op.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let mut session_slot = self.inner.session.lock().await;
        if session_slot.is_some() {
            debug!("connect called with a live session, ignoring");
            return Ok(());
        }

        self.inner.set_state(ConnectionState::Connecting);

        match self.open_session().await {
            Ok(session) => {
                *write(&self.inner.link) = Some(session.link());
                *session_slot = Some(session);
                self.spawn_poll_task();
                info!(device_id = %self.inner.config.device_id, "device session established");
                Ok(())
            }
            Err(e) => {
                self.inner.set_state(ConnectionState::Failed);
                warn!(error = %e, "device session failed to start");
                Err(e)
            }
        }
    }

    async fn open_session(&self) -> Result<MqttSession, CoreError> {
        let inner = &self.inner;
        let token = inner.tokens.ensure_valid().await?;
        let user_id = inner.resolve_user_id().await?;
        inner.refresh_device_info().await;

        let config = &inner.config;
        let options = SessionOptions {
            host: config.broker.host.clone(),
            port: config.broker.port,
            client_id: token.expose_secret().to_owned(),
            username: user_id,
            password: token,
            keep_alive: config.keep_alive,
            tls: config
                .broker
                .tls
                .then(|| config.account.tls.to_tls_mode()),
            connect_timeout: config.connect_timeout,
            reconnect: ReconnectConfig::default(),
        };

        let handler: Arc<dyn SessionHandler> = Arc::new(FrameHandler {
            inner: Arc::downgrade(&self.inner),
        });
        let session = MqttSession::connect(options, handler, inner.cancel.child_token()).await?;
        Ok(session)
    }

    fn spawn_poll_task(&self) {
        let task = tokio::spawn(poll_task(
            Arc::downgrade(&self.inner),
            self.inner.config.poll_interval,
            self.inner.cancel.child_token(),
        ));
        if let Some(previous) = lock(&self.inner.poll_task).replace(task) {
            previous.abort();
        }
    }

    /// Tear the session down. Idempotent; the state snapshot is kept.
    ///
    /// Cancels the poll task and any pending notification, asks the robot
    /// to stop streaming, closes the broker session and marks the
    /// supervisor [`Disconnected`](ConnectionState::Disconnected).
    pub async fn disconnect(&self) {
        let mut session_slot = self.inner.session.lock().await;

        if let Some(task) = lock(&self.inner.poll_task).take() {
            task.abort();
        }
        self.inner.debouncer.cancel();

        if let Some(session) = session_slot.take() {
            if self.inner.is_connected() {
                if let Err(e) = self.inner.transmit(&Envelope::stop_updates()) {
                    debug!(error = %e, "stop-updates not sent");
                }
            }
            session.close(CLOSE_GRACE).await;
        }

        *write(&self.inner.link) = None;
        self.inner.set_state(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    /// Disconnect, force a fresh token, connect again.
    pub async fn reconnect(&self) -> Result<(), CoreError> {
        info!("reconnecting with a fresh token");
        self.disconnect().await;
        if let Err(e) = self.inner.tokens.refresh().await {
            self.inner.set_state(ConnectionState::Failed);
            return Err(e.into());
        }
        self.connect().await
    }

    /// Re-send "start updates" and the one-shot queries.
    ///
    /// Returns `false` (and logs) when not connected.
    pub fn request_full_update(&self) -> bool {
        let Some(link) = self.inner.live_link() else {
            warn!("full update requested while disconnected");
            return false;
        };
        self.inner.send_session_setup(&link);
        true
    }

    // ── State observation ────────────────────────────────────────

    /// Whether commands can currently be delivered.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Copy of the last-known device state.
    pub fn snapshot(&self) -> DeviceState {
        self.inner.store.snapshot()
    }

    /// Receiver that changes on every state-bearing frame (not debounced).
    pub fn subscribe_state(&self) -> watch::Receiver<DeviceState> {
        self.inner.store.subscribe()
    }

    /// Register a callback for debounced state changes.
    ///
    /// Callbacks run on a spawned task with the state as of the moment
    /// the debounce timer fired.
    pub fn add_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&DeviceState) + Send + Sync + 'static,
    {
        self.inner.listeners.add(Arc::new(listener))
    }

    /// Device metadata from the cloud list (or the fallback placeholder).
    pub fn device_info(&self) -> DeviceInfo {
        read(&self.inner.device_info).clone()
    }

    /// Device and account ids, once the user id is known.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.inner.user_id.get().map(|user_id| DeviceIdentity {
            device_id: self.inner.config.device_id.clone(),
            user_id: user_id.clone(),
        })
    }

    pub(crate) fn transmit(&self, envelope: &Envelope) -> Result<(), CoreError> {
        self.inner.transmit(envelope)
    }
}

// ── Inner: shared by the facade, the handler and background tasks ──

impl SupervisorInner {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.connection_state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    fn is_connected(&self) -> bool {
        *self.connection_state.borrow() == ConnectionState::Connected
    }

    fn live_link(&self) -> Option<SessionLink> {
        if !self.is_connected() {
            return None;
        }
        read(&self.link).clone()
    }

    async fn resolve_user_id(&self) -> Result<String, CoreError> {
        let user_id = self
            .user_id
            .get_or_try_init(|| async { self.cloud.user_id().await })
            .await?;
        Ok(user_id.clone())
    }

    /// Best effort: a failure keeps whatever metadata we already have.
    async fn refresh_device_info(&self) {
        let device_id = &self.config.device_id;
        match self.cloud.list_devices().await {
            Ok(devices) => {
                let info = devices
                    .into_iter()
                    .find(|d| &d.device_id == device_id)
                    .map_or_else(
                        || {
                            warn!(device_id = %device_id, "device not in account list, using defaults");
                            DeviceInfo::fallback(device_id.clone())
                        },
                        DeviceInfo::from,
                    );
                *write(&self.device_info) = info;
            }
            Err(e) => warn!(error = %e, "could not fetch device list"),
        }
    }

    // ── Outbound ─────────────────────────────────────────────────

    fn transmit(&self, envelope: &Envelope) -> Result<(), CoreError> {
        let link = self.live_link().ok_or_else(|| CoreError::CommandRejected {
            reason: "device is not connected".into(),
        })?;
        self.publish_on(&link, envelope)
    }

    fn publish_on(&self, link: &SessionLink, envelope: &Envelope) -> Result<(), CoreError> {
        let payload = envelope.encode().map_err(vacbridge_api::Error::from)?;
        link.publish(&self.topics.outbound, payload)?;
        debug!(function = envelope.function, "frame sent");
        Ok(())
    }

    fn send_queries(&self, link: &SessionLink) {
        for query in Envelope::state_queries() {
            if let Err(e) = self.publish_on(link, &query) {
                warn!(function = query.function, error = %e, "state query not sent");
            }
        }
    }

    fn send_session_setup(&self, link: &SessionLink) {
        if let Err(e) = self.publish_on(link, &Envelope::start_updates()) {
            warn!(error = %e, "start-updates not sent");
        }
        self.send_queries(link);
    }

    // ── Session callbacks (delivery task) ────────────────────────

    fn on_connected(&self, link: &SessionLink) {
        self.set_state(ConnectionState::Connected);
        match link.subscribe(&self.topics.inbound) {
            Ok(()) => info!(topic = %self.topics.inbound, "subscribed to device topic"),
            Err(e) => warn!(topic = %self.topics.inbound, error = %e, "subscribe failed"),
        }
        self.send_session_setup(link);
    }

    fn on_transport_lost(&self, error: &vacbridge_api::Error) {
        let dropped = self.connection_state.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Reconnecting;
                true
            } else {
                false
            }
        });
        if dropped {
            warn!(error = %error, "device connection lost, keeping last known state");
        }
    }

    fn handle_frame(&self, payload: &[u8]) {
        trace!(bytes = payload.len(), "frame received");

        let event = match InboundEvent::decode(payload) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "dropping undecodable frame");
                return;
            }
        };

        match &event {
            InboundEvent::SystemEvent(param) => {
                info!(event = %param, "device system event");
                return;
            }
            InboundEvent::Unknown { code, .. } => {
                debug!(code, "unhandled function code");
                return;
            }
            InboundEvent::Ignored { code } => {
                debug!(code, "frame parameter has the wrong shape");
                return;
            }
            _ => {}
        }

        if self.store.apply(&event) {
            self.schedule_notification();
        }
    }

    fn schedule_notification(&self) {
        let store = Arc::clone(&self.store);
        let listeners = Arc::clone(&self.listeners);
        self.debouncer.arm(move || {
            let state = store.snapshot();
            let notified = listeners.notify_all(&state);
            debug!(listeners = notified, "state change delivered");
        });
    }
}

impl Drop for SupervisorInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Session handler ──────────────────────────────────────────────

/// Routes session callbacks to the supervisor without keeping it alive.
struct FrameHandler {
    inner: Weak<SupervisorInner>,
}

impl SessionHandler for FrameHandler {
    fn on_connect(&self, link: &SessionLink) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_connected(link);
        }
    }

    fn on_message(&self, topic: &str, payload: &[u8]) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if topic != inner.topics.inbound {
            debug!(topic, "message on unexpected topic");
            return;
        }
        inner.handle_frame(payload);
    }

    fn on_disconnect(&self, error: &vacbridge_api::Error) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_transport_lost(error);
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Re-issue the one-shot queries every `period` while connected.
async fn poll_task(inner: Weak<SupervisorInner>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                match inner.live_link() {
                    Some(link) => {
                        debug!("polling device state");
                        inner.send_queries(&link);
                    }
                    None => debug!("skipping poll while disconnected"),
                }
            }
        }
    }
}

// ── Lock helpers ─────────────────────────────────────────────────

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use secrecy::SecretString;
    use url::Url;

    use super::*;
    use crate::config::AccountConfig;

    pub(crate) fn offline_supervisor() -> ConnectionSupervisor {
        let mut account = AccountConfig::new("me@example.com", SecretString::from("pw"));
        account.cloud_url = Url::parse("http://127.0.0.1:9").unwrap();
        ConnectionSupervisor::new(SessionConfig::new(account, "dev-1")).unwrap()
    }

    fn counting_listener(sup: &ConnectionSupervisor) -> (Arc<AtomicUsize>, ListenerHandle) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handle = sup.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (hits, handle)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(400)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn state_subscribers_see_frames_before_the_debounce_fires() {
        let sup = offline_supervisor();
        let (hits, _handle) = counting_listener(&sup);
        let mut states = sup.subscribe_state();

        sup.inner.handle_frame(br#"{"f":3,"p":42}"#);

        assert!(states.has_changed().unwrap());
        assert_eq!(states.borrow_and_update().battery, Some(42));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        sup.inner.handle_frame(b"not json");
        assert!(!states.has_changed().unwrap());

        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn topics_follow_device_id() {
        let topics = DeviceTopics::for_device("abc");
        assert_eq!(topics.outbound, "device/abc/robot");
        assert_eq!(topics.inbound, "device/abc/app");
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_frames_notifies_once() {
        let sup = offline_supervisor();
        let (hits, _handle) = counting_listener(&sup);

        for i in 0..5 {
            let frame = format!(r#"{{"f":3,"p":{}}}"#, 90 - i);
            sup.inner.handle_frame(frame.as_bytes());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(sup.snapshot().battery, Some(86));
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_frames_notify_twice() {
        let sup = offline_supervisor();
        let (hits, _handle) = counting_listener(&sup);

        sup.inner.handle_frame(br#"{"f":4,"p":1}"#);
        settle().await;
        sup.inner.handle_frame(br#"{"f":4,"p":0}"#);
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn listener_sees_state_at_fire_time() {
        let sup = offline_supervisor();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let _handle = sup.add_listener(move |state| {
            *lock(&sink) = Some(state.pose);
        });

        sup.inner.handle_frame(br#"{"f":1,"p":{"x":1.0,"y":1.0,"yaw":0}}"#);
        sup.inner.handle_frame(br#"{"f":1,"p":{"x":2.0,"y":3.0,"yaw":45}}"#);
        settle().await;

        let pose = lock(&seen).unwrap();
        assert!((pose.x - 2.0).abs() < f64::EPSILON);
        assert!((pose.yaw - 45.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_never_notifies_or_mutates() {
        let sup = offline_supervisor();
        let (hits, _handle) = counting_listener(&sup);
        let before = sup.snapshot();

        sup.inner.handle_frame(&[0xc3, 0x28, 0xff]);
        sup.inner.handle_frame(b"{not json");
        sup.inner.handle_frame(b"42");
        sup.inner.handle_frame(br#"{"p":{"x":1}}"#);
        sup.inner.handle_frame(br#"{"f":50,"p":"dust bin full"}"#);
        sup.inner.handle_frame(br#"{"f":999}"#);
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(sup.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_keeps_snapshot_and_cancels_pending_notification() {
        let sup = offline_supervisor();
        let (hits, _handle) = counting_listener(&sup);

        sup.inner.handle_frame(br#"{"f":3,"p":55}"#);
        let before = sup.snapshot();
        sup.disconnect().await;
        sup.disconnect().await;
        settle().await;

        assert!(!sup.is_connected());
        assert_eq!(*sup.connection_state().borrow(), ConnectionState::Disconnected);
        assert_eq!(sup.snapshot(), before);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn removed_listener_is_not_notified() {
        let sup = offline_supervisor();
        let (hits, handle) = counting_listener(&sup);
        assert!(handle.remove());

        sup.inner.handle_frame(br#"{"f":5,"p":true}"#);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(sup.snapshot().dc_connected);
    }

    #[tokio::test]
    async fn transport_loss_only_downgrades_connected() {
        let sup = offline_supervisor();
        let err = vacbridge_api::Error::MqttConnect("reset".into());

        sup.inner.on_transport_lost(&err);
        assert_eq!(*sup.connection_state().borrow(), ConnectionState::Disconnected);

        sup.inner.set_state(ConnectionState::Connected);
        sup.inner.on_transport_lost(&err);
        assert_eq!(*sup.connection_state().borrow(), ConnectionState::Reconnecting);
        assert!(!sup.is_connected());
    }

    #[tokio::test]
    async fn full_update_refused_while_disconnected() {
        let sup = offline_supervisor();
        assert!(!sup.request_full_update());
    }

    #[tokio::test]
    async fn initial_state_and_identity() {
        let sup = offline_supervisor();
        assert_eq!(*sup.connection_state().borrow(), ConnectionState::Disconnected);
        assert!(sup.identity().is_none());
        assert_eq!(sup.device_info().name, "BlitzWolf Vacuum");
    }
}
