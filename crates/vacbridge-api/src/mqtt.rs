//! MQTT session to the device broker.
//!
//! [`MqttSession::connect`] opens the TLS connection, waits for the broker's
//! CONNACK, then hands the event loop to a background delivery task. The
//! task keeps polling; `rumqttc` re-dials on the next poll after a network
//! failure, so reconnection needs no bookkeeping here beyond pacing the
//! polls while the broker is unreachable.
//!
//! Inbound traffic is reported through a [`SessionHandler`], called from the
//! delivery task. Outbound traffic goes through a [`SessionLink`], which only
//! enqueues and therefore never blocks.
//!
//! ```rust,ignore
//! let cancel = CancellationToken::new();
//! let session = MqttSession::connect(options, handler, cancel.clone()).await?;
//! session.link().publish("device/abc/robot", br#"{"f":36}"#.to_vec())?;
//! session.close(Duration::from_secs(2)).await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, trace, warn};

use crate::error::Error;
use crate::transport::TlsMode;

// ── Limits ───────────────────────────────────────────────────────────

const REQUEST_CAPACITY: usize = 64;
const MAX_PACKET_SIZE: usize = 256 * 1024;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Pacing for polls while the broker is unreachable.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay after the first failed poll. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on the delay. Default: 120s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
        }
    }
}

// ── SessionOptions ───────────────────────────────────────────────────

/// Everything needed to open one broker session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub host: String,
    pub port: u16,
    /// The broker keys sessions by access token, so this is the token too.
    pub client_id: String,
    pub username: String,
    pub password: SecretString,
    pub keep_alive: Duration,
    /// `None` connects over plain TCP (local test brokers only).
    pub tls: Option<TlsMode>,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl SessionOptions {
    fn to_mqtt_options(&self) -> Result<MqttOptions, Error> {
        if self.client_id.trim().is_empty() {
            return Err(Error::MqttConnect("empty client id".into()));
        }

        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options
            .set_credentials(self.username.clone(), self.password.expose_secret().to_owned())
            .set_keep_alive(self.keep_alive.max(Duration::from_secs(5)))
            .set_clean_session(true)
            .set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

        match &self.tls {
            None => {}
            Some(TlsMode::System) => {
                options.set_transport(Transport::tls_with_default_config());
            }
            Some(mode @ TlsMode::CustomCa(_)) => {
                let ca = mode.read_custom_ca()?.unwrap_or_default();
                options.set_transport(Transport::tls(ca, None, None));
            }
            Some(TlsMode::DangerAcceptInvalid) => {
                warn!("certificate checks cannot be disabled for the broker, using system roots");
                options.set_transport(Transport::tls_with_default_config());
            }
        }

        Ok(options)
    }
}

// ── Handler / link ───────────────────────────────────────────────────

/// Receives session events on the delivery task.
///
/// Implementations must not block: the delivery task is also what drives
/// keep-alives and outbound publishes.
pub trait SessionHandler: Send + Sync + 'static {
    /// The broker accepted CONNECT. Fires on the initial handshake and on
    /// every automatic reconnect.
    fn on_connect(&self, link: &SessionLink);

    /// A PUBLISH arrived on a subscribed topic.
    fn on_message(&self, topic: &str, payload: &[u8]);

    /// The connection dropped. Fires once per outage.
    fn on_disconnect(&self, error: &Error);
}

/// Non-blocking handle for outbound traffic.
#[derive(Clone)]
pub struct SessionLink {
    client: AsyncClient,
}

impl SessionLink {
    /// Enqueue a QoS 0 publish.
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Error> {
        trace!(topic, bytes = payload.len(), "enqueue publish");
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(Error::from)
    }

    /// Enqueue a QoS 0 subscription.
    pub fn subscribe(&self, topic: &str) -> Result<(), Error> {
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(Error::from)
    }
}

// ── MqttSession ──────────────────────────────────────────────────────

/// A live broker session and its delivery task.
///
/// Dropping the session cancels the task without a DISCONNECT; prefer
/// [`close`](Self::close).
pub struct MqttSession {
    link: SessionLink,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MqttSession {
    /// Connect, wait for CONNACK, and spawn the delivery task.
    ///
    /// `handler.on_connect` has already run when this returns. A refused
    /// CONNACK is [`Error::ConnectionRefused`]; no retry is attempted.
    pub async fn connect(
        options: SessionOptions,
        handler: Arc<dyn SessionHandler>,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let mqtt_options = options.to_mqtt_options()?;
        let (client, mut eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        info!(host = %options.host, port = options.port, "connecting to broker");

        let timeout_secs = options.connect_timeout.as_secs();
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(Error::MqttConnect("cancelled during handshake".into()));
            }
            result = tokio::time::timeout(options.connect_timeout, await_connack(&mut eventloop)) => {
                result.map_err(|_| Error::Timeout { timeout_secs })??;
            }
        }

        info!("broker accepted connection");
        let link = SessionLink { client };
        handler.on_connect(&link);

        let task = tokio::spawn(delivery_loop(
            eventloop,
            link.clone(),
            handler,
            options.reconnect,
            cancel.clone(),
        ));

        Ok(Self {
            link,
            cancel,
            task: Some(task),
        })
    }

    pub fn link(&self) -> SessionLink {
        self.link.clone()
    }

    /// Send DISCONNECT and wait up to `grace` for the delivery task to
    /// flush it; the task is cancelled after that.
    pub async fn close(mut self, grace: Duration) {
        if let Err(e) = self.link.client.try_disconnect() {
            debug!(error = %e, "disconnect request not queued");
        }

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                debug!("delivery task still running after grace period, cancelling");
                self.cancel.cancel();
                let _ = task.await;
            }
        }

        self.cancel.cancel();
        info!("broker session closed");
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Handshake ────────────────────────────────────────────────────────

/// Poll until the broker answers CONNECT.
async fn await_connack(eventloop: &mut EventLoop) -> Result<(), Error> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                debug!(session_present = ack.session_present, "CONNACK received");
                return Ok(());
            }
            Ok(event) => trace!(?event, "pre-CONNACK event"),
            Err(e) => {
                let err = map_connection_error(e);
                error!(error = %err, "broker handshake failed");
                return Err(err);
            }
        }
    }
}

fn map_connection_error(err: ConnectionError) -> Error {
    match err {
        ConnectionError::ConnectionRefused(code) => Error::ConnectionRefused {
            code: format!("{code:?}"),
        },
        ConnectionError::Tls(e) => Error::Tls(e.to_string()),
        other => Error::MqttConnect(other.to_string()),
    }
}

// ── Delivery loop ────────────────────────────────────────────────────

/// Drive the event loop until cancelled or the session is closed. Polls
/// are retried forever; `rumqttc` re-dials on each one.
async fn delivery_loop(
    mut eventloop: EventLoop,
    link: SessionLink,
    handler: Arc<dyn SessionHandler>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    let mut online = true;

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!(attempt, "broker connection restored");
                attempt = 0;
                online = true;
                handler.on_connect(&link);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                trace!(topic = %publish.topic, bytes = publish.payload.len(), "inbound publish");
                handler.on_message(&publish.topic, &publish.payload);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("DISCONNECT sent, stopping delivery");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let err = map_connection_error(e);
                let level = failure_level(online, &err);
                if level == Level::ERROR {
                    error!(error = %err, attempt, "broker refused connection");
                } else if level == Level::WARN {
                    warn!(error = %err, "broker connection lost");
                } else {
                    debug!(error = %err, attempt, "broker still unreachable");
                }
                if online {
                    online = false;
                    handler.on_disconnect(&err);
                }

                let delay = calculate_backoff(attempt, &reconnect);
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                debug!(delay_ms, attempt, "waiting before next poll");

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                attempt = attempt.saturating_add(1);
            }
        }
    }

    debug!("delivery loop exiting");
}

/// How loudly to report a failed poll. A refused CONNACK is always an
/// error; a plain network failure is a warning once per outage.
fn failure_level(online: bool, err: &Error) -> Level {
    if matches!(err, Error::ConnectionRefused { .. }) {
        Level::ERROR
    } else if online {
        Level::WARN
    } else {
        Level::DEBUG
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn options() -> SessionOptions {
        SessionOptions {
            host: "iot.example.test".into(),
            port: 8883,
            client_id: "access-token".into(),
            username: "user-1".into(),
            password: SecretString::from("access-token"),
            keep_alive: Duration::from_secs(60),
            tls: None,
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
        }
    }

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(120));
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig::default();
        let d = calculate_backoff(40, &config);
        assert!(d <= Duration::from_secs(150), "delay {d:?} should be capped near 120s");
    }

    #[test]
    fn backoff_survives_huge_attempt_counts() {
        let config = ReconnectConfig::default();
        let d = calculate_backoff(u32::MAX, &config);
        assert!(d <= Duration::from_secs(150));
    }

    #[test]
    fn mqtt_options_carry_identity() {
        let mqtt = options().to_mqtt_options().unwrap();
        assert_eq!(mqtt.client_id(), "access-token");
        assert_eq!(mqtt.broker_address(), ("iot.example.test".to_owned(), 8883));
        assert_eq!(mqtt.keep_alive(), Duration::from_secs(60));
    }

    #[test]
    fn empty_client_id_is_rejected() {
        let mut opts = options();
        opts.client_id = String::new();
        assert!(matches!(opts.to_mqtt_options(), Err(Error::MqttConnect(_))));
    }

    #[test]
    fn refused_reconnect_is_logged_as_error_even_mid_outage() {
        let refused = Error::ConnectionRefused {
            code: "NotAuthorized".into(),
        };
        assert_eq!(failure_level(false, &refused), Level::ERROR);
        assert_eq!(failure_level(true, &refused), Level::ERROR);

        let dropped = Error::MqttConnect("connection reset".into());
        assert_eq!(failure_level(true, &dropped), Level::WARN);
        assert_eq!(failure_level(false, &dropped), Level::DEBUG);
    }

    #[test]
    fn refused_code_maps_to_connection_refused() {
        let err = map_connection_error(ConnectionError::ConnectionRefused(
            rumqttc::ConnectReturnCode::BadUserNamePassword,
        ));
        assert!(matches!(err, Error::ConnectionRefused { ref code } if code == "BadUserNamePassword"));
    }
}
