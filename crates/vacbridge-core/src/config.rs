// ── Runtime session configuration ──
//
// These types describe *how* to reach the cloud and the device broker.
// They carry credential data and connection tuning, but never touch disk.
// The CLI builds a `SessionConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;
use vacbridge_api::auth::{DEFAULT_CLIENT_ID, DEFAULT_CLIENT_SECRET};
use vacbridge_api::{ClientCredentials, TlsMode, TransportConfig};

pub const DEFAULT_CLOUD_URL: &str = "https://cloud.slamtec.com";
pub const DEFAULT_BROKER_HOST: &str = "iot.slamtec.com";
pub const DEFAULT_BROKER_PORT: u16 = 8883;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip HTTP certificate checks (debugging proxies only).
    DangerAcceptInvalid,
}

impl TlsVerification {
    pub(crate) fn to_tls_mode(&self) -> TlsMode {
        match self {
            Self::SystemDefaults => TlsMode::System,
            Self::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            Self::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// Cloud account credentials and HTTP tuning.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Cloud root (identity and resource endpoints).
    pub cloud_url: Url,
    pub client_id: String,
    pub client_secret: SecretString,
    pub email: String,
    pub password: SecretString,
    pub tls: TlsVerification,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl AccountConfig {
    pub fn new(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            cloud_url: default_cloud_url(),
            client_id: DEFAULT_CLIENT_ID.into(),
            client_secret: SecretString::from(DEFAULT_CLIENT_SECRET),
            email: email.into(),
            password,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.to_tls_mode(),
            timeout: self.timeout,
        }
    }

    pub(crate) fn client_credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }
}

/// Device broker address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    /// Plain TCP when false; only useful against a local test broker.
    pub tls: bool,
}

impl Default for BrokerEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.into(),
            port: DEFAULT_BROKER_PORT,
            tls: true,
        }
    }
}

/// Everything a `ConnectionSupervisor` needs for one device.
///
/// Built by the CLI, passed to the supervisor; core never reads config files.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub account: AccountConfig,
    pub device_id: String,
    /// Account user id cached from an earlier setup; resolved when absent.
    pub user_id: Option<String>,
    pub broker: BrokerEndpoint,
    pub keep_alive: Duration,
    /// Upper bound on the broker handshake.
    pub connect_timeout: Duration,
    /// Quiet period before listeners are notified of a burst of updates.
    pub debounce: Duration,
    /// Period of the one-shot state queries.
    pub poll_interval: Duration,
}

impl SessionConfig {
    pub fn new(account: AccountConfig, device_id: impl Into<String>) -> Self {
        Self {
            account,
            device_id: device_id.into(),
            user_id: None,
            broker: BrokerEndpoint::default(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            debounce: Duration::from_millis(150),
            poll_interval: Duration::from_secs(30),
        }
    }
}

pub fn default_cloud_url() -> Url {
    Url::parse(DEFAULT_CLOUD_URL).expect("default cloud URL is valid")
}
