use thiserror::Error;

/// Top-level error type for the `vacbridge-api` crate.
///
/// Covers the identity endpoint, the cloud resource endpoints and the
/// device's MQTT channel. `vacbridge-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The identity endpoint rejected the credentials (HTTP 400 or 401).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Operation did not finish in time.
    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Cloud ───────────────────────────────────────────────────────
    /// Non-success response from a cloud endpoint.
    #[error("Cloud API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An outbound envelope could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── MQTT ────────────────────────────────────────────────────────
    /// Network or protocol failure while opening the broker session.
    #[error("MQTT connection failed: {0}")]
    MqttConnect(String),

    /// The broker answered CONNECT with a non-success return code.
    #[error("MQTT broker refused the connection: {code}")]
    ConnectionRefused { code: String },

    /// The client's request queue rejected a publish or subscribe.
    #[error("MQTT client error: {0}")]
    MqttClient(String),
}

impl Error {
    /// Returns `true` if the identity endpoint rejected the credentials.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }
}

impl From<rumqttc::ClientError> for Error {
    fn from(err: rumqttc::ClientError) -> Self {
        Self::MqttClient(err.to_string())
    }
}
