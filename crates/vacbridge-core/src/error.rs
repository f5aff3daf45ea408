// ── Core error types ──
//
// User-facing errors from vacbridge-core. Consumers never see HTTP status
// codes or MQTT return codes directly; the `From<vacbridge_api::Error>` impl
// translates transport-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Device is not connected")]
    Disconnected,

    #[error("Connection timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Command rejected: {reason}")]
    CommandRejected { reason: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<vacbridge_api::Error> for CoreError {
    fn from(err: vacbridge_api::Error) -> Self {
        match err {
            vacbridge_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            vacbridge_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        endpoint: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            vacbridge_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            vacbridge_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            vacbridge_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                endpoint: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            vacbridge_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            vacbridge_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            vacbridge_api::Error::Serialization(e) => {
                CoreError::Internal(format!("Serialization error: {e}"))
            }
            vacbridge_api::Error::MqttConnect(reason) => CoreError::ConnectionFailed {
                endpoint: "broker".into(),
                reason,
            },
            vacbridge_api::Error::ConnectionRefused { code } => CoreError::ConnectionFailed {
                endpoint: "broker".into(),
                reason: format!("connection refused ({code})"),
            },
            vacbridge_api::Error::MqttClient(reason) => CoreError::CommandRejected { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_maps_to_authentication_failed() {
        let err: CoreError = vacbridge_api::Error::Authentication {
            message: "invalid credentials".into(),
        }
        .into();
        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    }

    #[test]
    fn refused_connack_is_connection_failure() {
        let err: CoreError = vacbridge_api::Error::ConnectionRefused {
            code: "NotAuthorized".into(),
        }
        .into();
        match err {
            CoreError::ConnectionFailed { endpoint, reason } => {
                assert_eq!(endpoint, "broker");
                assert!(reason.contains("NotAuthorized"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn api_status_is_preserved() {
        let err: CoreError = vacbridge_api::Error::Api {
            status: 404,
            message: "gone".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Api { status: Some(404), .. }));
    }
}
