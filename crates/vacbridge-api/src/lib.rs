// vacbridge-api: Async Rust client for the Slamtec cloud and device channel

pub mod auth;
pub mod cloud;
pub mod error;
pub mod mqtt;
pub mod protocol;
pub mod transport;

pub use auth::{ClientCredentials, Credential, TokenManager};
pub use cloud::{CloudClient, DeviceRecord};
pub use error::Error;
pub use mqtt::{MqttSession, SessionHandler, SessionLink, SessionOptions};
pub use protocol::{DecodeError, Envelope, InboundEvent};
pub use transport::{TlsMode, TransportConfig};
