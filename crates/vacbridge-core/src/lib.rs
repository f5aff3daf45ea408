// vacbridge-core: Session coordinator between vacbridge-api and consumers (CLI).

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod listeners;
pub mod model;
pub mod setup;
pub mod store;
pub mod supervisor;

mod debounce;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{AccountConfig, BrokerEndpoint, SessionConfig, TlsVerification};
pub use dispatcher::Command;
pub use error::CoreError;
pub use listeners::ListenerHandle;
pub use store::StateStore;
pub use supervisor::{ConnectionState, ConnectionSupervisor};

pub use model::{
    ActionCode, DeviceIdentity, DeviceInfo, DeviceMode, DeviceState, DockPose, NetworkInfo, Pose,
    SweepMode, VacuumStatus,
};
