// ── Domain model ──
//
// The device's last-known state and the account-level records that
// identify it. Consumers read these through snapshots; only the
// supervisor's inbound handler writes them.

pub mod device;
pub mod state;

pub use device::{DeviceIdentity, DeviceInfo};
pub use state::{
    ActionCode, DeviceMode, DeviceState, DockPose, NetworkInfo, Pose, SweepMode, VacuumStatus,
};
