// Slamtec cloud resource API (account and device records).

pub mod client;
pub mod models;

mod account;

pub use client::CloudClient;
pub use models::{DeviceList, DeviceRecord, UserRecord};
