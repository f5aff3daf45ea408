// ── Device identity and metadata ──

use serde::Serialize;
use vacbridge_api::DeviceRecord;

pub const DEFAULT_DEVICE_NAME: &str = "BlitzWolf Vacuum";
pub const DEFAULT_MODEL: &str = "BW-VC1";
pub const MANUFACTURER: &str = "BlitzWolf";

/// Which device on which account a session talks to.
///
/// Fixed for the life of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub user_id: String,
}

/// Descriptive metadata from the cloud device list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub software_version: Option<String>,
    pub hardware_version: Option<String>,
}

impl DeviceInfo {
    /// Placeholder used when the cloud does not list the device.
    pub fn fallback(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            name: DEFAULT_DEVICE_NAME.into(),
            model: DEFAULT_MODEL.into(),
            manufacturer: MANUFACTURER.into(),
            software_version: None,
            hardware_version: None,
        }
    }
}

impl From<DeviceRecord> for DeviceInfo {
    fn from(record: DeviceRecord) -> Self {
        Self {
            name: record
                .device_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DEVICE_NAME.into()),
            model: record.model.unwrap_or_else(|| DEFAULT_MODEL.into()),
            manufacturer: MANUFACTURER.into(),
            software_version: record.software_version,
            hardware_version: record.hardware_version,
            device_id: record.device_id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn record_without_name_uses_default() {
        let record: DeviceRecord =
            serde_json::from_str(r#"{"device_id":"d1","device_name":"  "}"#).unwrap();
        let info = DeviceInfo::from(record);
        assert_eq!(info.name, DEFAULT_DEVICE_NAME);
        assert_eq!(info.model, DEFAULT_MODEL);
        assert_eq!(info.device_id, "d1");
    }

    #[test]
    fn record_fields_carry_over() {
        let record: DeviceRecord = serde_json::from_str(
            r#"{"device_id":"d1","device_name":"Hall","model":"X","software_version":"1.2"}"#,
        )
        .unwrap();
        let info = DeviceInfo::from(record);
        assert_eq!(info.name, "Hall");
        assert_eq!(info.model, "X");
        assert_eq!(info.software_version.as_deref(), Some("1.2"));
        assert!(info.hardware_version.is_none());
    }
}
