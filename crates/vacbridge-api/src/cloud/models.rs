// Cloud resource payloads.
//
// The cloud returns more fields than we use; unknown keys are kept in
// `extra` so `vacbridge devices -o json` can show them verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `GET /api/users` response.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
}

/// `GET /api/devices` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub content: Vec<DeviceRecord>,
}

/// One device as returned by the list or the single-device endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub software_version: Option<String>,
    #[serde(default)]
    pub hardware_version: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}
