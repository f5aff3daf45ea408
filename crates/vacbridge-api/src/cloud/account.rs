// Account and device endpoints.

use tracing::debug;

use super::client::CloudClient;
use super::models::{DeviceList, DeviceRecord, UserRecord};
use crate::error::Error;

const USER_MEDIA_TYPE: &str = "application/vnd.slamtec.user-v1.0+json";
const DEVICE_LIST_MEDIA_TYPE: &str = "application/vnd.slamtec.devicelist-v1.0+json";
const DEVICE_MEDIA_TYPE: &str = "application/vnd.slamtec.device-v1.0+json";

impl CloudClient {
    /// Resolve the account's user id, used as the MQTT username.
    ///
    /// `GET /api/users`
    pub async fn user_id(&self) -> Result<String, Error> {
        let url = self.url("/api/users")?;
        let user: UserRecord = self.get(url, USER_MEDIA_TYPE).await?;
        debug!(user_id = %user.user_id, "resolved account user id");
        Ok(user.user_id)
    }

    /// List every device bound to the account.
    ///
    /// `GET /api/devices`
    pub async fn list_devices(&self) -> Result<Vec<DeviceRecord>, Error> {
        let url = self.url("/api/devices")?;
        let list: DeviceList = self.get(url, DEVICE_LIST_MEDIA_TYPE).await?;
        debug!(count = list.content.len(), "listed devices");
        Ok(list.content)
    }

    /// Fetch a single device record.
    ///
    /// `GET /api/devices/{device_id}`
    pub async fn get_device(&self, device_id: &str) -> Result<DeviceRecord, Error> {
        let url = self.url(&format!("/api/devices/{device_id}"))?;
        self.get(url, DEVICE_MEDIA_TYPE).await
    }
}
