// ── Account setup ──
//
// One-shot discovery used before a session exists: sign in, resolve the
// account user id, and pick the device to bind to.

use std::sync::Arc;

use tracing::{debug, info};
use vacbridge_api::{CloudClient, TokenManager};

use crate::config::AccountConfig;
use crate::error::CoreError;
use crate::model::{DeviceIdentity, DeviceInfo};

/// Result of [`discover`].
#[derive(Debug, Clone)]
pub struct Discovery {
    pub identity: DeviceIdentity,
    /// The selected device.
    pub device: DeviceInfo,
    /// Every device on the account, in cloud order.
    pub devices: Vec<DeviceInfo>,
}

fn cloud_client(account: &AccountConfig) -> Result<CloudClient, CoreError> {
    let http = account.transport().build_client()?;
    let tokens = Arc::new(TokenManager::new(
        http.clone(),
        &account.cloud_url,
        account.client_credentials(),
        account.email.clone(),
        account.password.clone(),
    )?);
    Ok(CloudClient::new(http, account.cloud_url.clone(), tokens))
}

/// Every device on the account, in cloud order. May be empty.
pub async fn list_devices(account: &AccountConfig) -> Result<Vec<DeviceInfo>, CoreError> {
    let cloud = cloud_client(account)?;
    cloud.tokens().authenticate().await?;
    Ok(cloud
        .list_devices()
        .await?
        .into_iter()
        .map(DeviceInfo::from)
        .collect())
}

/// Authenticate and select a device.
///
/// With `preferred = None` the first listed device is chosen. Bad
/// credentials surface as [`CoreError::AuthenticationFailed`]; an account
/// with no (matching) device as [`CoreError::DeviceNotFound`].
pub async fn discover(
    account: &AccountConfig,
    preferred: Option<&str>,
) -> Result<Discovery, CoreError> {
    let cloud = cloud_client(account)?;

    cloud.tokens().authenticate().await?;
    let user_id = cloud.user_id().await?;
    let devices: Vec<DeviceInfo> = cloud
        .list_devices()
        .await?
        .into_iter()
        .map(DeviceInfo::from)
        .collect();
    debug!(count = devices.len(), "account devices");

    let device = match preferred {
        Some(id) => devices.iter().find(|d| d.device_id == id),
        None => devices.first(),
    }
    .cloned()
    .ok_or_else(|| CoreError::DeviceNotFound {
        identifier: preferred.map_or_else(|| "any device on the account".into(), str::to_owned),
    })?;

    info!(device_id = %device.device_id, name = %device.name, "device selected");

    Ok(Discovery {
        identity: DeviceIdentity {
            device_id: device.device_id.clone(),
            user_id,
        },
        device,
        devices,
    })
}
