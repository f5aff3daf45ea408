//! `vacbridge devices`: account device listing.

use tabled::Tabled;
use vacbridge_core::DeviceInfo;
use vacbridge_core::setup;

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
pub struct DeviceRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Model")]
    pub model: String,
    #[tabled(rename = "Firmware")]
    pub firmware: String,
}

impl From<&DeviceInfo> for DeviceRow {
    fn from(d: &DeviceInfo) -> Self {
        Self {
            id: d.device_id.clone(),
            name: d.name.clone(),
            model: d.model.clone(),
            firmware: d.software_version.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

/// Render a device list in the selected format.
pub fn render(devices: &[DeviceInfo], global: &GlobalOpts) -> String {
    output::render_list(&global.output, devices, |d| DeviceRow::from(d), |d| d.device_id.clone())
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load_config_or_default();
    let account = config::resolve_account(global, &cfg)?;
    let devices = setup::list_devices(&account).await?;

    if devices.is_empty() && !global.quiet {
        eprintln!("No devices on this account.");
        return Ok(());
    }

    output::print_output(&render(&devices, global), global.quiet);
    Ok(())
}
