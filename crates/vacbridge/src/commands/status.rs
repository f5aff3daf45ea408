//! `vacbridge status` and `vacbridge watch`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use vacbridge_core::{ConnectionSupervisor, DeviceInfo, DeviceState, VacuumStatus};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::error::CliError;
use crate::output;

use super::open_session;

/// What `status`/`watch` print: metadata plus the state snapshot.
#[derive(Debug, Serialize)]
pub struct StatusView {
    pub device: DeviceInfo,
    pub connected: bool,
    pub status: VacuumStatus,
    pub state: DeviceState,
}

impl StatusView {
    fn capture(supervisor: &ConnectionSupervisor) -> Self {
        let state = supervisor.snapshot();
        Self {
            device: supervisor.device_info(),
            connected: supervisor.is_connected(),
            status: state.status(),
            state,
        }
    }
}

fn opt<T: std::fmt::Display>(value: Option<T>, suffix: &str) -> String {
    value.map_or_else(|| "unknown".into(), |v| format!("{v}{suffix}"))
}

fn detail(view: &StatusView) -> String {
    let s = &view.state;
    let action = s
        .action_name
        .clone()
        .unwrap_or_else(|| s.action.name().to_owned());
    output::key_values(&[
        ("Device", format!("{} ({})", view.device.name, view.device.device_id)),
        ("Connected", view.connected.to_string()),
        ("Status", view.status.to_string()),
        ("Action", action),
        ("Battery", opt(s.battery, "%")),
        ("Charging", s.charging.to_string()),
        ("DC connected", s.dc_connected.to_string()),
        ("Temperature", opt(s.temperature, "°C")),
        ("Fan speed", s.sweep_mode.to_string()),
        ("Mode", s.device_mode.to_string()),
        ("Cleaning time", format!("{} min", s.sweep_time_secs / 60)),
        (
            "Position",
            format!("x={:.2} y={:.2} yaw={:.0}°", s.pose.x, s.pose.y, s.pose.yaw),
        ),
        ("Dock", format!("x={:.2} y={:.2}", s.dock_pose.x, s.dock_pose.y)),
        ("Wi-Fi", opt(s.network.ssid.as_deref(), "")),
        ("IP", opt(s.network.ip.as_deref(), "")),
    ])
}

fn plain(view: &StatusView) -> String {
    format!(
        "{} {} {}",
        view.status,
        opt(view.state.battery, ""),
        view.state.sweep_mode
    )
}

fn render(view: &StatusView, global: &GlobalOpts) -> String {
    output::render_single(&global.output, view, detail, plain)
}

// ── status ──────────────────────────────────────────────────────────

pub async fn status(args: &StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let supervisor = open_session(global).await?;

    let reported = Arc::new(Notify::new());
    let signal = Arc::clone(&reported);
    let handle = supervisor.add_listener(move |_| signal.notify_one());

    let waited = tokio::time::timeout(Duration::from_secs(args.wait), reported.notified()).await;
    handle.remove();

    let view = StatusView::capture(&supervisor);
    supervisor.disconnect().await;

    if waited.is_err() {
        tracing::warn!(wait_secs = args.wait, "device did not report in time, showing partial state");
    }
    output::print_output(&render(&view, global), global.quiet);
    Ok(())
}

// ── watch ───────────────────────────────────────────────────────────

pub async fn watch(global: &GlobalOpts) -> Result<(), CliError> {
    let supervisor = open_session(global).await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let handle = supervisor.add_listener(move |_| {
        let _ = tx.send(());
    });
    let mut connection = supervisor.connection_state();

    if !global.quiet {
        eprintln!("Watching {} (Ctrl-C to stop)", supervisor.device_info().name);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(()) = rx.recv() => {
                let stamp = chrono::Local::now().format("%H:%M:%S");
                let view = StatusView::capture(&supervisor);
                if !global.quiet {
                    eprintln!("── {stamp} ──");
                }
                output::print_output(&render(&view, global), global.quiet);
            }
            Ok(()) = connection.changed() => {
                let state = *connection.borrow_and_update();
                if !global.quiet {
                    eprintln!("connection: {state}");
                }
            }
        }
    }

    handle.remove();
    supervisor.disconnect().await;
    Ok(())
}
