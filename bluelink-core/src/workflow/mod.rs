/*!
 * Bluetooth Workflows
 * One-shot sessions that issue a command and settle on the first terminal line
 */

pub mod discoverable;
pub mod pairing;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::bluetoothctl::{Bluetoothctl, Command, Launcher};
use crate::config::{BluelinkConfig, DiscoverableConfig, TimeoutConfig};
use crate::deadline;
use crate::device::Device;
use crate::error::{BluetoothError, Result};
use crate::host::{Host, Toast};
use crate::parser::{BluetoothctlLine, ChangedProperty};

pub use discoverable::DiscoverableSession;
pub use pairing::{handle_incoming_pairing_event, PairingEvent, PairingStep};

/// Single-command workflows that share one execution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect,
    Disconnect,
    Remove,
    Trust,
    Undiscoverable,
}

struct ActionLabels {
    operation: &'static str,
    progress: &'static str,
    done: &'static str,
    failed: &'static str,
}

impl Action {
    fn labels(&self) -> ActionLabels {
        let (operation, progress, done, failed) = match self {
            Action::Connect => ("connect", "Connecting to", "Connected to", "Failed to connect"),
            Action::Disconnect => (
                "disconnect",
                "Disconnecting from",
                "Disconnected from",
                "Failed to disconnect",
            ),
            Action::Remove => ("remove", "Removing", "Removed", "Failed to remove device"),
            Action::Trust => ("trust", "Trusting", "Trusted", "Failed to trust device"),
            Action::Undiscoverable => (
                "undiscoverable",
                "Turning off discoverable mode",
                "Discoverable mode off",
                "Failed to stop discoverable mode",
            ),
        };
        ActionLabels {
            operation,
            progress,
            done,
            failed,
        }
    }

    fn command(&self, mac: &str) -> Command {
        match self {
            Action::Connect => Command::Connect(mac.to_string()),
            Action::Disconnect => Command::Disconnect(mac.to_string()),
            Action::Remove => Command::Remove(mac.to_string()),
            Action::Trust => Command::Trust(mac.to_string()),
            Action::Undiscoverable => Command::Discoverable(false),
        }
    }

    fn timeout(&self, timeouts: &TimeoutConfig) -> Duration {
        match self {
            Action::Connect => timeouts.connect(),
            Action::Disconnect => timeouts.disconnect(),
            Action::Remove => timeouts.remove(),
            Action::Trust => timeouts.trust(),
            Action::Undiscoverable => timeouts.discoverable(),
        }
    }

    /// `Some(Ok)` on success, `Some(Err(reason))` on failure, `None` for lines this action ignores.
    fn outcome(
        &self,
        line: &BluetoothctlLine,
        mac: &str,
    ) -> Option<std::result::Result<(), String>> {
        use BluetoothctlLine as L;

        if let L::DeviceNotAvailable { mac: missing } = line {
            if missing.eq_ignore_ascii_case(mac) {
                return Some(Err(format!("Device {} not available", missing)));
            }
        }

        match (self, line) {
            (Action::Connect, L::ConnectionSuccess) => Some(Ok(())),
            (Action::Connect, L::ConnectionFailure { reason }) => Some(Err(reason.clone())),
            (Action::Disconnect, L::DisconnectionSuccess) => Some(Ok(())),
            (
                Action::Disconnect,
                L::DeviceChanged {
                    device,
                    property: Some(ChangedProperty::Connected(false)),
                },
            ) if device.mac.eq_ignore_ascii_case(mac) => Some(Ok(())),
            (Action::Disconnect, L::DisconnectionFailure { reason }) => Some(Err(reason.clone())),
            (Action::Remove, L::RemovalSuccess) => Some(Ok(())),
            (Action::Remove, L::RemovalFailure { reason }) => Some(Err(reason.clone())),
            (Action::Trust, L::TrustSuccess { mac: trusted })
                if trusted.eq_ignore_ascii_case(mac) =>
            {
                Some(Ok(()))
            }
            (Action::Trust, L::TrustFailure { reason }) => Some(Err(reason.clone())),
            (Action::Undiscoverable, L::DiscoverableSuccess { enabled: false })
            | (Action::Undiscoverable, L::DiscoverableChanged { enabled: false }) => Some(Ok(())),
            (Action::Undiscoverable, L::DiscoverableFailure { reason }) => {
                Some(Err(reason.clone()))
            }
            _ => None,
        }
    }
}

pub(crate) async fn next_line(
    events: &mut UnboundedReceiver<BluetoothctlLine>,
) -> Result<BluetoothctlLine> {
    events.recv().await.ok_or(BluetoothError::SessionClosed)
}

/// Mirrors a settled outcome to a toast and hands it back.
pub(crate) async fn report<T>(
    host: &Host,
    outcome: Result<T>,
    success: String,
    failure: &str,
) -> Result<T> {
    match &outcome {
        Ok(_) => {
            info!("{}", success);
            host.toast(Toast::success(success)).await;
        }
        Err(e) => {
            warn!("{}: {}", failure, e);
            host.toast(Toast::failure(failure).with_message(e.user_message()))
                .await;
        }
    }
    outcome
}

/// Writes the command for `action` and waits for the first line it settles on.
pub(crate) async fn settle(
    session: &Bluetoothctl,
    events: &mut UnboundedReceiver<BluetoothctlLine>,
    action: Action,
    mac: &str,
) -> Result<()> {
    let operation = action.labels().operation;
    session.execute(&action.command(mac)).await?;
    loop {
        let line = next_line(events).await?;
        if let Some(result) = action.outcome(&line, mac) {
            return result.map_err(|reason| BluetoothError::Failed { operation, reason });
        }
    }
}

pub struct Workflows {
    launcher: Arc<dyn Launcher>,
    host: Host,
    timeouts: TimeoutConfig,
    discoverable: DiscoverableConfig,
}

impl Workflows {
    pub fn new(launcher: Arc<dyn Launcher>, host: Host, config: &BluelinkConfig) -> Self {
        Self {
            launcher,
            host,
            timeouts: config.timeouts.clone(),
            discoverable: config.discoverable.clone(),
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub async fn connect_to_device(&self, device: &Device) -> Result<()> {
        self.run_action(Action::Connect, Some(device)).await
    }

    pub async fn disconnect_from_device(&self, device: &Device) -> Result<()> {
        self.run_action(Action::Disconnect, Some(device)).await
    }

    pub async fn remove_device(&self, device: &Device) -> Result<()> {
        self.run_action(Action::Remove, Some(device)).await
    }

    pub async fn trust_device(&self, device: &Device) -> Result<()> {
        self.run_action(Action::Trust, Some(device)).await
    }

    pub async fn make_undiscoverable(&self) -> Result<()> {
        self.run_action(Action::Undiscoverable, None).await
    }

    pub async fn run_action(&self, action: Action, device: Option<&Device>) -> Result<()> {
        let labels = action.labels();
        let mac = device.map(|device| device.mac.as_str()).unwrap_or_default();
        let title = |prefix: &str| match device {
            Some(device) => format!("{} {}", prefix, device.name),
            None => prefix.to_string(),
        };
        info!("Starting {} {}", labels.operation, mac);
        self.host
            .toast(Toast::animated(format!("{}...", title(labels.progress))))
            .await;

        let session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(e) => return self.report(Err(e), String::new(), labels.failed).await,
        };
        let (_subscription, mut events) = session.events();

        let outcome = deadline::within(
            labels.operation,
            action.timeout(&self.timeouts),
            settle(&session, &mut events, action, mac),
        )
        .await;

        session.kill().await;
        self.report(outcome, title(labels.done), labels.failed).await
    }

    pub(crate) async fn report<T>(
        &self,
        outcome: Result<T>,
        success: String,
        failure: &str,
    ) -> Result<T> {
        report(&self.host, outcome, success, failure).await
    }

    pub(crate) async fn launch(&self) -> Result<Bluetoothctl> {
        self.launcher.launch().await
    }
}
