/*!
 * Discoverable Mode
 * Keeps a session open while the adapter advertises itself and answers incoming pairs
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::pairing::{handle_incoming_pairing_event, PairingEvent, PairingStep};
use super::{next_line, report, settle, Action, Workflows};
use crate::bluetoothctl::Bluetoothctl;
use crate::deadline;
use crate::device::Device;
use crate::error::{BluetoothError, Result};
use crate::host::{Host, Toast};
use crate::parser::BluetoothctlLine;
use crate::registry::Subscription;

/// Live discoverable mode. `stop` turns it off; dropping only kills the session.
pub struct DiscoverableSession {
    session: Arc<Bluetoothctl>,
    watcher: Option<JoinHandle<()>>,
    host: Host,
    stop_timeout: Duration,
}

impl DiscoverableSession {
    pub fn is_active(&self) -> bool {
        !self.session.is_killed()
            && self
                .watcher
                .as_ref()
                .map(|watcher| !watcher.is_finished())
                .unwrap_or(false)
    }

    /// Writes `discoverable off` and waits for bluetoothctl to confirm before killing the session.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        info!("Stopping discoverable mode");

        let (_subscription, mut events) = self.session.events();
        let outcome = deadline::within(
            "undiscoverable",
            self.stop_timeout,
            settle(&self.session, &mut events, Action::Undiscoverable, ""),
        )
        .await;

        self.session.kill().await;
        report(
            &self.host,
            outcome,
            "No longer discoverable".to_string(),
            "Failed to stop discoverable mode",
        )
        .await
    }
}

impl Drop for DiscoverableSession {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.session.terminate();
    }
}

impl Workflows {
    pub async fn make_discoverable(&self) -> Result<DiscoverableSession> {
        info!("Starting discoverable mode");
        self.host().toast(Toast::animated("Making discoverable...")).await;

        let session = match self.launch().await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                return self
                    .report(Err(e), String::new(), "Failed to make discoverable")
                    .await
            }
        };
        let (subscription, mut events) = session.events();
        let visible_for = self.discoverable.timeout_secs;

        let outcome = deadline::within("discoverable", self.timeouts.discoverable(), async {
            session.discoverable_timeout(visible_for).await?;
            session.discoverable(true).await?;
            loop {
                match next_line(&mut events).await? {
                    BluetoothctlLine::DiscoverableSuccess { enabled: true }
                    | BluetoothctlLine::DiscoverableChanged { enabled: true } => return Ok(()),
                    BluetoothctlLine::DiscoverableFailure { reason } => {
                        return Err(BluetoothError::Failed {
                            operation: "discoverable",
                            reason,
                        })
                    }
                    _ => {}
                }
            }
        })
        .await;

        if let Err(e) = outcome {
            session.kill().await;
            return self.report(Err(e), String::new(), "Failed to make discoverable").await;
        }

        self.host()
            .toast(Toast::success("Discoverable").with_message(format!(
                "Visible to nearby devices for {} seconds",
                visible_for
            )))
            .await;

        let watcher = tokio::spawn(watch_incoming(
            session.clone(),
            self.host().clone(),
            events,
            subscription,
        ));
        Ok(DiscoverableSession {
            session,
            watcher: Some(watcher),
            host: self.host().clone(),
            stop_timeout: self.timeouts.discoverable(),
        })
    }
}

/// Follows device arrivals and answers pairing requests until the session ends.
async fn watch_incoming(
    session: Arc<Bluetoothctl>,
    host: Host,
    mut events: UnboundedReceiver<BluetoothctlLine>,
    _subscription: Subscription,
) {
    let mut seen: HashMap<String, Device> = HashMap::new();
    let mut current: Option<String> = None;

    while let Some(line) = events.recv().await {
        match &line {
            BluetoothctlLine::DeviceNew { device } => {
                let device = Device::from(device.clone());
                host.toast(Toast::animated(format!("{} is nearby", device.name)))
                    .await;
                current = Some(device.mac.clone());
                seen.insert(device.mac.clone(), device);
            }
            BluetoothctlLine::DeviceChanged { device, .. } => {
                seen.entry(device.mac.clone())
                    .or_insert_with(|| Device::new(device.mac.clone(), device.mac.clone()));
                current = Some(device.mac.clone());
            }
            BluetoothctlLine::DiscoverableChanged { enabled: false } => {
                host.toast(Toast::success("No longer discoverable")).await;
            }
            _ => {}
        }

        let device = current
            .as_ref()
            .and_then(|mac| seen.get(mac))
            .cloned()
            .unwrap_or_else(|| Device::new("", "Unknown device"));
        let Some(event) = PairingEvent::from_line(&line, &device) else {
            continue;
        };

        match handle_incoming_pairing_event(&session, &host, event).await {
            Ok(PairingStep::Paired) => {
                host.toast(Toast::success(format!("Paired with {}", device.name)))
                    .await;
            }
            Ok(PairingStep::Continue) => {}
            Err(e) => {
                warn!("Incoming pairing with {} failed: {}", device, e);
                host.toast(Toast::failure("Failed to pair").with_message(e.user_message()))
                    .await;
            }
        }
    }
}
