/*!
 * Pairing Flow
 * Outgoing `pair <mac>` and the agent prompts shared with incoming pairing
 */

use serde::Serialize;
use tracing::{debug, info};

use super::{next_line, Workflows};
use crate::bluetoothctl::Bluetoothctl;
use crate::deadline;
use crate::device::Device;
use crate::error::{BluetoothError, Result};
use crate::host::{Confirmation, Host, PromptRequest, Toast};
use crate::parser::{BluetoothctlLine, ChangedProperty};

/// Pairing-relevant lines, tied to the device they concern.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PairingEvent {
    PasskeyConfirmation { device: Device, passkey: String },
    PinRequest { device: Device },
    AuthorizeService { device: Device, uuid: String },
    PairingSuccess { device: Device },
    PairingFailure { device: Device, reason: String },
}

impl PairingEvent {
    pub fn from_line(line: &BluetoothctlLine, device: &Device) -> Option<Self> {
        let device = device.clone();
        match line {
            BluetoothctlLine::PasskeyConfirmation { passkey } => {
                Some(PairingEvent::PasskeyConfirmation {
                    device,
                    passkey: passkey.clone(),
                })
            }
            BluetoothctlLine::PinRequest => Some(PairingEvent::PinRequest { device }),
            BluetoothctlLine::AuthorizeService { uuid } => Some(PairingEvent::AuthorizeService {
                device,
                uuid: uuid.clone(),
            }),
            BluetoothctlLine::PairingSuccess => Some(PairingEvent::PairingSuccess { device }),
            BluetoothctlLine::DeviceChanged {
                device: changed,
                property: Some(ChangedProperty::Paired(true)),
            } if changed.mac.eq_ignore_ascii_case(&device.mac) => {
                Some(PairingEvent::PairingSuccess { device })
            }
            BluetoothctlLine::PairingFailure { reason } => Some(PairingEvent::PairingFailure {
                device,
                reason: reason.clone(),
            }),
            _ => None,
        }
    }

    pub fn device(&self) -> &Device {
        match self {
            PairingEvent::PasskeyConfirmation { device, .. }
            | PairingEvent::PinRequest { device }
            | PairingEvent::AuthorizeService { device, .. }
            | PairingEvent::PairingSuccess { device }
            | PairingEvent::PairingFailure { device, .. } => device,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStep {
    /// Answered an agent prompt; keep waiting.
    Continue,
    Paired,
}

/// Answers one pairing event on `session`, asking the user through `host` where needed.
///
/// Used for outgoing pairs and for peers pairing with us while discoverable.
pub async fn handle_incoming_pairing_event(
    session: &Bluetoothctl,
    host: &Host,
    event: PairingEvent,
) -> Result<PairingStep> {
    debug!("Pairing event: {:?}", event);
    match event {
        PairingEvent::PasskeyConfirmation { device, passkey } => {
            let accepted = host
                .confirmer
                .confirm(Confirmation {
                    title: format!("Pair with {}?", device.name),
                    message: format!("Confirm that {} shows the passkey {}", device.name, passkey),
                    confirm_label: "Pair".to_string(),
                    dismiss_label: "Cancel".to_string(),
                })
                .await;
            if accepted {
                session.yes().await?;
                Ok(PairingStep::Continue)
            } else {
                session.no().await?;
                Err(BluetoothError::Cancelled { operation: "pair" })
            }
        }
        PairingEvent::PinRequest { device } => {
            let pin = host
                .prompter
                .prompt(PromptRequest {
                    title: format!("Enter the PIN code for {}", device.name),
                    placeholder: Some("0000".to_string()),
                })
                .await;
            match pin.map(|pin| pin.trim().to_string()) {
                Some(pin) if !pin.is_empty() => {
                    session.pin(&pin).await?;
                    Ok(PairingStep::Continue)
                }
                _ => Err(BluetoothError::Cancelled { operation: "pair" }),
            }
        }
        PairingEvent::AuthorizeService { device, uuid } => {
            let accepted = host
                .confirmer
                .confirm(Confirmation {
                    title: format!("Allow {}?", device.name),
                    message: format!("{} requests access to service {}", device.name, uuid),
                    confirm_label: "Allow".to_string(),
                    dismiss_label: "Deny".to_string(),
                })
                .await;
            if accepted {
                session.yes().await?;
            } else {
                session.no().await?;
            }
            Ok(PairingStep::Continue)
        }
        PairingEvent::PairingSuccess { device } => {
            info!("Paired with {}", device);
            Ok(PairingStep::Paired)
        }
        PairingEvent::PairingFailure { reason, .. } => Err(BluetoothError::Failed {
            operation: "pair",
            reason,
        }),
    }
}

impl Workflows {
    pub async fn pair_to_device(&self, device: &Device) -> Result<()> {
        info!("Starting pair for {}", device);
        self.host()
            .toast(Toast::animated(format!("Pairing with {}...", device.name)))
            .await;

        let session = match self.launch().await {
            Ok(session) => session,
            Err(e) => return self.report(Err(e), String::new(), "Failed to pair").await,
        };
        let (_subscription, mut events) = session.events();

        let outcome = deadline::within("pair", self.timeouts.pair(), async {
            session.pair(&device.mac).await?;
            loop {
                let line = next_line(&mut events).await?;
                if let BluetoothctlLine::DeviceNotAvailable { mac } = &line {
                    if mac.eq_ignore_ascii_case(&device.mac) {
                        return Err(BluetoothError::Failed {
                            operation: "pair",
                            reason: format!("Device {} not available", mac),
                        });
                    }
                }
                let Some(event) = PairingEvent::from_line(&line, device) else {
                    continue;
                };
                let step = handle_incoming_pairing_event(&session, self.host(), event).await?;
                if step == PairingStep::Paired {
                    return Ok(());
                }
            }
        })
        .await;

        session.kill().await;
        self.report(outcome, format!("Paired with {}", device.name), "Failed to pair")
            .await
    }
}
