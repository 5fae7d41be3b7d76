/*!
 * bluetoothctl Line Protocol
 * Classifies one line of interactive bluetoothctl output into a tagged event
 */

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

use crate::device::DeviceRef;

const MAC: &str = r"[0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2}){5}";

static ANSI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]|\x1b\][^\x07]*\x07|[\x01\x02]")
        .expect("valid ANSI pattern")
});

/// Interactive prompts such as `[bluetooth]# ` or `[WH-1000XM4]# `.
static PROMPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\[[^\]]+\]#\s*)+").expect("valid prompt pattern"));

/// Property carried by a `[CHG] Device` line, when one could be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "name", content = "value")]
pub enum ChangedProperty {
    Connected(bool),
    Paired(bool),
    Trusted(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum BluetoothctlLine {
    DeviceListed {
        device: DeviceRef,
    },
    DeviceNew {
        device: DeviceRef,
    },
    DeviceChanged {
        device: DeviceRef,
        property: Option<ChangedProperty>,
    },
    DeviceDeleted {
        device: DeviceRef,
    },
    DeviceNotAvailable {
        mac: String,
    },
    DiscoverableChanged {
        enabled: bool,
    },
    PasskeyConfirmation {
        passkey: String,
    },
    PinRequest,
    AuthorizeService {
        uuid: String,
    },
    PairingAttempt {
        mac: String,
    },
    PairingSuccess,
    PairingFailure {
        reason: String,
    },
    ConnectionAttempt {
        mac: String,
    },
    ConnectionSuccess,
    ConnectionFailure {
        reason: String,
    },
    DisconnectionSuccess,
    DisconnectionFailure {
        reason: String,
    },
    RemovalSuccess,
    RemovalFailure {
        reason: String,
    },
    TrustSuccess {
        mac: String,
    },
    TrustFailure {
        reason: String,
    },
    DiscoverableSuccess {
        enabled: bool,
    },
    DiscoverableFailure {
        reason: String,
    },
    Unknown {
        raw_line: String,
    },
}

impl BluetoothctlLine {
    /// The verbatim reason of any `*Failure` variant.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            BluetoothctlLine::PairingFailure { reason }
            | BluetoothctlLine::ConnectionFailure { reason }
            | BluetoothctlLine::DisconnectionFailure { reason }
            | BluetoothctlLine::RemovalFailure { reason }
            | BluetoothctlLine::TrustFailure { reason }
            | BluetoothctlLine::DiscoverableFailure { reason } => Some(reason),
            _ => None,
        }
    }
}

type Build = fn(&Captures<'_>, &str) -> BluetoothctlLine;

struct Rule {
    name: &'static str,
    pattern: Regex,
    build: Build,
}

fn rule(name: &'static str, pattern: &str, build: Build) -> Rule {
    let pattern = pattern.replace("{MAC}", MAC);
    Rule {
        name,
        pattern: Regex::new(&pattern).expect("valid bluetoothctl pattern"),
        build,
    }
}

fn group(caps: &Captures<'_>, index: usize) -> String {
    caps.get(index)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Text after `Failed to …:`, or the whole line when bluetoothctl gave no detail.
fn reason(caps: &Captures<'_>, line: &str) -> String {
    match caps.get(1).map(|m| m.as_str().trim()) {
        Some(detail) if !detail.is_empty() => detail.to_string(),
        _ => line.to_string(),
    }
}

fn device(caps: &Captures<'_>, mac: usize, name: usize) -> DeviceRef {
    DeviceRef {
        mac: group(caps, mac),
        name: group(caps, name),
    }
}

fn changed_property(rest: &str) -> Option<ChangedProperty> {
    let flag = |key: &str| {
        rest.split_once(key)
            .map(|(_, value)| value.trim_start().starts_with("yes"))
    };
    if rest.contains("Connected:") {
        flag("Connected:").map(ChangedProperty::Connected)
    } else if rest.contains("Paired:") {
        flag("Paired:").map(ChangedProperty::Paired)
    } else if rest.contains("Trusted:") {
        flag("Trusted:").map(ChangedProperty::Trusted)
    } else {
        None
    }
}

fn device_event(caps: &Captures<'_>, _line: &str) -> BluetoothctlLine {
    let device = device(caps, 2, 3);
    match &caps[1] {
        "NEW" => BluetoothctlLine::DeviceNew { device },
        "DEL" => BluetoothctlLine::DeviceDeleted { device },
        _ => {
            let property = changed_property(&device.name);
            BluetoothctlLine::DeviceChanged { device, property }
        }
    }
}

// First match wins, so more specific templates sit above the generic ones.
static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule("device-not-available", r"Device ({MAC}) not available", |c, _| {
            BluetoothctlLine::DeviceNotAvailable { mac: group(c, 1) }
        }),
        rule(
            "device-event",
            r"\[(NEW|CHG|DEL)\] Device ({MAC})(?:\s+(.*))?$",
            device_event,
        ),
        rule(
            "controller-discoverable",
            r"\[CHG\] Controller {MAC} Discoverable: (yes|no)",
            |c, _| BluetoothctlLine::DiscoverableChanged {
                enabled: &c[1] == "yes",
            },
        ),
        rule(
            "passkey-confirmation",
            r"(?i)(?:confirm passkey|request confirmation)\D*(\d{4,6})",
            |c, _| BluetoothctlLine::PasskeyConfirmation {
                passkey: group(c, 1),
            },
        ),
        rule("pin-request", r"(?i)(?:enter pin code|request pin code)", |_, _| {
            BluetoothctlLine::PinRequest
        }),
        rule(
            "authorize-service",
            r"(?i)authorize service\s+([0-9a-f-]+)",
            |c, _| BluetoothctlLine::AuthorizeService { uuid: group(c, 1) },
        ),
        rule("pairing-attempt", r"Attempting to pair with ({MAC})", |c, _| {
            BluetoothctlLine::PairingAttempt { mac: group(c, 1) }
        }),
        rule("pairing-success", r"Pairing successful", |_, _| {
            BluetoothctlLine::PairingSuccess
        }),
        rule("pairing-failure", r"Failed to pair(?::\s*(.*))?", |c, l| {
            BluetoothctlLine::PairingFailure { reason: reason(c, l) }
        }),
        rule(
            "connection-attempt",
            r"Attempting to connect to ({MAC})",
            |c, _| BluetoothctlLine::ConnectionAttempt { mac: group(c, 1) },
        ),
        rule("connection-success", r"Connection successful", |_, _| {
            BluetoothctlLine::ConnectionSuccess
        }),
        rule("connection-failure", r"Failed to connect(?::\s*(.*))?", |c, l| {
            BluetoothctlLine::ConnectionFailure { reason: reason(c, l) }
        }),
        rule("disconnection-success", r"Successful disconnected", |_, _| {
            BluetoothctlLine::DisconnectionSuccess
        }),
        rule(
            "disconnection-failure",
            r"Failed to disconnect(?::\s*(.*))?",
            |c, l| BluetoothctlLine::DisconnectionFailure { reason: reason(c, l) },
        ),
        rule("removal-success", r"Device has been removed", |_, _| {
            BluetoothctlLine::RemovalSuccess
        }),
        rule(
            "removal-failure",
            r"Failed to remove device(?::\s*(.*))?",
            |c, l| BluetoothctlLine::RemovalFailure { reason: reason(c, l) },
        ),
        rule("trust-success", r"Changing ({MAC}) trust succeeded", |c, _| {
            BluetoothctlLine::TrustSuccess { mac: group(c, 1) }
        }),
        rule(
            "trust-failure",
            r"(?:Changing {MAC} trust failed|Failed to (?:set )?trust\w*)(?::\s*(.*))?",
            |c, l| BluetoothctlLine::TrustFailure { reason: reason(c, l) },
        ),
        rule(
            "discoverable-success",
            r"Changing discoverable (on|off) succeeded",
            |c, _| BluetoothctlLine::DiscoverableSuccess {
                enabled: &c[1] == "on",
            },
        ),
        rule(
            "discoverable-failure",
            r"Failed to set discoverable (?:on|off)(?::\s*(.*))?",
            |c, l| BluetoothctlLine::DiscoverableFailure { reason: reason(c, l) },
        ),
        rule("device-listed", r"^Device ({MAC}) (.+)$", |c, _| {
            BluetoothctlLine::DeviceListed {
                device: device(c, 1, 2),
            }
        }),
    ]
});

pub fn strip_ansi(text: &str) -> String {
    ANSI.replace_all(text, "").into_owned()
}

/// Removes escape codes and surrounding whitespace.
pub fn clean_line(raw: &str) -> String {
    strip_ansi(raw).trim().to_string()
}

/// Classifies one line of bluetoothctl output. Never fails: unmatched input becomes `Unknown`.
pub fn parse_line(raw: &str) -> BluetoothctlLine {
    let line = clean_line(raw);
    if line.is_empty() {
        return BluetoothctlLine::Unknown { raw_line: line };
    }

    let body = PROMPT.replace(&line, "");
    for rule in RULES.iter() {
        if let Some(caps) = rule.pattern.captures(&body) {
            return (rule.build)(&caps, &body);
        }
    }

    BluetoothctlLine::Unknown { raw_line: line }
}

/// Rule names in evaluation order.
pub fn rule_names() -> Vec<&'static str> {
    RULES.iter().map(|rule| rule.name).collect()
}

/// Every rule that would accept `raw`, in evaluation order. Only the first one decides the result.
pub fn matching_rules(raw: &str) -> Vec<&'static str> {
    let line = clean_line(raw);
    let body = PROMPT.replace(&line, "");
    RULES
        .iter()
        .filter(|rule| rule.pattern.is_match(&body))
        .map(|rule| rule.name)
        .collect()
}
