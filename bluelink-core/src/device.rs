/*!
 * Bluetooth Device Model
 * Devices, controllers and parsers for `bluetoothctl info|show|devices` output
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BluetoothError, Result};
use crate::parser::{parse_line, strip_ansi, BluetoothctlLine};

pub const DEFAULT_ICON: &str = "bluetooth";

/// A peer as it appears on a single bluetoothctl line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    pub mac: String,
    pub name: String,
}

/// A discovered or known peer, rebuilt from CLI output on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub mac: String,
    pub name: String,
    pub icon: String,
    pub connected: bool,
    pub trusted: bool,
    pub battery_level: Option<u8>,
}

impl Device {
    pub fn new(mac: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mac: mac.into(),
            name: name.into(),
            icon: DEFAULT_ICON.to_string(),
            connected: false,
            trusted: false,
            battery_level: None,
        }
    }

    pub fn to_ref(&self) -> DeviceRef {
        DeviceRef {
            mac: self.mac.clone(),
            name: self.name.clone(),
        }
    }
}

impl From<DeviceRef> for Device {
    fn from(device: DeviceRef) -> Self {
        Device::new(device.mac, device.name)
    }
}

impl From<DeviceInfo> for Device {
    fn from(info: DeviceInfo) -> Self {
        let name = info
            .alias
            .or(info.name)
            .unwrap_or_else(|| info.mac.clone());
        Self {
            mac: info.mac,
            name,
            icon: info.icon.unwrap_or_else(|| DEFAULT_ICON.to_string()),
            connected: info.connected,
            trusted: info.trusted,
            battery_level: info.battery_percentage,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.mac)
    }
}

/// Filters accepted by `bluetoothctl devices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceFilter {
    Paired,
    Bonded,
    Trusted,
    Connected,
}

impl DeviceFilter {
    pub fn as_arg(&self) -> &'static str {
        match self {
            DeviceFilter::Paired => "Paired",
            DeviceFilter::Bonded => "Bonded",
            DeviceFilter::Trusted => "Trusted",
            DeviceFilter::Connected => "Connected",
        }
    }
}

/// Output of `bluetoothctl info <mac>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub mac: String,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub icon: Option<String>,
    pub class: Option<String>,
    pub paired: bool,
    pub bonded: bool,
    pub trusted: bool,
    pub blocked: bool,
    pub connected: bool,
    pub battery_percentage: Option<u8>,
    pub uuids: Vec<String>,
}

/// Output of `bluetoothctl show`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerInfo {
    pub mac: String,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub powered: bool,
    pub discoverable: bool,
    pub discoverable_timeout: Option<u32>,
    pub pairable: bool,
    pub discovering: bool,
}

fn yes(value: &str) -> bool {
    value.eq_ignore_ascii_case("yes")
}

/// Accepts `0x46 (70)`, `70` or `0x46`.
fn parse_number(value: &str) -> Option<u32> {
    if let (Some(open), Some(close)) = (value.find('('), value.rfind(')')) {
        if open < close {
            if let Ok(n) = value[open + 1..close].trim().parse() {
                return Some(n);
            }
        }
    }
    let head = value.split_whitespace().next()?;
    match head.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => head.parse().ok(),
    }
}

/// Yields `(key, value)` for every indented `Key: value` line.
fn properties(output: &str) -> impl Iterator<Item = (&str, &str)> {
    output.lines().filter_map(|line| {
        let line = line.trim();
        let (key, value) = line.split_once(':')?;
        Some((key.trim(), value.trim()))
    })
}

/// Collects the devices from `bluetoothctl devices` output.
pub fn parse_device_list(output: &str) -> Vec<DeviceRef> {
    output
        .lines()
        .filter_map(|line| match parse_line(line) {
            BluetoothctlLine::DeviceListed { device } => Some(device),
            _ => None,
        })
        .collect()
}

/// True when bluetoothctl answered with `Device <mac> not available` for `mac`.
pub fn reports_not_available(mac: &str, output: &str) -> bool {
    output.lines().any(|line| match parse_line(line) {
        BluetoothctlLine::DeviceNotAvailable { mac: missing } => missing.eq_ignore_ascii_case(mac),
        _ => false,
    })
}

pub fn parse_info(mac: &str, output: &str) -> Result<DeviceInfo> {
    let output = strip_ansi(output);
    if output.trim().is_empty() || reports_not_available(mac, &output) {
        return Err(BluetoothError::NotAvailable {
            mac: mac.to_string(),
        });
    }

    let mut info = DeviceInfo {
        mac: mac.to_string(),
        ..Default::default()
    };

    for (key, value) in properties(&output) {
        match key {
            "Name" => info.name = Some(value.to_string()),
            "Alias" => info.alias = Some(value.to_string()),
            "Icon" => info.icon = Some(value.to_string()),
            "Class" => info.class = Some(value.to_string()),
            "Paired" => info.paired = yes(value),
            "Bonded" => info.bonded = yes(value),
            "Trusted" => info.trusted = yes(value),
            "Blocked" => info.blocked = yes(value),
            "Connected" => info.connected = yes(value),
            "Battery Percentage" => {
                info.battery_percentage = parse_number(value).and_then(|n| u8::try_from(n).ok())
            }
            "UUID" => info.uuids.push(value.to_string()),
            _ => {}
        }
    }

    Ok(info)
}

pub fn parse_controller(output: &str) -> Result<ControllerInfo> {
    let output = strip_ansi(output);
    let mac = output
        .lines()
        .find_map(|line| {
            let rest = line.trim().strip_prefix("Controller ")?;
            rest.split_whitespace().next().map(str::to_string)
        })
        .ok_or_else(|| BluetoothError::Failed {
            operation: "show",
            reason: "No default controller available".to_string(),
        })?;

    let mut info = ControllerInfo {
        mac,
        ..Default::default()
    };

    for (key, value) in properties(&output) {
        match key {
            "Name" => info.name = Some(value.to_string()),
            "Alias" => info.alias = Some(value.to_string()),
            "Powered" => info.powered = yes(value),
            "Discoverable" => info.discoverable = yes(value),
            "DiscoverableTimeout" => info.discoverable_timeout = parse_number(value),
            "Pairable" => info.pairable = yes(value),
            "Discovering" => info.discovering = yes(value),
            _ => {}
        }
    }

    Ok(info)
}
