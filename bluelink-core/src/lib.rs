/*!
 * bluelink
 * Bluetooth management over the bluetoothctl line protocol
 */

pub mod bluetoothctl;
pub mod config;
pub mod deadline;
pub mod device;
pub mod error;
pub mod framing;
pub mod host;
pub mod parser;
pub mod query;
pub mod registry;
pub mod workflow;

pub use bluetoothctl::{Bluetoothctl, Command, Launcher, ProcessLauncher};
pub use config::BluelinkConfig;
pub use device::{ControllerInfo, Device, DeviceFilter, DeviceInfo, DeviceRef};
pub use error::{BluetoothError, Result};
pub use host::{Confirmation, Confirmer, Host, Notifier, PromptRequest, Prompter, Toast, ToastStyle};
pub use parser::{parse_line, BluetoothctlLine, ChangedProperty};
pub use query::Query;
pub use registry::Subscription;
pub use workflow::{Action, DiscoverableSession, PairingEvent, PairingStep, Workflows};
