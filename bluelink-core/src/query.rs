/*!
 * One-shot bluetoothctl Queries
 * `info`, `show` and `devices` run to completion outside any interactive session
 */

use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::device::{
    parse_controller, parse_device_list, parse_info, reports_not_available, ControllerInfo, Device,
    DeviceFilter, DeviceInfo, DeviceRef,
};
use crate::error::{BluetoothError, Result};

pub struct Query {
    program: PathBuf,
}

impl Query {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn output(&self, args: &[&str]) -> Result<Output> {
        debug!("Running {} {}", self.program.display(), args.join(" "));
        Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|source| BluetoothError::Spawn {
                program: self.program.display().to_string(),
                source,
            })
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(BluetoothError::CommandFailed {
                command: format!("{} {}", self.program.display(), args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn info(&self, mac: &str) -> Result<DeviceInfo> {
        // `info` exits non-zero for unknown devices; the stdout text says why.
        let output = self.output(&["info", mac]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && !reports_not_available(mac, &stdout) {
            return Err(BluetoothError::CommandFailed {
                command: format!("{} info {}", self.program.display(), mac),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_info(mac, &stdout)
    }

    pub async fn controller(&self) -> Result<ControllerInfo> {
        parse_controller(&self.run(&["show"]).await?)
    }

    pub async fn devices(&self, filter: Option<DeviceFilter>) -> Result<Vec<DeviceRef>> {
        let stdout = match filter {
            Some(filter) => self.run(&["devices", filter.as_arg()]).await?,
            None => self.run(&["devices"]).await?,
        };
        Ok(parse_device_list(&stdout))
    }

    /// `devices` enriched with `info` for each entry.
    pub async fn list_devices(&self, filter: Option<DeviceFilter>) -> Result<Vec<Device>> {
        let mut devices = Vec::new();
        for listed in self.devices(filter).await? {
            match self.info(&listed.mac).await {
                Ok(info) => devices.push(Device::from(info)),
                Err(e) => {
                    warn!("No info for {}: {}", listed.mac, e);
                    devices.push(Device::from(listed));
                }
            }
        }
        Ok(devices)
    }
}
