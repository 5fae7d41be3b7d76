use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BluetoothError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("{operation} failed: {reason}")]
    Failed {
        operation: &'static str,
        reason: String,
    },

    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    #[error("bluetoothctl session closed")]
    SessionClosed,

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Device {mac} not available")]
    NotAvailable { mac: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BluetoothError {
    /// Reason shown to the user when a workflow settles with this error.
    pub fn user_message(&self) -> String {
        match self {
            BluetoothError::Failed { reason, .. } => reason.clone(),
            BluetoothError::Timeout { .. } => "Timed out".to_string(),
            BluetoothError::Cancelled { .. } => "Cancelled".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BluetoothError>;
