//! Error types.
//!
//! Nothing here is fatal to the process. Connect and read errors are absorbed by the
//! poll loop (back off, reconnect); descriptor errors degrade a display field; only
//! [`ConfigError`] is handed back to the caller, from the configuration entry point.

use thiserror::Error;

/// Failure to bring a device up. The poll loop retries after the reconnect backoff.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("can't find device with vendor ID:{vid:04X} and product ID:{pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("device enumeration failed: {0}")]
    Enumerate(String),

    #[error("failed to open device: {0}")]
    OpenFailed(String),

    #[error("failed to claim interface {interface}: {message}")]
    ClaimFailed { interface: u8, message: String },
}

/// Failure of a GET_REPORT read. The link is dead after any of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("zero-length transfer")]
    ShortTransfer,

    #[error("device disconnected")]
    Disconnected,

    #[error("control transfer failed: {0}")]
    Transfer(String),
}

/// Failure fetching an informational descriptor at connect time.
#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("can't get language descriptor: {0}")]
    Language(String),

    #[error("can't get descriptor {index}: {message}")]
    String { index: u8, message: String },
}

/// Rejected configuration or port setup. The port is left unconfigured.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("port name must not be empty")]
    EmptyPortName,

    #[error("port {0:?} is already configured")]
    DuplicatePort(String),

    #[error("no port named {0:?}")]
    UnknownPort(String),

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    #[error("USB context unavailable: {0}")]
    Usb(String),

    #[error("can't start reader thread: {0}")]
    Spawn(String),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
