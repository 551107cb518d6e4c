//! Port configuration.
//!
//! One [`PortConfig`] describes one device instance. A [`MonitorConfig`] is a list of
//! them, usually loaded from TOML:
//!
//! ```toml
//! [[port]]
//! port = "mouse"
//! vendor_id = 0x03F0
//! product_id = 0x1198
//! # interface_number = 0
//! # poll_interval_ms = 0     # 0 = use the device's endpoint interval
//! # priority = 0             # 0 = medium (50), else 1..=99
//! ```

use crate::device::DeviceIdentity;
use crate::error::ConfigError;
use crate::priority::ThreadPriority;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default GET_REPORT timeout.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 10_000;

/// Interval used until a device has told us its own.
pub const FALLBACK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration of one port. Integer fields are wide so out-of-range values can be
/// reported instead of silently truncated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Unique port name.
    pub port: String,
    pub vendor_id: i64,
    pub product_id: i64,
    #[serde(default)]
    pub interface_number: i64,
    /// Report ID requested by GET_REPORT. When nonzero, replies carry it as byte 0.
    #[serde(default)]
    pub report_id: i64,
    /// `0` = use the device's endpoint interval.
    #[serde(default)]
    pub poll_interval_ms: i64,
    /// `0` or less = medium, else `1..=99`.
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_reconnect_backoff_ms() -> u64 {
    DEFAULT_RECONNECT_BACKOFF_MS
}

/// A validated [`PortConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    pub port: String,
    pub identity: DeviceIdentity,
    /// `None` = follow the device.
    pub poll_interval: Option<Duration>,
    pub priority: ThreadPriority,
    pub read_timeout: Duration,
    pub reconnect_backoff: Duration,
}

impl PortSettings {
    /// Interval to sleep between reads: the override if any, else the device's hint,
    /// else [`FALLBACK_POLL_INTERVAL`].
    pub fn resolve_poll_interval(&self, device_hint: Option<Duration>) -> Duration {
        self.poll_interval
            .or(device_hint)
            .unwrap_or(FALLBACK_POLL_INTERVAL)
    }
}

fn ranged<T: TryFrom<i64>>(field: &'static str, value: i64) -> Result<T, ConfigError> {
    T::try_from(value).map_err(|_| ConfigError::OutOfRange { field, value })
}

impl PortConfig {
    /// A config with every optional field at its default.
    pub fn new(port: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            port: port.into(),
            vendor_id: i64::from(vendor_id),
            product_id: i64::from(product_id),
            interface_number: 0,
            report_id: 0,
            poll_interval_ms: 0,
            priority: 0,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
        }
    }

    pub fn interface(mut self, interface_number: u8) -> Self {
        self.interface_number = i64::from(interface_number);
        self
    }

    pub fn report_id(mut self, report_id: u8) -> Self {
        self.report_id = i64::from(report_id);
        self
    }

    pub fn poll_interval_ms(mut self, ms: i64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.read_timeout_ms = ms;
        self
    }

    pub fn reconnect_backoff_ms(mut self, ms: u64) -> Self {
        self.reconnect_backoff_ms = ms;
        self
    }

    /// Check ranges and resolve defaults.
    pub fn validate(&self) -> Result<PortSettings, ConfigError> {
        if self.port.trim().is_empty() {
            return Err(ConfigError::EmptyPortName);
        }
        let identity = DeviceIdentity {
            vendor_id: ranged("vendor_id", self.vendor_id)?,
            product_id: ranged("product_id", self.product_id)?,
            interface_number: ranged("interface_number", self.interface_number)?,
            report_id: ranged("report_id", self.report_id)?,
        };
        // non-positive intervals mean "use the device's"
        let poll_interval = u64::try_from(self.poll_interval_ms)
            .ok()
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis);
        let priority = ThreadPriority::from_config(self.priority)?;
        Ok(PortSettings {
            port: self.port.clone(),
            identity,
            poll_interval,
            priority,
            read_timeout: Duration::from_millis(self.read_timeout_ms.max(1)),
            reconnect_backoff: Duration::from_millis(self.reconnect_backoff_ms),
        })
    }
}

/// A set of ports, as loaded from a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default, rename = "port")]
    pub ports: Vec<PortConfig>,
}

impl MonitorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_defaults() {
        let cfg = MonitorConfig::from_toml_str(
            r#"
            [[port]]
            port = "mouse"
            vendor_id = 0x03F0
            product_id = 0x1198

            [[port]]
            port = "trackball"
            vendor_id = 0x047D
            product_id = 0x1020
            interface_number = 1
            poll_interval_ms = 20
            priority = 70
            reconnect_backoff_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.ports.len(), 2);
        assert_eq!(cfg.ports[0], PortConfig::new("mouse", 0x03f0, 0x1198));

        let s = cfg.ports[1].validate().unwrap();
        assert_eq!(s.identity.interface_number, 1);
        assert_eq!(s.poll_interval, Some(Duration::from_millis(20)));
        assert_eq!(s.priority.get(), 70);
        assert_eq!(s.reconnect_backoff, Duration::from_millis(500));
        assert_eq!(s.read_timeout, Duration::from_millis(DEFAULT_READ_TIMEOUT_MS));
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            PortConfig::new("  ", 1, 2).validate(),
            Err(ConfigError::EmptyPortName)
        ));

        let mut c = PortConfig::new("m", 1, 2);
        c.vendor_id = 0x1_0000;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::OutOfRange { field: "vendor_id", value: 0x1_0000 })
        ));

        let s = PortConfig::new("m", 1, 2).priority(-3).validate().unwrap();
        assert_eq!(s.priority, ThreadPriority::MEDIUM);

        let c = PortConfig::new("m", 1, 2).priority(100);
        assert!(matches!(
            c.validate(),
            Err(ConfigError::OutOfRange { field: "priority", .. })
        ));

        let mut c = PortConfig::new("m", 1, 2);
        c.interface_number = -1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_poll_interval_resolution() {
        let follow = PortConfig::new("m", 1, 2).validate().unwrap();
        assert_eq!(follow.poll_interval, None);
        assert_eq!(
            follow.resolve_poll_interval(Some(Duration::from_millis(8))),
            Duration::from_millis(8)
        );
        assert_eq!(follow.resolve_poll_interval(None), FALLBACK_POLL_INTERVAL);

        let negative = PortConfig::new("m", 1, 2).poll_interval_ms(-5).validate().unwrap();
        assert_eq!(negative.poll_interval, None);

        let fixed = PortConfig::new("m", 1, 2).poll_interval_ms(25).validate().unwrap();
        assert_eq!(
            fixed.resolve_poll_interval(Some(Duration::from_millis(8))),
            Duration::from_millis(25)
        );
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            MonitorConfig::from_toml_str("[[port]]\nport = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
