//! Per-port diagnostics.
//!
//! The reader thread publishes into a [`PortStatus`]; everyone else reads owned
//! [`PortSnapshot`]s of it. A snapshot is **immutable** and does not poll the device:
//! it reflects what the reader thread last wrote. Take a new one to refresh.
//!
//! # Example
//! ```no_run
//! use mousetap::{PortConfig, PortManager};
//!
//! let mut mgr = PortManager::new();
//! mgr.configure(PortConfig::new("mouse", 0x03f0, 0x1198)).expect("configure");
//! let snap = mgr.snapshot("mouse").expect("port exists");
//! println!("{} packets, connected={}", snap.packet_count, snap.connected);
//! ```

use crate::device::DeviceIdentity;
use crate::metadata::DeviceMeta;
use crate::state::MouseState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Shared, writer-is-the-reader-thread status of one port.
#[derive(Debug)]
pub struct PortStatus {
    port: String,
    identity: DeviceIdentity,
    connected: AtomicBool,
    packet_count: AtomicU64,
    connects: AtomicU64,
    inner: Mutex<StatusInner>,
}

#[derive(Debug, Default)]
struct StatusInner {
    poll_interval: Duration,
    last_report: Vec<u8>,
    state: MouseState,
    meta: Option<DeviceMeta>,
    last_error: Option<String>,
}

impl PortStatus {
    pub fn new(port: impl Into<String>, identity: DeviceIdentity, poll_interval: Duration) -> Self {
        Self {
            port: port.into(),
            identity,
            connected: AtomicBool::new(false),
            packet_count: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            inner: Mutex::new(StatusInner {
                poll_interval,
                ..StatusInner::default()
            }),
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn packet_count(&self) -> u64 {
        self.packet_count.load(Ordering::Relaxed)
    }

    pub(crate) fn set_connected(&self, meta: DeviceMeta, poll_interval: Duration) {
        {
            let mut inner = self.inner.lock();
            inner.meta = Some(meta);
            inner.poll_interval = poll_interval;
            inner.last_error = None;
        }
        self.connects.fetch_add(1, Ordering::Relaxed);
        self.connected.store(true, Ordering::Release);
    }

    pub(crate) fn set_disconnected(&self, reason: String) {
        self.connected.store(false, Ordering::Release);
        self.inner.lock().last_error = Some(reason);
    }

    pub(crate) fn record_error(&self, reason: String) {
        self.inner.lock().last_error = Some(reason);
    }

    pub(crate) fn record_report(&self, bytes: &[u8], state: MouseState) {
        {
            let mut inner = self.inner.lock();
            inner.last_report.clear();
            inner.last_report.extend_from_slice(bytes);
            inner.state = state;
        }
        self.packet_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy out the current status.
    pub fn snapshot(&self) -> PortSnapshot {
        let inner = self.inner.lock();
        PortSnapshot {
            port: self.port.clone(),
            vendor_id: self.identity.vendor_id,
            product_id: self.identity.product_id,
            interface_number: self.identity.interface_number,
            report_id: self.identity.report_id,
            connected: self.is_connected(),
            connects: self.connects.load(Ordering::Relaxed),
            packet_count: self.packet_count(),
            poll_interval_ms: inner.poll_interval.as_secs_f64() * 1000.0,
            last_report: inner.last_report.clone(),
            state: inner.state,
            meta: inner.meta.clone(),
            last_error: inner.last_error.clone(),
        }
    }
}

/// Owned, serializable view of a port at one point in time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortSnapshot {
    pub port: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface_number: u8,
    pub report_id: u8,
    pub connected: bool,
    /// Successful connects since the port was configured.
    pub connects: u64,
    /// Reports read since the port was configured.
    pub packet_count: u64,
    pub poll_interval_ms: f64,
    /// Bytes of the most recent report.
    pub last_report: Vec<u8>,
    /// Decoded state after the most recent report.
    pub state: MouseState,
    /// Metadata from the most recent connect; `None` until the first one.
    pub meta: Option<DeviceMeta>,
    /// Last connect or read error, cleared by a successful connect.
    pub last_error: Option<String>,
}

impl PortSnapshot {
    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
