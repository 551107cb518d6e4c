//! Transport seam.
//!
//! A [`Transport`] knows how to find and open the device named by a
//! [`DeviceIdentity`]; the resulting [`Link`] performs blocking GET_REPORT reads.
//! Dropping a link closes it: implementations release the claimed interface and the
//! OS handle in `Drop`, so every exit path of the poll loop's connected state closes
//! the device, failures included.
//!
//! Backends live in [`backends`](crate::backends): `usb` (libusb via `rusb`) and
//! `virtual` (scripted, for tests and demos).

use crate::error::{ConnectError, ReadError};
use crate::metadata::DeviceMeta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Upper bound on a single input report read.
pub const MAX_REPORT_LEN: usize = 80;

/// Which physical device a port binds to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Interface to claim and address GET_REPORT to (`wIndex`).
    pub interface_number: u8,
    /// Report ID requested (low byte of `wValue`). `0` for devices without report IDs.
    pub report_id: u8,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} if{}",
            self.vendor_id, self.product_id, self.interface_number
        )
    }
}

/// What a link learned about the device when it opened.
#[derive(Clone, Debug, Default)]
pub struct LinkInfo {
    /// Device-suggested poll interval, from the first IN endpoint's `bInterval`.
    pub poll_interval: Option<Duration>,
    /// Input report length, bounded by [`MAX_REPORT_LEN`].
    pub report_len: usize,
    pub meta: DeviceMeta,
}

/// Opens links to a device.
pub trait Transport: Send + 'static {
    type Link: Link;

    /// Enumerate, match (first vendor/product match wins), open and claim.
    fn open(&mut self, identity: &DeviceIdentity) -> Result<Self::Link, ConnectError>;
}

/// An open, claimed device. Closed on drop.
pub trait Link: Send {
    /// Issue one GET_REPORT(INPUT) request into `buf`, returning the byte count.
    ///
    /// A zero-length transfer is an error. After any error the link is dead.
    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ReadError>;

    fn info(&self) -> &LinkInfo;
}

/// Decode an endpoint `bInterval` as `125 µs × 2^(bInterval−1)`.
///
/// Out-of-range values are clamped to `1..=16`.
pub fn decode_interval(b_interval: u8) -> Duration {
    let exp = u32::from(b_interval.clamp(1, 16)) - 1;
    Duration::from_micros(125u64 << exp)
}
