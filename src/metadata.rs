//! Device metadata snapshot.
//!
//! [`DeviceMeta`] is gathered once per successful connect from the device, config,
//! HID class and string descriptors. It is purely informational: nothing in the poll
//! loop depends on it beyond the interval hint and report length carried by
//! [`LinkInfo`](crate::device::LinkInfo).
//!
//! # Conventions
//! - String fields hold a placeholder instead of failing: `"???"` when the device has
//!   no such string, `"Can't get descriptor N"` when fetching it failed.
//! - `hid` is `None` when the interface is not HID class or its class descriptor is
//!   malformed.
//! - Endpoint `interval` is the raw `bInterval`; see [`EndpointInfo::interval_ms`].

use serde::{Deserialize, Serialize};

/// Placeholder for a string descriptor index of 0.
pub const NO_STRING: &str = "???";

/// Snapshot of metadata describing the connected device.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeviceMeta {
    /// USB Vendor ID (VID).
    pub vid: u16,

    /// USB Product ID (PID).
    pub pid: u16,

    /// Bus number and device address, when the backend knows them.
    pub bus: Option<u8>,
    pub address: Option<u8>,

    pub manufacturer: String,
    pub product: String,
    pub serial_number: String,

    /// Maximum current drawn in the active configuration, in mA.
    pub max_power_ma: u16,

    /// Interface the link claimed.
    pub interface_number: u8,

    /// `bInterfaceClass` of that interface (3 = HID).
    pub interface_class: u8,

    /// HID class descriptor, when present.
    pub hid: Option<HidClassInfo>,

    pub endpoints: Vec<EndpointInfo>,
}

/// HID class descriptor (HID 1.11, 6.2.1) found in the interface's extra bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HidClassInfo {
    /// `bcdHID`, e.g. `0x0111`.
    pub bcd_hid: u16,
    /// `bCountryCode`, 0 = not localized.
    pub country_code: u8,
    /// `bNumDescriptors`.
    pub num_descriptors: u8,
    /// `wDescriptorLength` of the report descriptor.
    pub report_descriptor_len: u16,
}

const DT_HID: u8 = 0x21;
const DT_REPORT: u8 = 0x22;

impl HidClassInfo {
    /// Parse the class descriptor out of an interface's extra descriptor bytes.
    ///
    /// Requires at least 9 bytes, a `bLength` that fits, `bDescriptorType == 0x21`,
    /// at least one class descriptor and the first one being a report descriptor.
    pub fn parse(extra: &[u8]) -> Option<Self> {
        let buf = extra.get(..9)?;
        if usize::from(buf[0]) > extra.len() || buf[1] != DT_HID || buf[5] < 1 || buf[6] != DT_REPORT {
            return None;
        }
        Some(Self {
            bcd_hid: u16::from_le_bytes([buf[2], buf[3]]),
            country_code: buf[4],
            num_descriptors: buf[5],
            report_descriptor_len: u16::from_le_bytes([buf[7], buf[8]]),
        })
    }
}

/// One endpoint of the claimed interface.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub number: u8,
    pub direction_in: bool,
    /// `"Control"`, `"Isochronous"`, `"Bulk"` or `"Interrupt"`.
    pub transfer_type: String,
    pub sync_type: String,
    pub usage_type: String,
    pub max_packet_size: u16,
    /// Raw `bInterval`.
    pub interval: u8,
}

impl EndpointInfo {
    /// `bInterval` decoded as `125 µs × 2^(bInterval−1)`, in milliseconds.
    pub fn interval_ms(&self) -> f64 {
        crate::device::decode_interval(self.interval).as_secs_f64() * 1000.0
    }
}
