//! libusb backend (via `rusb`).
//!
//! [`UsbTransport`] enumerates attached devices on its own libusb context and opens
//! the first vendor/product match. [`UsbLink`] polls the device with class-specific
//! GET_REPORT control transfers (HID 1.11, 7.2.1):
//!
//! | field           | value                                   |
//! |-----------------|-----------------------------------------|
//! | `bmRequestType` | `0xA1` (IN, class, interface)           |
//! | `bRequest`      | `0x01` GET_REPORT                        |
//! | `wValue`        | report type INPUT (1) << 8 \| report ID |
//! | `wIndex`        | interface number                        |
//!
//! Connect-time introspection (strings, HID class descriptor, endpoints) is
//! best-effort: a failure there degrades a [`DeviceMeta`] field, never the connect.

use crate::device::{decode_interval, DeviceIdentity, Link, LinkInfo, Transport, MAX_REPORT_LEN};
use crate::error::{ConnectError, DescriptorError, ReadError};
use crate::metadata::{DeviceMeta, EndpointInfo, HidClassInfo, NO_STRING};
use rusb::{
    ConfigDescriptor, Context, DeviceHandle, Direction, Recipient, RequestType, SyncType,
    TransferType, UsageType, UsbContext,
};
use std::time::Duration;
use tracing::{debug, info, warn};

const HID_REPORT_GET: u8 = 0x01;
const HID_RT_INPUT: u8 = 0x01;

const CLASS_HID: u8 = rusb::constants::LIBUSB_CLASS_HID;

/// Timeout for connect-time descriptor requests.
const DESCRIPTOR_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens [`UsbLink`]s on a private libusb context.
pub struct UsbTransport {
    context: Context,
}

impl UsbTransport {
    pub fn new() -> Result<Self, rusb::Error> {
        Ok(Self {
            context: Context::new()?,
        })
    }
}

impl Transport for UsbTransport {
    type Link = UsbLink;

    fn open(&mut self, identity: &DeviceIdentity) -> Result<UsbLink, ConnectError> {
        let devices = self
            .context
            .devices()
            .map_err(|e| ConnectError::Enumerate(e.to_string()))?;

        let mut found = None;
        for device in devices.iter() {
            let desc = device
                .device_descriptor()
                .map_err(|e| ConnectError::Enumerate(e.to_string()))?;
            if desc.vendor_id() == identity.vendor_id && desc.product_id() == identity.product_id {
                found = Some((device, desc));
                break;
            }
        }
        let (device, desc) = found.ok_or(ConnectError::DeviceNotFound {
            vid: identity.vendor_id,
            pid: identity.product_id,
        })?;

        let mut handle = device
            .open()
            .map_err(|e| ConnectError::OpenFailed(e.to_string()))?;

        let iface = identity.interface_number;
        match handle.kernel_driver_active(iface) {
            Ok(true) => {
                if let Err(e) = handle.detach_kernel_driver(iface) {
                    warn!(interface = iface, "detach_kernel_driver failed: {e}");
                }
            }
            Ok(false) | Err(rusb::Error::NotSupported) => {}
            Err(e) => {
                return Err(ConnectError::OpenFailed(format!(
                    "kernel_driver_active failed: {e}"
                )))
            }
        }
        handle
            .claim_interface(iface)
            .map_err(|e| ConnectError::ClaimFailed {
                interface: iface,
                message: e.to_string(),
            })?;

        let mut meta = DeviceMeta {
            vid: desc.vendor_id(),
            pid: desc.product_id(),
            bus: Some(device.bus_number()),
            address: Some(device.address()),
            interface_number: iface,
            ..DeviceMeta::default()
        };

        let mut info = LinkInfo {
            poll_interval: None,
            report_len: MAX_REPORT_LEN,
            meta: DeviceMeta::default(),
        };

        match device.config_descriptor(0) {
            Ok(config) => describe_interface(&config, iface, &mut meta, &mut info),
            Err(e) => warn!("can't read config descriptor: {e}"),
        }

        meta.manufacturer = string_or_placeholder(&handle, desc.manufacturer_string_index());
        meta.product = string_or_placeholder(&handle, desc.product_string_index());
        meta.serial_number = string_or_placeholder(&handle, desc.serial_number_string_index());

        info!(
            device = %identity,
            manufacturer = %meta.manufacturer,
            product = %meta.product,
            "USB mouse connected"
        );
        info.meta = meta;

        Ok(UsbLink {
            handle,
            interface: iface,
            report_id: identity.report_id,
            info,
        })
    }
}

/// Fill interface/endpoint metadata and the link's interval hint and report length.
fn describe_interface(
    config: &ConfigDescriptor,
    iface: u8,
    meta: &mut DeviceMeta,
    info: &mut LinkInfo,
) {
    meta.max_power_ma = config.max_power();

    let interfaces: Vec<_> = config.interfaces().collect();
    let chosen = interfaces
        .iter()
        .find(|i| i.number() == iface)
        .or_else(|| interfaces.first());
    let Some(alt) = chosen.and_then(|i| i.descriptors().next()) else {
        warn!(interface = iface, "no interface descriptor");
        return;
    };

    meta.interface_class = alt.class_code();
    if alt.class_code() == CLASS_HID {
        meta.hid = HidClassInfo::parse(alt.extra());
    } else {
        warn!(
            "interface class ({}) is not HID ({})",
            alt.class_code(),
            CLASS_HID
        );
    }

    for ep in alt.endpoint_descriptors() {
        meta.endpoints.push(EndpointInfo {
            number: ep.number(),
            direction_in: ep.direction() == Direction::In,
            transfer_type: transfer_type_name(ep.transfer_type()).into(),
            sync_type: sync_type_name(ep.sync_type()).into(),
            usage_type: usage_type_name(ep.usage_type()).into(),
            max_packet_size: ep.max_packet_size(),
            interval: ep.interval(),
        });
    }

    let input = meta
        .endpoints
        .iter()
        .find(|e| e.direction_in)
        .or_else(|| meta.endpoints.first());
    if let Some(ep) = input {
        info.poll_interval = Some(decode_interval(ep.interval));
    }
    if let Some(ep) = meta
        .endpoints
        .iter()
        .find(|e| e.direction_in && e.transfer_type == "Interrupt")
    {
        info.report_len = usize::from(ep.max_packet_size).clamp(1, MAX_REPORT_LEN);
    }
}

fn string_or_placeholder<T: UsbContext>(handle: &DeviceHandle<T>, index: Option<u8>) -> String {
    match read_string(handle, index) {
        Ok(s) => s,
        Err(e) => {
            debug!("{e}");
            placeholder(&e)
        }
    }
}

/// Display text standing in for a string descriptor that could not be fetched.
fn placeholder(e: &DescriptorError) -> String {
    match e {
        DescriptorError::String { index, .. } => format!("Can't get descriptor {index}"),
        DescriptorError::Language(_) => "Can't get language descriptor".into(),
    }
}

/// Fetch a string descriptor in the device's first supported language.
fn read_string<T: UsbContext>(
    handle: &DeviceHandle<T>,
    index: Option<u8>,
) -> Result<String, DescriptorError> {
    let Some(index) = index.filter(|&i| i != 0) else {
        return Ok(NO_STRING.into());
    };
    let languages = handle
        .read_languages(DESCRIPTOR_TIMEOUT)
        .map_err(|e| DescriptorError::Language(e.to_string()))?;
    let language = languages
        .first()
        .copied()
        .ok_or_else(|| DescriptorError::Language("no languages".into()))?;
    handle
        .read_string_descriptor(language, index, DESCRIPTOR_TIMEOUT)
        .map_err(|e| DescriptorError::String {
            index,
            message: e.to_string(),
        })
}

fn transfer_type_name(t: TransferType) -> &'static str {
    match t {
        TransferType::Control => "Control",
        TransferType::Isochronous => "Isochronous",
        TransferType::Bulk => "Bulk",
        TransferType::Interrupt => "Interrupt",
    }
}

fn sync_type_name(t: SyncType) -> &'static str {
    match t {
        SyncType::NoSync => "None",
        SyncType::Asynchronous => "Asynchronous",
        SyncType::Adaptive => "Adaptive",
        SyncType::Synchronous => "Synchronous",
    }
}

fn usage_type_name(t: UsageType) -> &'static str {
    match t {
        UsageType::Data => "Data",
        UsageType::Feedback => "Feedback",
        UsageType::FeedbackData => "Data (Implicit feedback)",
        UsageType::Reserved => "3 (Reserved)",
    }
}

/// A claimed HID interface. Releases the interface and closes the handle on drop.
pub struct UsbLink {
    handle: DeviceHandle<Context>,
    interface: u8,
    report_id: u8,
    info: LinkInfo,
}

impl Link for UsbLink {
    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ReadError> {
        let request_type = rusb::request_type(Direction::In, RequestType::Class, Recipient::Interface);
        let value = (u16::from(HID_RT_INPUT) << 8) | u16::from(self.report_id);
        match self.handle.read_control(
            request_type,
            HID_REPORT_GET,
            value,
            u16::from(self.interface),
            buf,
            timeout,
        ) {
            Ok(0) => Err(ReadError::ShortTransfer),
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Err(ReadError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
            Err(rusb::Error::NoDevice) => Err(ReadError::Disconnected),
            Err(e) => Err(ReadError::Transfer(e.to_string())),
        }
    }

    fn info(&self) -> &LinkInfo {
        &self.info
    }
}

impl Drop for UsbLink {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            debug!(interface = self.interface, "release_interface: {e}");
        }
    }
}

/// One attached USB device, for listings.
#[derive(Clone, Debug)]
pub struct UsbDeviceSummary {
    pub bus: u8,
    pub address: u8,
    pub vid: u16,
    pub pid: u16,
    pub class: u8,
}

/// Enumerate attached devices (no handles are opened).
pub fn list_devices() -> Result<Vec<UsbDeviceSummary>, rusb::Error> {
    let context = Context::new()?;
    let mut out = Vec::new();
    for device in context.devices()?.iter() {
        let desc = match device.device_descriptor() {
            Ok(d) => d,
            Err(e) => {
                debug!("device_descriptor failed: {e}");
                continue;
            }
        };
        out.push(UsbDeviceSummary {
            bus: device.bus_number(),
            address: device.address(),
            vid: desc.vendor_id(),
            pid: desc.product_id(),
            class: desc.class_code(),
        });
    }
    Ok(out)
}
