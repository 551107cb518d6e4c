//! Scripted in-memory transport.
//!
//! [`VirtualTransport`] plays back a script instead of touching hardware:
//! - each call to `open` consumes the next queued outcome (a failure, or a
//!   [`VirtualDevice`] whose reads are themselves scripted);
//! - once the open queue is empty every further attempt fails with `DeviceNotFound`;
//! - a link whose read queue is exhausted keeps replaying the last report it returned,
//!   like an idle mouse that keeps answering GET_REPORT. A link that never returned a
//!   report fails instead.
//!
//! The transport is cheap to clone; clones share the script and the attempt log, so a
//! test can keep one and hand the other to a port.

use crate::device::{decode_interval, DeviceIdentity, Link, LinkInfo, Transport, MAX_REPORT_LEN};
use crate::error::{ConnectError, ReadError};
use crate::metadata::{DeviceMeta, EndpointInfo, HidClassInfo};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One scripted read.
#[derive(Clone, Debug)]
pub enum ReadStep {
    Report(Vec<u8>),
    Fail(ReadError),
}

/// A scripted device: metadata plus the reads it will answer.
#[derive(Clone, Debug)]
pub struct VirtualDevice {
    b_interval: u8,
    report_len: usize,
    meta: DeviceMeta,
    reads: VecDeque<ReadStep>,
}

impl VirtualDevice {
    /// A boot-protocol mouse with a 4-byte interrupt endpoint polled every 8 ms.
    pub fn mouse(vid: u16, pid: u16) -> Self {
        Self {
            b_interval: 7,
            report_len: 4,
            meta: DeviceMeta {
                vid,
                pid,
                manufacturer: "Virtual".into(),
                product: "Virtual Mouse".into(),
                serial_number: "virtual:0".into(),
                max_power_ma: 100,
                interface_class: 3,
                hid: Some(HidClassInfo {
                    bcd_hid: 0x0111,
                    country_code: 0,
                    num_descriptors: 1,
                    report_descriptor_len: 52,
                }),
                endpoints: vec![EndpointInfo {
                    number: 1,
                    direction_in: true,
                    transfer_type: "Interrupt".into(),
                    sync_type: "None".into(),
                    usage_type: "Data".into(),
                    max_packet_size: 4,
                    interval: 7,
                }],
                ..DeviceMeta::default()
            },
            reads: VecDeque::new(),
        }
    }

    /// Override the endpoint `bInterval` the device advertises.
    pub fn with_interval(mut self, b_interval: u8) -> Self {
        self.b_interval = b_interval;
        for ep in &mut self.meta.endpoints {
            ep.interval = b_interval;
        }
        self
    }

    /// Queue a report to be returned by the next read.
    pub fn report(mut self, bytes: &[u8]) -> Self {
        self.reads.push_back(ReadStep::Report(bytes.to_vec()));
        self
    }

    /// Queue a read failure.
    pub fn fail(mut self, err: ReadError) -> Self {
        self.reads.push_back(ReadStep::Fail(err));
        self
    }
}

enum OpenStep {
    Fail(fn(&DeviceIdentity) -> ConnectError),
    Device(VirtualDevice),
}

#[derive(Default)]
struct Script {
    opens: VecDeque<OpenStep>,
    attempts: Vec<Instant>,
    open_links: usize,
}

/// Scripted [`Transport`]. See the module docs.
#[derive(Clone, Default)]
pub struct VirtualTransport {
    script: Arc<Mutex<Script>>,
}

impl VirtualTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `count` failed opens (device not present).
    pub fn unplugged(self, count: usize) -> Self {
        {
            let mut s = self.script.lock();
            for _ in 0..count {
                s.opens.push_back(OpenStep::Fail(|id| ConnectError::DeviceNotFound {
                    vid: id.vendor_id,
                    pid: id.product_id,
                }));
            }
        }
        self
    }

    /// Queue a failed claim.
    pub fn busy(self) -> Self {
        self.script
            .lock()
            .opens
            .push_back(OpenStep::Fail(|id| ConnectError::ClaimFailed {
                interface: id.interface_number,
                message: "Resource busy".into(),
            }));
        self
    }

    /// Queue a successful open that yields `device`.
    pub fn plug(self, device: VirtualDevice) -> Self {
        self.script.lock().opens.push_back(OpenStep::Device(device));
        self
    }

    /// Number of `open` calls so far.
    pub fn open_attempts(&self) -> usize {
        self.script.lock().attempts.len()
    }

    /// Time of every `open` call, oldest first.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.script.lock().attempts.clone()
    }

    /// Links currently open (not yet dropped).
    pub fn open_links(&self) -> usize {
        self.script.lock().open_links
    }
}

impl Transport for VirtualTransport {
    type Link = VirtualLink;

    fn open(&mut self, identity: &DeviceIdentity) -> Result<VirtualLink, ConnectError> {
        let mut s = self.script.lock();
        s.attempts.push(Instant::now());
        match s.opens.pop_front() {
            Some(OpenStep::Device(device)) => {
                s.open_links += 1;
                let mut meta = device.meta;
                meta.interface_number = identity.interface_number;
                Ok(VirtualLink {
                    reads: device.reads,
                    last: None,
                    info: LinkInfo {
                        poll_interval: Some(decode_interval(device.b_interval)),
                        report_len: device.report_len.clamp(1, MAX_REPORT_LEN),
                        meta,
                    },
                    script: Arc::clone(&self.script),
                })
            }
            Some(OpenStep::Fail(make)) => Err(make(identity)),
            None => Err(ConnectError::DeviceNotFound {
                vid: identity.vendor_id,
                pid: identity.product_id,
            }),
        }
    }
}

/// Link handed out by [`VirtualTransport`].
pub struct VirtualLink {
    reads: VecDeque<ReadStep>,
    last: Option<Vec<u8>>,
    info: LinkInfo,
    script: Arc<Mutex<Script>>,
}

impl Link for VirtualLink {
    fn read_report(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, ReadError> {
        let bytes = match self.reads.pop_front() {
            Some(ReadStep::Report(bytes)) => bytes,
            Some(ReadStep::Fail(e)) => return Err(e),
            None => self.last.clone().ok_or(ReadError::Disconnected)?,
        };
        if bytes.is_empty() {
            return Err(ReadError::ShortTransfer);
        }
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        self.last = Some(bytes);
        Ok(n)
    }

    fn info(&self) -> &LinkInfo {
        &self.info
    }
}

impl Drop for VirtualLink {
    fn drop(&mut self) {
        let mut s = self.script.lock();
        s.open_links = s.open_links.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            vendor_id: 0x03f0,
            product_id: 0x1198,
            interface_number: 0,
            report_id: 0,
        }
    }

    #[test]
    fn test_open_script_order() {
        let mut t = VirtualTransport::new()
            .unplugged(1)
            .busy()
            .plug(VirtualDevice::mouse(0x03f0, 0x1198));
        assert!(matches!(
            t.open(&identity()),
            Err(ConnectError::DeviceNotFound { vid: 0x03f0, .. })
        ));
        assert!(matches!(
            t.open(&identity()),
            Err(ConnectError::ClaimFailed { interface: 0, .. })
        ));
        let link = t.open(&identity()).unwrap();
        assert_eq!(t.open_links(), 1);
        assert!(t.open(&identity()).is_err());
        assert_eq!(t.open_attempts(), 4);
        drop(link);
        assert_eq!(t.open_links(), 0);
    }

    #[test]
    fn test_reads_replay_last_report() {
        let mut t = VirtualTransport::new().plug(
            VirtualDevice::mouse(1, 2)
                .report(&[1, 2])
                .report(&[0, 0, 3]),
        );
        let mut link = t.open(&identity()).unwrap();
        let mut buf = [0u8; 8];
        let timeout = Duration::from_millis(10);
        assert_eq!(link.read_report(&mut buf, timeout), Ok(2));
        assert_eq!(&buf[..2], &[1, 2]);
        assert_eq!(link.read_report(&mut buf, timeout), Ok(3));
        assert_eq!(link.read_report(&mut buf, timeout), Ok(3));
        assert_eq!(&buf[..3], &[0, 0, 3]);
    }

    #[test]
    fn test_scripted_failure_and_silent_device() {
        let mut t = VirtualTransport::new()
            .plug(VirtualDevice::mouse(1, 2).fail(ReadError::Timeout { timeout_ms: 5 }))
            .plug(VirtualDevice::mouse(1, 2));
        let mut buf = [0u8; 8];
        let timeout = Duration::from_millis(10);

        let mut link = t.open(&identity()).unwrap();
        assert_eq!(
            link.read_report(&mut buf, timeout),
            Err(ReadError::Timeout { timeout_ms: 5 })
        );

        let mut link = t.open(&identity()).unwrap();
        assert_eq!(link.read_report(&mut buf, timeout), Err(ReadError::Disconnected));
    }

    #[test]
    fn test_link_info() {
        let mut t = VirtualTransport::new().plug(VirtualDevice::mouse(1, 2).with_interval(4));
        let link = t.open(&identity()).unwrap();
        assert_eq!(link.info().poll_interval, Some(Duration::from_millis(1)));
        assert_eq!(link.info().report_len, 4);
        assert_eq!(link.info().meta.endpoints[0].interval, 4);
    }
}
