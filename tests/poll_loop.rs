#![cfg(feature = "virtual")]

use crossbeam::channel::{unbounded, Receiver};
use mousetap::backends::virtual_input::{VirtualDevice, VirtualTransport};
use mousetap::{
    Address, Dispatcher, PortConfig, PortManager, ReadError, StateTracker, ValueUpdate,
};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

const BACKOFF_MS: u64 = 50;

fn config() -> PortConfig {
    PortConfig::new("mouse", 0x03f0, 0x1198).reconnect_backoff_ms(BACKOFF_MS)
}

/// One failed open first, so listeners are registered before the forced first dispatch.
fn late_plug(device: VirtualDevice) -> VirtualTransport {
    VirtualTransport::new().unplugged(1).plug(device)
}

fn subscribe(mgr: &PortManager, address: Address) -> Receiver<i32> {
    let (tx, rx) = unbounded();
    mgr.register_callback("mouse", address, move |u: &ValueUpdate| {
        let _ = tx.send(u.value);
    })
    .unwrap();
    rx
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let t = Instant::now();
    while !cond() {
        assert!(t.elapsed() < WAIT, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn reconnects_after_two_failed_opens() {
    let transport = VirtualTransport::new()
        .unplugged(2)
        .plug(VirtualDevice::mouse(0x03f0, 0x1198).report(&[0, 0, 0, 0]));
    let probe = transport.clone();

    let mut mgr = PortManager::new();
    mgr.configure_with(config(), transport).unwrap();
    let rx = subscribe(&mgr, Address::BUTTON_0);

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 0);
    assert_eq!(probe.open_attempts(), 3);

    let times = probe.attempt_times();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(BACKOFF_MS));
    }

    let snap = mgr.snapshot("mouse").unwrap();
    assert!(snap.connected);
    assert_eq!(snap.connects, 1);
    assert!(snap.last_error.is_none());
}

#[test]
fn fans_out_to_every_listener_at_an_address() {
    let transport = late_plug(VirtualDevice::mouse(0x03f0, 0x1198).report(&[0, 0, 5, 0]));

    let mut mgr = PortManager::new();
    mgr.configure_with(config(), transport).unwrap();
    let a = subscribe(&mgr, Address::Y);
    let b = subscribe(&mgr, Address::Y);
    let bad = subscribe(&mgr, Address(99));

    let va = a.recv_timeout(WAIT).unwrap();
    let vb = b.recv_timeout(WAIT).unwrap();
    assert_eq!(va, vb);
    assert!(bad.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn unknown_address_reported_once_per_connection() {
    let dispatcher = Dispatcher::new();
    let (tx, rx) = unbounded();
    dispatcher.register(Address(99), move |u: &ValueUpdate| {
        let _ = tx.send(u.value);
    });

    let mut tracker = StateTracker::new();
    let mut unknown = Vec::new();
    for report in [[0u8, 1, 0, 0], [0, 1, 0, 0], [0, 2, 0, 0]] {
        let changes = tracker.apply(&mousetap::decode(&report));
        unknown.extend(
            dispatcher
                .notify(&changes, tracker.current(), Instant::now())
                .unknown,
        );
        tracker.commit();
    }
    assert_eq!(unknown, vec![Address(99)]);
    assert!(rx.try_recv().is_err());
}

#[test]
fn button_press_and_release_end_to_end() {
    let transport = late_plug(
        VirtualDevice::mouse(0x03f0, 0x1198)
            .report(&[0x00, 0, 0, 0])
            .report(&[0x01, 0, 0, 0])
            .report(&[0x01, 3, 0, 0])
            .report(&[0x00, 0, 0, 0]),
    );

    let mut mgr = PortManager::new();
    mgr.configure_with(config().poll_interval_ms(0), transport)
        .unwrap();
    let rx = subscribe(&mgr, Address::BUTTON_0);

    // first dispatch after connect is forced
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 0);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 1);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 0);
    // the idle mouse keeps answering with the same report
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    let snap = mgr.snapshot("mouse").unwrap();
    assert!(snap.packet_count >= 4);
    assert_eq!(snap.state.x, 3);
    assert_eq!(snap.poll_interval_ms, 8.0);
    assert_eq!(snap.meta.as_ref().unwrap().product, "Virtual Mouse");
}

#[test]
fn read_failure_reconnects_and_redispatches() {
    let transport = late_plug(
        VirtualDevice::mouse(0x03f0, 0x1198)
            .report(&[0, 4, 0, 0])
            .fail(ReadError::Disconnected),
    )
    .plug(VirtualDevice::mouse(0x03f0, 0x1198).report(&[0, 0, 0, 0]));
    let probe = transport.clone();

    let mut mgr = PortManager::new();
    mgr.configure_with(config(), transport).unwrap();
    let rx = subscribe(&mgr, Address::X);

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 4);
    // accumulators survive the reconnect; the forced cycle re-sends them
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 4);

    wait_until(|| mgr.snapshot("mouse").is_some_and(|s| s.connects == 2));
    assert_eq!(probe.open_attempts(), 3);
    assert_eq!(probe.open_links(), 1);
}

#[test]
fn dropping_manager_wakes_sleeping_reader() {
    let transport = VirtualTransport::new();
    let probe = transport.clone();

    let mut mgr = PortManager::new();
    mgr.configure_with(config().reconnect_backoff_ms(60_000), transport)
        .unwrap();
    wait_until(|| probe.open_attempts() == 1);

    let t = Instant::now();
    drop(mgr);
    assert!(t.elapsed() < WAIT);
    assert_eq!(probe.open_attempts(), 1);
}

#[test]
fn describe_reflects_connected_device() {
    let transport = VirtualTransport::new()
        .plug(VirtualDevice::mouse(0x03f0, 0x1198).report(&[0x02, 0xFF, 0x01, 0x00]));

    let mut mgr = PortManager::new();
    mgr.configure_with(config(), transport).unwrap();
    wait_until(|| mgr.snapshot("mouse").is_some_and(|s| s.packet_count > 0));

    let text = mgr.describe("mouse", 4).unwrap();
    assert!(text.starts_with("mouse: connected\n"));
    assert!(text.contains("Product: \"Virtual Mouse\""));
    assert!(text.contains("HID Report Length: 52"));
    assert!(text.contains(" 02 FF 01 00"));
}

#[test]
fn report_id_byte_is_skipped_when_decoding() {
    let transport = late_plug(
        VirtualDevice::mouse(0x03f0, 0x1198).report(&[0x02, 0x00, 0x05, 0x00, 0x00]),
    );

    let mut mgr = PortManager::new();
    mgr.configure_with(config().report_id(2), transport).unwrap();
    let button = subscribe(&mgr, Address::BUTTON_1);
    let x = subscribe(&mgr, Address::X);

    assert_eq!(button.recv_timeout(WAIT).unwrap(), 0);
    assert_eq!(x.recv_timeout(WAIT).unwrap(), 5);

    let snap = mgr.snapshot("mouse").unwrap();
    assert_eq!(snap.report_id, 2);
    assert_eq!(snap.state.buttons, 0);
}
