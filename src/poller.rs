//! Reader loop and reconnect state machine.
//!
//! ```text
//!            open ok                         read ok: decode, dispatch, sleep(interval)
//!   Disconnected ─────────▶ Connected ◀──┐
//!     ▲    │ open failed        │   └─────┘
//!     │    └ sleep(backoff) ─┐  │ read failed: close link, sleep(backoff)
//!     └──────────────────────┴──┘
//! ```
//!
//! The loop owns the transport, the open link (inside [`ConnectionState::Connected`])
//! and the [`StateTracker`]; nothing else touches them. It publishes into
//! [`PortStatus`] for diagnostics and fans values out through the shared
//! [`Dispatcher`].
//!
//! Shutdown is cooperative: every sleep waits on the shutdown channel and the loop
//! checks it after each read, so a stop request takes effect at the next suspension
//! point. Leaving the loop drops the link, which closes the device.

use crate::config::PortSettings;
use crate::decode::decode;
use crate::device::{Link, Transport, MAX_REPORT_LEN};
use crate::eventbus::Dispatcher;
use crate::snapshot::PortStatus;
use crate::state::StateTracker;
use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, trace, warn};

/// Per-connection data, dropped (and the link closed) on disconnect.
struct Session<L> {
    link: L,
    buf: Vec<u8>,
    poll_interval: Duration,
}

enum ConnectionState<L> {
    Disconnected,
    Connected(Session<L>),
}

pub(crate) struct Poller<T: Transport> {
    settings: PortSettings,
    transport: T,
    tracker: StateTracker,
    dispatcher: Arc<Dispatcher>,
    status: Arc<PortStatus>,
    shutdown: Receiver<()>,
}

impl<T: Transport> Poller<T> {
    pub(crate) fn new(
        settings: PortSettings,
        transport: T,
        dispatcher: Arc<Dispatcher>,
        status: Arc<PortStatus>,
        shutdown: Receiver<()>,
    ) -> Self {
        Self {
            settings,
            transport,
            tracker: StateTracker::new(),
            dispatcher,
            status,
            shutdown,
        }
    }

    /// Run until shutdown is requested or the shutdown sender is dropped.
    pub(crate) fn run(mut self) {
        self.settings.priority.apply_to_current_thread();
        let backoff = self.settings.reconnect_backoff;

        let mut state = ConnectionState::Disconnected;
        loop {
            state = match state {
                ConnectionState::Disconnected => match self.connect() {
                    Some(session) => ConnectionState::Connected(session),
                    None => {
                        if !self.pause(backoff) {
                            break;
                        }
                        ConnectionState::Disconnected
                    }
                },
                ConnectionState::Connected(mut session) => {
                    let read = session
                        .link
                        .read_report(&mut session.buf, self.settings.read_timeout);
                    match read {
                        Ok(n) => {
                            if self.stop_requested() {
                                break;
                            }
                            self.process(&session.buf[..n]);
                            if !self.pause(session.poll_interval) {
                                break;
                            }
                            ConnectionState::Connected(session)
                        }
                        Err(e) => {
                            warn!(port = %self.settings.port, "read failed: {e}");
                            drop(session);
                            self.status.set_disconnected(e.to_string());
                            info!(port = %self.settings.port, "USB mouse disconnected");
                            if !self.pause(backoff) {
                                break;
                            }
                            ConnectionState::Disconnected
                        }
                    }
                }
            };
        }

        self.status.set_disconnected("stopped".into());
        info!(port = %self.settings.port, "reader stopped");
    }

    /// Disconnected → Connected, if the device can be opened.
    fn connect(&mut self) -> Option<Session<T::Link>> {
        let link = match self.transport.open(&self.settings.identity) {
            Ok(link) => link,
            Err(e) => {
                warn!(port = %self.settings.port, "connect failed: {e}");
                self.status.record_error(e.to_string());
                return None;
            }
        };

        let info = link.info();
        let poll_interval = self.settings.resolve_poll_interval(info.poll_interval);
        // reports from a device using report IDs carry the ID in front
        let report_len = info.report_len.clamp(1, MAX_REPORT_LEN) + self.id_prefix_len();
        self.status.set_connected(info.meta.clone(), poll_interval);
        self.tracker.begin_connection();
        info!(
            port = %self.settings.port,
            device = %self.settings.identity,
            poll_interval_ms = poll_interval.as_secs_f64() * 1000.0,
            report_len,
            "reader connected"
        );

        Some(Session {
            link,
            buf: vec![0; report_len],
            poll_interval,
        })
    }

    fn id_prefix_len(&self) -> usize {
        usize::from(self.settings.identity.report_id != 0)
    }

    /// Decode one report, dispatch what changed and commit the new baseline.
    fn process(&mut self, report: &[u8]) {
        let at = Instant::now();
        trace!(port = %self.settings.port, "read {} {:02X?}", report.len(), report);

        let payload = report.get(self.id_prefix_len()..).unwrap_or_default();
        let changes = self.tracker.apply(&decode(payload));
        self.status.record_report(report, *self.tracker.current());
        self.dispatcher.notify(&changes, self.tracker.current(), at);
        self.tracker.commit();
    }

    fn stop_requested(&self) -> bool {
        !matches!(self.shutdown.try_recv(), Err(TryRecvError::Empty))
    }

    /// Sleep for `d` unless shutdown arrives first. Returns `false` on shutdown.
    fn pause(&self, d: Duration) -> bool {
        matches!(self.shutdown.recv_timeout(d), Err(RecvTimeoutError::Timeout))
    }
}
