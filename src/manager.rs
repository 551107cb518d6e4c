//! Port registry: one reader thread, dispatcher and status per configured device.
//!
//! ```no_run
//! use mousetap::{Address, PortConfig, PortManager, ValueUpdate};
//!
//! let mut mgr = PortManager::new();
//! mgr.configure(PortConfig::new("mouse", 0x03f0, 0x1198))?;
//! mgr.register_callback("mouse", Address::BUTTON_0, |u: &ValueUpdate| {
//!     println!("left button = {}", u.value);
//! })?;
//! # Ok::<(), mousetap::ConfigError>(())
//! ```
//!
//! Dropping the manager stops every reader and closes every device.

use crate::config::{PortConfig, PortSettings};
use crate::describe::describe;
use crate::device::Transport;
use crate::error::ConfigError;
use crate::event::Address;
use crate::eventbus::{Dispatcher, SubscriptionId, ValueListener};
use crate::poller::Poller;
use crate::snapshot::{PortSnapshot, PortStatus};
use crossbeam::channel::{bounded, Sender};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

struct Port {
    settings: PortSettings,
    dispatcher: Arc<Dispatcher>,
    status: Arc<PortStatus>,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Port {
    /// Signal the reader and wait for it to close the device.
    fn stop(&mut self) {
        // dropping the sender wakes any sleep in the reader
        self.shutdown.take();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!(port = %self.settings.port, "reader thread panicked");
            }
        }
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Default)]
pub struct PortManager {
    ports: BTreeMap<String, Port>,
}

impl PortManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `config`, open libusb and start polling the device it names.
    ///
    /// The device does not have to be present: the reader keeps retrying every
    /// `reconnect_backoff_ms` until it shows up.
    #[cfg(feature = "usb")]
    pub fn configure(&mut self, config: PortConfig) -> Result<(), ConfigError> {
        let transport =
            crate::backends::usb::UsbTransport::new().map_err(|e| ConfigError::Usb(e.to_string()))?;
        self.configure_with(config, transport)
    }

    /// Like [`configure`](Self::configure) with a caller-supplied transport.
    pub fn configure_with<T: Transport>(
        &mut self,
        config: PortConfig,
        transport: T,
    ) -> Result<(), ConfigError> {
        let settings = config.validate()?;
        if self.ports.contains_key(&settings.port) {
            return Err(ConfigError::DuplicatePort(settings.port));
        }

        let dispatcher = Arc::new(Dispatcher::new());
        let status = Arc::new(PortStatus::new(
            settings.port.clone(),
            settings.identity,
            settings.resolve_poll_interval(None),
        ));
        let (shutdown_tx, shutdown_rx) = bounded(1);

        let poller = Poller::new(
            settings.clone(),
            transport,
            Arc::clone(&dispatcher),
            Arc::clone(&status),
            shutdown_rx,
        );
        let thread = thread::Builder::new()
            .name(format!("{}_READER", settings.port))
            .spawn(move || poller.run())
            .map_err(|e| ConfigError::Spawn(e.to_string()))?;

        info!(
            port = %settings.port,
            device = %settings.identity,
            priority = settings.priority.get(),
            "port configured"
        );
        self.ports.insert(
            settings.port.clone(),
            Port {
                settings,
                dispatcher,
                status,
                shutdown: Some(shutdown_tx),
                thread: Some(thread),
            },
        );
        Ok(())
    }

    /// Subscribe `listener` to `address` on `port`.
    ///
    /// Any address is accepted. Unrecognized ones are never called; they are reported
    /// on the first dispatch of each connection.
    pub fn register_callback(
        &self,
        port: &str,
        address: Address,
        listener: impl ValueListener + 'static,
    ) -> Result<SubscriptionId, ConfigError> {
        let p = self.port(port)?;
        let id = p.dispatcher.register(address, listener);
        debug!(port, %address, ?id, "listener registered");
        Ok(id)
    }

    /// Remove a subscription. Returns `Ok(false)` if `id` was not registered on `port`.
    pub fn unregister(&self, port: &str, id: SubscriptionId) -> Result<bool, ConfigError> {
        Ok(self.port(port)?.dispatcher.unregister(id))
    }

    /// Mute a subscription without removing it.
    pub fn disable(&self, port: &str, id: SubscriptionId) -> Result<bool, ConfigError> {
        Ok(self.port(port)?.dispatcher.disable(id))
    }

    pub fn enable(&self, port: &str, id: SubscriptionId) -> Result<bool, ConfigError> {
        Ok(self.port(port)?.dispatcher.enable(id))
    }

    pub fn snapshot(&self, port: &str) -> Option<PortSnapshot> {
        self.ports.get(port).map(|p| p.status.snapshot())
    }

    pub fn snapshots(&self) -> Vec<PortSnapshot> {
        self.ports.values().map(|p| p.status.snapshot()).collect()
    }

    /// Human-readable report for `port`; see [`describe`].
    pub fn describe(&self, port: &str, verbosity: u8) -> Option<String> {
        self.snapshot(port).map(|s| describe(&s, verbosity))
    }

    /// Shared status handle for `port`, for callers that poll it often.
    pub fn status(&self, port: &str) -> Option<Arc<PortStatus>> {
        self.ports.get(port).map(|p| Arc::clone(&p.status))
    }

    /// Configured port names, sorted.
    pub fn ports(&self) -> Vec<String> {
        self.ports.keys().cloned().collect()
    }

    /// Stop `port`'s reader, close its device and forget it.
    pub fn shutdown(&mut self, port: &str) -> Result<(), ConfigError> {
        let mut p = self
            .ports
            .remove(port)
            .ok_or_else(|| ConfigError::UnknownPort(port.to_string()))?;
        p.stop();
        info!(port, "port shut down");
        Ok(())
    }

    /// Stop every port.
    pub fn shutdown_all(&mut self) {
        // signal everyone first so the readers wind down in parallel
        for p in self.ports.values_mut() {
            p.shutdown.take();
        }
        self.ports.clear();
    }

    fn port(&self, port: &str) -> Result<&Port, ConfigError> {
        self.ports
            .get(port)
            .ok_or_else(|| ConfigError::UnknownPort(port.to_string()))
    }
}

impl Drop for PortManager {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}
