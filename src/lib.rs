//! mousetap: poll a USB HID mouse and fan its values out to subscribers.
//!
//! Each configured port gets a reader thread that opens the device with libusb, asks
//! for the current input report with a class `GET_REPORT` control transfer, decodes
//! buttons and relative X/Y/wheel motion into running totals, and calls every listener
//! subscribed to a value that changed. Unplugging is handled by closing the device and
//! retrying until it comes back.
//!
//! Values are addressed by small integers:
//!
//! | Address | Value |
//! |---------|-------|
//! | 0, 1, 2 | button bits (0 = released, 1 = pressed) |
//! | 10 | accumulated X |
//! | 11 | accumulated Y |
//! | 12 | accumulated wheel |
//!
//! Start with [`PortManager`] and [`PortConfig`].
//!
//! # Feature flags
//! - **`usb`**: the libusb transport (`rusb`).
//! - **`virtual`**: a scripted in-memory transport for tests and demos.
//! - **`cli`**: the `mousetap` binary.

pub mod backends;
pub mod config;
pub mod decode;
pub mod describe;
pub mod device;
pub mod error;
pub mod event;
pub mod eventbus;
pub mod filtered_listener;
pub mod logger;
pub mod manager;
pub mod metadata;
mod poller;
pub mod priority;
pub mod snapshot;
pub mod state;

pub use config::{MonitorConfig, PortConfig, PortSettings};
pub use decode::{decode, sign_extend, ReportDelta};
pub use describe::describe;
pub use device::{DeviceIdentity, Link, LinkInfo, Transport};
pub use error::{ConfigError, ConnectError, DescriptorError, ReadError};
pub use event::{Address, Channel, ValueUpdate};
pub use eventbus::{DispatchReport, Dispatcher, SubscriptionId, ValueListener};
pub use filtered_listener::FilteredListener;
pub use logger::Logger;
pub use manager::PortManager;
pub use metadata::DeviceMeta;
pub use priority::ThreadPriority;
pub use snapshot::{PortSnapshot, PortStatus};
pub use state::{ChangeSet, MouseState, StateTracker};
