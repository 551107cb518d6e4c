//! Transports for `mousetap`.
//!
//! Implementations of [`Transport`](crate::device::Transport).
//!
//! # Feature flags
//! - **`usb`**: libusb via `rusb`; works wherever libusb does.
//! - **`virtual`**: scripted devices for tests and demos.

#[cfg(feature = "usb")]
#[cfg_attr(docsrs, doc(cfg(feature = "usb")))]
pub mod usb;

#[cfg(feature = "virtual")]
#[cfg_attr(docsrs, doc(cfg(feature = "virtual")))]
pub mod virtual_input;
