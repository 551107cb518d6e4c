//! Addresses and value updates.
//!
//! Subscribers name the input dimension they care about with a small integer
//! [`Address`]. The numbering is a fixed contract with the record/consumer layer:
//!
//! | Address | Channel | Value |
//! |---------|---------|-------|
//! | `0..=7` | button bit `n` of report byte 0 | `0` / `1` |
//! | `10`    | X       | cumulative signed counts |
//! | `11`    | Y       | cumulative signed counts |
//! | `12`    | wheel   | cumulative signed detents |
//!
//! Only buttons `0..=2` are wired in the usual record set, but every bit of the
//! button byte is addressable. Any other number is accepted at registration and
//! reported as a configuration warning on the first dispatch after a connect.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Numeric subscription address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub i32);

impl Address {
    pub const BUTTON_0: Address = Address(0);
    pub const BUTTON_1: Address = Address(1);
    pub const BUTTON_2: Address = Address(2);
    pub const X: Address = Address(10);
    pub const Y: Address = Address(11);
    pub const WHEEL: Address = Address(12);

    /// The default wired set: three buttons and the three axes.
    pub const DEFAULT_SET: [Address; 6] = [
        Address::BUTTON_0,
        Address::BUTTON_1,
        Address::BUTTON_2,
        Address::X,
        Address::Y,
        Address::WHEEL,
    ];

    /// Address of button bit `bit` (0..=7).
    #[inline]
    pub fn button(bit: u8) -> Option<Address> {
        (bit < 8).then_some(Address(i32::from(bit)))
    }

    /// Resolve the channel behind this address, if it is a recognized one.
    pub fn channel(self) -> Option<Channel> {
        match self.0 {
            n @ 0..=7 => Some(Channel::Button(n as u8)),
            10 => Some(Channel::X),
            11 => Some(Channel::Y),
            12 => Some(Channel::Wheel),
            _ => None,
        }
    }

    #[inline]
    pub fn is_known(self) -> bool {
        self.channel().is_some()
    }
}

impl From<i32> for Address {
    fn from(n: i32) -> Self {
        Address(n)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel() {
            Some(ch) => write!(f, "{} ({ch})", self.0),
            None => write!(f, "{} (unknown)", self.0),
        }
    }
}

/// A recognized input dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Bit `n` of the button byte.
    Button(u8),
    X,
    Y,
    Wheel,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Button(n) => write!(f, "button{n}"),
            Channel::X => f.write_str("x"),
            Channel::Y => f.write_str("y"),
            Channel::Wheel => f.write_str("wheel"),
        }
    }
}

/// One value delivered to a subscriber.
#[derive(Clone, Debug)]
pub struct ValueUpdate {
    /// Address the subscriber registered at.
    pub address: Address,
    /// `0`/`1` for buttons, the cumulative accumulator for axes.
    pub value: i32,
    /// Capture time of the report that produced this value.
    pub at: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_channels() {
        assert_eq!(Address(0).channel(), Some(Channel::Button(0)));
        assert_eq!(Address(7).channel(), Some(Channel::Button(7)));
        assert_eq!(Address(8).channel(), None);
        assert_eq!(Address(10).channel(), Some(Channel::X));
        assert_eq!(Address(11).channel(), Some(Channel::Y));
        assert_eq!(Address(12).channel(), Some(Channel::Wheel));
        assert_eq!(Address(13).channel(), None);
        assert_eq!(Address(-1).channel(), None);
        assert!(!Address(99).is_known());
    }

    #[test]
    fn test_button_constructor() {
        assert_eq!(Address::button(2), Some(Address::BUTTON_2));
        assert_eq!(Address::button(8), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Address::Y.to_string(), "11 (y)");
        assert_eq!(Address(99).to_string(), "99 (unknown)");
    }
}
