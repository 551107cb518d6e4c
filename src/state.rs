//! Cumulative mouse state and change detection.
//!
//! [`StateTracker`] holds the `previous` and `current` [`MouseState`]. Each successful
//! read goes through [`StateTracker::apply`] (update `current`, compute the
//! [`ChangeSet`]), the dispatcher fans the changes out, then [`StateTracker::commit`]
//! makes `current` the new baseline.
//!
//! The first cycle after a (re)connect is forced: every recognized address counts as
//! changed, whatever the values, so subscribers get a fresh baseline after an outage.

use crate::decode::ReportDelta;
use crate::event::{Address, Channel};
use serde::{Deserialize, Serialize};

/// Buttons plus cumulative axis positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouseState {
    pub buttons: u8,
    pub x: i32,
    pub y: i32,
    pub wheel: i32,
}

impl MouseState {
    /// Value published for `address`: `0`/`1` for a button bit, the accumulator for an axis.
    pub fn value(&self, address: Address) -> Option<i32> {
        Some(match address.channel()? {
            Channel::Button(bit) => i32::from((self.buttons >> bit) & 1),
            Channel::X => self.x,
            Channel::Y => self.y,
            Channel::Wheel => self.wheel,
        })
    }

    /// Add a decoded report. Accumulators wrap instead of overflowing.
    pub fn apply(&mut self, delta: &ReportDelta) {
        if let Some(buttons) = delta.buttons {
            self.buttons = buttons;
        }
        self.x = self.x.wrapping_add(delta.dx);
        self.y = self.y.wrapping_add(delta.dy);
        self.wheel = self.wheel.wrapping_add(delta.dwheel);
    }
}

/// Which addresses changed in one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// XOR of old and new button bytes.
    pub buttons: u8,
    pub x: bool,
    pub y: bool,
    pub wheel: bool,
    /// First cycle after a connect: everything recognized counts as changed.
    pub forced: bool,
}

impl ChangeSet {
    /// Compare two snapshots.
    pub fn between(old: &MouseState, new: &MouseState, forced: bool) -> Self {
        Self {
            buttons: old.buttons ^ new.buttons,
            x: old.x != new.x,
            y: old.y != new.y,
            wheel: old.wheel != new.wheel,
            forced,
        }
    }

    /// `true` if `address` must be dispatched this cycle. Unknown addresses never are.
    pub fn contains(&self, address: Address) -> bool {
        let Some(channel) = address.channel() else {
            return false;
        };
        if self.forced {
            return true;
        }
        match channel {
            Channel::Button(bit) => self.buttons & (1 << bit) != 0,
            Channel::X => self.x,
            Channel::Y => self.y,
            Channel::Wheel => self.wheel,
        }
    }

    /// `true` if nothing needs dispatching.
    pub fn is_empty(&self) -> bool {
        !self.forced && self.buttons == 0 && !self.x && !self.y && !self.wheel
    }
}

/// Previous/current snapshots plus the first-cycle flag.
#[derive(Clone, Debug)]
pub struct StateTracker {
    previous: MouseState,
    current: MouseState,
    first_cycle: bool,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    /// A fresh tracker starts in the forced state.
    pub fn new() -> Self {
        Self {
            previous: MouseState::default(),
            current: MouseState::default(),
            first_cycle: true,
        }
    }

    /// Mark the next cycle as the first one after a connect. Accumulators are kept.
    pub fn begin_connection(&mut self) {
        self.first_cycle = true;
    }

    /// Update `current` with `delta` and report what differs from `previous`.
    pub fn apply(&mut self, delta: &ReportDelta) -> ChangeSet {
        self.current.apply(delta);
        ChangeSet::between(&self.previous, &self.current, self.first_cycle)
    }

    /// End the cycle: `current` becomes the baseline and the forced flag clears.
    pub fn commit(&mut self) {
        self.previous = self.current;
        self.first_cycle = false;
    }

    #[inline]
    pub fn current(&self) -> &MouseState {
        &self.current
    }

    #[inline]
    pub fn previous(&self) -> &MouseState {
        &self.previous
    }

    #[inline]
    pub fn is_first_cycle(&self) -> bool {
        self.first_cycle
    }
}
