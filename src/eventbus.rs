//! Address-keyed subscription registry and fan-out.
//!
//! [`Dispatcher`] is the one structure touched from both sides: subscribers register
//! and unregister from any thread while the port's reader thread dispatches. The
//! registry sits behind an `RwLock`; [`Dispatcher::notify`] collects the listeners to
//! call under the read lock and invokes them after releasing it, so a listener may
//! (un)register from inside its own callback. Each subscription's enabled and
//! registered flags are re-checked right before its call, so a subscription removed
//! or muted mid-dispatch is skipped.
//!
//! Dispatch is synchronous. A slow listener stalls polling of its device.

use crate::event::{Address, ValueUpdate};
use crate::state::{ChangeSet, MouseState};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Receives values for the address it was registered at.
pub trait ValueListener: Send {
    fn on_value(&mut self, update: &ValueUpdate);
}

impl<F> ValueListener for F
where
    F: FnMut(&ValueUpdate) + Send,
{
    fn on_value(&mut self, update: &ValueUpdate) {
        self(update)
    }
}

/// Handle returned by [`Dispatcher::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

struct Slot {
    enabled: AtomicBool,
    registered: AtomicBool,
    listener: Mutex<Box<dyn ValueListener>>,
}

impl Slot {
    fn is_live(&self) -> bool {
        self.registered.load(Ordering::Acquire) && self.enabled.load(Ordering::Acquire)
    }
}

struct Entry {
    id: SubscriptionId,
    slot: Arc<Slot>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_address: BTreeMap<Address, Vec<Entry>>,
}

impl Registry {
    fn find(&self, id: SubscriptionId) -> Option<&Entry> {
        self.by_address
            .values()
            .flat_map(|v| v.iter())
            .find(|e| e.id == id)
    }
}

/// What one [`Dispatcher::notify`] call did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listener invocations made.
    pub notified: usize,
    /// Unrecognized addresses with subscribers (reported on forced cycles only).
    pub unknown: Vec<Address>,
}

/// Concurrency-safe multimap from [`Address`] to listeners.
#[derive(Default)]
pub struct Dispatcher {
    registry: RwLock<Registry>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` at `address`. Several listeners may share an address.
    pub fn register(
        &self,
        address: Address,
        listener: impl ValueListener + 'static,
    ) -> SubscriptionId {
        let mut reg = self.registry.write();
        let id = SubscriptionId(reg.next_id);
        reg.next_id += 1;
        reg.by_address.entry(address).or_default().push(Entry {
            id,
            slot: Arc::new(Slot {
                enabled: AtomicBool::new(true),
                registered: AtomicBool::new(true),
                listener: Mutex::new(Box::new(listener)),
            }),
        });
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    ///
    /// Once this returns, no new call to the listener starts, including from a
    /// dispatch already in progress. A call running at that moment finishes.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut reg = self.registry.write();
        let mut removed = false;
        reg.by_address.retain(|_, entries| {
            entries.retain(|e| {
                if e.id != id {
                    return true;
                }
                e.slot.registered.store(false, Ordering::Release);
                removed = true;
                false
            });
            !entries.is_empty()
        });
        removed
    }

    /// Resume delivery to a muted subscription.
    pub fn enable(&self, id: SubscriptionId) -> bool {
        self.set_enabled(id, true)
    }

    /// Mute a subscription without removing it.
    pub fn disable(&self, id: SubscriptionId) -> bool {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: SubscriptionId, enabled: bool) -> bool {
        match self.registry.read().find(id) {
            Some(entry) => {
                entry.slot.enabled.store(enabled, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.registry.read().by_address.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Addresses that currently have at least one subscription.
    pub fn addresses(&self) -> Vec<Address> {
        self.registry.read().by_address.keys().copied().collect()
    }

    /// Call every enabled listener whose address is in `changes` with its value in `state`.
    ///
    /// Each listener is invoked at most once per call. Unknown addresses are never
    /// called; on a forced cycle they are logged and returned in the report.
    pub fn notify(&self, changes: &ChangeSet, state: &MouseState, at: Instant) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut due: Vec<(Address, i32, Arc<Slot>)> = Vec::new();

        {
            let reg = self.registry.read();
            for (&address, entries) in &reg.by_address {
                let Some(value) = state.value(address) else {
                    if changes.forced {
                        report.unknown.push(address);
                    }
                    continue;
                };
                if !changes.contains(address) {
                    continue;
                }
                due.extend(
                    entries
                        .iter()
                        .filter(|e| e.slot.is_live())
                        .map(|e| (address, value, Arc::clone(&e.slot))),
                );
            }
        }

        for address in &report.unknown {
            warn!("bad USB mouse address {}", address.0);
        }

        for (address, value, slot) in due {
            let mut listener = slot.listener.lock();
            // an earlier listener in this dispatch may have removed or muted it
            if !slot.is_live() {
                continue;
            }
            let update = ValueUpdate { address, value, at };
            listener.on_value(&update);
            report.notified += 1;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::state::StateTracker;
    use std::sync::mpsc;

    fn cycle(t: &mut StateTracker, d: &Dispatcher, report: &[u8]) -> DispatchReport {
        let changes = t.apply(&decode(report));
        let r = d.notify(&changes, t.current(), Instant::now());
        t.commit();
        r
    }

    #[test]
    fn test_fan_out_same_address() {
        let d = Dispatcher::new();
        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();
        d.register(Address::Y, move |u: &ValueUpdate| tx.send(("a", u.value)).unwrap());
        d.register(Address::Y, move |u: &ValueUpdate| tx2.send(("b", u.value)).unwrap());

        let mut t = StateTracker::new();
        cycle(&mut t, &d, &[0, 0, 0]);
        let _: Vec<_> = rx.try_iter().collect();

        let r = cycle(&mut t, &d, &[0, 0, 0xFE]);
        assert_eq!(r.notified, 2);
        let mut got: Vec<_> = rx.try_iter().collect();
        got.sort();
        assert_eq!(got, vec![("a", -2), ("b", -2)]);
    }

    #[test]
    fn test_second_identical_dispatch_notifies_nobody() {
        let d = Dispatcher::new();
        for a in Address::DEFAULT_SET {
            d.register(a, |_: &ValueUpdate| {});
        }
        let mut t = StateTracker::new();
        assert_eq!(cycle(&mut t, &d, &[1, 2, 3, 4]).notified, 6);
        assert_eq!(cycle(&mut t, &d, &[1, 0, 0, 0]).notified, 0);
    }

    #[test]
    fn test_unknown_address_warned_only_when_forced() {
        let d = Dispatcher::new();
        let (tx, rx) = mpsc::channel();
        d.register(Address(99), move |u: &ValueUpdate| tx.send(u.value).unwrap());

        let mut t = StateTracker::new();
        let r = cycle(&mut t, &d, &[1, 1, 1, 1]);
        assert_eq!(r.unknown, vec![Address(99)]);
        assert_eq!(r.notified, 0);

        let r = cycle(&mut t, &d, &[0, 1, 1, 1]);
        assert!(r.unknown.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disable_enable_unregister() {
        let d = Dispatcher::new();
        let id = d.register(Address::X, |_: &ValueUpdate| {});
        assert_eq!(d.len(), 1);

        let mut t = StateTracker::new();
        assert!(d.disable(id));
        assert_eq!(cycle(&mut t, &d, &[0, 1]).notified, 0);
        assert!(d.enable(id));
        assert_eq!(cycle(&mut t, &d, &[0, 1]).notified, 1);

        assert!(d.unregister(id));
        assert!(!d.unregister(id));
        assert!(d.is_empty());
        assert!(d.addresses().is_empty());
    }

    #[test]
    fn test_listener_may_register_during_dispatch() {
        let d = Arc::new(Dispatcher::new());
        let inner = Arc::clone(&d);
        d.register(Address::BUTTON_0, move |_: &ValueUpdate| {
            inner.register(Address::BUTTON_1, |_: &ValueUpdate| {});
        });
        let mut t = StateTracker::new();
        cycle(&mut t, &d, &[1]);
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn test_unregistered_mid_dispatch_is_not_called() {
        let d = Arc::new(Dispatcher::new());
        let (tx, rx) = mpsc::channel();
        let victim = d.register(Address::X, move |u: &ValueUpdate| tx.send(u.value).unwrap());

        // button 0 sorts before X, so it runs first within the same dispatch
        let weak = Arc::downgrade(&d);
        let (done_tx, done_rx) = mpsc::channel();
        d.register(Address::BUTTON_0, move |_: &ValueUpdate| {
            if let Some(d) = weak.upgrade() {
                done_tx.send(d.unregister(victim)).unwrap();
            }
        });

        let mut t = StateTracker::new();
        let r = cycle(&mut t, &d, &[1, 1]);
        assert_eq!(done_rx.try_recv(), Ok(true));
        assert!(rx.try_recv().is_err());
        assert_eq!(r.notified, 1);
    }

    #[test]
    fn test_disabled_mid_dispatch_is_not_called() {
        let d = Arc::new(Dispatcher::new());
        let (tx, rx) = mpsc::channel();
        let muted = d.register(Address::WHEEL, move |u: &ValueUpdate| tx.send(u.value).unwrap());

        let weak = Arc::downgrade(&d);
        d.register(Address::Y, move |_: &ValueUpdate| {
            if let Some(d) = weak.upgrade() {
                d.disable(muted);
            }
        });

        let mut t = StateTracker::new();
        cycle(&mut t, &d, &[0, 0, 1, 1]);
        assert!(rx.try_recv().is_err());

        assert!(d.enable(muted));
        cycle(&mut t, &d, &[0, 0, 0, 1]);
        assert_eq!(rx.try_recv(), Ok(2));
    }
}
