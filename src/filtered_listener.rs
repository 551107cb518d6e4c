use crate::event::ValueUpdate;
use crate::eventbus::ValueListener;

/// Wraps a listener and only forwards updates accepted by a user-supplied predicate.
///
/// Handy for thresholds ("only when X passes 1000") or edge selection ("presses only")
/// without teaching the dispatcher about either.
pub struct FilteredListener {
    predicate: Box<dyn Fn(&ValueUpdate) -> bool + Send + Sync>,
    inner: Box<dyn ValueListener>,
}

impl FilteredListener {
    pub fn new(
        predicate: impl Fn(&ValueUpdate) -> bool + Send + Sync + 'static,
        inner: impl ValueListener + 'static,
    ) -> Self {
        Self {
            predicate: Box::new(predicate),
            inner: Box::new(inner),
        }
    }

    /// Forward only button presses (value `1`).
    pub fn presses(inner: impl ValueListener + 'static) -> Self {
        Self::new(|u| u.value != 0, inner)
    }
}

impl ValueListener for FilteredListener {
    fn on_value(&mut self, update: &ValueUpdate) {
        if (self.predicate)(update) {
            self.inner.on_value(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Address;
    use std::sync::mpsc;
    use std::time::Instant;

    fn update(value: i32) -> ValueUpdate {
        ValueUpdate {
            address: Address::BUTTON_0,
            value,
            at: Instant::now(),
        }
    }

    #[test]
    fn test_presses_only() {
        let (tx, rx) = mpsc::channel();
        let mut l = FilteredListener::presses(move |u: &ValueUpdate| tx.send(u.value).unwrap());
        l.on_value(&update(1));
        l.on_value(&update(0));
        l.on_value(&update(1));
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 1]);
    }
}
