use crate::event::ValueUpdate;
use crate::eventbus::ValueListener;
use tracing::info;

/// A listener that logs every update it receives.
pub struct Logger {
    port: String,
}

impl Logger {
    pub fn new(port: impl Into<String>) -> Self {
        Self { port: port.into() }
    }
}

impl ValueListener for Logger {
    fn on_value(&mut self, update: &ValueUpdate) {
        info!(port = %self.port, address = %update.address, value = update.value, "input");
    }
}
