//! Deprecation advisories
//!
//! Non-fatal warnings about behaviour that will change. Each advisory is logged
//! under the `deprecation` target and kept so the caller can report them.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

/// Deprecation advisory sink
#[derive(Debug, Clone, Default)]
pub struct DeprecationLogger {
    messages: Arc<Mutex<Vec<String>>>,
}

impl DeprecationLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an advisory
    pub fn deprecated(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "deprecation", "{}", message);
        self.messages.lock().push(message);
    }

    /// Advisories emitted so far
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Take and clear the advisories emitted so far
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock())
    }
}
