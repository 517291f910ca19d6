//! Query event reporting.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use vireo_resolver::{Result, ResolverError};

/// One completed resolution, as reported to listeners.
#[derive(Debug, Clone)]
pub struct QueryEvent {
    /// Network the query ran on.
    pub netid: u32,
    /// Queried name.
    pub name: String,
    /// Query type code.
    pub qtype: u16,
    /// Response code (negative for local failures).
    pub rcode: i32,
    /// End-to-end latency.
    pub latency: Duration,
}

/// Receives query events. Callbacks may arrive on any task; the
/// listener synchronizes internally.
pub trait EventListener: Send + Sync {
    /// Called once per completed resolution.
    fn on_query_event(&self, event: &QueryEvent);
}

/// Registry of event listeners.
#[derive(Default)]
pub struct EventReporter {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventReporter {
    /// Registers a listener. A listener instance can be registered
    /// only once; `None` is rejected outright.
    pub fn register(&self, listener: Option<Arc<dyn EventListener>>) -> Result<()> {
        let listener = listener
            .ok_or_else(|| ResolverError::InvalidArgument("null event listener".into()))?;
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|known| Arc::ptr_eq(known, &listener)) {
            return Err(ResolverError::AlreadyExists(0));
        }
        listeners.push(listener);
        Ok(())
    }

    /// Delivers an event to every listener.
    pub fn emit(&self, event: &QueryEvent) {
        for listener in self.listeners.read().iter() {
            listener.on_query_event(event);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns true if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
