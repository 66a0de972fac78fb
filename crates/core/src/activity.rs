//! Activity log sink — trait for recording CRM activity entries from any
//! module.
//!
//! The engine writes human-readable activity (e.g. "Email Sequence Started")
//! through an `Arc<dyn ActivitySink>`; the surrounding application routes
//! entries to its activity timeline store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A single activity-log entry attributed to a concrete actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub lead_id: Uuid,
    /// Always resolves to a valid actor; never optional. Callers depend on
    /// activity entries carrying an attributable identity.
    pub actor_id: Uuid,
    pub action: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

/// Trait for recording activity entries.
pub trait ActivitySink: Send + Sync {
    fn record(&self, entry: ActivityEntry);
}

/// No-op sink for tests and modules that don't need activity logging.
pub struct NoOpSink;

impl ActivitySink for NoOpSink {
    fn record(&self, _entry: ActivityEntry) {}
}

/// In-memory sink that captures entries for testing.
#[derive(Default)]
pub struct CaptureSink {
    entries: Mutex<Vec<ActivityEntry>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries
            .lock()
            .expect("activity sink mutex poisoned")
            .clone()
    }

    pub fn count(&self) -> usize {
        self.entries
            .lock()
            .expect("activity sink mutex poisoned")
            .len()
    }
}

impl ActivitySink for CaptureSink {
    fn record(&self, entry: ActivityEntry) {
        self.entries
            .lock()
            .expect("activity sink mutex poisoned")
            .push(entry);
    }
}

/// The fixed actor used when a lead has neither an owner nor a creator.
pub fn system_actor() -> Uuid {
    Uuid::nil()
}

/// Convenience builder for `ActivityEntry` with minimal boilerplate.
pub fn make_entry(
    tenant_id: Uuid,
    lead_id: Uuid,
    actor_id: Uuid,
    action: impl Into<String>,
    detail: impl Into<String>,
) -> ActivityEntry {
    ActivityEntry {
        id: Uuid::new_v4(),
        tenant_id,
        lead_id,
        actor_id,
        action: action.into(),
        detail: detail.into(),
        timestamp: Utc::now(),
    }
}

/// Convenience: create a no-op sink for modules that don't need logging.
pub fn noop_sink() -> Arc<dyn ActivitySink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
