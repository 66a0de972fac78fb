//! Dispatch query — the handoff point to the external delivery worker.
//!
//! Selection is read-only: the engine's responsibility ends at producing
//! the due list. Marking a step `sent` happens through the tracker's
//! delivery write-back once the worker has actually sent the mail.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use cadence_core::types::ScheduledStep;

use crate::store::SequenceStore;

#[derive(Clone)]
pub struct DispatchQueue {
    store: Arc<SequenceStore>,
}

impl DispatchQueue {
    pub fn new(store: Arc<SequenceStore>) -> Self {
        Self { store }
    }

    /// Pending steps whose scheduled send time has arrived, scoped to the
    /// tenant's leads, ordered by send time then step number, capped at
    /// `limit`.
    pub fn due_steps(&self, tenant_id: Uuid, limit: usize) -> Vec<ScheduledStep> {
        let due = self.store.due_steps(tenant_id, Utc::now(), limit);
        metrics::gauge!("dispatch.due_steps").set(due.len() as f64);
        due
    }
}
