//! Status aggregator — read-only summary of a lead's sequence for
//! reporting. Counts are exclusive snapshots of each step's current status,
//! not cumulative historical tallies.

use std::sync::Arc;

use uuid::Uuid;

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::types::{StatusSummary, StepStatus};

use crate::store::SequenceStore;

#[derive(Clone)]
pub struct StatusAggregator {
    store: Arc<SequenceStore>,
}

impl StatusAggregator {
    pub fn new(store: Arc<SequenceStore>) -> Self {
        Self { store }
    }

    /// Summarize the lead's steps by lifecycle state. A lead with no steps
    /// yields `started = false` and zero counts; an unknown lead is
    /// `NotFound`.
    pub fn sequence_status(&self, tenant_id: Uuid, lead_id: Uuid) -> CadenceResult<StatusSummary> {
        self.store
            .get_lead(tenant_id, lead_id)
            .ok_or_else(|| CadenceError::NotFound(format!("Lead {lead_id}")))?;

        let steps = self.store.steps_for_lead(lead_id);
        if steps.is_empty() {
            return Ok(StatusSummary::default());
        }

        let mut summary = StatusSummary {
            started: true,
            // Steps are ordered by step number; the first carries the
            // owning sequence's template id.
            sequence_id: steps.first().map(|s| s.template_id),
            total_steps: steps.len() as u32,
            ..StatusSummary::default()
        };

        for step in &steps {
            match step.status {
                StepStatus::Pending => summary.pending += 1,
                StepStatus::Sent => summary.sent += 1,
                StepStatus::Opened => summary.opened += 1,
                StepStatus::Clicked => summary.clicked += 1,
                StepStatus::Bounced | StepStatus::Failed => {}
            }
        }

        Ok(summary)
    }
}
