//! Sequence scheduler — materializes a lead's drip sequence from a template.
//!
//! Starting a sequence resolves the template, renders each step against the
//! lead's contact fields, computes concrete send times anchored on the
//! lead's creation timestamp, and persists the batch while claiming the
//! lead's active-sequence slot. "Already active" and "no contact address"
//! are expected business conditions returned as structured results, never
//! errors.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use cadence_core::activity::{make_entry, system_actor, ActivitySink};
use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::types::{
    Lead, ScheduledStep, SequenceStartOutcome, SequenceStartResult, StepStatus,
};

use crate::renderer::{render, RenderContext};
use crate::store::SequenceStore;
use crate::templates::TemplateCatalog;

/// Steps whose computed send time has already passed are pushed forward by
/// this much — a step is never scheduled in the past.
const CLAMP_FORWARD_DAYS: i64 = 1;

pub struct SequenceScheduler {
    store: Arc<SequenceStore>,
    catalog: TemplateCatalog,
    activity: Arc<dyn ActivitySink>,
}

impl SequenceScheduler {
    pub fn new(store: Arc<SequenceStore>, activity: Arc<dyn ActivitySink>) -> Self {
        let catalog = TemplateCatalog::new(store.clone());
        Self {
            store,
            catalog,
            activity,
        }
    }

    /// Start a drip sequence for a lead.
    ///
    /// The lead must resolve under the tenant (`NotFound` otherwise). A lead
    /// with an active sequence yields `already_active`; one without a
    /// contact address yields `no_contact`; both with zero steps created.
    /// Otherwise one pending step per template step is persisted as a single
    /// batch and an activity entry is recorded.
    pub fn start_sequence(
        &self,
        tenant_id: Uuid,
        lead_id: Uuid,
        template_id: Option<Uuid>,
    ) -> CadenceResult<SequenceStartResult> {
        let lead = self
            .store
            .get_lead(tenant_id, lead_id)
            .ok_or_else(|| CadenceError::NotFound(format!("Lead {lead_id}")))?;

        if !lead.has_contact_address() {
            return Ok(SequenceStartResult {
                outcome: SequenceStartOutcome::NoContact,
                success: false,
                message: "Lead has no email address; no emails scheduled".to_string(),
                template_id: None,
                template_name: None,
                steps_created: 0,
                first_send_at: None,
            });
        }

        // Cheap fast path; the batch insert below is the authoritative
        // race-safe check.
        if let Some(existing) = self.store.active_sequence(lead_id) {
            return Ok(Self::already_active(existing));
        }

        let template = self.catalog.resolve(tenant_id, template_id)?;
        let ctx = RenderContext::from_lead(&lead);
        let now = Utc::now();

        let steps: Vec<ScheduledStep> = template
            .steps
            .iter()
            .map(|step| {
                let mut scheduled_send_at = lead.created_at + Duration::days(step.delay_days);
                if scheduled_send_at < now {
                    scheduled_send_at = now + Duration::days(CLAMP_FORWARD_DAYS);
                }
                ScheduledStep {
                    id: Uuid::new_v4(),
                    template_id: template.id,
                    lead_id,
                    step_number: step.step_number,
                    subject: render(&step.subject, &ctx),
                    body: render(&step.body, &ctx),
                    delay_days: step.delay_days,
                    scheduled_send_at,
                    sent_at: None,
                    status: StepStatus::Pending,
                    opened_at: None,
                    clicked_at: None,
                    open_count: 0,
                    click_count: 0,
                }
            })
            .collect();

        let steps_created = steps.len() as u32;
        let first_send_at = steps.iter().map(|s| s.scheduled_send_at).min();

        if let Err(conflict) = self.store.insert_step_batch(lead_id, template.id, steps) {
            return Ok(Self::already_active(conflict.existing_template));
        }

        let actor = resolve_actor(&lead);
        self.activity.record(make_entry(
            tenant_id,
            lead_id,
            actor,
            "Email Sequence Started",
            format!("{steps_created} emails scheduled"),
        ));

        metrics::counter!("sequence.started").increment(1);
        metrics::counter!("sequence.steps_scheduled").increment(steps_created as u64);
        info!(
            lead_id = %lead_id,
            template_id = %template.id,
            steps = steps_created,
            "Sequence started"
        );

        Ok(SequenceStartResult {
            outcome: SequenceStartOutcome::Started,
            success: true,
            message: format!(
                "Sequence '{}' started: {} emails scheduled",
                template.name, steps_created
            ),
            template_id: Some(template.id),
            template_name: Some(template.name),
            steps_created,
            first_send_at,
        })
    }

    /// Administrative cancel: mark the lead's remaining pending steps
    /// `failed` and release its active-sequence slot so a new sequence may
    /// start later. Returns the number of steps failed.
    pub fn fail_sequence(&self, tenant_id: Uuid, lead_id: Uuid) -> CadenceResult<u32> {
        let lead = self
            .store
            .get_lead(tenant_id, lead_id)
            .ok_or_else(|| CadenceError::NotFound(format!("Lead {lead_id}")))?;

        let mut failed = 0u32;
        for step in self.store.steps_for_lead(lead_id) {
            if step.status == StepStatus::Pending
                && self
                    .store
                    .with_step_mut(step.id, |s| s.status = StepStatus::Failed)
                    .is_some()
            {
                failed += 1;
            }
        }
        self.store.clear_active_sequence(lead_id);

        self.activity.record(make_entry(
            tenant_id,
            lead_id,
            resolve_actor(&lead),
            "Email Sequence Cancelled",
            format!("{failed} pending emails marked failed"),
        ));
        info!(lead_id = %lead_id, failed, "Sequence cancelled");
        Ok(failed)
    }

    fn already_active(existing_template: Uuid) -> SequenceStartResult {
        SequenceStartResult {
            outcome: SequenceStartOutcome::AlreadyActive,
            success: false,
            message: "Lead already has an active sequence".to_string(),
            template_id: Some(existing_template),
            template_name: None,
            steps_created: 0,
            first_send_at: None,
        }
    }
}

/// Resolve the actor an activity entry is attributed to: the lead's owner,
/// else its creator, else the fixed system actor. Callers depend on
/// activity entries always carrying a valid actor, so the chain must not
/// collapse into a single nullable field.
fn resolve_actor(lead: &Lead) -> Uuid {
    lead.owner_id
        .or(lead.created_by)
        .unwrap_or_else(system_actor)
}
