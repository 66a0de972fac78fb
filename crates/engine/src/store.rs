//! In-memory sequence store backed by DashMap.
//!
//! Production: replace with PostgreSQL (sqlx) or similar ACID store.
//! This provides the same API surface for development and testing. The two
//! uniqueness constraints the engine relies on — one active sequence per
//! lead, one canonical default template per tenant — are enforced here with
//! atomic check-then-insert on the corresponding index, not in application
//! logic.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::types::{Lead, ScheduledStep, SequenceTemplate, StepStatus, MAX_LEAD_SCORE};

/// Returned when a step batch loses the race for a lead's active-sequence
/// slot.
#[derive(Debug, Clone)]
pub struct StartConflict {
    pub existing_template: Uuid,
}

/// Thread-safe in-memory store for leads, sequence templates, scheduled
/// steps, and the indexes guarding the engine's invariants.
pub struct SequenceStore {
    leads: DashMap<Uuid, Lead>,
    templates: DashMap<Uuid, SequenceTemplate>,
    steps: DashMap<Uuid, ScheduledStep>,
    /// lead_id -> template id of the lead's active (non-failed) sequence.
    active_sequences: DashMap<Uuid, Uuid>,
    /// tenant_id -> id of the tenant's canonical default template.
    default_templates: DashMap<Uuid, Uuid>,
}

impl SequenceStore {
    pub fn new() -> Self {
        info!("Sequence store initialized (in-memory, development mode)");
        Self {
            leads: DashMap::new(),
            templates: DashMap::new(),
            steps: DashMap::new(),
            active_sequences: DashMap::new(),
            default_templates: DashMap::new(),
        }
    }

    // ─── Leads ─────────────────────────────────────────────────────────────

    pub fn upsert_lead(&self, lead: Lead) {
        self.leads.insert(lead.id, lead);
    }

    /// Tenant-scoped lookup: a lead under another tenant does not resolve.
    pub fn get_lead(&self, tenant_id: Uuid, lead_id: Uuid) -> Option<Lead> {
        self.leads
            .get(&lead_id)
            .filter(|l| l.tenant_id == tenant_id)
            .map(|l| l.value().clone())
    }

    /// Increment a lead's score, clamped at the ceiling. Returns the new
    /// score, or `None` if the lead no longer exists.
    pub fn increment_score(&self, lead_id: Uuid, delta: u32) -> Option<u32> {
        self.leads.get_mut(&lead_id).map(|mut entry| {
            let lead = entry.value_mut();
            lead.score = (lead.score + delta).min(MAX_LEAD_SCORE);
            lead.score
        })
    }

    /// Delete a lead. Its scheduled steps and active-sequence marker cascade
    /// with it.
    pub fn delete_lead(&self, tenant_id: Uuid, lead_id: Uuid) -> bool {
        let removed = self
            .leads
            .remove_if(&lead_id, |_, l| l.tenant_id == tenant_id)
            .is_some();
        if removed {
            self.steps.retain(|_, s| s.lead_id != lead_id);
            self.active_sequences.remove(&lead_id);
            info!(lead_id = %lead_id, "Lead deleted, steps cascaded");
        }
        removed
    }

    // ─── Templates ─────────────────────────────────────────────────────────

    pub fn insert_template(&self, template: SequenceTemplate) {
        self.templates.insert(template.id, template);
    }

    pub fn get_template(&self, template_id: Uuid) -> Option<SequenceTemplate> {
        self.templates.get(&template_id).map(|t| t.value().clone())
    }

    /// Return the tenant's canonical default template, creating it with
    /// `build` on first use. The per-tenant index entry is claimed
    /// atomically, so concurrent first calls still converge on one record.
    pub fn default_template_for<F>(
        &self,
        tenant_id: Uuid,
        build: F,
    ) -> CadenceResult<SequenceTemplate>
    where
        F: FnOnce() -> SequenceTemplate,
    {
        match self.default_templates.entry(tenant_id) {
            Entry::Occupied(e) => {
                let id = *e.get();
                self.templates
                    .get(&id)
                    .map(|t| t.value().clone())
                    .ok_or_else(|| {
                        CadenceError::Store(format!("default template {id} missing from store"))
                    })
            }
            Entry::Vacant(slot) => {
                let template = build();
                info!(
                    tenant_id = %tenant_id,
                    template_id = %template.id,
                    "Default template created"
                );
                self.templates.insert(template.id, template.clone());
                slot.insert(template.id);
                Ok(template)
            }
        }
    }

    // ─── Scheduled steps ───────────────────────────────────────────────────

    /// Template id of the lead's active sequence, if any.
    pub fn active_sequence(&self, lead_id: Uuid) -> Option<Uuid> {
        self.active_sequences.get(&lead_id).map(|e| *e.value())
    }

    /// Insert a sequence's steps as one batch, claiming the lead's
    /// active-sequence slot. The slot is checked and claimed under the entry
    /// lock, so of two concurrent batches for the same lead exactly one
    /// wins; the loser writes nothing and observes the winner's template id.
    pub fn insert_step_batch(
        &self,
        lead_id: Uuid,
        template_id: Uuid,
        steps: Vec<ScheduledStep>,
    ) -> Result<(), StartConflict> {
        match self.active_sequences.entry(lead_id) {
            Entry::Occupied(e) => Err(StartConflict {
                existing_template: *e.get(),
            }),
            Entry::Vacant(slot) => {
                for step in steps {
                    self.steps.insert(step.id, step);
                }
                slot.insert(template_id);
                Ok(())
            }
        }
    }

    /// Drop the lead's active-sequence marker (administrative cancel path).
    pub fn clear_active_sequence(&self, lead_id: Uuid) -> bool {
        self.active_sequences.remove(&lead_id).is_some()
    }

    pub fn get_step(&self, step_id: Uuid) -> Option<ScheduledStep> {
        self.steps.get(&step_id).map(|s| s.value().clone())
    }

    /// Mutate a step in place under its entry lock — the transactional
    /// read-modify-write the tracker needs so replayed events never lose
    /// counter increments. Returns `None` for an unknown id.
    pub fn with_step_mut<R>(
        &self,
        step_id: Uuid,
        f: impl FnOnce(&mut ScheduledStep) -> R,
    ) -> Option<R> {
        self.steps.get_mut(&step_id).map(|mut e| f(e.value_mut()))
    }

    /// All steps for a lead, ordered by step number.
    pub fn steps_for_lead(&self, lead_id: Uuid) -> Vec<ScheduledStep> {
        let mut steps: Vec<ScheduledStep> = self
            .steps
            .iter()
            .filter(|s| s.value().lead_id == lead_id)
            .map(|s| s.value().clone())
            .collect();
        steps.sort_by_key(|s| s.step_number);
        steps
    }

    /// Pending steps whose send time has arrived, scoped to the tenant's
    /// leads, ordered by send time then step number, capped at `limit`.
    pub fn due_steps(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Vec<ScheduledStep> {
        let mut due: Vec<ScheduledStep> = self
            .steps
            .iter()
            .filter(|s| {
                let step = s.value();
                step.status == StepStatus::Pending
                    && step.scheduled_send_at <= now
                    && self
                        .leads
                        .get(&step.lead_id)
                        .map(|l| l.tenant_id == tenant_id)
                        .unwrap_or(false)
            })
            .map(|s| s.value().clone())
            .collect();
        due.sort_by(|a, b| {
            a.scheduled_send_at
                .cmp(&b.scheduled_send_at)
                .then(a.step_number.cmp(&b.step_number))
        });
        due.truncate(limit);
        due
    }

    // ─── Demo Data ─────────────────────────────────────────────────────────

    /// Seed a demo tenant with a handful of leads for development. Returns
    /// the tenant id so the caller can log or exercise it.
    pub fn seed_demo_data(&self) -> Uuid {
        let tenant_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let now = Utc::now();

        let leads = vec![
            ("Ava", "Reyes", "Northwind Traders", Some("ava.reyes@northwind.example")),
            ("Ben", "Okafor", "Fabrikam", Some("ben.okafor@fabrikam.example")),
            ("Carol", "Lindqvist", "Contoso", Some("carol.l@contoso.example")),
            // No contact address: exercises the soft "cannot start" outcome.
            ("Dan", "Moreau", "Adventure Works", None),
        ];

        for (i, (first, last, company, email)) in leads.into_iter().enumerate() {
            self.upsert_lead(Lead {
                id: Uuid::new_v4(),
                tenant_id,
                first_name: Some(first.to_string()),
                last_name: Some(last.to_string()),
                company_name: Some(company.to_string()),
                email: email.map(str::to_string),
                score: 10 * i as u32,
                owner_id: Some(owner),
                created_by: Some(owner),
                created_at: now - Duration::days(i as i64),
            });
        }

        info!(tenant_id = %tenant_id, "Demo tenant seeded with 4 leads");
        tenant_id
    }
}

impl Default for SequenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_lead(tenant_id: Uuid) -> Lead {
        Lead {
            id: Uuid::new_v4(),
            tenant_id,
            first_name: Some("Test".into()),
            last_name: None,
            company_name: None,
            email: Some("test@example.com".into()),
            score: 0,
            owner_id: None,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    fn make_step(lead_id: Uuid, template_id: Uuid, number: u32) -> ScheduledStep {
        ScheduledStep {
            id: Uuid::new_v4(),
            template_id,
            lead_id,
            step_number: number,
            subject: "s".into(),
            body: "b".into(),
            delay_days: 0,
            scheduled_send_at: Utc::now(),
            sent_at: None,
            status: StepStatus::Pending,
            opened_at: None,
            clicked_at: None,
            open_count: 0,
            click_count: 0,
        }
    }

    #[test]
    fn test_lead_tenant_scoping() {
        let store = SequenceStore::new();
        let tenant = Uuid::new_v4();
        let lead = make_lead(tenant);
        let lead_id = lead.id;
        store.upsert_lead(lead);

        assert!(store.get_lead(tenant, lead_id).is_some());
        assert!(store.get_lead(Uuid::new_v4(), lead_id).is_none());
    }

    #[test]
    fn test_score_clamp() {
        let store = SequenceStore::new();
        let tenant = Uuid::new_v4();
        let mut lead = make_lead(tenant);
        lead.score = 98;
        let lead_id = lead.id;
        store.upsert_lead(lead);

        assert_eq!(store.increment_score(lead_id, 10), Some(100));
        assert_eq!(store.increment_score(lead_id, 5), Some(100));
        assert_eq!(store.increment_score(Uuid::new_v4(), 5), None);
    }

    #[test]
    fn test_batch_conflict_writes_nothing() {
        let store = SequenceStore::new();
        let tenant = Uuid::new_v4();
        let lead = make_lead(tenant);
        let lead_id = lead.id;
        store.upsert_lead(lead);

        let first_template = Uuid::new_v4();
        let steps = vec![
            make_step(lead_id, first_template, 1),
            make_step(lead_id, first_template, 2),
        ];
        assert!(store.insert_step_batch(lead_id, first_template, steps).is_ok());
        assert_eq!(store.steps_for_lead(lead_id).len(), 2);

        // Second batch loses the slot and leaves no steps behind.
        let second_template = Uuid::new_v4();
        let conflict = store
            .insert_step_batch(lead_id, second_template, vec![make_step(lead_id, second_template, 1)])
            .unwrap_err();
        assert_eq!(conflict.existing_template, first_template);
        assert_eq!(store.steps_for_lead(lead_id).len(), 2);
    }

    #[test]
    fn test_cascade_delete() {
        let store = SequenceStore::new();
        let tenant = Uuid::new_v4();
        let lead = make_lead(tenant);
        let lead_id = lead.id;
        store.upsert_lead(lead);

        let template_id = Uuid::new_v4();
        store
            .insert_step_batch(lead_id, template_id, vec![make_step(lead_id, template_id, 1)])
            .unwrap();
        assert!(store.active_sequence(lead_id).is_some());

        assert!(store.delete_lead(tenant, lead_id));
        assert!(store.steps_for_lead(lead_id).is_empty());
        assert!(store.active_sequence(lead_id).is_none());
        // Wrong tenant never deletes.
        assert!(!store.delete_lead(Uuid::new_v4(), lead_id));
    }

    #[test]
    fn test_default_template_idempotent() {
        let store = SequenceStore::new();
        let tenant = Uuid::new_v4();

        let build = |tenant_id: Uuid| SequenceTemplate {
            id: Uuid::new_v4(),
            tenant_id,
            name: "Default".into(),
            active: true,
            trigger_on_creation: true,
            score_threshold: None,
            steps: vec![cadence_core::types::EmailStepTemplate {
                step_number: 1,
                delay_days: 0,
                subject: "s".into(),
                body: "b".into(),
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let first = store.default_template_for(tenant, || build(tenant)).unwrap();
        let second = store.default_template_for(tenant, || build(tenant)).unwrap();
        assert_eq!(first.id, second.id);

        // A different tenant gets its own default.
        let other = Uuid::new_v4();
        let third = store.default_template_for(other, || build(other)).unwrap();
        assert_ne!(first.id, third.id);
    }

    #[test]
    fn test_due_steps_filter_order_limit() {
        let store = SequenceStore::new();
        let tenant = Uuid::new_v4();
        let lead = make_lead(tenant);
        let lead_id = lead.id;
        store.upsert_lead(lead);

        let template_id = Uuid::new_v4();
        let now = Utc::now();

        let mut steps = Vec::new();
        for (i, offset_days) in [-3i64, -2, -1, 1, 2].iter().enumerate() {
            let mut step = make_step(lead_id, template_id, (i + 1) as u32);
            step.scheduled_send_at = now + Duration::days(*offset_days);
            steps.push(step);
        }
        store.insert_step_batch(lead_id, template_id, steps).unwrap();

        let due = store.due_steps(tenant, now, 100);
        assert_eq!(due.len(), 3);
        assert!(due.windows(2).all(|w| w[0].scheduled_send_at <= w[1].scheduled_send_at));

        // Limit caps the result.
        let capped = store.due_steps(tenant, now, 2);
        assert_eq!(capped.len(), 2);

        // Other tenants see nothing.
        assert!(store.due_steps(Uuid::new_v4(), now, 100).is_empty());
    }
}
