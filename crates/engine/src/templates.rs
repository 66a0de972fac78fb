//! Template catalog: tenant-scoped sequence template resolution, operator
//! creation with step validation, and the lazily-materialized per-tenant
//! default template.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::types::{EmailStepTemplate, SequenceTemplate};

use crate::store::SequenceStore;

/// Canonical name of the default template. Unique per tenant via the
/// store's default index.
pub const DEFAULT_TEMPLATE_NAME: &str = "Default Drip Sequence";

#[derive(Clone)]
pub struct TemplateCatalog {
    store: Arc<SequenceStore>,
}

impl TemplateCatalog {
    pub fn new(store: Arc<SequenceStore>) -> Self {
        Self { store }
    }

    /// Resolve the template a sequence start should use.
    ///
    /// With an explicit id, the template must exist, belong to the tenant,
    /// and be active — anything else is `NotFound` (inactive and
    /// wrong-tenant are indistinguishable to the caller). Without one, the
    /// tenant's default template is returned, created on first use; repeat
    /// calls return the same record.
    pub fn resolve(
        &self,
        tenant_id: Uuid,
        template_id: Option<Uuid>,
    ) -> CadenceResult<SequenceTemplate> {
        match template_id {
            Some(id) => self
                .store
                .get_template(id)
                .filter(|t| t.tenant_id == tenant_id && t.active)
                .ok_or_else(|| CadenceError::NotFound(format!("Template {id}"))),
            None => self
                .store
                .default_template_for(tenant_id, || Self::build_default(tenant_id)),
        }
    }

    /// Operator path: store a new template after validating its steps.
    pub fn create_template(
        &self,
        tenant_id: Uuid,
        name: String,
        trigger_on_creation: bool,
        score_threshold: Option<u32>,
        mut steps: Vec<EmailStepTemplate>,
    ) -> CadenceResult<SequenceTemplate> {
        validate_steps(&steps)?;
        steps.sort_by_key(|s| s.step_number);

        let now = Utc::now();
        let template = SequenceTemplate {
            id: Uuid::new_v4(),
            tenant_id,
            name,
            active: true,
            trigger_on_creation,
            score_threshold,
            steps,
            created_at: now,
            updated_at: now,
        };
        info!(
            template_id = %template.id,
            tenant_id = %tenant_id,
            name = %template.name,
            steps = template.step_count(),
            "Template created"
        );
        self.store.insert_template(template.clone());
        Ok(template)
    }

    fn build_default(tenant_id: Uuid) -> SequenceTemplate {
        let now = Utc::now();
        SequenceTemplate {
            id: Uuid::new_v4(),
            tenant_id,
            name: DEFAULT_TEMPLATE_NAME.to_string(),
            active: true,
            trigger_on_creation: true,
            score_threshold: None,
            steps: default_steps(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// The built-in 5-step schedule used when a tenant has no explicit template.
pub fn default_steps() -> Vec<EmailStepTemplate> {
    vec![
        EmailStepTemplate {
            step_number: 1,
            delay_days: 0,
            subject: "Quick hello, {first_name}".to_string(),
            body: "Hi {first_name},\n\nThanks for connecting. I wanted to reach out \
                   personally and see how things are going at {company_name}. Is there \
                   anything I can help with?\n"
                .to_string(),
        },
        EmailStepTemplate {
            step_number: 2,
            delay_days: 3,
            subject: "Following up, {first_name}".to_string(),
            body: "Hi {first_name},\n\nJust floating this back to the top of your \
                   inbox. Happy to walk through how teams like {company_name} use us \
                   whenever suits.\n"
                .to_string(),
        },
        EmailStepTemplate {
            step_number: 3,
            delay_days: 7,
            subject: "A few resources for {company_name}".to_string(),
            body: "Hi {first_name},\n\nI put together a couple of short case studies \
                   that felt relevant to {company_name}. Would love to hear what you \
                   think.\n"
                .to_string(),
        },
        EmailStepTemplate {
            step_number: 4,
            delay_days: 10,
            subject: "Checking in".to_string(),
            body: "Hi {first_name},\n\nStill keen to connect when the timing works. \
                   Even a quick no is useful so I know where things stand.\n"
                .to_string(),
        },
        EmailStepTemplate {
            step_number: 5,
            delay_days: 14,
            subject: "Closing the loop, {first_name}".to_string(),
            body: "Hi {first_name},\n\nI haven't heard back, so I'll close the loop \
                   for now. If priorities shift at {company_name}, my door is open.\n"
                .to_string(),
        },
    ]
}

fn validate_steps(steps: &[EmailStepTemplate]) -> CadenceResult<()> {
    if steps.is_empty() {
        return Err(CadenceError::Validation(
            "template must define at least one step".to_string(),
        ));
    }
    let mut seen = std::collections::HashSet::new();
    for step in steps {
        if step.step_number == 0 {
            return Err(CadenceError::Validation(
                "step numbers must be positive".to_string(),
            ));
        }
        if !seen.insert(step.step_number) {
            return Err(CadenceError::Validation(format!(
                "duplicate step number {}",
                step.step_number
            )));
        }
        if step.delay_days < 0 {
            return Err(CadenceError::Validation(format!(
                "step {} has a negative delay",
                step.step_number
            )));
        }
    }
    Ok(())
}
