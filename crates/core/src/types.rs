use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lead scores are clamped to this ceiling on every increment.
pub const MAX_LEAD_SCORE: u32 = 100;

/// A sales prospect record. Owned by the surrounding CRM; the engine reads
/// contact fields for rendering and mutates only `score`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub score: u32,
    pub owner_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    /// Whether the lead can receive sequence email at all.
    pub fn has_contact_address(&self) -> bool {
        self.email
            .as_deref()
            .map(|e| !e.trim().is_empty())
            .unwrap_or(false)
    }
}

/// A reusable, tenant-scoped definition of timed email steps.
/// Logically immutable once a sequence has started from it — edits only
/// affect future starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceTemplate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub active: bool,
    pub trigger_on_creation: bool,
    pub score_threshold: Option<u32>,
    /// Ordered by `step_number`; validated non-empty at write time.
    pub steps: Vec<EmailStepTemplate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SequenceTemplate {
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Total span of the sequence in days (delay of the last step).
    pub fn duration_days(&self) -> i64 {
        self.steps.iter().map(|s| s.delay_days).max().unwrap_or(0)
    }
}

/// One email definition inside a template. Subject and body may contain
/// placeholder tokens substituted at schedule time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailStepTemplate {
    pub step_number: u32,
    pub delay_days: i64,
    pub subject: String,
    pub body: String,
}

/// Lifecycle state of a scheduled step.
///
/// `pending -> sent -> opened -> clicked` in engagement order; `bounced`
/// and `failed` are terminal. Status never moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Sent,
    Opened,
    Clicked,
    Bounced,
    Failed,
}

impl StepStatus {
    /// Position in the engagement ladder. Terminal states rank above all
    /// engagement states so comparisons never regress out of them.
    pub fn engagement_rank(&self) -> u8 {
        match self {
            StepStatus::Pending => 0,
            StepStatus::Sent => 1,
            StepStatus::Opened => 2,
            StepStatus::Clicked => 3,
            StepStatus::Bounced | StepStatus::Failed => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Bounced | StepStatus::Failed)
    }
}

/// One concrete, per-lead instance of a template step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledStep {
    pub id: Uuid,
    pub template_id: Uuid,
    pub lead_id: Uuid,
    pub step_number: u32,
    pub subject: String,
    pub body: String,
    pub delay_days: i64,
    pub scheduled_send_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub status: StepStatus,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub open_count: u32,
    pub click_count: u32,
}

/// Delivery status reported back by the external send worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
    Bounced,
}

/// How a sequence-start request concluded.
///
/// `AlreadyActive` and `NoContact` are expected business conditions, not
/// errors — bulk import pipelines re-trigger starts and must not see
/// failures for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStartOutcome {
    Started,
    AlreadyActive,
    NoContact,
}

/// Result of a sequence-start request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStartResult {
    pub outcome: SequenceStartOutcome,
    pub success: bool,
    pub message: String,
    pub template_id: Option<Uuid>,
    pub template_name: Option<String>,
    pub steps_created: u32,
    pub first_send_at: Option<DateTime<Utc>>,
}

/// Snapshot of a lead's sequence, counted by current step status.
/// A step counted as `opened` is not also counted as `sent`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSummary {
    pub started: bool,
    pub sequence_id: Option<Uuid>,
    pub total_steps: u32,
    pub pending: u32,
    pub sent: u32,
    pub opened: u32,
    pub clicked: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engagement_rank_ordering() {
        assert!(StepStatus::Pending.engagement_rank() < StepStatus::Sent.engagement_rank());
        assert!(StepStatus::Sent.engagement_rank() < StepStatus::Opened.engagement_rank());
        assert!(StepStatus::Opened.engagement_rank() < StepStatus::Clicked.engagement_rank());
        assert!(StepStatus::Clicked.engagement_rank() < StepStatus::Bounced.engagement_rank());
    }

    #[test]
    fn test_terminal_states() {
        assert!(StepStatus::Bounced.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(!StepStatus::Clicked.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
    }

    #[test]
    fn test_contact_address() {
        let mut lead = Lead {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            first_name: None,
            last_name: None,
            company_name: None,
            email: Some("a@b.com".into()),
            score: 0,
            owner_id: None,
            created_by: None,
            created_at: Utc::now(),
        };
        assert!(lead.has_contact_address());

        lead.email = Some("   ".into());
        assert!(!lead.has_contact_address());

        lead.email = None;
        assert!(!lead.has_contact_address());
    }

    #[test]
    fn test_template_duration() {
        let template = SequenceTemplate {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Test".into(),
            active: true,
            trigger_on_creation: true,
            score_threshold: None,
            steps: vec![
                EmailStepTemplate {
                    step_number: 1,
                    delay_days: 0,
                    subject: "a".into(),
                    body: "b".into(),
                },
                EmailStepTemplate {
                    step_number: 2,
                    delay_days: 14,
                    subject: "c".into(),
                    body: "d".into(),
                },
            ],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(template.step_count(), 2);
        assert_eq!(template.duration_days(), 14);
    }
}
