//! Engagement tracker — moves scheduled steps through their lifecycle on
//! delivery and engagement events and feeds score deltas back to the lead.
//!
//! Tracking endpoints are hit by stale and forged pixel/link requests, so a
//! missing step id is a `false` return, never an error. Events are safe to
//! replay: first-occurrence timestamps are set once, counters always
//! accumulate, status only ever moves forward.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use cadence_core::config::SequenceConfig;
use cadence_core::types::{DeliveryOutcome, StepStatus};

use crate::store::SequenceStore;

pub struct EngagementTracker {
    store: Arc<SequenceStore>,
    config: SequenceConfig,
}

impl EngagementTracker {
    pub fn new(store: Arc<SequenceStore>, config: SequenceConfig) -> Self {
        Self { store, config }
    }

    /// Record an open event for a step. Returns `false` for an unknown id.
    pub fn record_open(&self, step_id: Uuid) -> bool {
        let now = Utc::now();
        let updated = self.store.with_step_mut(step_id, |step| {
            if step.opened_at.is_none() {
                step.opened_at = Some(now);
            }
            if !step.status.is_terminal()
                && step.status.engagement_rank() < StepStatus::Opened.engagement_rank()
            {
                step.status = StepStatus::Opened;
            }
            step.open_count += 1;
            (step.lead_id, step.open_count)
        });

        let Some((lead_id, open_count)) = updated else {
            debug!(step_id = %step_id, "Open event for unknown step, ignoring");
            return false;
        };

        metrics::counter!("tracking.opens").increment(1);
        debug!(step_id = %step_id, open_count, "Open recorded");
        self.apply_score_delta(lead_id, self.config.open_score_delta, "open");
        true
    }

    /// Record a click event for a step. Returns `false` for an unknown id.
    /// Click is the most-advanced engagement state, so any non-terminal
    /// step moves to `clicked`.
    pub fn record_click(&self, step_id: Uuid) -> bool {
        let now = Utc::now();
        let updated = self.store.with_step_mut(step_id, |step| {
            if step.clicked_at.is_none() {
                step.clicked_at = Some(now);
            }
            if !step.status.is_terminal() {
                step.status = StepStatus::Clicked;
            }
            step.click_count += 1;
            (step.lead_id, step.click_count)
        });

        let Some((lead_id, click_count)) = updated else {
            debug!(step_id = %step_id, "Click event for unknown step, ignoring");
            return false;
        };

        metrics::counter!("tracking.clicks").increment(1);
        debug!(step_id = %step_id, click_count, "Click recorded");
        self.apply_score_delta(lead_id, self.config.click_score_delta, "click");
        true
    }

    /// Write-back path for the external delivery worker. Returns `false`
    /// for an unknown id.
    pub fn record_delivery(&self, step_id: Uuid, outcome: DeliveryOutcome) -> bool {
        let now = Utc::now();
        let applied = self.store.with_step_mut(step_id, |step| match outcome {
            DeliveryOutcome::Sent => {
                if step.sent_at.is_none() {
                    step.sent_at = Some(now);
                }
                if step.status == StepStatus::Pending {
                    step.status = StepStatus::Sent;
                }
            }
            DeliveryOutcome::Failed => {
                if !step.status.is_terminal() {
                    step.status = StepStatus::Failed;
                }
            }
            DeliveryOutcome::Bounced => {
                if !step.status.is_terminal() {
                    step.status = StepStatus::Bounced;
                }
            }
        });

        if applied.is_none() {
            debug!(step_id = %step_id, ?outcome, "Delivery report for unknown step, ignoring");
            return false;
        }
        metrics::counter!("delivery.reports", "outcome" => format!("{outcome:?}")).increment(1);
        true
    }

    /// The step transition above is the authoritative event; the score
    /// update rides behind it and must never roll the step back. A lead
    /// deleted between events is logged and counted, not an error.
    fn apply_score_delta(&self, lead_id: Uuid, delta: u32, kind: &str) {
        match self.store.increment_score(lead_id, delta) {
            Some(new_score) => {
                debug!(lead_id = %lead_id, kind, new_score, "Lead score updated");
            }
            None => {
                warn!(lead_id = %lead_id, kind, "Lead missing during score update, step transition kept");
                metrics::counter!("tracking.score_update_failures").increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::types::{Lead, ScheduledStep};

    fn setup(score: u32) -> (EngagementTracker, Arc<SequenceStore>, Uuid, Uuid) {
        let store = Arc::new(SequenceStore::new());
        let tenant = Uuid::new_v4();
        let lead = Lead {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            first_name: None,
            last_name: None,
            company_name: None,
            email: Some("t@example.com".into()),
            score,
            owner_id: None,
            created_by: None,
            created_at: Utc::now(),
        };
        let lead_id = lead.id;
        store.upsert_lead(lead);

        let template_id = Uuid::new_v4();
        let step = ScheduledStep {
            id: Uuid::new_v4(),
            template_id,
            lead_id,
            step_number: 1,
            subject: "s".into(),
            body: "b".into(),
            delay_days: 0,
            scheduled_send_at: Utc::now(),
            sent_at: None,
            status: StepStatus::Sent,
            opened_at: None,
            clicked_at: None,
            open_count: 0,
            click_count: 0,
        };
        let step_id = step.id;
        store
            .insert_step_batch(lead_id, template_id, vec![step])
            .unwrap();

        let tracker = EngagementTracker::new(store.clone(), SequenceConfig::default());
        (tracker, store, tenant, step_id)
    }

    fn lead_score(store: &SequenceStore, tenant: Uuid, step_id: Uuid) -> u32 {
        let lead_id = store.get_step(step_id).unwrap().lead_id;
        store.get_lead(tenant, lead_id).unwrap().score
    }

    #[test]
    fn test_open_advances_and_scores() {
        let (tracker, store, tenant, step_id) = setup(0);

        assert!(tracker.record_open(step_id));

        let step = store.get_step(step_id).unwrap();
        assert_eq!(step.status, StepStatus::Opened);
        assert!(step.opened_at.is_some());
        assert_eq!(step.open_count, 1);
        assert_eq!(lead_score(&store, tenant, step_id), 5);
    }

    #[test]
    fn test_open_replay_keeps_first_timestamp() {
        let (tracker, store, tenant, step_id) = setup(0);

        tracker.record_open(step_id);
        let first = store.get_step(step_id).unwrap().opened_at;

        tracker.record_open(step_id);
        let step = store.get_step(step_id).unwrap();
        assert_eq!(step.open_count, 2);
        assert_eq!(step.opened_at, first);
        // Score accumulates with each event, up to the clamp.
        assert_eq!(lead_score(&store, tenant, step_id), 10);
    }

    #[test]
    fn test_click_is_most_advanced_and_monotonic() {
        let (tracker, store, _, step_id) = setup(0);

        assert!(tracker.record_click(step_id));
        assert_eq!(store.get_step(step_id).unwrap().status, StepStatus::Clicked);

        // A later open must not regress the status, but still counts.
        assert!(tracker.record_open(step_id));
        let step = store.get_step(step_id).unwrap();
        assert_eq!(step.status, StepStatus::Clicked);
        assert_eq!(step.open_count, 1);
        assert!(step.opened_at.is_some());
    }

    #[test]
    fn test_score_clamps_at_ceiling() {
        let (tracker, store, tenant, step_id) = setup(98);

        tracker.record_click(step_id);
        assert_eq!(lead_score(&store, tenant, step_id), 100);

        tracker.record_click(step_id);
        assert_eq!(lead_score(&store, tenant, step_id), 100);
    }

    #[test]
    fn test_unknown_step_returns_false() {
        let (tracker, _, _, _) = setup(0);
        assert!(!tracker.record_open(Uuid::new_v4()));
        assert!(!tracker.record_click(Uuid::new_v4()));
        assert!(!tracker.record_delivery(Uuid::new_v4(), DeliveryOutcome::Sent));
    }

    #[test]
    fn test_missing_lead_keeps_step_transition() {
        let (tracker, store, tenant, step_id) = setup(0);
        let lead_id = store.get_step(step_id).unwrap().lead_id;

        // Cascade removes the step too, so re-insert one orphaned step to
        // simulate a score-update failure after the step commit.
        store.delete_lead(tenant, lead_id);
        let template_id = Uuid::new_v4();
        let orphan = ScheduledStep {
            id: Uuid::new_v4(),
            template_id,
            lead_id,
            step_number: 1,
            subject: "s".into(),
            body: "b".into(),
            delay_days: 0,
            scheduled_send_at: Utc::now(),
            sent_at: None,
            status: StepStatus::Sent,
            opened_at: None,
            clicked_at: None,
            open_count: 0,
            click_count: 0,
        };
        let orphan_id = orphan.id;
        store
            .insert_step_batch(lead_id, template_id, vec![orphan])
            .unwrap();

        // The step still tracks even though the score update has nowhere
        // to land.
        assert!(tracker.record_open(orphan_id));
        assert_eq!(store.get_step(orphan_id).unwrap().open_count, 1);
    }

    #[test]
    fn test_delivery_write_back() {
        let (tracker, store, _, step_id) = setup(0);

        // Reset to pending to exercise the sent transition.
        store
            .with_step_mut(step_id, |s| s.status = StepStatus::Pending)
            .unwrap();

        assert!(tracker.record_delivery(step_id, DeliveryOutcome::Sent));
        let step = store.get_step(step_id).unwrap();
        assert_eq!(step.status, StepStatus::Sent);
        let sent_at = step.sent_at;
        assert!(sent_at.is_some());

        // Replay keeps the first timestamp.
        assert!(tracker.record_delivery(step_id, DeliveryOutcome::Sent));
        assert_eq!(store.get_step(step_id).unwrap().sent_at, sent_at);
    }

    #[test]
    fn test_bounce_is_terminal() {
        let (tracker, store, tenant, step_id) = setup(0);

        assert!(tracker.record_delivery(step_id, DeliveryOutcome::Bounced));
        assert_eq!(store.get_step(step_id).unwrap().status, StepStatus::Bounced);

        // Engagement after a bounce accumulates counters but never
        // resurrects the status.
        tracker.record_click(step_id);
        let step = store.get_step(step_id).unwrap();
        assert_eq!(step.status, StepStatus::Bounced);
        assert_eq!(step.click_count, 1);
        assert_eq!(lead_score(&store, tenant, step_id), 10);

        // Nor does a late failure report overwrite the bounce.
        tracker.record_delivery(step_id, DeliveryOutcome::Failed);
        assert_eq!(store.get_step(step_id).unwrap().status, StepStatus::Bounced);
    }
}
