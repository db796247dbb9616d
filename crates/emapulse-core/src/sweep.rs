//! Periodic sweep over persisted deadlines.
//!
//! The sweep replaces client-side re-prompt timers: deadlines live in the
//! store, and a single periodic scan picks up every active state whose
//! `next_prompt_at` has elapsed, whether or not any client is running.
//!
//! Delivery is at-least-once. The sweep stamps `last_prompted_at` after
//! each attempt but never advances the deadline, so an unanswered state is
//! re-notified at most once per tick until the user responds.
//!
//! The sweep holds no scheduling state of its own; a crashed tick resumes
//! on the next one from the same `due_states` query.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::{CoreError, DeliveryError, StoreError};
use crate::push::Notifier;
use crate::state::PromptRequest;
use crate::storage::{StateDb, SweepConfig};

/// Tally of one sweep tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// States whose deadline had elapsed at tick time.
    pub due: usize,
    /// Prompts the push endpoint accepted.
    pub delivered: usize,
    /// Due states whose user has no registered endpoint.
    pub no_subscription: usize,
    /// Delivery attempts that failed in transport.
    pub failed: usize,
    /// Episodes ended by the timeout policy this tick.
    pub expired: usize,
}

/// Scans the store on a fixed cadence and hands due prompts to the
/// notifier.
pub struct Sweeper {
    db: StateDb,
    notifier: Notifier,
    config: SweepConfig,
}

impl Sweeper {
    pub fn new(db: StateDb, notifier: Notifier, config: SweepConfig) -> Self {
        Self {
            db,
            notifier,
            config,
        }
    }

    /// Run one tick at `now`.
    ///
    /// Deliveries run as independent blocking tasks so one slow endpoint
    /// cannot hold up the rest; all row mutations stay on this task's
    /// store handle. Per-item failures are counted, logged, and isolated.
    ///
    /// # Errors
    /// Only a failure of the due-states query itself propagates; the
    /// caller's loop logs it and keeps ticking.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, CoreError> {
        let mut report = SweepReport::default();

        report.expired = self.expire_stale(now);

        let due = self.db.due_states(now)?;
        report.due = due.len();

        let mut deliveries: JoinSet<(String, Result<crate::push::Delivered, DeliveryError>)> =
            JoinSet::new();
        for row in &due {
            let request = PromptRequest::from(row);
            let subscription = match self.db.find_subscription(&request.user_id) {
                Ok(sub) => sub,
                Err(err) => {
                    warn!(state_id = %request.state_id, %err, "subscription lookup failed");
                    report.failed += 1;
                    continue;
                }
            };
            let notifier = self.notifier.clone();
            deliveries.spawn_blocking(move || {
                let result = notifier.deliver(subscription.as_ref(), &request);
                (request.state_id, result)
            });
        }

        while let Some(joined) = deliveries.join_next().await {
            let Ok((state_id, result)) = joined else {
                warn!("delivery task aborted");
                report.failed += 1;
                continue;
            };

            match result {
                Ok(_) => report.delivered += 1,
                Err(DeliveryError::NoSubscription { ref user_id }) => {
                    warn!(%state_id, %user_id, "no push subscription; state stays due");
                    report.no_subscription += 1;
                }
                Err(err) => {
                    warn!(%state_id, %err, "prompt delivery failed; will retry next sweep");
                    report.failed += 1;
                }
            }

            // Attempted either way. The deadline itself is untouched, so
            // the state remains due until the user answers.
            if let Err(err) = self.db.stamp_prompted(&state_id, now) {
                warn!(%state_id, %err, "failed to stamp delivery attempt");
            }
        }

        Ok(report)
    }

    /// Timeout policy: end active episodes with no answer since the
    /// configured cutoff. Disabled unless `expire_after_secs` is set.
    fn expire_stale(&self, now: DateTime<Utc>) -> usize {
        let Some(expire_after) = self.config.expire_after_secs else {
            return 0;
        };
        let cutoff = now - Duration::seconds(expire_after);

        let stale = match self.db.stale_states(cutoff) {
            Ok(stale) => stale,
            Err(err) => {
                warn!(%err, "stale-state scan failed");
                return 0;
            }
        };

        let mut expired = 0;
        for state in stale {
            match self.db.end(&state.id, now) {
                Ok(_) => {
                    info!(state_id = %state.id, user_id = %state.user_id, "episode expired unanswered");
                    expired += 1;
                }
                // Answered in the meantime; nothing to do.
                Err(StoreError::NotFound { .. }) => {}
                Err(err) => warn!(state_id = %state.id, %err, "failed to expire episode"),
            }
        }
        expired
    }

    /// Tick forever on the configured cadence.
    ///
    /// Transient store or delivery failures are logged and do not stop the
    /// loop; every tick re-reads the persisted deadlines, so a restart
    /// resumes cleanly with no in-memory state to lose.
    pub async fn run(&self) -> Result<(), CoreError> {
        let period = std::time::Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval_secs = self.config.interval_secs, "sweep loop started");
        loop {
            ticker.tick().await;
            match self.run_once(Utc::now()).await {
                Ok(report) => {
                    if report.due > 0 || report.expired > 0 {
                        info!(
                            due = report.due,
                            delivered = report.delivered,
                            no_subscription = report.no_subscription,
                            failed = report.failed,
                            expired = report.expired,
                            "sweep complete"
                        );
                    }
                }
                Err(err) => warn!(%err, "sweep failed; retrying next tick"),
            }
        }
    }
}
