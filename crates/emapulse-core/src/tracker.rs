//! Client-facing operations: label logging and prompt responses.
//!
//! Each EMA episode is a small state machine driven entirely by persisted
//! rows:
//!
//! ```text
//! [none] --log(ema label)--> ACTIVE (next_prompt_at = now + interval)
//! ACTIVE --respond yes-----> ACTIVE (deadline advanced by one interval)
//! ACTIVE --respond no------> ENDED                           [terminal]
//! ACTIVE --timeout policy--> ENDED                           [terminal]
//! ```
//!
//! Stale answers (the episode already ended or was reconfirmed) resolve to
//! a success-level no-op: the user's intent was already satisfied by an
//! earlier answer, so there is nothing to surface.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::label::{Label, LabelKind};
use crate::state::{EmaAnswer, UserLog, UserState};
use crate::storage::StateDb;

/// Result of journaling one label press.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LogOutcome {
    /// Non-EMA label: journaled, nothing to track.
    Logged { log: UserLog },
    /// First EMA press for the pair: a new episode begins.
    Started { log: UserLog, state: UserState },
    /// EMA press while an episode is already running for the pair.
    AlreadyActive { log: UserLog, state: UserState },
}

/// Result of answering a prompt.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RespondOutcome {
    /// "Yes" on a live episode: deadline advanced by one interval.
    Confirmed { state: UserState },
    /// "No" on a live episode: terminal, no further prompts.
    Ended { state: UserState },
    /// The episode was already ended or never existed; the answer is moot.
    AlreadySettled { state_id: String },
}

/// Drives the per-episode state machine against the store.
pub struct Tracker<'a> {
    db: &'a StateDb,
}

impl<'a> Tracker<'a> {
    pub fn new(db: &'a StateDb) -> Self {
        Self { db }
    }

    /// Journal a label press; for EMA labels, begin an episode when none is
    /// running.
    ///
    /// A concurrent duplicate start loses the store's uniqueness race and
    /// is reported as `AlreadyActive` rather than an error -- the pair is
    /// being tracked either way.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidLabel` if an EMA label is missing its
    /// interval, or the store's own failures.
    pub fn log_label(
        &self,
        user_id: &str,
        label: &Label,
        now: DateTime<Utc>,
    ) -> Result<LogOutcome, StoreError> {
        let log = self.db.insert_log(user_id, &label.form_id, &label.id, now)?;

        if label.kind != LabelKind::Ema {
            return Ok(LogOutcome::Logged { log });
        }

        let interval = label
            .ema_interval_seconds
            .ok_or_else(|| StoreError::InvalidLabel {
                name: label.name.clone(),
                message: "ema labels require ema_interval_seconds".into(),
            })?;

        if let Some(state) = self.db.find_active(user_id, &label.id)? {
            return Ok(LogOutcome::AlreadyActive { log, state });
        }

        match self.db.start(user_id, &label.form_id, &label.id, interval, now) {
            Ok(state) => Ok(LogOutcome::Started { log, state }),
            Err(StoreError::Conflict { .. }) => {
                let state =
                    self.db
                        .find_active(user_id, &label.id)?
                        .ok_or(StoreError::NotFound {
                            state_id: label.id.clone(),
                        })?;
                Ok(LogOutcome::AlreadyActive { log, state })
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a user's answer to a delivered prompt.
    ///
    /// # Errors
    /// Only genuine store failures propagate; stale or duplicate answers
    /// resolve to `AlreadySettled`.
    pub fn respond(
        &self,
        state_id: &str,
        answer: EmaAnswer,
        now: DateTime<Utc>,
    ) -> Result<RespondOutcome, StoreError> {
        let settled = || RespondOutcome::AlreadySettled {
            state_id: state_id.to_string(),
        };

        let Some(state) = self.db.get_state(state_id)? else {
            return Ok(settled());
        };
        if !state.active {
            return Ok(settled());
        }

        match answer {
            EmaAnswer::Yes => {
                let label =
                    self.db
                        .label_by_ref(&state.label_id)?
                        .ok_or(StoreError::UnknownLabel(state.label_id.clone()))?;
                let interval =
                    label
                        .ema_interval_seconds
                        .ok_or_else(|| StoreError::InvalidLabel {
                            name: label.name.clone(),
                            message: "ema labels require ema_interval_seconds".into(),
                        })?;
                match self.db.confirm(state_id, interval, now) {
                    Ok(state) => Ok(RespondOutcome::Confirmed { state }),
                    // Lost a race with another answer; already handled.
                    Err(StoreError::NotFound { .. }) => Ok(settled()),
                    Err(e) => Err(e),
                }
            }
            EmaAnswer::No => match self.db.end(state_id, now) {
                Ok(state) => Ok(RespondOutcome::Ended { state }),
                Err(StoreError::NotFound { .. }) => Ok(settled()),
                Err(e) => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn db_with_labels() -> StateDb {
        let db = StateDb::open_memory().unwrap();
        for (id, kind, decay, interval) in [
            ("ev", LabelKind::Event, None, None),
            ("dc", LabelKind::Decay, Some(900), None),
            ("em", LabelKind::Ema, None, Some(300)),
        ] {
            db.upsert_label(&Label {
                id: id.into(),
                form_id: "form-1".into(),
                name: format!("{id}-label"),
                kind,
                decay_seconds: decay,
                ema_interval_seconds: interval,
                prompt_text: None,
                created_at: t(0),
            })
            .unwrap();
        }
        db
    }

    #[test]
    fn event_and_decay_labels_only_journal() {
        let db = db_with_labels();
        let tracker = Tracker::new(&db);
        for id in ["ev", "dc"] {
            let label = db.label_by_ref(id).unwrap().unwrap();
            let outcome = tracker.log_label("u1", &label, t(0)).unwrap();
            assert!(matches!(outcome, LogOutcome::Logged { .. }));
            assert!(db.find_active("u1", id).unwrap().is_none());
        }
        assert_eq!(db.recent_logs("u1", 10).unwrap().len(), 2);
    }

    #[test]
    fn first_ema_press_starts_an_episode() {
        let db = db_with_labels();
        let tracker = Tracker::new(&db);
        let label = db.label_by_ref("em").unwrap().unwrap();

        let outcome = tracker.log_label("u1", &label, t(0)).unwrap();
        let LogOutcome::Started { state, .. } = outcome else {
            panic!("expected Started");
        };
        assert!(state.active);
        assert_eq!(state.next_prompt_at, t(300));
    }

    #[test]
    fn second_ema_press_reports_already_active() {
        let db = db_with_labels();
        let tracker = Tracker::new(&db);
        let label = db.label_by_ref("em").unwrap().unwrap();

        tracker.log_label("u1", &label, t(0)).unwrap();
        let outcome = tracker.log_label("u1", &label, t(10)).unwrap();
        let LogOutcome::AlreadyActive { state, .. } = outcome else {
            panic!("expected AlreadyActive");
        };
        // The original deadline is untouched by the duplicate press.
        assert_eq!(state.next_prompt_at, t(300));
        // Both presses are journaled regardless.
        assert_eq!(db.recent_logs("u1", 10).unwrap().len(), 2);
    }

    #[test]
    fn yes_reschedules_no_ends() {
        let db = db_with_labels();
        let tracker = Tracker::new(&db);
        let label = db.label_by_ref("em").unwrap().unwrap();

        let LogOutcome::Started { state, .. } = tracker.log_label("u1", &label, t(0)).unwrap()
        else {
            panic!("expected Started");
        };

        let RespondOutcome::Confirmed { state: confirmed } =
            tracker.respond(&state.id, EmaAnswer::Yes, t(320)).unwrap()
        else {
            panic!("expected Confirmed");
        };
        assert_eq!(confirmed.next_prompt_at, t(620));
        assert_eq!(confirmed.last_confirmed_at, Some(t(320)));

        let RespondOutcome::Ended { state: ended } =
            tracker.respond(&state.id, EmaAnswer::No, t(700)).unwrap()
        else {
            panic!("expected Ended");
        };
        assert!(!ended.active);
        assert_eq!(ended.ended_at, Some(t(700)));
    }

    #[test]
    fn stale_answers_are_no_ops() {
        let db = db_with_labels();
        let tracker = Tracker::new(&db);
        let label = db.label_by_ref("em").unwrap().unwrap();

        let LogOutcome::Started { state, .. } = tracker.log_label("u1", &label, t(0)).unwrap()
        else {
            panic!("expected Started");
        };
        tracker.respond(&state.id, EmaAnswer::No, t(100)).unwrap();

        // Duplicate decline, late confirm, unknown id: all settle quietly.
        for answer in [EmaAnswer::No, EmaAnswer::Yes] {
            let outcome = tracker.respond(&state.id, answer, t(200)).unwrap();
            assert!(matches!(outcome, RespondOutcome::AlreadySettled { .. }));
        }
        let outcome = tracker
            .respond("never-existed", EmaAnswer::Yes, t(200))
            .unwrap();
        assert!(matches!(outcome, RespondOutcome::AlreadySettled { .. }));

        // The terminal row is untouched by the late answers.
        let row = db.get_state(&state.id).unwrap().unwrap();
        assert!(!row.active);
        assert_eq!(row.ended_at, Some(t(100)));
    }

    #[test]
    fn decline_then_new_press_starts_fresh_episode() {
        let db = db_with_labels();
        let tracker = Tracker::new(&db);
        let label = db.label_by_ref("em").unwrap().unwrap();

        let LogOutcome::Started { state: first, .. } =
            tracker.log_label("u1", &label, t(0)).unwrap()
        else {
            panic!("expected Started");
        };
        tracker.respond(&first.id, EmaAnswer::No, t(100)).unwrap();

        let LogOutcome::Started { state: second, .. } =
            tracker.log_label("u1", &label, t(500)).unwrap()
        else {
            panic!("expected a fresh episode");
        };
        assert_ne!(first.id, second.id);
        assert_eq!(second.next_prompt_at, t(800));
    }
}
