//! Engine data model: EMA episodes and the work units derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::label::Label;

/// One EMA episode for a (user, label) pair.
///
/// At most one row per pair is active at any time; the store enforces this
/// with a partial unique index. Ended rows are kept for history and are
/// immutable from the engine's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserState {
    pub id: String,
    pub user_id: String,
    pub form_id: String,
    pub label_id: String,
    pub active: bool,
    pub started_at: DateTime<Utc>,
    pub last_confirmed_at: Option<DateTime<Utc>>,
    /// Stamped by the sweep after each delivery attempt. Never consulted
    /// for scheduling decisions.
    pub last_prompted_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Scheduling deadline; the sweep picks the row up once this elapses.
    pub next_prompt_at: DateTime<Utc>,
}

impl UserState {
    /// Whether the state's deadline has elapsed.
    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        self.active && self.next_prompt_at <= as_of
    }
}

/// A state row joined with its label definition.
#[derive(Debug, Clone, Serialize)]
pub struct StateWithLabel {
    pub state: UserState,
    pub label: Label,
}

/// Unit of work handed from the sweep to the notifier. Ephemeral, never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct PromptRequest {
    pub user_id: String,
    pub state_id: String,
    pub label_id: String,
    pub label_name: String,
    pub prompt_text: Option<String>,
}

impl From<&StateWithLabel> for PromptRequest {
    fn from(row: &StateWithLabel) -> Self {
        Self {
            user_id: row.state.user_id.clone(),
            state_id: row.state.id.clone(),
            label_id: row.label.id.clone(),
            label_name: row.label.name.clone(),
            prompt_text: row.label.prompt_text.clone(),
        }
    }
}

/// Registered push endpoint for a user.
///
/// Opaque to the engine beyond "hand to the notifier". One current
/// subscription per user; a re-registration overwrites the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub user_id: String,
    pub endpoint: String,
    /// Transport keys exactly as the client provided them, passed through
    /// to the push sink untouched.
    pub keys: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

/// A user's answer to a delivered prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmaAnswer {
    Yes,
    No,
}

impl EmaAnswer {
    /// Parse a user-supplied answer string ("yes"/"no").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "yes" | "y" => Some(EmaAnswer::Yes),
            "no" | "n" => Some(EmaAnswer::No),
            _ => None,
        }
    }
}

/// One journal row per label press, regardless of kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLog {
    pub id: i64,
    pub user_id: String,
    pub form_id: String,
    pub label_id: String,
    pub logged_at: DateTime<Utc>,
}
