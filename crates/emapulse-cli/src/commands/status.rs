use chrono::{DateTime, Duration, Utc};
use emapulse_core::{LabelKind, StateDb, UserState};
use serde::Serialize;

/// One active episode with its due-ness evaluated at request time.
#[derive(Serialize)]
struct EpisodeStatus {
    state: UserState,
    label_name: String,
    due: bool,
}

/// One journal row; decay labels carry the end of their relevance window.
#[derive(Serialize)]
struct JournalEntry {
    label_name: String,
    kind: LabelKind,
    logged_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    relevant_until: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct StatusReport {
    user_id: String,
    episodes: Vec<EpisodeStatus>,
    recent_logs: Vec<JournalEntry>,
}

/// Print a user's active episodes and recent journal. This is the polling
/// fallback when push delivery never reaches the device.
pub fn run(user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = StateDb::open()?;
    let now = Utc::now();

    let episodes = db
        .active_states(user)?
        .into_iter()
        .map(|row| EpisodeStatus {
            due: row.state.is_due(now),
            label_name: row.label.name,
            state: row.state,
        })
        .collect();

    let recent_logs = db
        .recent_logs(user, 20)?
        .into_iter()
        .map(|(log, label)| JournalEntry {
            label_name: label.name,
            kind: label.kind,
            logged_at: log.logged_at,
            relevant_until: label
                .decay_seconds
                .map(|secs| log.logged_at + Duration::seconds(secs)),
        })
        .collect();

    let report = StatusReport {
        user_id: user.to_string(),
        episodes,
        recent_logs,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
