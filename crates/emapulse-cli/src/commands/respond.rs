use chrono::Utc;
use emapulse_core::{EmaAnswer, StateDb, Tracker};

/// Apply a yes/no answer to a delivered prompt. Stale answers print an
/// `already_settled` outcome rather than failing.
pub fn run(state_id: &str, answer: &str) -> Result<(), Box<dyn std::error::Error>> {
    let answer = EmaAnswer::parse(answer)
        .ok_or_else(|| format!("unknown answer '{answer}' (expected yes or no)"))?;

    let db = StateDb::open()?;
    let outcome = Tracker::new(&db).respond(state_id, answer, Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
