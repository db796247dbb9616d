use chrono::Utc;
use emapulse_core::{StateDb, Tracker};

/// Journal one label press; for EMA labels this may begin an episode.
pub fn run(user: &str, label_ref: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = StateDb::open()?;
    let label = db
        .label_by_ref(label_ref)?
        .ok_or_else(|| format!("no label matching '{label_ref}'"))?;

    let outcome = Tracker::new(&db).log_label(user, &label, Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
