use chrono::Utc;
use clap::Subcommand;
use emapulse_core::{Label, LabelKind, StateDb};

#[derive(Subcommand)]
pub enum LabelAction {
    /// Add a label definition to the catalog
    Add {
        /// Label name shown in prompts
        name: String,
        /// Owning form id
        #[arg(long)]
        form: String,
        /// Label kind: event, decay, or ema
        #[arg(long)]
        kind: String,
        /// Relevance window for decay labels (seconds)
        #[arg(long)]
        decay_secs: Option<i64>,
        /// Re-prompt interval for ema labels (seconds)
        #[arg(long)]
        interval_secs: Option<i64>,
        /// Custom prompt body override
        #[arg(long)]
        prompt: Option<String>,
    },
    /// List the label catalog
    List,
    /// Remove a label by id or name
    Remove {
        /// Label id or name
        label: String,
    },
}

pub fn run(action: LabelAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = StateDb::open()?;

    match action {
        LabelAction::Add {
            name,
            form,
            kind,
            decay_secs,
            interval_secs,
            prompt,
        } => {
            let kind = LabelKind::parse(&kind)
                .ok_or_else(|| format!("unknown label kind '{kind}' (expected event, decay, or ema)"))?;
            let label = Label {
                id: uuid::Uuid::new_v4().to_string(),
                form_id: form,
                name,
                kind,
                decay_seconds: decay_secs,
                ema_interval_seconds: interval_secs,
                prompt_text: prompt,
                created_at: Utc::now(),
            };
            db.upsert_label(&label)?;
            println!("{}", serde_json::to_string_pretty(&label)?);
        }
        LabelAction::List => {
            let labels = db.list_labels()?;
            println!("{}", serde_json::to_string_pretty(&labels)?);
        }
        LabelAction::Remove { label } => {
            let found = db
                .label_by_ref(&label)?
                .ok_or_else(|| format!("no label matching '{label}'"))?;
            db.remove_label(&found.id)?;
            println!("removed {}", found.id);
        }
    }
    Ok(())
}
