use chrono::Utc;
use clap::Subcommand;
use emapulse_core::StateDb;

#[derive(Subcommand)]
pub enum SubscribeAction {
    /// Register (or replace) a user's push endpoint
    Set {
        /// Push endpoint URL
        endpoint: String,
        /// Owning user id
        #[arg(long)]
        user: String,
        /// Transport keys as a JSON object, passed through to the sink
        #[arg(long)]
        keys: Option<String>,
    },
    /// Show a user's current subscription
    Show {
        #[arg(long)]
        user: String,
    },
    /// Remove a user's subscription
    Remove {
        #[arg(long)]
        user: String,
    },
}

pub fn run(action: SubscribeAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = StateDb::open()?;

    match action {
        SubscribeAction::Set {
            endpoint,
            user,
            keys,
        } => {
            let keys = keys
                .map(|raw| serde_json::from_str::<serde_json::Value>(&raw))
                .transpose()
                .map_err(|e| format!("--keys must be a JSON object: {e}"))?;
            db.set_subscription(&user, &endpoint, keys.as_ref(), Utc::now())?;
            let sub = db.find_subscription(&user)?;
            println!("{}", serde_json::to_string_pretty(&sub)?);
        }
        SubscribeAction::Show { user } => {
            let sub = db.find_subscription(&user)?;
            println!("{}", serde_json::to_string_pretty(&sub)?);
        }
        SubscribeAction::Remove { user } => {
            if db.remove_subscription(&user)? {
                println!("removed subscription for {user}");
            } else {
                println!("no subscription for {user}");
            }
        }
    }
    Ok(())
}
