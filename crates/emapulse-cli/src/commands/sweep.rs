use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use emapulse_core::{Config, Notifier, StateDb, Sweeper, WebPushSink};

#[derive(Subcommand)]
pub enum SweepAction {
    /// Run exactly one sweep tick and print the report
    Once,
    /// Run the sweep loop until interrupted
    Run {
        /// Override the configured cadence (seconds)
        #[arg(long)]
        interval: Option<u64>,
    },
}

fn build_sweeper(config: &Config, interval: Option<u64>) -> Result<Sweeper, Box<dyn std::error::Error>> {
    let db = StateDb::open()?;
    let notifier = Notifier::new(
        Arc::new(WebPushSink::new(config.push.timeout_secs)),
        config.push.default_title.clone(),
    );
    let mut sweep_config = config.sweep.clone();
    if let Some(secs) = interval {
        sweep_config.interval_secs = secs;
    }
    Ok(Sweeper::new(db, notifier, sweep_config))
}

pub fn run(action: SweepAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let rt = tokio::runtime::Runtime::new()?;

    match action {
        SweepAction::Once => {
            let sweeper = build_sweeper(&config, None)?;
            let report = rt.block_on(sweeper.run_once(Utc::now()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        SweepAction::Run { interval } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .init();
            let sweeper = build_sweeper(&config, interval)?;
            rt.block_on(sweeper.run())?;
        }
    }
    Ok(())
}
