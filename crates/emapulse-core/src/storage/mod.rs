mod config;
pub mod migrations;
pub mod state_db;

pub use config::{Config, PushConfig, SweepConfig};
pub use state_db::StateDb;

use std::path::PathBuf;

/// Returns `~/.config/emapulse[-dev]/` based on EMAPULSE_ENV.
///
/// Set EMAPULSE_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("EMAPULSE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("emapulse-dev")
    } else {
        base_dir.join("emapulse")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
