//! TOML-based engine configuration.
//!
//! Stores operational settings:
//! - Sweep cadence and the optional unanswered-episode timeout
//! - Push delivery timeout and default notification title
//!
//! Configuration is stored at `~/.config/emapulse/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;

/// Sweep-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweep ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Auto-end episodes with no answer for this many seconds.
    /// Disabled when absent; declines always end an episode regardless.
    #[serde(default)]
    pub expire_after_secs: Option<i64>,
}

/// Push delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Per-request timeout against the push endpoint.
    #[serde(default = "default_push_timeout_secs")]
    pub timeout_secs: u64,
    /// Notification title when the label has no override.
    #[serde(default = "default_title")]
    pub default_title: String,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/emapulse/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub push: PushConfig,
}

// Default functions
fn default_interval_secs() -> u64 {
    60
}
fn default_push_timeout_secs() -> u64 {
    10
}
fn default_title() -> String {
    "Behavior Check".into()
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            expire_after_secs: None,
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_push_timeout_secs(),
            default_title: default_title(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep: SweepConfig::default(),
            push: PushConfig::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err("config key is empty".into());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| format!("unknown config key: {key}"))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| format!("unknown config key: {key}"))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(value.parse::<bool>()?),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(format!("cannot parse '{value}' as number").into());
                        }
                    }
                    serde_json::Value::Null => {
                        // Optional numeric field (expire_after_secs): "none"
                        // clears it, a number sets it.
                        if value == "none" {
                            serde_json::Value::Null
                        } else {
                            serde_json::Value::Number(value.parse::<i64>()?.into())
                        }
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| format!("unknown config key: {key}"))?;
        }

        Err(format!("unknown config key: {key}").into())
    }

    fn path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written to
    /// disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(Self::path()?, content)?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key.
    ///
    /// # Errors
    /// Returns an error if the key is unknown or the value cannot be
    /// parsed as the field's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json)?;
        self.save()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.sweep.interval_secs, 60);
        assert!(cfg.sweep.expire_after_secs.is_none());
        assert_eq!(cfg.push.timeout_secs, 10);
        assert_eq!(cfg.push.default_title, "Behavior Check");
    }

    #[test]
    fn toml_roundtrip_with_partial_file() {
        let cfg: Config = toml::from_str(
            "[sweep]\ninterval_secs = 30\n",
        )
        .unwrap();
        assert_eq!(cfg.sweep.interval_secs, 30);
        assert_eq!(cfg.push.timeout_secs, 10);

        let rendered = toml::to_string_pretty(&cfg).unwrap();
        let reparsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(reparsed.sweep.interval_secs, 30);
    }

    #[test]
    fn get_by_dotted_key() {
        let cfg = Config::default();
        assert_eq!(cfg.get("sweep.interval_secs").as_deref(), Some("60"));
        assert_eq!(cfg.get("push.default_title").as_deref(), Some("Behavior Check"));
        assert!(cfg.get("nope.nothing").is_none());
    }

    #[test]
    fn set_parses_field_types() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        Config::set_json_value_by_path(&mut json, "sweep.interval_secs", "120").unwrap();
        Config::set_json_value_by_path(&mut json, "sweep.expire_after_secs", "86400").unwrap();
        let cfg: Config = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.sweep.interval_secs, 120);
        assert_eq!(cfg.sweep.expire_after_secs, Some(86_400));
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        assert!(Config::set_json_value_by_path(&mut json, "sweep.bogus", "1").is_err());
    }
}
