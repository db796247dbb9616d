//! Label catalog model.
//!
//! Label definitions are owned by the external CRUD layer; the engine
//! consumes them read-only. The one invariant enforced here is that the
//! kind-specific parameter is present exactly when the kind requires it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    /// One-shot occurrence: journaled and done.
    Event,
    /// Occurrence that stays relevant for a fixed window after logging.
    Decay,
    /// Ongoing state re-confirmed on an interval until the user declines.
    Ema,
}

impl LabelKind {
    /// Parse a user-supplied kind string ("event", "decay", "ema").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "event" => Some(LabelKind::Event),
            "decay" => Some(LabelKind::Decay),
            "ema" => Some(LabelKind::Ema),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKind::Event => "event",
            LabelKind::Decay => "decay",
            LabelKind::Ema => "ema",
        }
    }
}

/// One catalog entry. Labels belong to a form owned by the external
/// form editor; `form_id` is carried as an opaque reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub form_id: String,
    pub name: String,
    pub kind: LabelKind,
    /// Seconds a logged occurrence stays relevant. Required iff kind is `Decay`.
    pub decay_seconds: Option<i64>,
    /// Re-prompt interval in seconds. Required iff kind is `Ema`.
    pub ema_interval_seconds: Option<i64>,
    /// Overrides the default prompt body for this label.
    pub prompt_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Label {
    /// Check the kind/parameter invariant.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidLabel` when the kind-specific parameter
    /// is missing, non-positive, or present for the wrong kind.
    pub fn validate(&self) -> Result<(), StoreError> {
        let invalid = |message: &str| StoreError::InvalidLabel {
            name: self.name.clone(),
            message: message.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }

        match self.kind {
            LabelKind::Event => {
                if self.decay_seconds.is_some() || self.ema_interval_seconds.is_some() {
                    return Err(invalid("event labels take no timing parameters"));
                }
            }
            LabelKind::Decay => {
                match self.decay_seconds {
                    Some(s) if s > 0 => {}
                    Some(_) => return Err(invalid("decay_seconds must be positive")),
                    None => return Err(invalid("decay labels require decay_seconds")),
                }
                if self.ema_interval_seconds.is_some() {
                    return Err(invalid("decay labels take no ema_interval_seconds"));
                }
            }
            LabelKind::Ema => {
                match self.ema_interval_seconds {
                    Some(s) if s > 0 => {}
                    Some(_) => return Err(invalid("ema_interval_seconds must be positive")),
                    None => return Err(invalid("ema labels require ema_interval_seconds")),
                }
                if self.decay_seconds.is_some() {
                    return Err(invalid("ema labels take no decay_seconds"));
                }
            }
        }
        Ok(())
    }
}
