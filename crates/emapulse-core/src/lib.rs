//! # Emapulse Core Library
//!
//! This library implements the re-prompt engine behind emapulse, a tracker
//! for user-reported behavioral/emotional labels. When a user logs a
//! "state"-type label, the engine opens an episode and periodically asks
//! "are you still in this state?" over a push endpoint, rescheduling on
//! each confirmation and ending terminally on a decline or timeout. The
//! surrounding product surface (auth, form/label editors, dashboards) lives
//! elsewhere; this crate is the scheduling core those layers call into.
//!
//! ## Architecture
//!
//! - **State Store**: SQLite-backed single source of truth for episode
//!   lifecycles; the single-active-episode invariant is a uniqueness
//!   constraint, not a check-then-act read
//! - **Sweep**: a periodic scan over persisted deadlines -- no client timer
//!   has to stay alive for re-prompts to fire
//! - **Push**: delivery boundary posting notification payloads to each
//!   user's registered endpoint; failures are logged and retried next tick
//! - **Tracker**: the client-facing state machine for label presses and
//!   yes/no answers
//!
//! ## Key Components
//!
//! - [`StateDb`]: episode, label, journal, and subscription persistence
//! - [`Sweeper`]: the deadline sweep loop
//! - [`Notifier`]: payload construction and sink dispatch
//! - [`Tracker`]: `log_label` / `respond` operations

pub mod error;
pub mod label;
pub mod push;
pub mod state;
pub mod storage;
pub mod sweep;
pub mod tracker;

pub use error::{ConfigError, CoreError, DeliveryError, StoreError};
pub use label::{Label, LabelKind};
pub use push::{Delivered, NotificationPayload, Notifier, PushSink, WebPushSink};
pub use state::{EmaAnswer, PromptRequest, PushSubscription, StateWithLabel, UserLog, UserState};
pub use storage::{Config, PushConfig, StateDb, SweepConfig};
pub use sweep::{SweepReport, Sweeper};
pub use tracker::{LogOutcome, RespondOutcome, Tracker};
