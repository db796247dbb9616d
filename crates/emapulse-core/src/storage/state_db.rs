//! SQLite-based storage for labels, logs, EMA states, and push
//! subscriptions.
//!
//! This is the single source of truth for scheduling decisions. All state
//! transitions go through atomic per-row UPDATEs guarded on `active`, and
//! the single-active-state invariant is a partial unique index rather than
//! a read-then-write check, so concurrent duplicate starts fail cleanly
//! with a conflict.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{data_dir, migrations};
use crate::error::StoreError;
use crate::label::{Label, LabelKind};
use crate::state::{PushSubscription, StateWithLabel, UserLog, UserState};

// === Helper Functions ===

/// Parse label kind from database string
fn parse_label_kind(kind_str: &str) -> LabelKind {
    LabelKind::parse(kind_str).unwrap_or(LabelKind::Event)
}

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_optional_datetime(dt_str: Option<String>) -> Option<DateTime<Utc>> {
    dt_str.map(|s| parse_datetime_fallback(&s))
}

/// Build a UserState from a row selected with `STATE_COLUMNS`.
fn row_to_state(row: &rusqlite::Row) -> Result<UserState, rusqlite::Error> {
    let started_at: String = row.get(5)?;
    let next_prompt_at: String = row.get(9)?;
    Ok(UserState {
        id: row.get(0)?,
        user_id: row.get(1)?,
        form_id: row.get(2)?,
        label_id: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
        started_at: parse_datetime_fallback(&started_at),
        last_confirmed_at: parse_optional_datetime(row.get(6)?),
        last_prompted_at: parse_optional_datetime(row.get(7)?),
        ended_at: parse_optional_datetime(row.get(8)?),
        next_prompt_at: parse_datetime_fallback(&next_prompt_at),
    })
}

/// Build a Label from a row whose label columns begin at `base`.
fn row_to_label(row: &rusqlite::Row, base: usize) -> Result<Label, rusqlite::Error> {
    let kind_str: String = row.get(base + 3)?;
    let created_at: String = row.get(base + 7)?;
    Ok(Label {
        id: row.get(base)?,
        form_id: row.get(base + 1)?,
        name: row.get(base + 2)?,
        kind: parse_label_kind(&kind_str),
        decay_seconds: row.get(base + 4)?,
        ema_interval_seconds: row.get(base + 5)?,
        prompt_text: row.get(base + 6)?,
        created_at: parse_datetime_fallback(&created_at),
    })
}

const STATE_COLUMNS: &str = "id, user_id, form_id, label_id, active, started_at, \
     last_confirmed_at, last_prompted_at, ended_at, next_prompt_at";

const JOINED_COLUMNS: &str = "s.id, s.user_id, s.form_id, s.label_id, s.active, s.started_at, \
     s.last_confirmed_at, s.last_prompted_at, s.ended_at, s.next_prompt_at, \
     l.id, l.form_id, l.name, l.kind, l.decay_seconds, l.ema_interval_seconds, \
     l.prompt_text, l.created_at";

fn row_to_state_with_label(row: &rusqlite::Row) -> Result<StateWithLabel, rusqlite::Error> {
    Ok(StateWithLabel {
        state: row_to_state(row)?,
        label: row_to_label(row, 10)?,
    })
}

/// SQLite database backing the re-prompt engine.
pub struct StateDb {
    conn: Connection,
}

impl StateDb {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/emapulse/emapulse.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("emapulse.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open the database at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS labels (
                id                   TEXT PRIMARY KEY,
                form_id              TEXT NOT NULL,
                name                 TEXT NOT NULL,
                kind                 TEXT NOT NULL,
                decay_seconds        INTEGER,
                ema_interval_seconds INTEGER,
                prompt_text          TEXT,
                created_at           TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_logs (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id   TEXT NOT NULL,
                form_id   TEXT NOT NULL,
                label_id  TEXT NOT NULL,
                logged_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_states (
                id                TEXT PRIMARY KEY,
                user_id           TEXT NOT NULL,
                form_id           TEXT NOT NULL,
                label_id          TEXT NOT NULL,
                active            INTEGER NOT NULL DEFAULT 1,
                started_at        TEXT NOT NULL,
                last_confirmed_at TEXT,
                ended_at          TEXT,
                next_prompt_at    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS subscriptions (
                user_id    TEXT PRIMARY KEY,
                endpoint   TEXT NOT NULL,
                keys       TEXT,
                updated_at TEXT NOT NULL
            );

            -- Create indexes for common query patterns
            CREATE INDEX IF NOT EXISTS idx_user_states_due ON user_states(active, next_prompt_at);
            CREATE INDEX IF NOT EXISTS idx_user_logs_user ON user_logs(user_id, logged_at);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_labels_name ON labels(form_id, name);",
        )?;

        // Run incremental migrations (v1 -> v2, etc.)
        migrations::migrate(&self.conn)?;

        // Single-active-state invariant: a second racing start for the same
        // (user, label) pair hits this constraint instead of inserting a
        // duplicate row.
        self.conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_user_states_active_unique
             ON user_states(user_id, label_id)
             WHERE active = 1",
            [],
        )?;

        Ok(())
    }

    // ── Label catalog ────────────────────────────────────────────────

    /// Insert or replace a label definition.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidLabel` if the definition violates the
    /// kind/parameter invariant.
    pub fn upsert_label(&self, label: &Label) -> Result<(), StoreError> {
        label.validate()?;
        self.conn.execute(
            "INSERT OR REPLACE INTO labels
                 (id, form_id, name, kind, decay_seconds, ema_interval_seconds, prompt_text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                label.id,
                label.form_id,
                label.name,
                label.kind.as_str(),
                label.decay_seconds,
                label.ema_interval_seconds,
                label.prompt_text,
                label.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up a label by id or, failing that, by name.
    pub fn label_by_ref(&self, label_ref: &str) -> Result<Option<Label>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, form_id, name, kind, decay_seconds, ema_interval_seconds, prompt_text, created_at
             FROM labels WHERE id = ?1 OR name = ?1 LIMIT 1",
        )?;
        let label = stmt
            .query_row(params![label_ref], |row| row_to_label(row, 0))
            .optional()?;
        Ok(label)
    }

    pub fn list_labels(&self) -> Result<Vec<Label>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, form_id, name, kind, decay_seconds, ema_interval_seconds, prompt_text, created_at
             FROM labels ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], |row| row_to_label(row, 0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Remove a label definition. Returns whether a row was deleted.
    pub fn remove_label(&self, label_id: &str) -> Result<bool, StoreError> {
        let n = self
            .conn
            .execute("DELETE FROM labels WHERE id = ?1", params![label_id])?;
        Ok(n > 0)
    }

    // ── Log journal ──────────────────────────────────────────────────

    /// Journal one label press.
    pub fn insert_log(
        &self,
        user_id: &str,
        form_id: &str,
        label_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserLog, StoreError> {
        self.conn.execute(
            "INSERT INTO user_logs (user_id, form_id, label_id, logged_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, form_id, label_id, now.to_rfc3339()],
        )?;
        Ok(UserLog {
            id: self.conn.last_insert_rowid(),
            user_id: user_id.to_string(),
            form_id: form_id.to_string(),
            label_id: label_id.to_string(),
            logged_at: now,
        })
    }

    /// Most recent log rows for a user, newest first, joined with their
    /// labels.
    pub fn recent_logs(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<(UserLog, Label)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT g.id, g.user_id, g.form_id, g.label_id, g.logged_at,
                    l.id, l.form_id, l.name, l.kind, l.decay_seconds,
                    l.ema_interval_seconds, l.prompt_text, l.created_at
             FROM user_logs g
             JOIN labels l ON l.id = g.label_id
             WHERE g.user_id = ?1
             ORDER BY g.logged_at DESC, g.id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            let logged_at: String = row.get(4)?;
            let log = UserLog {
                id: row.get(0)?,
                user_id: row.get(1)?,
                form_id: row.get(2)?,
                label_id: row.get(3)?,
                logged_at: parse_datetime_fallback(&logged_at),
            };
            Ok((log, row_to_label(row, 5)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ── EMA states ───────────────────────────────────────────────────

    /// The single active state for a (user, label) pair, if any.
    pub fn find_active(
        &self,
        user_id: &str,
        label_id: &str,
    ) -> Result<Option<UserState>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STATE_COLUMNS} FROM user_states
             WHERE user_id = ?1 AND label_id = ?2 AND active = 1"
        ))?;
        let state = stmt
            .query_row(params![user_id, label_id], row_to_state)
            .optional()?;
        Ok(state)
    }

    /// Fetch a state by id regardless of lifecycle position.
    pub fn get_state(&self, state_id: &str) -> Result<Option<UserState>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {STATE_COLUMNS} FROM user_states WHERE id = ?1"))?;
        let state = stmt.query_row(params![state_id], row_to_state).optional()?;
        Ok(state)
    }

    /// Begin a new episode with `next_prompt_at = now + interval`.
    ///
    /// # Errors
    /// Returns `StoreError::Conflict` if an active state already exists for
    /// the pair; a concurrent duplicate start loses the race on the
    /// uniqueness constraint rather than inserting a second row.
    pub fn start(
        &self,
        user_id: &str,
        form_id: &str,
        label_id: &str,
        interval_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<UserState, StoreError> {
        let id = Uuid::new_v4().to_string();
        let next_prompt_at = now + Duration::seconds(interval_seconds);
        let result = self.conn.execute(
            "INSERT INTO user_states (id, user_id, form_id, label_id, active, started_at, next_prompt_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
            params![
                id,
                user_id,
                form_id,
                label_id,
                now.to_rfc3339(),
                next_prompt_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => self
                .get_state(&id)?
                .ok_or(StoreError::NotFound { state_id: id }),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict {
                    user_id: user_id.to_string(),
                    label_id: label_id.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record a "yes" answer: `last_confirmed_at = now`, deadline advanced
    /// by one interval.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if the id does not resolve to an
    /// active state (stale update).
    pub fn confirm(
        &self,
        state_id: &str,
        interval_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<UserState, StoreError> {
        let next_prompt_at = now + Duration::seconds(interval_seconds);
        let updated = self.conn.execute(
            "UPDATE user_states SET last_confirmed_at = ?2, next_prompt_at = ?3
             WHERE id = ?1 AND active = 1",
            params![state_id, now.to_rfc3339(), next_prompt_at.to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                state_id: state_id.to_string(),
            });
        }
        self.get_state(state_id)?.ok_or(StoreError::NotFound {
            state_id: state_id.to_string(),
        })
    }

    /// End an episode: `active = false`, `ended_at = now`. Terminal.
    ///
    /// Ending an already-ended state is a no-op success (tolerates duplicate
    /// timeout/response delivery).
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` only if the id is entirely unknown.
    pub fn end(&self, state_id: &str, now: DateTime<Utc>) -> Result<UserState, StoreError> {
        self.conn.execute(
            "UPDATE user_states SET active = 0, ended_at = ?2
             WHERE id = ?1 AND active = 1",
            params![state_id, now.to_rfc3339()],
        )?;
        self.get_state(state_id)?.ok_or(StoreError::NotFound {
            state_id: state_id.to_string(),
        })
    }

    /// All active states whose deadline has elapsed, joined with their
    /// labels.
    ///
    /// A finite snapshot: each qualifying row appears exactly once per
    /// call, with no ordering guarantee.
    pub fn due_states(&self, as_of: DateTime<Utc>) -> Result<Vec<StateWithLabel>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {JOINED_COLUMNS}
             FROM user_states s
             JOIN labels l ON l.id = s.label_id
             WHERE s.active = 1 AND s.next_prompt_at <= ?1"
        ))?;
        let rows = stmt.query_map(params![as_of.to_rfc3339()], row_to_state_with_label)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All active states for one user, joined with their labels. Backs the
    /// client polling path when push never arrives.
    pub fn active_states(&self, user_id: &str) -> Result<Vec<StateWithLabel>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {JOINED_COLUMNS}
             FROM user_states s
             JOIN labels l ON l.id = s.label_id
             WHERE s.user_id = ?1 AND s.active = 1
             ORDER BY s.started_at"
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_state_with_label)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Active states with no answer since `cutoff` (falling back to
    /// `started_at` for never-confirmed episodes). Input to the optional
    /// timeout policy.
    pub fn stale_states(&self, cutoff: DateTime<Utc>) -> Result<Vec<UserState>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STATE_COLUMNS} FROM user_states
             WHERE active = 1 AND COALESCE(last_confirmed_at, started_at) <= ?1"
        ))?;
        let rows = stmt.query_map(params![cutoff.to_rfc3339()], row_to_state)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Stamp a delivery attempt. Touches `last_prompted_at` only; the
    /// deadline and lifecycle flags are left alone, so the state stays due
    /// until the user answers.
    pub fn stamp_prompted(&self, state_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE user_states SET last_prompted_at = ?2 WHERE id = ?1",
            params![state_id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    // ── Push subscriptions ───────────────────────────────────────────

    /// Register the user's push endpoint. Last write wins.
    pub fn set_subscription(
        &self,
        user_id: &str,
        endpoint: &str,
        keys: Option<&serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let keys_json = keys.map(|k| k.to_string());
        self.conn.execute(
            "INSERT OR REPLACE INTO subscriptions (user_id, endpoint, keys, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, endpoint, keys_json, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// The user's current push endpoint, if registered.
    pub fn find_subscription(&self, user_id: &str) -> Result<Option<PushSubscription>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, endpoint, keys, updated_at FROM subscriptions WHERE user_id = ?1",
        )?;
        let sub = stmt
            .query_row(params![user_id], |row| {
                let keys: Option<String> = row.get(2)?;
                let updated_at: String = row.get(3)?;
                Ok(PushSubscription {
                    user_id: row.get(0)?,
                    endpoint: row.get(1)?,
                    keys: keys.and_then(|k| serde_json::from_str(&k).ok()),
                    updated_at: parse_datetime_fallback(&updated_at),
                })
            })
            .optional()?;
        Ok(sub)
    }

    /// Drop the user's push endpoint. Returns whether one existed.
    pub fn remove_subscription(&self, user_id: &str) -> Result<bool, StoreError> {
        let n = self.conn.execute(
            "DELETE FROM subscriptions WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(n > 0)
    }
}
