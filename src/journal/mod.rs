//! Per-container history of repair actions.
//!
//! The journal answers the windowed questions the heal task asks ("how many
//! restarts in the current frame?") and keeps at most `max_historic_entries`
//! events per container. Every operation goes through one connection behind
//! one mutex, so concurrent workers and the status server never interleave.

pub mod event;
pub mod summary;

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::clock::Clock;
use crate::container::Container;
use event::{format_date, parse_date, EventType, JournalEvent};
use summary::{is_constantly_failing, EventEntry, FailingContainer, Summary};

/// `db_path` value that keeps the journal in memory only.
pub const EPHEMERAL_DB_PATH: &str = ":memory:";

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, JournalError>;

#[derive(Debug)]
pub struct Journal {
    conn: Mutex<Connection>,
    max_historic_entries: u64,
    clock: Arc<dyn Clock>,
}

impl Journal {
    pub fn open(db_path: &str, max_historic_entries: u64, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = if db_path == EPHEMERAL_DB_PATH {
            Connection::open_in_memory()?
        } else {
            log::info!("Persisting the journal at {db_path}");
            Connection::open(db_path)?
        };

        migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            max_historic_entries,
            clock,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("Poisoned journal mutex")
    }

    /// Restarts not older than `frame_seconds`, ignoring archived frames.
    pub fn count_restarts_in_window(&self, container_name: &str, frame_seconds: u64) -> Result<u64> {
        let since = window_start(self.clock.now(), frame_seconds);
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(id) FROM journal
             WHERE container_name = ?1 AND event_type = ?2 AND event_date >= ?3
               AND COALESCE(archived, 0) = 0",
            params![container_name, EventType::Restart, since],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Whether a frame reset was recorded within the last two frames.
    pub fn reached_max_in_previous_window(
        &self,
        container_name: &str,
        frame_seconds: u64,
    ) -> Result<bool> {
        let since = window_start(self.clock.now(), frame_seconds.saturating_mul(2));
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(id) FROM journal
             WHERE container_name = ?1 AND event_type = ?2 AND event_date >= ?3",
            params![container_name, EventType::MaxRestartsReached, since],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Restarts since the history was last cleared. Kept apart from the
    /// events, so retention never lowers it.
    pub fn total_restarts(&self, container_name: &str) -> Result<u64> {
        let total: Option<i64> = self
            .conn()
            .query_row(
                "SELECT total FROM restart_totals WHERE container_name = ?1",
                params![container_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(total.unwrap_or_default() as u64)
    }

    pub fn last_restart_time(&self, container_name: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn();
        let date: Option<String> = conn
            .query_row(
                "SELECT event_date FROM journal
                 WHERE container_name = ?1 AND event_type = ?2
                 ORDER BY id DESC LIMIT 1",
                params![container_name, EventType::Restart],
                |row| row.get(0),
            )
            .optional()?;

        match date {
            Some(date) => Ok(Some(parse_date(&date).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })?)),
            None => Ok(None),
        }
    }

    pub fn is_marked_do_not_touch(&self, container_name: &str) -> Result<bool> {
        Ok(count_events(&self.conn(), container_name, EventType::DoNotTouch)? > 0)
    }

    pub fn clear_history(&self, container_name: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM journal WHERE container_name = ?1",
            params![container_name],
        )?;
        conn.execute(
            "DELETE FROM restart_totals WHERE container_name = ?1",
            params![container_name],
        )?;
        Ok(())
    }

    pub fn record_event(&self, container_name: &str, event_type: EventType, message: &str) -> Result<()> {
        let conn = self.conn();
        self.insert_event(&conn, container_name, event_type, message)
    }

    pub fn record_restart(&self, container_name: &str) -> Result<()> {
        self.record_event(container_name, EventType::Restart, "Container was restarted")
    }

    /// Returns `true` only when the container was marked just now.
    pub fn record_do_not_touch(&self, container_name: &str) -> Result<bool> {
        let conn = self.conn();
        if count_events(&conn, container_name, EventType::DoNotTouch)? > 0 {
            return Ok(false);
        }

        self.insert_event(
            &conn,
            container_name,
            EventType::DoNotTouch,
            "Maximum restarts reached, not touching anymore",
        )?;
        Ok(true)
    }

    /// Closes the current frame: everything recorded so far is archived and a
    /// frame reset event starts the next one.
    pub fn record_give_up_wait_and_archive(&self, container_name: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE journal SET archived = 1 WHERE container_name = ?1",
            params![container_name],
        )?;
        self.insert_event(
            &conn,
            container_name,
            EventType::MaxRestartsReached,
            "Starting next frame after max restarts reached and wait time",
        )
    }

    /// Events of one container, oldest first.
    pub fn events(&self, container_name: &str) -> Result<Vec<JournalEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, container_name, event_type, event_date, message, COALESCE(archived, 0)
             FROM journal WHERE container_name = ?1 ORDER BY id ASC",
        )?;

        let events = stmt
            .query_map(params![container_name], |row| {
                let date: String = row.get(3)?;
                let timestamp = parse_date(&date).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(JournalEvent {
                    id: row.get(0)?,
                    container_name: row.get(1)?,
                    event_type: row.get(2)?,
                    timestamp,
                    message: row.get(4)?,
                    archived: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }

    /// Status overview: the newest `event_limit` events of all containers and
    /// the containers that keep failing across frames.
    pub fn summary(&self, containers: &[Container], event_limit: usize) -> Result<Summary> {
        let now = self.clock.now();
        let conn = self.conn();

        let mut failing = Vec::new();
        for container in containers {
            let policy = container.policy();
            if policy.max_restarts_in_frame == 0 {
                continue;
            }

            let restarts_in_frame: i64 = conn.query_row(
                "SELECT COUNT(id) FROM journal
                 WHERE container_name = ?1 AND event_type = ?2 AND event_date >= ?3
                   AND COALESCE(archived, 0) = 0",
                params![
                    container.name(),
                    EventType::Restart,
                    window_start(now, policy.frame_size_in_seconds)
                ],
                |row| row.get(0),
            )?;
            let resets: i64 = conn.query_row(
                "SELECT COUNT(id) FROM journal
                 WHERE container_name = ?1 AND event_type = ?2 AND event_date >= ?3",
                params![
                    container.name(),
                    EventType::MaxRestartsReached,
                    window_start(now, policy.frame_size_in_seconds.saturating_mul(2))
                ],
                |row| row.get(0),
            )?;

            let restarts_in_frame = restarts_in_frame as u64;
            let reached_max = resets > 0;
            if is_constantly_failing(policy.max_restarts_in_frame, restarts_in_frame, reached_max) {
                failing.push(FailingContainer::new(
                    container.name(),
                    restarts_in_frame,
                    reached_max,
                ));
            }
        }

        let mut stmt = conn.prepare(
            "SELECT message, container_name, event_date, id
             FROM journal ORDER BY id DESC LIMIT ?1",
        )?;
        let last_events = stmt
            .query_map(params![event_limit as i64], |row| {
                Ok(EventEntry {
                    message: row.get(0)?,
                    container: row.get(1)?,
                    date: row.get(2)?,
                    num: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Summary::new(last_events, failing))
    }

    fn insert_event(
        &self,
        conn: &Connection,
        container_name: &str,
        event_type: EventType,
        message: &str,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO journal (container_name, event_type, event_date, message, archived)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![
                container_name,
                event_type,
                format_date(self.clock.now()),
                message
            ],
        )?;

        if event_type == EventType::Restart {
            conn.execute(
                "INSERT INTO restart_totals (container_name, total) VALUES (?1, 1)
                 ON CONFLICT(container_name) DO UPDATE SET total = total + 1",
                params![container_name],
            )?;
        }

        // Keep only the newest entries of this container
        conn.execute(
            "DELETE FROM journal WHERE container_name = ?1 AND id NOT IN (
                SELECT id FROM journal WHERE container_name = ?1
                ORDER BY id DESC LIMIT ?2
             )",
            params![
                container_name,
                i64::try_from(self.max_historic_entries).unwrap_or(i64::MAX)
            ],
        )?;

        Ok(())
    }
}

fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    // The table already exists when the database file is persistent
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS journal (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            container_name TEXT,
            event_type TEXT,
            event_date TEXT,
            message TEXT,
            archived BOOLEAN
        );
        CREATE TABLE IF NOT EXISTS restart_totals (
            container_name TEXT PRIMARY KEY,
            total INTEGER NOT NULL
        );",
    )
}

fn count_events(conn: &Connection, container_name: &str, event_type: EventType) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(id) FROM journal WHERE container_name = ?1 AND event_type = ?2",
        params![container_name, event_type],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn window_start(now: DateTime<Utc>, seconds: u64) -> String {
    let start = i64::try_from(seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::UNIX_EPOCH);
    format_date(start)
}
