//! # Evolution ledger
//!
//! ## Responsibility
//! Durable, append-only record of every completed cycle: what was sensed,
//! what was proposed, how it scored, and whether it was accepted. The
//! ledger is the source of truth for "was this fitness-worthy" —
//! publication is downstream notification and never retracts a row.
//!
//! ## Guarantees
//! - Once `append` returns `Ok`, the record survives process restart.
//! - Rows are never updated or deleted here; retention is external.
//! - Appends serialize: the connection sits behind a mutex, and SQLite's
//!   own transactionality covers the write itself.
//! - `list_recent` returns rows most-recent-first in append order.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::OracleError;

// ---------------------------------------------------------------------------
// EvolutionRecord
// ---------------------------------------------------------------------------

/// One durable row. Fields beyond the auto-assigned `id` are exactly the
/// persisted schema; none may be removed or repurposed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvolutionRecord {
    /// Auto-increment row id; `None` until appended.
    pub id: Option<i64>,
    /// Cycle completion time, Unix epoch milliseconds.
    pub timestamp_ms: u64,
    /// Serialized state snapshot the cycle ran against.
    pub state_json: String,
    /// The fitness score the gate saw.
    pub fitness: f64,
    /// The candidate program text.
    pub code: String,
    /// Gate outcome.
    pub accepted: bool,
}

impl EvolutionRecord {
    pub fn new(
        timestamp_ms: u64,
        state_json: impl Into<String>,
        fitness: f64,
        code: impl Into<String>,
        accepted: bool,
    ) -> Self {
        Self {
            id: None,
            timestamp_ms,
            state_json: state_json.into(),
            fitness,
            code: code.into(),
            accepted,
        }
    }
}

// ---------------------------------------------------------------------------
// EvolutionLedger
// ---------------------------------------------------------------------------

/// SQLite-backed ledger. Open once at startup, inject everywhere.
pub struct EvolutionLedger {
    conn: Mutex<Connection>,
}

impl EvolutionLedger {
    /// Open (creating if needed) the ledger at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OracleError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory ledger for tests; contents die with the handle.
    pub fn open_in_memory() -> Result<Self, OracleError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, OracleError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS evolutions (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                state     TEXT    NOT NULL,
                fitness   REAL    NOT NULL,
                code      TEXT    NOT NULL,
                accepted  INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append one record, returning its assigned row id.
    pub fn append(&self, record: &EvolutionRecord) -> Result<i64, OracleError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO evolutions (timestamp, state, fitness, code, accepted)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.timestamp_ms as i64,
                record.state_json,
                record.fitness,
                record.code,
                record.accepted as i64,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The `n` most recent records, most-recent-first.
    pub fn list_recent(&self, n: usize) -> Result<Vec<EvolutionRecord>, OracleError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, state, fitness, code, accepted
             FROM evolutions ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([n as i64], |row| {
            Ok(EvolutionRecord {
                id: Some(row.get::<_, i64>(0)?),
                timestamp_ms: row.get::<_, i64>(1)? as u64,
                state_json: row.get(2)?,
                fitness: row.get(3)?,
                code: row.get(4)?,
                accepted: row.get::<_, i64>(5)? != 0,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Total number of appended records.
    pub fn count(&self) -> Result<u64, OracleError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM evolutions", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
