// crates/ramq-store/src/store.rs
// ============================================================================
// Module: SQLite Validation Store
// Description: Durable persistence for reference tables, runs, records, and results.
// Purpose: Implement the store operations named in SPEC_FULL.md §6.
// Dependencies: ramq-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Each entity is stored as a canonical JSON blob keyed by its identity
//! column, with a handful of indexed columns pulled out for filtering
//! (`run_id` on records/results, `enabled` on rules). The store speaks only
//! in terms of the seven operations SPEC_FULL.md §6 names: upsert, getById,
//! list-with-filters, paged-list, bulkInsert, and delete-cascade-by-runId.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use ramq_core::BillingCode;
use ramq_core::BillingRecord;
use ramq_core::Establishment;
use ramq_core::Rule;
use ramq_core::RunId;
use ramq_core::ValidationResult;
use ramq_core::ValidationRun;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced by the `SQLite`-backed store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying `SQLite` connection returned an error.
    #[error("store db error: {0}")]
    Db(String),
    /// A stored JSON payload failed to (de)serialize.
    #[error("store serialization error: {0}")]
    Serialization(String),
    /// The store's internal connection mutex was poisoned by a prior panic.
    #[error("store mutex poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed persistence for reference tables and run-scoped data.
#[derive(Clone)]
pub struct SqliteStore {
    /// Shared, mutex-guarded connection; `SQLite` only allows one writer at a time.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if absent) a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be opened or its
    /// schema initialized.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let connection = Connection::open(path)?;
        Self::from_connection(connection)
    }

    /// Opens an in-memory store, primarily for tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when schema initialization fails.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Initializes the schema on a freshly opened connection.
    fn from_connection(connection: Connection) -> Result<Self, StoreError> {
        connection.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS codes (code TEXT PRIMARY KEY, data TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS rules (id TEXT PRIMARY KEY, enabled INTEGER NOT NULL, data TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS contexts (name TEXT PRIMARY KEY);
             CREATE TABLE IF NOT EXISTS establishments (id TEXT PRIMARY KEY, data TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS validation_runs (id TEXT PRIMARY KEY, data TEXT NOT NULL);
             CREATE TABLE IF NOT EXISTS billing_records (
                 run_id TEXT NOT NULL,
                 record_number INTEGER NOT NULL,
                 data TEXT NOT NULL,
                 PRIMARY KEY (run_id, record_number)
             );
             CREATE TABLE IF NOT EXISTS validation_results (
                 id TEXT PRIMARY KEY,
                 run_id TEXT NOT NULL,
                 data TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_results_run_id ON validation_results (run_id);",
        )?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Acquires the connection lock, translating poisoning into [`StoreError`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock().map_err(|_| StoreError::Poisoned)
    }

    // ------------------------------------------------------------------
    // Reference tables
    // ------------------------------------------------------------------

    /// Upserts a billing code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on serialization or database failure.
    pub fn upsert_code(&self, code: &BillingCode) -> Result<(), StoreError> {
        let data = serde_json::to_string(code)?;
        self.lock()?.execute(
            "INSERT INTO codes (code, data) VALUES (?1, ?2)
             ON CONFLICT(code) DO UPDATE SET data = excluded.data",
            params![code.code, data],
        )?;
        Ok(())
    }

    /// Lists every stored billing code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database or deserialization failure.
    pub fn list_codes(&self) -> Result<Vec<BillingCode>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard.prepare("SELECT data FROM codes ORDER BY code")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        rows.map(|row| Ok(serde_json::from_str(&row?)?)).collect()
    }

    /// Upserts a rule definition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on serialization or database failure.
    pub fn upsert_rule(&self, rule: &Rule) -> Result<(), StoreError> {
        let data = serde_json::to_string(rule)?;
        self.lock()?.execute(
            "INSERT INTO rules (id, enabled, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET enabled = excluded.enabled, data = excluded.data",
            params![rule.id.to_string(), i64::from(rule.enabled), data],
        )?;
        Ok(())
    }

    /// Lists enabled rules, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database or deserialization failure.
    pub fn list_enabled_rules(&self) -> Result<Vec<Rule>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard.prepare("SELECT data FROM rules WHERE enabled = 1 ORDER BY rowid")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        rows.map(|row| Ok(serde_json::from_str(&row?)?)).collect()
    }

    /// Registers a context element name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn upsert_context(&self, name: &str) -> Result<(), StoreError> {
        self.lock()?.execute("INSERT OR IGNORE INTO contexts (name) VALUES (?1)", params![name])?;
        Ok(())
    }

    /// Lists every registered context element name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn list_contexts(&self) -> Result<std::collections::BTreeSet<String>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard.prepare("SELECT name FROM contexts")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        rows.map(|row| Ok(row?)).collect()
    }

    /// Upserts an establishment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on serialization or database failure.
    pub fn upsert_establishment(&self, establishment: &Establishment) -> Result<(), StoreError> {
        let data = serde_json::to_string(establishment)?;
        self.lock()?.execute(
            "INSERT INTO establishments (id, data) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
            params![establishment.id, data],
        )?;
        Ok(())
    }

    /// Lists every stored establishment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database or deserialization failure.
    pub fn list_establishments(&self) -> Result<Vec<Establishment>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard.prepare("SELECT data FROM establishments ORDER BY id")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        rows.map(|row| Ok(serde_json::from_str(&row?)?)).collect()
    }

    // ------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------

    /// Upserts a validation run's control-plane state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on serialization or database failure.
    pub fn upsert_run(&self, run: &ValidationRun) -> Result<(), StoreError> {
        let data = serde_json::to_string(run)?;
        self.lock()?.execute(
            "INSERT INTO validation_runs (id, data) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
            params![run.id.to_string(), data],
        )?;
        Ok(())
    }

    /// Looks up a validation run by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database or deserialization failure.
    pub fn get_run(&self, id: RunId) -> Result<Option<ValidationRun>, StoreError> {
        let guard = self.lock()?;
        let data: Option<String> = guard
            .query_row("SELECT data FROM validation_runs WHERE id = ?1", params![id.to_string()], |row| row.get(0))
            .optional()?;
        data.map(|raw| Ok(serde_json::from_str(&raw)?)).transpose()
    }

    // ------------------------------------------------------------------
    // Billing records
    // ------------------------------------------------------------------

    /// Bulk-inserts every record of a run in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on serialization or database failure.
    pub fn bulk_insert_records(&self, records: &[BillingRecord]) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction()?;
        for record in records {
            let data = serde_json::to_string(record)?;
            tx.execute(
                "INSERT INTO billing_records (run_id, record_number, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(run_id, record_number) DO UPDATE SET data = excluded.data",
                params![record.validation_run_id.to_string(), record.record_number.get(), data],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Returns a page of a run's billing records, ordered by `record_number`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database or deserialization failure.
    pub fn list_records_page(
        &self,
        run_id: RunId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<BillingRecord>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard.prepare(
            "SELECT data FROM billing_records WHERE run_id = ?1 ORDER BY record_number LIMIT ?2 OFFSET ?3",
        )?;
        let rows = statement.query_map(params![run_id.to_string(), limit as i64, offset as i64], |row| row.get::<_, String>(0))?;
        rows.map(|row| Ok(serde_json::from_str(&row?)?)).collect()
    }

    // ------------------------------------------------------------------
    // Validation results
    // ------------------------------------------------------------------

    /// Bulk-inserts every finding of a run in a single transaction, in the
    /// engine's emission order (SPEC_FULL.md §5 ordering guarantee).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on serialization or database failure.
    pub fn bulk_insert_results(&self, results: &[ValidationResult]) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction()?;
        for result in results {
            let data = serde_json::to_string(result)?;
            tx.execute(
                "INSERT INTO validation_results (id, run_id, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data",
                params![result.id.to_string(), result.validation_run_id.to_string(), data],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Returns a page of a run's findings, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database or deserialization failure.
    pub fn list_results_page(
        &self,
        run_id: RunId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ValidationResult>, StoreError> {
        let guard = self.lock()?;
        let mut statement =
            guard.prepare("SELECT data FROM validation_results WHERE run_id = ?1 ORDER BY rowid LIMIT ?2 OFFSET ?3")?;
        let rows = statement.query_map(params![run_id.to_string(), limit as i64, offset as i64], |row| row.get::<_, String>(0))?;
        rows.map(|row| Ok(serde_json::from_str(&row?)?)).collect()
    }

    // ------------------------------------------------------------------
    // Cascade delete
    // ------------------------------------------------------------------

    /// Deletes a run and every record/result it owns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn delete_run_cascade(&self, run_id: RunId) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction()?;
        tx.execute("DELETE FROM validation_results WHERE run_id = ?1", params![run_id.to_string()])?;
        tx.execute("DELETE FROM billing_records WHERE run_id = ?1", params![run_id.to_string()])?;
        tx.execute("DELETE FROM validation_runs WHERE id = ?1", params![run_id.to_string()])?;
        tx.commit()?;
        Ok(())
    }
}
