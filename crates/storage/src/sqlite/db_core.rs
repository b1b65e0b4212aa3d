//! SQLite store core - connection plumbing shared by every store
//!
//! Responsibilities:
//! - Bootstrap the database directory and file
//! - Load the schema catalog once
//! - Open one connection per call and run statements with bound parameters
//! - Build relational and document stores

use keel_core::config::{DbLocation, StoreOptions, resolve_location};
use keel_core::{Delimiter, Record, Result, RowValues, Statement, StoreError, Value};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode, ToSql, TransactionBehavior, params_from_iter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::catalog::Catalog;
use super::document::DocumentStore;
use super::relational::RelationalStore;
use super::reservation::{self, KeyRange, SequenceTarget};

/// Row-count expectation for each statement of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affected {
    Any,
    /// Zero affected rows aborts the call with `NotFound`
    AtLeastOne,
}

/// SQLite store core
#[derive(Debug)]
pub struct SqliteCore {
    location: DbLocation,
    options: StoreOptions,
    catalog: Catalog,
    delimiter: Delimiter,
}

impl SqliteCore {
    pub fn open(location: DbLocation) -> Result<Self> {
        Self::open_with_options(location, StoreOptions::default())
    }

    /// Open the database, creating it if absent, and read its schema
    pub fn open_with_options(location: DbLocation, options: StoreOptions) -> Result<Self> {
        if !location.directory.as_os_str().is_empty() {
            std::fs::create_dir_all(&location.directory)?;
        }

        let mut core = Self {
            location,
            options,
            catalog: Catalog::default(),
            delimiter: Delimiter::DOUBLE_QUOTE,
        };
        let conn = core
            .connect()
            .map_err(|e| StoreError::Metadata(e.to_string()))?;
        core.catalog = Catalog::load(&conn)?;

        info!(
            "SQLite store initialized at: {:?} ({} tables)",
            core.path(),
            core.catalog.list_tables().len()
        );
        Ok(core)
    }

    pub fn in_directory(directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Result<Self> {
        Self::open(DbLocation::new(directory, file_name))
    }

    /// Resolve a named connection string from a settings file
    pub fn from_settings(settings_path: &Path, name: &str) -> Result<Self> {
        let (location, options) = resolve_location(settings_path, name);
        Self::open_with_options(location, options)
    }

    pub fn location(&self) -> &DbLocation {
        &self.location
    }

    pub fn path(&self) -> PathBuf {
        self.location.path()
    }

    pub fn connection_string(&self) -> String {
        self.location.connection_string()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    /// Open a configured connection; it closes when dropped
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(self.path()).map_err(classify)?;
        conn.busy_timeout(Duration::from_millis(self.options.busy_timeout_ms))
            .map_err(classify)?;
        conn.pragma_update(None, "journal_mode", self.options.journal_mode.pragma_value())
            .map_err(classify)?;
        Ok(conn)
    }

    /// Live check, unlike the catalog snapshot
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let found = self.execute_scalar(&Statement::with_params(
            "SELECT count(name) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            vec![Value::Text(name.to_string())],
        ))?;
        Ok(found.as_i64().unwrap_or(0) > 0)
    }

    /// First column of the first row, NULL when there is none
    pub fn execute_scalar(&self, statement: &Statement) -> Result<Value> {
        Ok(self
            .query(statement)?
            .first()
            .and_then(|row| row.iter().next().map(|(_, value)| value.clone()))
            .unwrap_or(Value::Null))
    }

    /// Run a query and materialize every row
    pub fn query(&self, statement: &Statement) -> Result<Vec<RowValues>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&statement.sql).map_err(classify)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt
            .query(params_from_iter(statement.params.iter().map(Param)))
            .map_err(classify)?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(classify)? {
            let mut values = RowValues::new();
            for (index, name) in columns.iter().enumerate() {
                values.push(name.clone(), read_value(row.get_ref(index).map_err(classify)?));
            }
            result.push(values);
        }
        Ok(result)
    }

    /// Execute statements in order inside one transaction.
    ///
    /// The first failure rolls back everything the call executed.
    pub fn transact(&self, statements: &[Statement], expect: Affected) -> Result<usize> {
        if statements.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(classify)?;

        let mut total = 0;
        for statement in statements {
            let mut stmt = tx.prepare_cached(&statement.sql).map_err(classify)?;
            let changed = stmt
                .execute(params_from_iter(statement.params.iter().map(Param)))
                .map_err(classify)?;
            if changed == 0 && expect == Affected::AtLeastOne {
                let key = statement.params.last().cloned().unwrap_or(Value::Null);
                return Err(StoreError::NotFound(format!("no row matched key {}", key)));
            }
            total += changed;
        }
        tx.commit().map_err(classify)?;

        debug!(
            "Executed {} statements, {} rows affected",
            statements.len(),
            total
        );
        Ok(total)
    }

    /// Run schema DDL in its own transaction
    pub fn transact_ddl(&self, sql: &str) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction().map_err(classify)?;
        tx.execute_batch(sql).map_err(classify)?;
        tx.commit().map_err(classify)
    }

    /// Reserve `count` sequential keys on a dedicated connection
    pub fn reserve_keys(&self, target: &SequenceTarget<'_>, count: usize) -> Result<KeyRange> {
        let mut conn = self
            .connect()
            .map_err(|e| StoreError::Reservation(e.to_string()))?;
        reservation::reserve(&mut conn, target, count)
    }

    pub fn relational_store<T: Record>(self: &Arc<Self>) -> Result<RelationalStore<T>> {
        RelationalStore::new(Arc::clone(self))
    }

    pub fn document_store<T>(self: &Arc<Self>) -> Result<DocumentStore<T>>
    where
        T: Record + Serialize + DeserializeOwned,
    {
        DocumentStore::new(Arc::clone(self))
    }

    pub fn document_store_named<T>(self: &Arc<Self>, table: &str) -> Result<DocumentStore<T>>
    where
        T: Record + Serialize + DeserializeOwned,
    {
        DocumentStore::named(Arc::clone(self), table)
    }
}

/// Map a backend failure into the store taxonomy
pub(crate) fn classify(e: rusqlite::Error) -> StoreError {
    let message = e.to_string();
    if let Some((_, table)) = message.split_once("no such table: ") {
        return StoreError::TableMissing(table.trim().to_string());
    }
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::Constraint(message)
        }
        _ => StoreError::Execution(message),
    }
}

/// Borrowed statement parameter
struct Param<'a>(&'a Value);

impl ToSql for Param<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self.0 {
            Value::Null => ValueRef::Null,
            Value::Integer(v) => ValueRef::Integer(*v),
            Value::Real(v) => ValueRef::Real(*v),
            Value::Text(v) => ValueRef::Text(v.as_bytes()),
            Value::Blob(v) => ValueRef::Blob(v),
        }))
    }
}

fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::Blob(v.to_vec()),
    }
}
