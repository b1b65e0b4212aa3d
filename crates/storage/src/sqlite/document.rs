//! Document store - a key column plus a JSON body per record
//!
//! The table is created on demand. The body is authoritative; the key column
//! only addresses rows and receives the same key the body carries.

use chrono::{DateTime, Utc};
use keel_core::{
    FieldDescriptor, FieldKind, FieldValue, KeyStrategy, Record, Result, RowValues, Statement,
    StoreError, Value,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use super::db_core::{Affected, SqliteCore};
use super::reservation::{SequenceTarget, assign_keys};
use super::statement::{delete_in, placeholder_list};

const KEY_COLUMN: &str = "key";
const BODY_COLUMN: &str = "body";
const CREATED_COLUMN: &str = "created_at";

/// A stored document with its row metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Document<T> {
    pub key: Value,
    pub record: T,
    pub created_at: Option<DateTime<Utc>>,
}

/// Load progress over a table that may not exist yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    Initial,
    Created,
}

/// Document store
#[derive(Debug)]
pub struct DocumentStore<T> {
    core: Arc<SqliteCore>,
    table_name: String,
    delimited_table: String,
    delimited_key: String,
    delimited_body: String,
    delimited_created: String,
    key: FieldDescriptor,
    _record: PhantomData<fn() -> T>,
}

impl<T> DocumentStore<T>
where
    T: Record + Serialize + DeserializeOwned,
{
    /// Store over the table named after the record type
    pub fn new(core: Arc<SqliteCore>) -> Result<Self> {
        Self::named(core, T::table_name())
    }

    pub fn named(core: Arc<SqliteCore>, table: &str) -> Result<Self> {
        let key = T::key_descriptor().ok_or_else(|| {
            StoreError::Mapping(format!(
                "{} declares no key field",
                std::any::type_name::<T>()
            ))
        })?;
        let delimiter = core.delimiter();
        Ok(Self {
            table_name: table.to_string(),
            delimited_table: delimiter.quote(table),
            delimited_key: delimiter.quote(KEY_COLUMN),
            delimited_body: delimiter.quote(BODY_COLUMN),
            delimited_created: delimiter.quote(CREATED_COLUMN),
            key,
            core,
            _record: PhantomData,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn generates_keys(&self) -> bool {
        self.key.kind == FieldKind::Integer && T::key_strategy() == KeyStrategy::Generated
    }

    /// DDL for the document table
    pub fn create_table_sql(&self) -> String {
        let key_type = match (self.key.kind, T::key_strategy()) {
            (FieldKind::Integer, KeyStrategy::Generated) => {
                "INTEGER PRIMARY KEY AUTOINCREMENT".to_string()
            }
            (kind, _) => format!("{} PRIMARY KEY", kind.sql_type()),
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({} {}, {} TEXT NOT NULL, {} TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
            self.delimited_table,
            self.delimited_key,
            key_type,
            self.delimited_body,
            self.delimited_created
        )
    }

    /// Create the table if absent
    pub fn ensure_table(&self) -> Result<()> {
        self.core.transact_ddl(&self.create_table_sql())?;
        debug!("Document table ready: {}", self.table_name);
        Ok(())
    }

    /// Every row, with its key column and creation time
    pub fn load_documents(&self) -> Result<Vec<Document<T>>> {
        let select = Statement::new(format!(
            "SELECT {}, {}, {} FROM {}",
            self.delimited_key, self.delimited_body, self.delimited_created, self.delimited_table
        ));

        let mut state = LoadState::Initial;
        let rows = loop {
            match self.core.query(&select) {
                Ok(rows) => break rows,
                Err(e) if e.is_table_missing() && state == LoadState::Initial => {
                    debug!("Document table {} missing, creating it", self.table_name);
                    self.ensure_table()?;
                    state = LoadState::Created;
                }
                Err(e) => return Err(e),
            }
        };

        rows.into_iter().map(|row| self.decode(row)).collect()
    }

    fn decode(&self, mut row: RowValues) -> Result<Document<T>> {
        let record = match row.take(BODY_COLUMN) {
            Value::Text(body) => serde_json::from_str(&body)?,
            other => {
                return Err(StoreError::Mapping(format!(
                    "document body in {} is not text: {:?}",
                    self.table_name, other
                )));
            }
        };
        let created_at = Option::<DateTime<Utc>>::from_value(row.take(CREATED_COLUMN))
            .map_err(|e| StoreError::field(CREATED_COLUMN, e))?;
        Ok(Document {
            key: row.take(KEY_COLUMN),
            record,
            created_at,
        })
    }

    fn reserve_into(&self, batch: &mut [T]) -> Result<()> {
        let target = SequenceTarget {
            table: &self.table_name,
            delimited_table: &self.delimited_table,
            delimited_key: &self.delimited_key,
            uses_sequence: true,
        };
        let range = self.core.reserve_keys(&target, batch.len())?;
        assign_keys(batch, self.key.name, range)
    }

    fn key_of(&self, item: &T) -> Value {
        item.get_field(self.key.name).unwrap_or(Value::Null)
    }
}

impl<T> crate::trait_::DataStore<T> for DocumentStore<T>
where
    T: Record + Serialize + DeserializeOwned,
{
    fn load_all(&self) -> Result<Vec<T>> {
        Ok(self
            .load_documents()?
            .into_iter()
            .map(|document| document.record)
            .collect())
    }

    fn add(&self, batch: &mut [T]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.ensure_table()?;
        if self.generates_keys() {
            self.reserve_into(batch)?;
        }

        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES ({})",
            self.delimited_table,
            self.delimited_key,
            self.delimited_body,
            placeholder_list(1, 2)
        );
        let statements = batch
            .iter()
            .map(|item| {
                let body = serde_json::to_string(item)?;
                Ok(Statement::with_params(
                    sql.clone(),
                    vec![self.key_of(item), Value::Text(body)],
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.core.transact(&statements, Affected::Any)?;
        debug!("Stored {} documents in {}", batch.len(), self.table_name);
        Ok(())
    }

    fn update(&self, batch: &[T]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.ensure_table()?;
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2",
            self.delimited_table, self.delimited_body, self.delimited_key
        );
        let statements = batch
            .iter()
            .map(|item| {
                let body = serde_json::to_string(item)?;
                Ok(Statement::with_params(
                    sql.clone(),
                    vec![Value::Text(body), self.key_of(item)],
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        self.core.transact(&statements, Affected::AtLeastOne)?;
        Ok(())
    }

    fn delete(&self, batch: &[T]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.ensure_table()?;
        let keys = batch.iter().map(|item| self.key_of(item)).collect();
        let statements = delete_in(&self.delimited_table, &self.delimited_key, keys);
        self.core.transact(&statements, Affected::Any)?;
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.ensure_table()?;
        self.core.transact(
            &[Statement::new(format!("DELETE FROM {}", self.delimited_table))],
            Affected::Any,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trait_::DataStore;
    use keel_core::config::DbLocation;
    use keel_core::impl_record;
    use serde::Deserialize;
    use tempfile::tempdir;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: i64,
        title: String,
        pinned: bool,
    }

    impl_record!(Note {
        key id,
        title,
        pinned,
    });

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Badge {
        id: Uuid,
        label: String,
    }

    impl_record!(Badge {
        key id,
        label,
    });

    fn note(title: &str) -> Note {
        Note {
            id: 0,
            title: title.to_string(),
            pinned: false,
        }
    }

    fn open() -> (tempfile::TempDir, Arc<SqliteCore>) {
        let dir = tempdir().unwrap();
        let core = SqliteCore::open(DbLocation::new(dir.path(), "documents.db")).unwrap();
        (dir, Arc::new(core))
    }

    #[test]
    fn test_load_on_missing_table_creates_it() {
        let (_dir, core) = open();
        let store = core.document_store::<Note>().unwrap();
        assert!(!core.table_exists("Note").unwrap());
        assert!(store.load_all().unwrap().is_empty());
        assert!(core.table_exists("Note").unwrap());
    }

    #[test]
    fn test_create_table_sql_follows_key_shape() {
        let (_dir, core) = open();
        let notes = core.document_store::<Note>().unwrap();
        assert_eq!(
            notes.create_table_sql(),
            "CREATE TABLE IF NOT EXISTS \"Note\" (\"key\" INTEGER PRIMARY KEY AUTOINCREMENT, \
             \"body\" TEXT NOT NULL, \"created_at\" TIMESTAMP DEFAULT CURRENT_TIMESTAMP)"
        );
        let badges = core.document_store_named::<Badge>("badges").unwrap();
        assert!(badges.create_table_sql().contains("\"key\" TEXT PRIMARY KEY"));
    }

    #[test]
    fn test_bodies_carry_reserved_keys() {
        let (_dir, core) = open();
        let store = core.document_store::<Note>().unwrap();

        let mut first = note("one");
        store.add_one(&mut first).unwrap();
        let mut batch = vec![note("two"), note("three")];
        store.add(&mut batch).unwrap();
        assert_eq!(
            vec![first.id, batch[0].id, batch[1].id],
            vec![1, 2, 3]
        );

        let documents = store.load_documents().unwrap();
        assert_eq!(documents.len(), 3);
        for document in &documents {
            assert_eq!(document.key, Value::Integer(document.record.id));
            assert!(document.created_at.is_some());
        }
        assert_eq!(documents[2].record, batch[1]);
    }

    #[test]
    fn test_update_rewrites_body() {
        let (_dir, core) = open();
        let store = core.document_store::<Note>().unwrap();
        let mut stored = note("one");
        store.add_one(&mut stored).unwrap();

        stored.pinned = true;
        store.update_one(&stored).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![stored.clone()]);

        let mut ghost = note("ghost");
        ghost.id = 99;
        let result = store.update_one(&ghost);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(store.load_all().unwrap(), vec![stored]);
    }

    #[test]
    fn test_delete_subset_and_all() {
        let (_dir, core) = open();
        let store = core.document_store::<Note>().unwrap();
        let mut batch = vec![note("a"), note("b"), note("c")];
        store.add(&mut batch).unwrap();

        store.delete(&batch[..2]).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![batch[2].clone()]);

        store.delete_all().unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_text_keys_are_caller_assigned() {
        let (_dir, core) = open();
        let store = core.document_store_named::<Badge>("badges").unwrap();
        let id = Uuid::new_v4();
        let mut badge = Badge {
            id,
            label: "gold".to_string(),
        };
        store.add_one(&mut badge).unwrap();
        assert_eq!(badge.id, id);

        let documents = store.load_documents().unwrap();
        assert_eq!(documents[0].key, Value::Text(id.to_string()));
        assert_eq!(documents[0].record, badge);

        let result = store.add_one(&mut badge.clone());
        assert!(matches!(result, Err(StoreError::Constraint(_))));
    }

    #[test]
    fn test_mutations_create_table_first() {
        let (_dir, core) = open();
        let store = core.document_store::<Note>().unwrap();
        store.delete_all().unwrap();
        assert!(core.table_exists("Note").unwrap());
    }

    #[test]
    fn test_mutations_recreate_a_dropped_table() {
        let (_dir, core) = open();
        let store = core.document_store::<Note>().unwrap();
        let mut first = note("one");
        store.add_one(&mut first).unwrap();

        core.transact_ddl("DROP TABLE \"Note\"").unwrap();
        let mut second = note("two");
        store.add_one(&mut second).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![second]);
    }
}
