//! Schema catalog - table and column metadata read from SQLite
//!
//! Loaded once when the store core opens; stores treat it as immutable.

use keel_core::{Result, StoreError};
use rusqlite::Connection;

use super::reservation::SEQUENCE_TABLE;

/// One column as reported by `pragma_table_info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub ordinal: usize,
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    /// 1-based position inside the primary key, 0 when not part of it
    pub pk_position: usize,
}

impl ColumnDescriptor {
    pub fn is_primary_key(&self) -> bool {
        self.pk_position > 0
    }
}

/// Metadata for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    /// Declared `WITHOUT ROWID`
    pub without_rowid: bool,
    /// Declared with `AUTOINCREMENT`, so it owns a `sqlite_sequence` row
    pub uses_sequence: bool,
}

impl TableInfo {
    /// Primary-key columns in key order
    pub fn primary_keys(&self) -> Vec<&ColumnDescriptor> {
        let mut keys: Vec<&ColumnDescriptor> =
            self.columns.iter().filter(|c| c.is_primary_key()).collect();
        keys.sort_by_key(|c| c.pk_position);
        keys
    }

    /// SQLite row-identity rule: the sole primary key, declared `INTEGER`,
    /// on a rowid table aliases the rowid and auto-assigns values.
    pub fn is_auto_incrementing(&self, column: &ColumnDescriptor) -> bool {
        column.is_primary_key()
            && self.primary_keys().len() == 1
            && column.declared_type.eq_ignore_ascii_case("integer")
            && !self.without_rowid
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Snapshot of every user table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    tables: Vec<TableInfo>,
}

impl Catalog {
    /// Read table and column metadata
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut stmt = conn
            .prepare(
                "SELECT name, COALESCE(sql, '') FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
                 AND name <> ?1 ORDER BY name",
            )
            .map_err(metadata_error)?;
        let definitions = stmt
            .query_map([SEQUENCE_TABLE], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(metadata_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(metadata_error)?;

        let mut tables = Vec::with_capacity(definitions.len());
        for (name, sql) in definitions {
            let ddl = sql.to_ascii_uppercase();
            let columns = Self::load_columns(conn, &name)?;
            tables.push(TableInfo {
                name,
                columns,
                without_rowid: ddl.contains("WITHOUT ROWID"),
                uses_sequence: ddl.contains("AUTOINCREMENT"),
            });
        }
        Ok(Self { tables })
    }

    fn load_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let mut stmt = conn
            .prepare(
                "SELECT cid, name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid",
            )
            .map_err(metadata_error)?;
        let columns = stmt
            .query_map([table], |row| {
                Ok(ColumnDescriptor {
                    ordinal: row.get::<_, i64>(0)? as usize,
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                    not_null: row.get::<_, i64>(3)? != 0,
                    pk_position: row.get::<_, i64>(4)? as usize,
                })
            })
            .map_err(metadata_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(metadata_error)?;
        Ok(columns)
    }

    pub fn list_tables(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn columns_of(&self, name: &str) -> Option<&[ColumnDescriptor]> {
        self.table(name).map(|t| t.columns.as_slice())
    }
}

fn metadata_error(e: rusqlite::Error) -> StoreError {
    StoreError::Metadata(e.to_string())
}
