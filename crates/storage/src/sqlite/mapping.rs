//! Table mapping - binds record fields to catalog columns

use keel_core::{Delimiter, FieldKind, Record, Result, StoreError};

use super::catalog::TableInfo;

/// One mapped column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub column_name: String,
    pub field_name: &'static str,
    /// Type declared in the table DDL
    pub data_type: String,
    pub kind: FieldKind,
    pub is_primary_key: bool,
    pub is_auto_incrementing: bool,
    delimited_name: String,
}

impl ColumnMapping {
    pub fn delimited_name(&self) -> &str {
        &self.delimited_name
    }
}

/// Field/column binding for one record type and table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    table_name: String,
    delimited_table_name: String,
    delimiter: Delimiter,
    columns: Vec<ColumnMapping>,
    /// Primary-key columns declared by the table, mapped or not
    table_key_count: usize,
    uses_sequence: bool,
}

impl TableMapping {
    /// Match catalog columns to `T`'s fields, in column order.
    ///
    /// Fields without a column are left out; columns without a field are
    /// never written.
    pub fn build<T: Record>(table: &TableInfo, delimiter: Delimiter) -> Result<Self> {
        let fields = T::fields();
        let mut columns = Vec::new();
        for column in &table.columns {
            let Some(field) = fields
                .iter()
                .find(|f| f.column.eq_ignore_ascii_case(&column.name))
            else {
                continue;
            };
            columns.push(ColumnMapping {
                column_name: column.name.clone(),
                field_name: field.name,
                data_type: column.declared_type.clone(),
                kind: field.kind,
                is_primary_key: column.is_primary_key(),
                is_auto_incrementing: table.is_auto_incrementing(column),
                delimited_name: delimiter.quote(&column.name),
            });
        }

        if columns.is_empty() {
            return Err(StoreError::Mapping(format!(
                "no field of {} matches a column of table {}",
                std::any::type_name::<T>(),
                table.name
            )));
        }

        Ok(Self {
            table_name: table.name.clone(),
            delimited_table_name: delimiter.quote(&table.name),
            delimiter,
            columns,
            table_key_count: table.primary_keys().len(),
            uses_sequence: table.uses_sequence,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn delimited_table_name(&self) -> &str {
        &self.delimited_table_name
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    pub fn uses_sequence(&self) -> bool {
        self.uses_sequence
    }

    pub fn primary_key_mappings(&self) -> Vec<&ColumnMapping> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }

    /// The single primary-key column used to address rows
    pub fn primary_key(&self) -> Result<&ColumnMapping> {
        if self.table_key_count > 1 {
            return Err(StoreError::Mapping(format!(
                "table {} has a composite primary key, which update and delete do not support",
                self.table_name
            )));
        }
        self.columns
            .iter()
            .find(|c| c.is_primary_key)
            .ok_or_else(|| {
                StoreError::Mapping(format!(
                    "no primary key of table {} is mapped to a field",
                    self.table_name
                ))
            })
    }

    /// The primary key, when the backend assigns its values
    pub fn auto_key(&self) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.is_auto_incrementing)
    }

    pub fn find_by_field(&self, field: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.field_name == field)
    }

    pub fn find_by_column(&self, column: &str) -> Option<&ColumnMapping> {
        self.columns
            .iter()
            .find(|c| c.column_name.eq_ignore_ascii_case(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::catalog::Catalog;
    use keel_core::impl_record;
    use rusqlite::Connection;

    #[derive(Debug, Clone)]
    struct Client {
        client_id: i64,
        first_name: String,
        nickname: String,
    }

    impl_record!(Client {
        key client_id => "ClientId",
        first_name => "FirstName",
        nickname,
    });

    #[derive(Debug, Clone)]
    struct Stranger {
        id: i64,
    }

    impl_record!(Stranger in "Client" {
        key id => "Nope",
    });

    fn table(ddl: &str, name: &str) -> TableInfo {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(ddl).unwrap();
        Catalog::load(&conn).unwrap().table(name).unwrap().clone()
    }

    #[test]
    fn test_mapping_drops_unmatched_fields_and_columns() {
        let info = table(
            "CREATE TABLE Client (ClientId INTEGER PRIMARY KEY AUTOINCREMENT, \
             FirstName TEXT, LastName TEXT);",
            "Client",
        );
        let mapping = TableMapping::build::<Client>(&info, Delimiter::DOUBLE_QUOTE).unwrap();
        let names: Vec<&str> = mapping.columns().iter().map(|c| c.field_name).collect();
        assert_eq!(names, vec!["client_id", "first_name"]);
        assert!(mapping.find_by_field("nickname").is_none());
        assert!(mapping.find_by_column("lastname").is_none());
        assert_eq!(mapping.delimited_table_name(), "\"Client\"");
        assert!(mapping.uses_sequence());

        let key = mapping.primary_key().unwrap();
        assert_eq!(key.delimited_name(), "\"ClientId\"");
        assert_eq!(mapping.auto_key().map(|c| c.field_name), Some("client_id"));
    }

    #[test]
    fn test_mapping_reports_composite_key() {
        let info = table(
            "CREATE TABLE Client (ClientId INTEGER, FirstName TEXT, \
             PRIMARY KEY (ClientId, FirstName));",
            "Client",
        );
        let mapping = TableMapping::build::<Client>(&info, Delimiter::DOUBLE_QUOTE).unwrap();
        assert_eq!(mapping.primary_key_mappings().len(), 2);
        assert!(mapping.auto_key().is_none());
        let err = mapping.primary_key().unwrap_err();
        assert!(err.to_string().contains("composite"));
    }

    #[test]
    fn test_mapping_with_unmapped_key_cannot_address_rows() {
        let info = table(
            "CREATE TABLE Client (Code TEXT PRIMARY KEY, FirstName TEXT);",
            "Client",
        );
        let mapping = TableMapping::build::<Client>(&info, Delimiter::DOUBLE_QUOTE).unwrap();
        assert!(matches!(mapping.primary_key(), Err(StoreError::Mapping(_))));
    }

    #[test]
    fn test_mapping_without_any_match_fails() {
        let info = table("CREATE TABLE Client (ClientId INTEGER PRIMARY KEY);", "Client");
        let result = TableMapping::build::<Stranger>(&info, Delimiter::DOUBLE_QUOTE);
        assert!(matches!(result, Err(StoreError::Mapping(_))));
    }
}
