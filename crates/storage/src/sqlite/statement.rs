//! Relational statement generation
//!
//! Builds parameter-bound statements for a [`TableMapping`]. Key reservation
//! happens before these run, so records already carry their final keys.

use keel_core::{Record, Result, Statement, StoreError, Value};

use super::mapping::TableMapping;

/// Upper bound on parameters bound to one statement
pub const MAX_BOUND_PARAMS: usize = 32766;

/// Positional placeholder, 1-based
pub fn placeholder(index: usize) -> String {
    format!("?{}", index)
}

/// Comma-separated placeholders `?start .. ?start+count-1`
pub fn placeholder_list(start: usize, count: usize) -> String {
    (start..start + count)
        .map(placeholder)
        .collect::<Vec<_>>()
        .join(", ")
}

fn field_value(values: &[(&'static str, Value)], field: &str) -> Value {
    values
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, value)| value.clone())
        .unwrap_or(Value::Null)
}

/// Unfiltered full-table select
pub fn select_all(mapping: &TableMapping) -> Statement {
    Statement::new(format!("SELECT * FROM {}", mapping.delimited_table_name()))
}

/// One INSERT per record, every mapped column bound in mapping order
pub fn insert_statements<T: Record>(mapping: &TableMapping, batch: &[T]) -> Vec<Statement> {
    let columns = mapping
        .columns()
        .iter()
        .map(|c| c.delimited_name())
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        mapping.delimited_table_name(),
        columns,
        placeholder_list(1, mapping.columns().len())
    );

    batch
        .iter()
        .map(|item| {
            let values = item.to_values();
            let params = mapping
                .columns()
                .iter()
                .map(|c| field_value(&values, c.field_name))
                .collect();
            Statement::with_params(sql.clone(), params)
        })
        .collect()
}

/// One UPDATE per record: every mapped non-key column, matched on the key
pub fn update_statements<T: Record>(mapping: &TableMapping, batch: &[T]) -> Result<Vec<Statement>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    let key = mapping.primary_key()?;
    let set_columns: Vec<_> = mapping
        .columns()
        .iter()
        .filter(|c| !c.is_primary_key)
        .collect();
    if set_columns.is_empty() {
        return Err(StoreError::Mapping(format!(
            "table {} has no mapped non-key column to update",
            mapping.table_name()
        )));
    }

    let assignments = set_columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = {}", c.delimited_name(), placeholder(i + 1)))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        mapping.delimited_table_name(),
        assignments,
        key.delimited_name(),
        placeholder(set_columns.len() + 1)
    );

    Ok(batch
        .iter()
        .map(|item| {
            let values = item.to_values();
            let mut params: Vec<Value> = set_columns
                .iter()
                .map(|c| field_value(&values, c.field_name))
                .collect();
            params.push(field_value(&values, key.field_name));
            Statement::with_params(sql.clone(), params)
        })
        .collect())
}

/// DELETE with an `IN` list over the key column, one statement per
/// [`MAX_BOUND_PARAMS`] keys
pub fn delete_statements<T: Record>(mapping: &TableMapping, batch: &[T]) -> Result<Vec<Statement>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    let key = mapping.primary_key()?;
    let keys: Vec<Value> = batch
        .iter()
        .map(|item| item.get_field(key.field_name).unwrap_or(Value::Null))
        .collect();
    Ok(delete_in(
        mapping.delimited_table_name(),
        key.delimited_name(),
        keys,
    ))
}

pub fn delete_all_statement(mapping: &TableMapping) -> Statement {
    Statement::new(format!("DELETE FROM {}", mapping.delimited_table_name()))
}

/// `DELETE FROM table WHERE column IN (...)`, chunked by parameter limit
pub(crate) fn delete_in(table: &str, column: &str, keys: Vec<Value>) -> Vec<Statement> {
    keys.chunks(MAX_BOUND_PARAMS)
        .map(|chunk| {
            Statement::with_params(
                format!(
                    "DELETE FROM {} WHERE {} IN ({})",
                    table,
                    column,
                    placeholder_list(1, chunk.len())
                ),
                chunk.to_vec(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::catalog::Catalog;
    use keel_core::{Delimiter, impl_record};
    use rusqlite::Connection;

    #[derive(Debug, Clone)]
    struct Album {
        album_id: i64,
        title: String,
        artist_id: i64,
        rating: Option<i32>,
    }

    impl_record!(Album {
        key album_id => "AlbumId",
        title => "Title",
        artist_id => "ArtistId",
        rating,
    });

    fn mapping(ddl: &str) -> TableMapping {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(ddl).unwrap();
        let catalog = Catalog::load(&conn).unwrap();
        TableMapping::build::<Album>(catalog.table("Album").unwrap(), Delimiter::DOUBLE_QUOTE)
            .unwrap()
    }

    fn album_mapping() -> TableMapping {
        mapping("CREATE TABLE Album (AlbumId INTEGER PRIMARY KEY, Title TEXT, ArtistId INTEGER);")
    }

    fn album(id: i64, title: &str) -> Album {
        Album {
            album_id: id,
            title: title.to_string(),
            artist_id: 3,
            rating: None,
        }
    }

    #[test]
    fn test_select_all() {
        assert_eq!(select_all(&album_mapping()).sql, "SELECT * FROM \"Album\"");
    }

    #[test]
    fn test_insert_binds_mapped_columns_in_order() {
        let statements = insert_statements(&album_mapping(), &[album(1, "A"), album(2, "B")]);
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].sql,
            "INSERT INTO \"Album\" (\"AlbumId\", \"Title\", \"ArtistId\") VALUES (?1, ?2, ?3)"
        );
        assert_eq!(
            statements[1].params,
            vec![Value::Integer(2), Value::Text("B".into()), Value::Integer(3)]
        );
    }

    #[test]
    fn test_update_sets_non_key_columns_and_matches_key() {
        let statements = update_statements(&album_mapping(), &[album(7, "C")]).unwrap();
        assert_eq!(
            statements[0].sql,
            "UPDATE \"Album\" SET \"Title\" = ?1, \"ArtistId\" = ?2 WHERE \"AlbumId\" = ?3"
        );
        assert_eq!(
            statements[0].params,
            vec![Value::Text("C".into()), Value::Integer(3), Value::Integer(7)]
        );
    }

    #[test]
    fn test_delete_is_one_parameterized_in_list() {
        let statements =
            delete_statements(&album_mapping(), &[album(1, "x"), album(2, "y"), album(5, "z")])
                .unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql,
            "DELETE FROM \"Album\" WHERE \"AlbumId\" IN (?1, ?2, ?3)"
        );
        assert_eq!(
            statements[0].params,
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(5)]
        );
    }

    #[test]
    fn test_delete_in_chunks_large_key_lists() {
        let keys: Vec<Value> = (0..(MAX_BOUND_PARAMS as i64 + 1)).map(Value::Integer).collect();
        let statements = delete_in("\"t\"", "\"id\"", keys);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].params, vec![Value::Integer(MAX_BOUND_PARAMS as i64)]);
    }

    #[test]
    fn test_empty_batch_generates_nothing() {
        let mapping = album_mapping();
        let empty: [Album; 0] = [];
        assert!(insert_statements(&mapping, &empty).is_empty());
        assert!(update_statements(&mapping, &empty).unwrap().is_empty());
        assert!(delete_statements(&mapping, &empty).unwrap().is_empty());
    }

    #[test]
    fn test_composite_key_is_rejected_for_update_and_delete() {
        let mapping = mapping(
            "CREATE TABLE Album (AlbumId INTEGER, ArtistId INTEGER, Title TEXT, \
             PRIMARY KEY (AlbumId, ArtistId));",
        );
        assert!(update_statements(&mapping, &[album(1, "x")]).is_err());
        assert!(delete_statements(&mapping, &[album(1, "x")]).is_err());
        assert_eq!(insert_statements(&mapping, &[album(1, "x")]).len(), 1);
    }
}
