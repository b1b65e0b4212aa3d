//! Auto-increment key reservation
//!
//! Reserves a contiguous key range for a whole batch in one immediate
//! transaction, then writes the keys into the records. Inserts that follow
//! carry explicit keys, so no row has to be re-read to learn its key.

use keel_core::{Record, Result, StoreError, Value};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::debug;

/// Contiguous reserved keys `[start, start + count)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    pub start: i64,
    pub count: usize,
}

impl KeyRange {
    pub fn keys(&self) -> std::ops::Range<i64> {
        self.start..self.start + self.count as i64
    }

    pub fn last(&self) -> Option<i64> {
        self.keys().last()
    }
}

/// Table whose sequence is advanced
#[derive(Debug, Clone, Copy)]
pub struct SequenceTarget<'a> {
    pub table: &'a str,
    pub delimited_table: &'a str,
    pub delimited_key: &'a str,
    /// Table keeps its counter in `sqlite_sequence`
    pub uses_sequence: bool,
}

/// High-water marks for tables that have no `sqlite_sequence` row
pub const SEQUENCE_TABLE: &str = "keel_sequence";

/// Reserve `count` keys for `target`.
///
/// The counter is the larger of the stored high-water mark and the highest
/// existing key. AUTOINCREMENT tables keep the mark in `sqlite_sequence`;
/// every other table keeps it in [`SEQUENCE_TABLE`], so a range is never
/// handed out twice even before its rows are inserted. On failure the
/// transaction rolls back and nothing is reserved.
pub fn reserve(conn: &mut Connection, target: &SequenceTarget<'_>, count: usize) -> Result<KeyRange> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(reservation_error)?;

    let has_sequence_table = tx
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map_err(reservation_error)?
        > 0;
    let native = target.uses_sequence && has_sequence_table;

    let stored: Option<i64> = if native {
        tx.query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = ?1",
            [target.table],
            |row| row.get(0),
        )
        .optional()
        .map_err(reservation_error)?
    } else {
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (name TEXT PRIMARY KEY, seq INTEGER NOT NULL)",
            SEQUENCE_TABLE
        ))
        .map_err(reservation_error)?;
        tx.query_row(
            &format!("SELECT seq FROM \"{}\" WHERE name = ?1", SEQUENCE_TABLE),
            [target.table],
            |row| row.get(0),
        )
        .optional()
        .map_err(reservation_error)?
    };
    let highest: i64 = tx
        .query_row(
            &format!(
                "SELECT COALESCE(MAX({}), 0) FROM {}",
                target.delimited_key, target.delimited_table
            ),
            [],
            |row| row.get(0),
        )
        .map_err(reservation_error)?;

    let counter = stored.unwrap_or(0).max(highest);
    let advanced = i64::try_from(count)
        .ok()
        .and_then(|n| counter.checked_add(n))
        .ok_or_else(|| {
            StoreError::Reservation(format!("key space of {} exhausted", target.table))
        })?;

    let advance = match (native, stored) {
        (true, Some(_)) => tx.execute(
            "UPDATE sqlite_sequence SET seq = ?1 WHERE name = ?2",
            params![advanced, target.table],
        ),
        (true, None) => tx.execute(
            "INSERT INTO sqlite_sequence (name, seq) VALUES (?1, ?2)",
            params![target.table, advanced],
        ),
        (false, _) => tx.execute(
            &format!(
                "INSERT INTO \"{}\" (name, seq) VALUES (?1, ?2) \
                 ON CONFLICT(name) DO UPDATE SET seq = excluded.seq",
                SEQUENCE_TABLE
            ),
            params![target.table, advanced],
        ),
    };
    advance.map_err(reservation_error)?;

    tx.commit().map_err(reservation_error)?;

    let range = KeyRange {
        start: counter + 1,
        count,
    };
    debug!(
        "Reserved {} keys for {} starting at {}",
        count, target.table, range.start
    );
    Ok(range)
}

/// Write reserved keys into `field` of each record, in batch order.
///
/// Either every record receives its key or the batch is left as it was.
pub fn assign_keys<T: Record>(batch: &mut [T], field: &str, range: KeyRange) -> Result<()> {
    let originals: Vec<Value> = batch
        .iter()
        .map(|item| item.get_field(field).unwrap_or(Value::Null))
        .collect();

    for (index, key) in range.keys().enumerate().take(batch.len()) {
        if let Err(e) = batch[index].set_field(field, Value::Integer(key)) {
            for (item, original) in batch.iter_mut().zip(originals).take(index) {
                item.set_field(field, original)?;
            }
            return Err(StoreError::Reservation(e.to_string()));
        }
    }
    Ok(())
}

fn reservation_error(e: rusqlite::Error) -> StoreError {
    StoreError::Reservation(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::impl_record;

    #[derive(Debug, Clone, PartialEq)]
    struct Artist {
        artist_id: i64,
        name: String,
    }

    impl_record!(Artist {
        key artist_id,
        name,
    });

    #[derive(Debug, Clone, PartialEq)]
    struct Loose {
        id: i64,
        code: String,
    }

    impl_record!(Loose {
        key id,
        code,
    });

    fn target(uses_sequence: bool) -> SequenceTarget<'static> {
        SequenceTarget {
            table: "Artist",
            delimited_table: "\"Artist\"",
            delimited_key: "\"ArtistId\"",
            uses_sequence,
        }
    }

    #[test]
    fn test_reserve_on_empty_autoincrement_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Artist (ArtistId INTEGER PRIMARY KEY AUTOINCREMENT, Name TEXT);",
        )
        .unwrap();

        let first = reserve(&mut conn, &target(true), 1).unwrap();
        assert_eq!(first, KeyRange { start: 1, count: 1 });
        let second = reserve(&mut conn, &target(true), 2).unwrap();
        assert_eq!(second.keys().collect::<Vec<_>>(), vec![2, 3]);

        let seq: i64 = conn
            .query_row("SELECT seq FROM sqlite_sequence WHERE name = 'Artist'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(seq, 3);

        // Native assignment continues after the reserved range
        conn.execute("INSERT INTO Artist (Name) VALUES ('native')", [])
            .unwrap();
        assert_eq!(conn.last_insert_rowid(), 4);
    }

    #[test]
    fn test_reserve_follows_existing_rows_without_sequence() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Artist (ArtistId INTEGER PRIMARY KEY, Name TEXT);
             INSERT INTO Artist (ArtistId, Name) VALUES (5, 'x');",
        )
        .unwrap();

        let range = reserve(&mut conn, &target(false), 3).unwrap();
        assert_eq!(range.start, 6);
        assert_eq!(range.last(), Some(8));
    }

    #[test]
    fn test_reserve_without_sequence_never_repeats_a_range() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE Artist (ArtistId INTEGER PRIMARY KEY, Name TEXT);")
            .unwrap();

        let first = reserve(&mut conn, &target(false), 2).unwrap();
        let second = reserve(&mut conn, &target(false), 2).unwrap();
        assert_eq!(first.keys().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(second.keys().collect::<Vec<_>>(), vec![3, 4]);

        let mark: i64 = conn
            .query_row(
                "SELECT seq FROM keel_sequence WHERE name = 'Artist'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(mark, 4);
    }

    #[test]
    fn test_reserve_without_sequence_follows_rows_above_the_mark() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE Artist (ArtistId INTEGER PRIMARY KEY, Name TEXT);")
            .unwrap();

        reserve(&mut conn, &target(false), 1).unwrap();
        conn.execute("INSERT INTO Artist (ArtistId, Name) VALUES (10, 'x')", [])
            .unwrap();
        let next = reserve(&mut conn, &target(false), 1).unwrap();
        assert_eq!(next.start, 11);
    }

    #[test]
    fn test_reserve_on_missing_table_fails_cleanly() {
        let mut conn = Connection::open_in_memory().unwrap();
        let result = reserve(&mut conn, &target(true), 2);
        assert!(matches!(result, Err(StoreError::Reservation(_))));
    }

    #[test]
    fn test_assign_keys_in_batch_order() {
        let mut batch = vec![
            Artist {
                artist_id: 0,
                name: "a".into(),
            },
            Artist {
                artist_id: 0,
                name: "b".into(),
            },
        ];
        assign_keys(&mut batch, "artist_id", KeyRange { start: 10, count: 2 }).unwrap();
        assert_eq!(batch[0].artist_id, 10);
        assert_eq!(batch[1].artist_id, 11);
    }

    #[test]
    fn test_assign_keys_restores_batch_on_failure() {
        let mut batch = vec![
            Loose {
                id: 1,
                code: "a".into(),
            },
            Loose {
                id: 2,
                code: "b".into(),
            },
        ];
        let before = batch.clone();
        // `code` is text, so the first assignment already fails
        let result = assign_keys(&mut batch, "code", KeyRange { start: 1, count: 2 });
        assert!(matches!(result, Err(StoreError::Reservation(_))));
        assert_eq!(batch, before);

        let result = assign_keys(&mut batch, "missing", KeyRange { start: 1, count: 2 });
        assert!(result.is_err());
        assert_eq!(batch, before);
    }
}
