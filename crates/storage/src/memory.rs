//! In-memory store implementation
//!
//! Provides the façade contract without a database, with the same key
//! reservation and not-found semantics as the SQLite stores

use keel_core::{FieldKind, KeyStrategy, Record, Result, StoreError, Value};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::trait_::{DataStore, SharedStore};

#[derive(Debug)]
struct MemoryTable<T> {
    rows: Vec<T>,
    /// Highest key ever handed out
    sequence: i64,
}

/// In-memory store implementation
#[derive(Debug)]
pub struct MemoryStore<T> {
    table: Mutex<MemoryTable<T>>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            table: Mutex::new(MemoryTable {
                rows: Vec::new(),
                sequence: 0,
            }),
        }
    }
}

impl<T: Record + Clone + Send> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.rows.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryTable<T>>> {
        self.table
            .lock()
            .map_err(|e| StoreError::Execution(e.to_string()))
    }

    fn generates_keys() -> bool {
        T::key_strategy() == KeyStrategy::Generated
            && T::key_descriptor().is_some_and(|k| k.kind == FieldKind::Integer)
    }
}

impl<T: Record + Clone + Send> DataStore<T> for MemoryStore<T> {
    fn load_all(&self) -> Result<Vec<T>> {
        Ok(self.lock()?.rows.clone())
    }

    fn add(&self, batch: &mut [T]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut table = self.lock()?;

        if Self::generates_keys() {
            let counter = table
                .rows
                .iter()
                .filter_map(|r| r.key().as_i64())
                .max()
                .unwrap_or(0)
                .max(table.sequence);
            let originals: Vec<Value> = batch.iter().map(T::key).collect();
            let mut next = counter;
            for index in 0..batch.len() {
                next += 1;
                if let Err(e) = batch[index].set_key(next) {
                    for (item, key) in batch.iter_mut().zip(originals) {
                        item.set_field(T::key_field(), key)?;
                    }
                    return Err(StoreError::Reservation(e.to_string()));
                }
            }
            table.sequence = next;
        }

        let mut seen: Vec<Value> = table.rows.iter().map(T::key).collect();
        for item in batch.iter() {
            let key = item.key();
            if seen.contains(&key) {
                return Err(StoreError::Constraint(format!(
                    "duplicate key {} in {}",
                    key,
                    T::table_name()
                )));
            }
            seen.push(key);
        }
        table.rows.extend(batch.iter().cloned());
        Ok(())
    }

    fn update(&self, batch: &[T]) -> Result<()> {
        let mut table = self.lock()?;
        let mut positions = Vec::with_capacity(batch.len());
        for item in batch {
            let key = item.key();
            let position = table
                .rows
                .iter()
                .position(|r| r.key() == key)
                .ok_or_else(|| StoreError::NotFound(format!("no row matched key {}", key)))?;
            positions.push(position);
        }
        for (position, item) in positions.into_iter().zip(batch) {
            table.rows[position] = item.clone();
        }
        Ok(())
    }

    fn delete(&self, batch: &[T]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let keys: Vec<Value> = batch.iter().map(T::key).collect();
        self.lock()?.rows.retain(|r| !keys.contains(&r.key()));
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.lock()?.rows.clear();
        Ok(())
    }
}

/// Create a new shared in-memory store
pub fn create_memory_store<T>() -> SharedStore<T>
where
    T: Record + Clone + Send + 'static,
{
    Arc::new(MemoryStore::<T>::new())
}
