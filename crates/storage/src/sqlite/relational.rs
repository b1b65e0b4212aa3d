//! Relational store - one column per record field

use keel_core::{KeyStrategy, Record, Result, StoreError};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use super::db_core::{Affected, SqliteCore};
use super::mapping::TableMapping;
use super::reservation::{SequenceTarget, assign_keys};
use super::statement;
use crate::trait_::DataStore;

/// Store over a caller-owned table discovered through the catalog
#[derive(Debug)]
pub struct RelationalStore<T> {
    core: Arc<SqliteCore>,
    mapping: TableMapping,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> RelationalStore<T> {
    /// Bind `T` to the table named by [`Record::table_name`]
    pub fn new(core: Arc<SqliteCore>) -> Result<Self> {
        Self::with_table(core, T::table_name())
    }

    pub fn with_table(core: Arc<SqliteCore>, table: &str) -> Result<Self> {
        let info = core
            .catalog()
            .table(table)
            .ok_or_else(|| StoreError::TableMissing(table.to_string()))?;
        let mapping = TableMapping::build::<T>(info, core.delimiter())?;
        debug!(
            "Mapped {} onto table {} ({} columns)",
            std::any::type_name::<T>(),
            mapping.table_name(),
            mapping.columns().len()
        );
        Ok(Self {
            core,
            mapping,
            _record: PhantomData,
        })
    }

    pub fn mapping(&self) -> &TableMapping {
        &self.mapping
    }

    pub fn core(&self) -> &Arc<SqliteCore> {
        &self.core
    }

    fn reserve_into(&self, batch: &mut [T]) -> Result<()> {
        if T::key_strategy() == KeyStrategy::Assigned {
            return Ok(());
        }
        let Some(key) = self.mapping.auto_key() else {
            return Ok(());
        };
        let target = SequenceTarget {
            table: self.mapping.table_name(),
            delimited_table: self.mapping.delimited_table_name(),
            delimited_key: key.delimited_name(),
            uses_sequence: self.mapping.uses_sequence(),
        };
        let range = self.core.reserve_keys(&target, batch.len())?;
        assign_keys(batch, key.field_name, range)
    }
}

impl<T: Record> DataStore<T> for RelationalStore<T> {
    fn load_all(&self) -> Result<Vec<T>> {
        self.core
            .query(&statement::select_all(&self.mapping))?
            .iter_mut()
            .map(T::from_values)
            .collect()
    }

    fn add(&self, batch: &mut [T]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.reserve_into(batch)?;
        let statements = statement::insert_statements(&self.mapping, batch);
        self.core.transact(&statements, Affected::Any)?;
        debug!("Inserted {} rows into {}", batch.len(), self.mapping.table_name());
        Ok(())
    }

    fn update(&self, batch: &[T]) -> Result<()> {
        let statements = statement::update_statements(&self.mapping, batch)?;
        self.core.transact(&statements, Affected::AtLeastOne)?;
        Ok(())
    }

    fn delete(&self, batch: &[T]) -> Result<()> {
        let statements = statement::delete_statements(&self.mapping, batch)?;
        self.core.transact(&statements, Affected::Any)?;
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.core
            .transact(&[statement::delete_all_statement(&self.mapping)], Affected::Any)?;
        Ok(())
    }
}
