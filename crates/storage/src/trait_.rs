//! Store trait definitions
//!
//! The façade contract shared by every store, in blocking and async form

use async_trait::async_trait;
use keel_core::Result;
use std::sync::Arc;

/// Record store façade
///
/// Every mutating call processes its batch in order and stops at the first
/// failure. `add` writes generated keys back into the batch.
pub trait DataStore<T>: Send + Sync {
    /// Load every record of the table
    fn load_all(&self) -> Result<Vec<T>>;

    fn add(&self, batch: &mut [T]) -> Result<()>;

    fn update(&self, batch: &[T]) -> Result<()>;

    fn delete(&self, batch: &[T]) -> Result<()>;

    fn delete_all(&self) -> Result<()>;

    fn add_one(&self, item: &mut T) -> Result<()> {
        self.add(std::slice::from_mut(item))
    }

    fn update_one(&self, item: &T) -> Result<()> {
        self.update(std::slice::from_ref(item))
    }

    fn delete_one(&self, item: &T) -> Result<()> {
        self.delete(std::slice::from_ref(item))
    }
}

/// Async form of [`DataStore`]; batches move in and out by value
#[async_trait]
pub trait AsyncDataStore<T: Send + 'static>: Send + Sync {
    async fn load_all(&self) -> Result<Vec<T>>;

    /// Insert the batch and hand it back with generated keys filled in
    async fn add(&self, batch: Vec<T>) -> Result<Vec<T>>;

    async fn update(&self, batch: Vec<T>) -> Result<()>;

    async fn delete(&self, batch: Vec<T>) -> Result<()>;

    async fn delete_all(&self) -> Result<()>;
}

/// Shared store reference
pub type SharedStore<T> = Arc<dyn DataStore<T>>;
