//! Blocking adapter - async access to synchronous stores
//!
//! Each call runs on tokio's blocking pool so async callers never stall the
//! runtime while SQLite works.

use async_trait::async_trait;
use keel_core::{Result, StoreError};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::trait_::{AsyncDataStore, DataStore};

/// Async wrapper around a shared [`DataStore`]
#[derive(Debug)]
pub struct BlockingStore<S, T> {
    inner: Arc<S>,
    _record: PhantomData<fn() -> T>,
}

impl<S, T> Clone for BlockingStore<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _record: PhantomData,
        }
    }
}

impl<S, T> BlockingStore<S, T>
where
    S: DataStore<T> + 'static,
    T: Send + 'static,
{
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(inner: Arc<S>) -> Self {
        Self {
            inner,
            _record: PhantomData,
        }
    }

    /// The wrapped synchronous store
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }
}

/// Helper to run a blocking store call
async fn run_blocking<R, F>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Execution(e.to_string()))?
}

#[async_trait]
impl<S, T> AsyncDataStore<T> for BlockingStore<S, T>
where
    S: DataStore<T> + 'static,
    T: Send + 'static,
{
    async fn load_all(&self) -> Result<Vec<T>> {
        let store = Arc::clone(&self.inner);
        run_blocking(move || store.load_all()).await
    }

    async fn add(&self, mut batch: Vec<T>) -> Result<Vec<T>> {
        let store = Arc::clone(&self.inner);
        run_blocking(move || {
            store.add(&mut batch)?;
            Ok(batch)
        })
        .await
    }

    async fn update(&self, batch: Vec<T>) -> Result<()> {
        let store = Arc::clone(&self.inner);
        run_blocking(move || store.update(&batch)).await
    }

    async fn delete(&self, batch: Vec<T>) -> Result<()> {
        let store = Arc::clone(&self.inner);
        run_blocking(move || store.delete(&batch)).await
    }

    async fn delete_all(&self) -> Result<()> {
        let store = Arc::clone(&self.inner);
        run_blocking(move || store.delete_all()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use keel_core::impl_record;

    #[derive(Debug, Clone, PartialEq)]
    struct Property {
        property_id: i64,
        name: String,
    }

    impl_record!(Property {
        key property_id,
        name,
    });

    #[tokio::test]
    async fn test_blocking_store_returns_keyed_batch() {
        let store = BlockingStore::new(MemoryStore::<Property>::new());
        let added = store
            .add(vec![
                Property {
                    property_id: 0,
                    name: "north".into(),
                },
                Property {
                    property_id: 0,
                    name: "south".into(),
                },
            ])
            .await
            .unwrap();
        assert_eq!(added[0].property_id, 1);
        assert_eq!(added[1].property_id, 2);

        store.delete(vec![added[0].clone()]).await.unwrap();
        let remaining = store.load_all().await.unwrap();
        assert_eq!(remaining, vec![added[1].clone()]);
    }

    #[tokio::test]
    async fn test_blocking_store_propagates_errors() {
        let store = BlockingStore::new(MemoryStore::<Property>::new());
        let missing = Property {
            property_id: 7,
            name: "ghost".into(),
        };
        let result = store.update(vec![missing]).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
