//! Result sinks.
//!
//! Workers hand every successfully fetched payload to a [`Store`]. Calls to
//! [`Store::add`] arrive concurrently from all workers, so implementations
//! serialize them internally.

use std::sync::{Mutex, PoisonError};

use serde_json::Value;

/// Append-only sink for fetched payloads.
pub trait Store: Send + Sync + 'static {
    /// Appends one payload.
    fn add(&self, payload: Value);

    /// Returns a snapshot of everything saved so far, in insertion order.
    fn saved_data(&self) -> Vec<Value>;
}

/// In-memory [`Store`] keeping payloads in completion order.
#[derive(Debug, Default)]
pub struct ListStore {
    items: Mutex<Vec<Value>>,
}

impl ListStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads saved.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing has been saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes every saved payload, leaving the store empty.
    pub fn take(&self) -> Vec<Value> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Store for ListStore {
    fn add(&self, payload: Value) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload);
    }

    fn saved_data(&self) -> Vec<Value> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_list_store_keeps_insertion_order() {
        let store = ListStore::new();
        store.add(json!({ "title": "test 1" }));
        store.add(json!({ "title": "test 2" }));

        assert_eq!(
            store.saved_data(),
            vec![json!({ "title": "test 1" }), json!({ "title": "test 2" })]
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_take_empties_store() {
        let store = ListStore::new();
        store.add(json!(1));
        assert_eq!(store.take(), vec![json!(1)]);
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_are_all_kept() {
        let store = Arc::new(ListStore::new());
        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for n in 0..50 {
                    store.add(json!({ "worker": worker, "n": n }));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len(), 400);
    }

    #[test]
    fn test_store_is_object_safe() {
        let store: Arc<dyn Store> = Arc::new(ListStore::new());
        store.add(Value::Null);
        assert_eq!(store.saved_data().len(), 1);
    }
}
