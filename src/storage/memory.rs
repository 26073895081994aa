//! In-process object store.

use super::ObjectStore;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A stored object and its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Objects kept in a map, keyed by `(bucket, key)`.
///
/// Writes to keys registered with [`MemoryObjectStore::fail_on`] fail with a
/// backend error, which lets callers exercise partial-failure paths.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    failing_keys: Mutex<HashSet<String>>,
    write_delay: Option<Duration>,
    puts: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `put` by `delay` before it lands.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Seed an object, e.g. the source PDF.
    pub fn insert(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    bytes,
                    content_type: content_type.to_string(),
                },
            );
        }
    }

    /// Make every future write of `key` (in any bucket) fail.
    pub fn fail_on(&self, key: &str) {
        if let Ok(mut keys) = self.failing_keys.lock() {
            keys.insert(key.to_string());
        }
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys present in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| {
                objects
                    .keys()
                    .filter(|(b, _)| b == bucket)
                    .map(|(_, k)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of successful `put` calls so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.object(bucket, key)
            .map(|o| o.bytes)
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failing_keys
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))?
            .contains(key);
        if failing {
            return Err(StoreError::Backend(format!("injected write failure for '{key}'")));
        }

        self.objects
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))?
            .insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    bytes,
                    content_type: content_type.to_string(),
                },
            );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_seeded_object() {
        let store = MemoryObjectStore::new();
        store.insert("in", "a.pdf", b"%PDF-".to_vec(), "application/pdf");
        assert_eq!(store.get("in", "a.pdf").await.unwrap(), b"%PDF-");
        assert!(matches!(
            store.get("other", "a.pdf").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn injected_failure_blocks_only_that_key() {
        let store = MemoryObjectStore::new();
        store.fail_on("x/bad.pdf");
        assert!(store.put("b", "x/bad.pdf", vec![1], "application/pdf").await.is_err());
        store.put("b", "x/good.pdf", vec![1], "application/pdf").await.unwrap();
        assert_eq!(store.keys("b"), vec!["x/good.pdf"]);
        assert_eq!(store.put_count(), 1);
    }
}
