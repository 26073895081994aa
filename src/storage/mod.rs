//! Object storage: where the source PDF comes from and outputs go.
//!
//! The pipeline never talks to a storage SDK directly. It receives an
//! [`ObjectStore`] capability at construction, so the same code runs against
//! S3 in production, a directory on disk from the CLI, and an in-memory map in
//! tests.
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | [`S3ObjectStore`]     | [`s3`]     | production, any S3-compatible endpoint |
//! | [`LocalObjectStore`]  | [`local`]  | CLI runs against a local directory |
//! | [`MemoryObjectStore`] | [`memory`] | tests and embedding callers |

pub mod local;
pub mod memory;
pub mod s3;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

use crate::error::{OutputError, StoreError};
use crate::pipeline::naming::StorageKey;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Content type of every page extract.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Read/write access to objects addressed by `(bucket, key)`.
///
/// `put` must either store the whole buffer or fail; partial objects are
/// never visible.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError>;
}

/// Write side of one invocation: a store bound to the destination bucket.
///
/// Failures surface as [`OutputError::StorageWriteFailed`]; there are no
/// retries at this layer.
#[derive(Clone)]
pub struct ObjectSink {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectSink {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Durably write `bytes` under `key`. Returns the number of bytes written.
    pub async fn put(
        &self,
        key: &StorageKey,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<usize, OutputError> {
        let len = bytes.len();
        self.store
            .put(&self.bucket, key.as_str(), bytes, content_type)
            .await
            .map_err(|e| OutputError::StorageWriteFailed {
                key: key.to_string(),
                detail: e.to_string(),
            })?;
        debug!("Stored {}/{} ({} bytes, {})", self.bucket, key, len, content_type);
        Ok(len)
    }
}

impl std::fmt::Debug for ObjectSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectSink")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}
