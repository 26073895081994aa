//! S3 (or S3-compatible) object store.
//!
//! The SDK client is handed in by the caller, who owns region, credentials
//! and endpoint configuration. The binary builds one with
//! `aws_config::load_defaults`; Lambda-style hosts reuse theirs.

use super::ObjectStore;
use crate::error::StoreError;
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient AWS configuration (env, profile,
    /// instance metadata).
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StoreError::Backend(format!(
                        "GetObject {bucket}/{key} failed: {}",
                        DisplayErrorContext(&e)
                    ))
                }
            })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Backend(format!("reading body of {bucket}/{key}: {e}")))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                StoreError::Backend(format!(
                    "PutObject {bucket}/{key} failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}
