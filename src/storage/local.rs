//! Directory-backed object store.
//!
//! Layout: `{root}/{bucket}/{key}`, with the declared content type stored
//! next to each object in `{key}.content-type`. Writes go to a temporary file
//! in the same directory and are renamed into place, so readers never see a
//! half-written object.

use super::ObjectStore;
use crate::error::StoreError;
use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const CONTENT_TYPE_SUFFIX: &str = ".content-type";

#[derive(Debug)]
pub struct LocalObjectStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `(bucket, key)` to a path under the root.
    ///
    /// Absolute keys and `..` segments are rejected so a key can never escape
    /// its bucket directory.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for part in [bucket, key] {
            let rel = Path::new(part);
            if part.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
                return Err(StoreError::Backend(format!(
                    "'{part}' is not a valid relative object path"
                )));
            }
            path.push(rel);
        }
        Ok(path)
    }

    /// Content type recorded for an object, if any.
    pub async fn content_type(&self, bucket: &str, key: &str) -> Result<Option<String>, StoreError> {
        let path = sidecar(&self.object_path(bucket, key)?);
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(format!(".{}.{n}.tmp", std::process::id()));
        let tmp_path = path.with_file_name(tmp_name);

        tokio::fs::write(&tmp_path, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
        Ok(())
    }
}

fn sidecar(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(CONTENT_TYPE_SUFFIX);
    path.with_file_name(name)
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StoreError::Io(e)
            }
        })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.write_atomic(&sidecar(&path), content_type.as_bytes()).await?;
        self.write_atomic(&path, &bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips_with_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        store
            .put("bucket", "docs/0.webp", vec![9, 8, 7], "image/webp")
            .await
            .unwrap();

        assert_eq!(store.get("bucket", "docs/0.webp").await.unwrap(), vec![9, 8, 7]);
        assert_eq!(
            store.content_type("bucket", "docs/0.webp").await.unwrap().as_deref(),
            Some("image/webp")
        );
        assert!(dir.path().join("bucket/docs/0.webp").is_file());
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(matches!(
            store.get("bucket", "nope.pdf").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn no_temp_files_are_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.put("b", "a.pdf", vec![1; 100], "application/pdf").await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path().join("b"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.pdf", "a.pdf.content-type"]);
    }

    #[test]
    fn escaping_keys_are_rejected() {
        let store = LocalObjectStore::new("/srv/objects");
        assert!(store.object_path("b", "../etc/passwd").is_err());
        assert!(store.object_path("b", "/abs.pdf").is_err());
        assert!(store.object_path("..", "a.pdf").is_err());
        assert!(store.object_path("b", "").is_err());
        assert_eq!(
            store.object_path("b", "docs/a b.pdf").unwrap(),
            PathBuf::from("/srv/objects/b/docs/a b.pdf")
        );
    }
}
