//! Append-only commit log backends
//!
//! A log is a per-repository byte sequence identified by a path like
//! `/commits/<repo>.log`. One batch is appended per poll cycle; batches to
//! different logs never interleave, and each log has exactly one writer
//! task, which is what makes the object backend's read-modify-write append
//! safe to keep.

use crate::config::StorageKind;
use crate::error::StorageError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Trait for append-only log storage
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append `body` to the log at `path`, creating the log if needed.
    /// The batch lands in full or not at all from the caller's view.
    async fn append(&self, path: &str, body: &[u8]) -> Result<(), StorageError>;
}

/// Construct the backend selected by configuration
pub fn make_store(kind: StorageKind, root: &str) -> Result<Arc<dyn LogStore>, StorageError> {
    let store: Arc<dyn LogStore> = match kind {
        StorageKind::Fs => Arc::new(FsLogStore::new(root)),
        StorageKind::Object => Arc::new(ObjectLogStore::new(root)?),
    };
    Ok(store)
}

/// Local-filesystem backend
///
/// Every call opens (or creates) the file in append mode, writes the whole
/// batch, flushes, and closes. No cross-call buffering; the batch is
/// durable to local disk when the call returns.
pub struct FsLogStore {
    base: PathBuf,
}

impl FsLogStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Log paths are absolute-looking (`/commits/...`); they are joined
    /// under the base directory, never treated as filesystem-absolute.
    fn full_path(&self, path: &str) -> PathBuf {
        self.base.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl LogStore for FsLogStore {
    async fn append(&self, path: &str, body: &[u8]) -> Result<(), StorageError> {
        let full = self.full_path(path);
        let body = body.to_vec();
        let log_path = path.to_string();

        tokio::task::spawn_blocking(move || append_file(&full, &body))
            .await
            .map_err(|e| StorageError::WriteFailed {
                path: log_path.clone(),
                reason: format!("append task panicked: {}", e),
            })?
            .map_err(|e| StorageError::WriteFailed {
                path: log_path,
                reason: e.to_string(),
            })
    }
}

fn append_file(full: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(full)?;

    file.write_all(body)?;
    file.flush()?;
    Ok(())
}

/// S3-compatible HTTP object-store backend
///
/// Objects cannot be appended to in place: the existing object is
/// downloaded (a missing object reads as empty), the new batch is
/// concatenated, and the whole object is uploaded again. This
/// read-modify-write is not atomic against concurrent writers to the same
/// key; each repository's log has exactly one writer task.
pub struct ObjectLogStore {
    http: Client,
    base_url: String,
}

impl ObjectLogStore {
    /// Create a store against a bucket base URL, e.g.
    /// `http://minio.internal:9000/commit-logs`
    pub fn new(base_url: &str) -> Result<Self, StorageError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StorageError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, object_key(path))
    }

    async fn download(&self, url: &str, path: &str) -> Result<Vec<u8>, StorageError> {
        let response =
            self.http
                .get(url)
                .send()
                .await
                .map_err(|e| StorageError::ReadFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;

        // First append to this log: nothing stored yet
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        if !response.status().is_success() {
            return Err(StorageError::ReadFailed {
                path: path.to_string(),
                reason: format!("status {}", response.status().as_u16()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::ReadFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        Ok(bytes.to_vec())
    }

    async fn upload(&self, url: &str, path: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let response =
            self.http
                .put(url)
                .body(body)
                .send()
                .await
                .map_err(|e| StorageError::WriteFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;

        if !response.status().is_success() {
            return Err(StorageError::WriteFailed {
                path: path.to_string(),
                reason: format!("status {}", response.status().as_u16()),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl LogStore for ObjectLogStore {
    async fn append(&self, path: &str, body: &[u8]) -> Result<(), StorageError> {
        let url = self.object_url(path);

        let mut object = self.download(&url, path).await?;
        object.extend_from_slice(body);

        self.upload(&url, path, object).await
    }
}

/// Object keys never carry the log path's leading separator
fn object_key(path: &str) -> &str {
    path.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fs_append_creates_log() {
        let dir = tempdir().unwrap();
        let store = FsLogStore::new(dir.path());

        store.append("/commits/demo.log", b"line-1\n").await.unwrap();

        let content = std::fs::read(dir.path().join("commits/demo.log")).unwrap();
        assert_eq!(content, b"line-1\n");
    }

    #[tokio::test]
    async fn test_fs_append_accumulates_across_calls() {
        let dir = tempdir().unwrap();
        let store = FsLogStore::new(dir.path());

        store.append("/commits/demo.log", b"line-1\n").await.unwrap();
        store.append("/commits/demo.log", b"line-2\n").await.unwrap();

        let content = std::fs::read(dir.path().join("commits/demo.log")).unwrap();
        assert_eq!(content, b"line-1\nline-2\n");
    }

    #[tokio::test]
    async fn test_fs_append_empty_batch_leaves_content_unchanged() {
        let dir = tempdir().unwrap();
        let store = FsLogStore::new(dir.path());

        store.append("/commits/demo.log", b"line-1\n").await.unwrap();
        store.append("/commits/demo.log", b"").await.unwrap();

        let content = std::fs::read(dir.path().join("commits/demo.log")).unwrap();
        assert_eq!(content, b"line-1\n");
    }

    #[tokio::test]
    async fn test_fs_logs_for_different_repos_are_disjoint() {
        let dir = tempdir().unwrap();
        let store = FsLogStore::new(dir.path());

        store.append("/commits/alpha.log", b"a\n").await.unwrap();
        store.append("/commits/beta.log", b"b\n").await.unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("commits/alpha.log")).unwrap(),
            b"a\n"
        );
        assert_eq!(
            std::fs::read(dir.path().join("commits/beta.log")).unwrap(),
            b"b\n"
        );
    }

    #[test]
    fn test_full_path_stays_under_base() {
        let store = FsLogStore::new("/var/lib/githarvest");
        assert_eq!(
            store.full_path("/commits/demo.log"),
            PathBuf::from("/var/lib/githarvest/commits/demo.log")
        );
    }

    #[test]
    fn test_object_key_strips_leading_separator() {
        assert_eq!(object_key("/commits/demo.log"), "commits/demo.log");
        assert_eq!(object_key("commits/demo.log"), "commits/demo.log");
    }

    #[test]
    fn test_object_url() {
        let store = ObjectLogStore::new("http://minio.internal:9000/commit-logs/").unwrap();
        assert_eq!(
            store.object_url("/commits/demo.log"),
            "http://minio.internal:9000/commit-logs/commits/demo.log"
        );
    }

    #[test]
    fn test_make_store_selects_backend() {
        let fs = make_store(StorageKind::Fs, "/tmp/logs");
        assert!(fs.is_ok());

        let object = make_store(StorageKind::Object, "http://minio.internal:9000/logs");
        assert!(object.is_ok());
    }
}
