//! Verification document storage
//!
//! Documents are written once on upload, read by reviewers, and deleted
//! best-effort with the account.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Upload size limit for identity documents (5 MiB)
pub const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;

/// Content types accepted for identity documents
pub const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "application/pdf"];

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage key: '{0}'")]
    InvalidKey(String),

    #[error("document not found: '{0}'")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A stored document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait DocumentStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<StoredDocument, StorageError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Storage key for a user's document: `<user_id>/<random>.<ext>`
pub fn document_key(user_id: uuid::Uuid, content_type: &str) -> String {
    let ext = match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "application/pdf" => "pdf",
        _ => "bin",
    };
    format!("{}/{}.{}", user_id, uuid::Uuid::new_v4(), ext)
}

/// Keys are relative paths of `[A-Za-z0-9._-]` segments, no `..`.
fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && key.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        });
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_owned()))
    }
}

/// Documents on the local filesystem under a root directory
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn content_type_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".type");
        PathBuf::from(name)
    }
}

#[async_trait]
impl DocumentStorage for FsStorage {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tokio::fs::write(Self::content_type_path(&path), content_type).await?;
        tracing::debug!(key, size = bytes.len(), "document stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredDocument, StorageError> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_owned()))
            }
            Err(e) => return Err(e.into()),
        };
        let content_type = tokio::fs::read_to_string(Self::content_type_path(&path))
            .await
            .unwrap_or_else(|_| "application/octet-stream".to_owned());
        Ok(StoredDocument {
            bytes,
            content_type,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        for target in [Self::content_type_path(&path), path] {
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Documents held in memory (tests, `serve --memory`)
#[derive(Default)]
pub struct MemoryStorage {
    documents: RwLock<HashMap<String, StoredDocument>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStorage for MemoryStorage {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.documents.write().await.insert(
            key.to_owned(),
            StoredDocument {
                bytes: bytes.to_vec(),
                content_type: content_type.to_owned(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredDocument, StorageError> {
        self.documents
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_owned()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.documents.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_traversal_keys() {
        for key in ["", "/etc/passwd", "../x", "a/../b", "a//b", "a/b c", "a\\b"] {
            assert!(validate_key(key).is_err(), "{key:?} should be rejected");
        }
        assert!(validate_key("user/abc-1.png").is_ok());
    }

    #[test]
    fn document_keys_are_valid() {
        let key = document_key(uuid::Uuid::new_v4(), "application/pdf");
        assert!(key.ends_with(".pdf"));
        assert!(validate_key(&key).is_ok());
    }

    #[tokio::test]
    async fn fs_round_trip_and_delete() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path());

        storage.put("u1/doc.png", b"png-bytes", "image/png").await.unwrap();
        let doc = storage.get("u1/doc.png").await.unwrap();
        assert_eq!(doc.bytes, b"png-bytes");
        assert_eq!(doc.content_type, "image/png");

        storage.delete("u1/doc.png").await.unwrap();
        assert!(matches!(
            storage.get("u1/doc.png").await,
            Err(StorageError::NotFound(_))
        ));

        // Second delete is a no-op
        storage.delete("u1/doc.png").await.unwrap();
    }

    #[tokio::test]
    async fn fs_rejects_escape() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path());
        assert!(matches!(
            storage.put("../escape.png", b"x", "image/png").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn memory_storage() {
        let storage = MemoryStorage::new();
        storage.put("k/doc.pdf", b"%PDF", "application/pdf").await.unwrap();
        assert_eq!(storage.len().await, 1);
        storage.delete("k/doc.pdf").await.unwrap();
        assert!(storage.is_empty().await);
    }
}
