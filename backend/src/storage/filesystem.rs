//! Filesystem storage backend.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{StorageBackend, StorageError};
use crate::error::Result;

/// Suffix of in-flight writes. Files with this suffix are never valid blobs.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Filesystem-based storage backend
pub struct FilesystemStorage {
    base_path: PathBuf,
}

impl FilesystemStorage {
    /// Create new filesystem storage
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a key below the base path, rejecting anything that could escape it.
    fn key_to_path(&self, key: &str) -> std::result::Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(relative))
    }

    fn temp_path_for(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}{}", Uuid::new_v4().simple(), TEMP_SUFFIX));
        path.with_file_name(name)
    }
}

/// Create a directory tree, tolerating concurrent creators.
async fn ensure_dir(dir: &Path, key: &str) -> std::result::Result<(), StorageError> {
    match fs::create_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(StorageError::io(key, e)),
    }
}

/// Removes a temporary file when dropped unless the write was committed.
///
/// Covers failed writes and futures dropped mid-write (deadline expiry),
/// so no partial file ever survives at the temporary name.
struct TempFileGuard {
    path: Option<PathBuf>,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn commit(mut self) {
        self.path = None;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), "Failed to remove temp file: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl StorageBackend for FilesystemStorage {
    async fn put(&self, key: &str, content: Bytes) -> Result<()> {
        let path = self.key_to_path(key)?;

        if let Some(parent) = path.parent() {
            ensure_dir(parent, key).await?;
        }

        // Write to a unique temp name, then rename into place
        let temp_path = Self::temp_path_for(&path);
        let guard = TempFileGuard::new(temp_path.clone());

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        file.write_all(&content)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        file.sync_all().await.map_err(|e| StorageError::io(key, e))?;
        drop(file);

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        guard.commit();

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.key_to_path(key)?;
        let content = fs::read(&path)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        Ok(Bytes::from(content))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.key_to_path(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        Ok(())
    }

    async fn copy(&self, source: &str, dest: &str) -> Result<()> {
        let source_path = self.key_to_path(source)?;
        let dest_path = self.key_to_path(dest)?;

        if let Some(parent) = dest_path.parent() {
            ensure_dir(parent, dest).await?;
        }

        let temp_path = Self::temp_path_for(&dest_path);
        let guard = TempFileGuard::new(temp_path.clone());

        fs::copy(&source_path, &temp_path)
            .await
            .map_err(|e| StorageError::io(source, e))?;
        fs::File::open(&temp_path)
            .await
            .map_err(|e| StorageError::io(dest, e))?
            .sync_all()
            .await
            .map_err(|e| StorageError::io(dest, e))?;
        fs::rename(&temp_path, &dest_path)
            .await
            .map_err(|e| StorageError::io(dest, e))?;
        guard.commit();

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let search_path = self.key_to_path(prefix)?;

        let mut keys = Vec::new();
        let mut stack = vec![search_path];

        while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(prefix, e).into()),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io(prefix, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::io(prefix, e))?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.base_path) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn modified(&self, key: &str) -> Result<DateTime<Utc>> {
        let path = self.key_to_path(key)?;
        let modified = fs::metadata(&path)
            .await
            .and_then(|meta| meta.modified())
            .map_err(|e| StorageError::io(key, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_storage() -> (FilesystemStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(temp_dir.path());
        (storage, temp_dir)
    }

    #[tokio::test]
    async fn test_put_get() {
        let (storage, _temp) = create_test_storage();

        let content = Bytes::from("sealed bytes");
        storage
            .put("evidence/2024/case_1/a.enc", content.clone())
            .await
            .unwrap();

        let retrieved = storage.get("evidence/2024/case_1/a.enc").await.unwrap();
        assert_eq!(retrieved, content);
    }

    #[tokio::test]
    async fn test_put_leaves_no_temp_files() {
        let (storage, _temp) = create_test_storage();
        storage
            .put("evidence/x/b.enc", Bytes::from("data"))
            .await
            .unwrap();

        let keys = storage.list("evidence").await.unwrap();
        assert_eq!(keys, vec!["evidence/x/b.enc".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_blob_is_reported_as_missing() {
        let (storage, _temp) = create_test_storage();
        let err = storage.get("evidence/none.enc").await.unwrap_err();
        assert!(matches!(err, AppError::Storage(StorageError::Missing(_))));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (storage, _temp) = create_test_storage();
        for key in ["../outside", "/etc/passwd", "evidence/../../x", ""] {
            let err = storage.put(key, Bytes::from("x")).await.unwrap_err();
            assert!(
                matches!(err, AppError::Storage(StorageError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_copy_and_delete() {
        let (storage, _temp) = create_test_storage();
        storage.put("live/a.enc", Bytes::from("v1")).await.unwrap();
        storage
            .copy("live/a.enc", "versions/7/v1.enc")
            .await
            .unwrap();

        storage.delete("live/a.enc").await.unwrap();
        assert!(!storage.exists("live/a.enc").await.unwrap());
        assert_eq!(
            storage.get("versions/7/v1.enc").await.unwrap(),
            Bytes::from("v1")
        );
    }

    #[tokio::test]
    async fn test_concurrent_writers_share_partition() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FilesystemStorage::new(temp.path()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage
                    .put(
                        &format!("evidence/2024/case_9/{}.enc", i),
                        Bytes::from(vec![i as u8; 32]),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(storage.list("evidence/2024/case_9").await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_modified_time() {
        let (storage, _temp) = create_test_storage();
        let before = Utc::now() - chrono::Duration::seconds(5);
        storage
            .put("evidence/a.enc", Bytes::from_static(b"x"))
            .await
            .unwrap();

        let modified = storage.modified("evidence/a.enc").await.unwrap();
        assert!(modified >= before);
        assert!(matches!(
            storage.modified("evidence/missing.enc").await,
            Err(AppError::Storage(StorageError::Missing(_)))
        ));
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let (storage, _temp) = create_test_storage();
        assert!(storage.list("evidence").await.unwrap().is_empty());
    }
}
