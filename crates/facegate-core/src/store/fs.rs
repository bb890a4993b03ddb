use super::{sample_name, validate_label, BlobStore, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Samples as files under `<root>/<label>/`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Non-hidden entries of `dir` for which `keep` holds, sorted by name.
    /// A missing directory reads as empty.
    async fn read_names(
        dir: &Path,
        keep: impl Fn(&std::fs::FileType) -> bool,
    ) -> Result<Vec<String>, StoreError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                tracing::warn!(path = %entry.path().display(), "skipping non-UTF-8 entry");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if keep(&entry.file_type().await?) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, label: &str, data: Bytes, extension: &str) -> Result<String, StoreError> {
        let label = validate_label(label)?;
        let dir = self.root.join(label);
        fs::create_dir_all(&dir).await?;

        let name = sample_name(extension);
        // Hidden temp name: listings skip it until the rename lands.
        let tmp = dir.join(format!(".{name}.partial"));
        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, dir.join(&name)).await?;

        let key = format!("{label}/{name}");
        tracing::debug!(key, bytes = data.len(), "sample written");
        Ok(key)
    }

    async fn list_labels(&self) -> Result<Vec<String>, StoreError> {
        let mut labels = Self::read_names(&self.root, |t| t.is_dir()).await?;
        labels.retain(|name| validate_label(name).is_ok_and(|valid| valid == name));
        Ok(labels)
    }

    async fn list_samples(&self, label: &str) -> Result<Vec<String>, StoreError> {
        let label = validate_label(label)?;
        let names = Self::read_names(&self.root.join(label), |t| t.is_file()).await?;
        Ok(names.into_iter().map(|name| format!("{label}/{name}")).collect())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let bad_key = || StoreError::SampleKey(key.to_string());
        let (label, name) = key.split_once('/').ok_or_else(bad_key)?;
        let label = validate_label(label)?;
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(bad_key());
        }
        Ok(Bytes::from(fs::read(self.root.join(label).join(name)).await?))
    }

    fn describe(&self) -> String {
        format!("fs:{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_missing_root_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("does-not-exist"));
        assert!(store.list_labels().await.unwrap().is_empty());
        assert!(store.list_samples("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let k1 = store.put("bob", Bytes::from_static(b"one"), "png").await.unwrap();
        let k2 = store.put("alice", Bytes::from_static(b"two"), "jpg").await.unwrap();
        store.put("alice", Bytes::from_static(b"three"), "jpg").await.unwrap();

        assert!(k1.starts_with("bob/") && k1.ends_with(".png"));
        assert!(k2.starts_with("alice/"));
        assert_eq!(store.list_labels().await.unwrap(), vec!["alice", "bob"]);

        let keys = store.list_samples("alice").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&k2));
        let mut payloads = Vec::new();
        for key in &keys {
            payloads.push(store.get(key).await.unwrap());
        }
        payloads.sort();
        assert_eq!(payloads, vec![Bytes::from_static(b"three"), Bytes::from_static(b"two")]);
    }

    #[tokio::test]
    async fn test_hidden_and_stray_entries_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("carol", Bytes::from_static(b"x"), "png").await.unwrap();

        std::fs::write(dir.path().join("stray.txt"), b"not a label").unwrap();
        std::fs::create_dir(dir.path().join(".cache")).unwrap();
        std::fs::write(dir.path().join("carol/.DS_Store"), b"junk").unwrap();
        std::fs::create_dir(dir.path().join("carol/nested")).unwrap();

        assert_eq!(store.list_labels().await.unwrap(), vec!["carol"]);
        assert_eq!(store.list_samples("carol").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_rejects_malformed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        for key in ["no-slash", "alice/", "alice/.hidden", "alice/../x", "../etc/passwd"] {
            assert!(store.get(key).await.is_err(), "{key:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn test_get_of_removed_sample_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let key = store.put("alice", Bytes::from_static(b"x"), "png").await.unwrap();
        std::fs::remove_file(dir.path().join(&key)).unwrap();

        let err = store.get(&key).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    }

    #[tokio::test]
    async fn test_put_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let err = store.put("../escape", Bytes::from_static(b"x"), "png").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidLabel { .. }));
    }
}
