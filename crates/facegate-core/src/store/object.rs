use super::{sample_name, validate_label, BlobStore, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;

/// Connection settings for an S3-compatible bucket.
///
/// Credentials are not part of this struct: they come from the standard
/// `AWS_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub prefix: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub allow_http: bool,
}

/// Samples as objects under `<prefix>/<label>/`.
#[derive(Debug, Clone)]
pub struct ObjectBlobStore {
    store: Arc<dyn ObjectStore>,
    prefix: ObjectPath,
    description: String,
}

impl ObjectBlobStore {
    /// Wrap any object store. `prefix` may be empty.
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str) -> Result<Self, StoreError> {
        let description = format!("object:{store}/{prefix}");
        Ok(Self {
            store,
            prefix: ObjectPath::parse(prefix)?,
            description,
        })
    }

    /// Connect to an S3-compatible bucket.
    pub fn s3(settings: &S3Settings) -> Result<Self, StoreError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&settings.bucket)
            .with_allow_http(settings.allow_http);
        if let Some(region) = &settings.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        let store = builder.build()?;

        let mut this = Self::new(Arc::new(store), &settings.prefix)?;
        this.description = format!("s3://{}/{}", settings.bucket, settings.prefix);
        Ok(this)
    }

    /// `<prefix>/<parts...>` without percent-encoding, so labels list back verbatim.
    fn join(&self, parts: &[&str]) -> Result<ObjectPath, StoreError> {
        let mut raw = self.prefix.as_ref().to_string();
        for part in parts {
            if !raw.is_empty() {
                raw.push('/');
            }
            raw.push_str(part);
        }
        Ok(ObjectPath::parse(raw)?)
    }

    fn listing_root(&self) -> Option<&ObjectPath> {
        (!self.prefix.as_ref().is_empty()).then_some(&self.prefix)
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn put(&self, label: &str, data: Bytes, extension: &str) -> Result<String, StoreError> {
        let label = validate_label(label)?;
        let location = self.join(&[label, &sample_name(extension)])?;
        let size = data.len();
        self.store.put(&location, PutPayload::from(data)).await?;

        tracing::debug!(key = %location, bytes = size, "sample uploaded");
        Ok(location.to_string())
    }

    async fn list_labels(&self) -> Result<Vec<String>, StoreError> {
        let listing = self.store.list_with_delimiter(self.listing_root()).await?;
        let mut labels: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename())
            .filter(|name| validate_label(name).is_ok_and(|valid| valid == *name))
            .map(str::to_string)
            .collect();
        labels.sort();
        labels.dedup();
        Ok(labels)
    }

    async fn list_samples(&self, label: &str) -> Result<Vec<String>, StoreError> {
        let label = validate_label(label)?;
        let dir = self.join(&[label])?;
        let listing = self.store.list_with_delimiter(Some(&dir)).await?;

        let mut keys: Vec<String> = listing
            .objects
            .into_iter()
            .filter(|meta| !meta.location.filename().is_some_and(|n| n.starts_with('.')))
            .map(|meta| meta.location.to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let location = ObjectPath::parse(key)?;
        if !location.prefix_matches(&self.prefix) {
            return Err(StoreError::SampleKey(key.to_string()));
        }
        Ok(self.store.get(&location).await?.bytes().await?)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn memory_store(prefix: &str) -> (Arc<InMemory>, ObjectBlobStore) {
        let backend = Arc::new(InMemory::new());
        let store = ObjectBlobStore::new(backend.clone(), prefix).unwrap();
        (backend, store)
    }

    #[tokio::test]
    async fn test_empty_bucket_lists_empty() {
        let (_, store) = memory_store("faces");
        assert!(store.list_labels().await.unwrap().is_empty());
        assert!(store.list_samples("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_then_list_under_prefix() {
        let (backend, store) = memory_store("faces/labels");

        let key = store.put("alice", Bytes::from_static(b"a1"), "png").await.unwrap();
        store.put("alice", Bytes::from_static(b"a2"), "png").await.unwrap();
        store.put("Zoë Smith", Bytes::from_static(b"z1"), "jpg").await.unwrap();

        assert!(key.starts_with("faces/labels/alice/"), "{key}");
        assert_eq!(store.list_labels().await.unwrap(), vec!["Zoë Smith", "alice"]);
        assert_eq!(store.list_samples("alice").await.unwrap().len(), 2);

        let direct = backend.get(&ObjectPath::from(key.as_str())).await.unwrap();
        assert_eq!(direct.bytes().await.unwrap(), Bytes::from_static(b"a1"));
        assert_eq!(store.get(&key).await.unwrap(), Bytes::from_static(b"a1"));
    }

    #[tokio::test]
    async fn test_get_outside_prefix_or_missing_fails() {
        let (backend, store) = memory_store("faces");
        backend
            .put(&ObjectPath::from("other/bob/x.png"), PutPayload::from_static(b"x"))
            .await
            .unwrap();

        assert!(matches!(
            store.get("other/bob/x.png").await,
            Err(StoreError::SampleKey(_))
        ));
        assert!(matches!(
            store.get("faces/bob/missing.png").await,
            Err(StoreError::Object(_))
        ));
    }

    #[tokio::test]
    async fn test_objects_outside_prefix_ignored() {
        let (backend, store) = memory_store("faces");
        backend
            .put(&ObjectPath::from("other/bob/x.png"), PutPayload::from_static(b"x"))
            .await
            .unwrap();
        store.put("carol", Bytes::from_static(b"c"), "png").await.unwrap();

        assert_eq!(store.list_labels().await.unwrap(), vec!["carol"]);
    }

    #[tokio::test]
    async fn test_empty_prefix() {
        let (_, store) = memory_store("");
        let key = store.put("dave", Bytes::from_static(b"d"), "png").await.unwrap();
        assert!(key.starts_with("dave/"));
        assert_eq!(store.list_labels().await.unwrap(), vec!["dave"]);
    }

    #[test]
    fn test_s3_store_builds_offline() {
        let settings = S3Settings {
            bucket: "faces".into(),
            prefix: "prod/labels".into(),
            region: Some("us-east-1".into()),
            endpoint: Some("http://127.0.0.1:9000".into()),
            allow_http: true,
        };
        let store = ObjectBlobStore::s3(&settings).unwrap();
        assert_eq!(store.describe(), "s3://faces/prod/labels");
        assert_eq!(store.prefix.as_ref(), "prod/labels");
    }
}
