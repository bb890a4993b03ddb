//! Blob storage for labeled reference samples.
//!
//! Both bindings lay samples out as `<label>/<sample>`: under a directory
//! for [`FsBlobStore`], under a key prefix for [`ObjectBlobStore`].

mod fs;
mod object;

pub use fs::FsBlobStore;
pub use object::{ObjectBlobStore, S3Settings};

use crate::error::ErrorKind;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

const MAX_LABEL_LEN: usize = 128;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid label {label:?}: {reason}")]
    InvalidLabel { label: String, reason: &'static str },
    #[error("filesystem store: {0}")]
    Io(#[from] std::io::Error),
    #[error("object store: {0}")]
    Object(#[from] object_store::Error),
    #[error("object key: {0}")]
    Key(#[from] object_store::path::Error),
    #[error("malformed sample key {0:?}")]
    SampleKey(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidLabel { .. } => ErrorKind::InvalidInput,
            StoreError::Io(_) | StoreError::Object(_) => ErrorKind::StoreUnavailable,
            StoreError::Key(_) | StoreError::SampleKey(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Persistent storage for labeled samples.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist one sample under `label` and return its key.
    async fn put(&self, label: &str, data: Bytes, extension: &str) -> Result<String, StoreError>;

    /// Every label with at least one stored sample location, sorted.
    async fn list_labels(&self) -> Result<Vec<String>, StoreError>;

    /// Keys of every sample stored under `label`, sorted.
    async fn list_samples(&self, label: &str) -> Result<Vec<String>, StoreError>;

    /// Contents of one sample, by a key from [`list_samples`](Self::list_samples) or `put`.
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Human-readable backend description.
    fn describe(&self) -> String;
}

/// Normalize and check a label before it becomes a path segment.
///
/// Returns the trimmed label.
pub fn validate_label(label: &str) -> Result<&str, StoreError> {
    let trimmed = label.trim();
    let reject = |reason| {
        Err(StoreError::InvalidLabel {
            label: label.to_string(),
            reason,
        })
    };

    if trimmed.is_empty() {
        return reject("label is empty");
    }
    if trimmed.len() > MAX_LABEL_LEN {
        return reject("label is longer than 128 bytes");
    }
    if trimmed == "." || trimmed == ".." {
        return reject("label is a relative path component");
    }
    if trimmed.starts_with('.') {
        return reject("label starts with '.'");
    }
    if trimmed.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return reject("label contains a path separator or control character");
    }
    Ok(trimmed)
}

/// Unique sample file name: `<unix-millis>-<8 hex>.<ext>`.
pub(crate) fn sample_name(extension: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{millis}-{}.{extension}", &suffix[..8])
}
