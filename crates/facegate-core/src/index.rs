//! Label index: build from the blob store, publish by atomic swap.

use crate::embedding::{decode_image, DecodeError, DetectionError, EmbeddingSource};
use crate::error::ErrorKind;
use crate::store::{BlobStore, StoreError};
use crate::types::{Embedding, Index, LabeledDescriptorSet};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;

pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("listing labels: {0}")]
    Store(#[from] StoreError),
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::Store(e) => e.kind(),
        }
    }
}

/// Knobs for [`rebuild`].
#[derive(Debug, Clone)]
pub struct RebuildOptions {
    /// Budget for decoding plus detecting one sample.
    pub sample_timeout: Duration,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            sample_timeout: DEFAULT_SAMPLE_TIMEOUT,
        }
    }
}

/// Why a stored sample contributed no embedding.
#[derive(Error, Debug)]
enum SkipReason {
    #[error("unreadable: {0}")]
    Read(#[from] StoreError),
    #[error("undecodable: {0}")]
    Decode(#[from] DecodeError),
    #[error("detection failed: {0}")]
    Detection(#[from] DetectionError),
    #[error("no single unambiguous face")]
    NoFace,
    #[error("embedding has {got} dimensions, expected {expected}")]
    Dimension { expected: usize, got: usize },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("decode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Holder of the current [`Index`] snapshot.
///
/// Readers get an `Arc<Index>` and keep it as long as they like; a publish
/// swaps the pointer and never touches a snapshot someone is holding.
#[derive(Debug)]
pub struct LabelIndex {
    current: watch::Sender<Arc<Index>>,
}

impl Default for LabelIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelIndex {
    /// Starts with the empty version-0 index.
    pub fn new() -> Self {
        let (current, _) = watch::channel(Arc::new(Index::empty()));
        Self { current }
    }

    /// Latest published snapshot. Never waits on a rebuild.
    pub fn current(&self) -> Arc<Index> {
        self.current.borrow().clone()
    }

    /// Receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Index>> {
        self.current.subscribe()
    }

    /// Replace the current snapshot in one step.
    pub(crate) fn publish(&self, index: Index) -> Arc<Index> {
        let index = Arc::new(index);
        let previous = self.current.send_replace(index.clone());
        tracing::info!(
            version = index.version,
            previous = previous.version,
            labels = index.label_count(),
            embeddings = index.embedding_count(),
            "index published"
        );
        index
    }
}

/// Build a fresh index from everything in `store`.
///
/// Only failing to list labels aborts the rebuild. A label whose samples
/// cannot be listed, and any sample that cannot be read or decoded, has no
/// single face, or times out, is logged and skipped; the label itself is
/// kept, possibly with no embeddings.
pub async fn rebuild(
    store: &dyn BlobStore,
    source: &dyn EmbeddingSource,
    previous_version: u64,
    options: &RebuildOptions,
) -> Result<Index, IndexError> {
    let started = Instant::now();
    let labels = store.list_labels().await?;
    let dimension = source.dimension();

    let mut entries = BTreeMap::new();
    for label in labels {
        let mut set = LabeledDescriptorSet::new(label.clone());

        match store.list_samples(&label).await {
            Ok(samples) => {
                for key in samples {
                    set.samples_seen += 1;
                    match embed_sample(store, source, &key, dimension, options.sample_timeout).await {
                        Ok(embedding) => set.embeddings.push(embedding),
                        Err(reason) => {
                            set.samples_skipped += 1;
                            tracing::warn!(label = %label, key = %key, %reason, "sample skipped");
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(label = %label, error = %e, "listing samples failed; label kept empty");
            }
        }

        entries.insert(label, set);
    }

    let index = Index {
        version: previous_version + 1,
        dimension,
        built_at: chrono::Utc::now(),
        entries,
    };

    tracing::info!(
        version = index.version,
        labels = index.label_count(),
        embeddings = index.embedding_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "index rebuilt"
    );

    Ok(index)
}

/// Read one sample, decode it and extract its single face embedding,
/// all within `timeout`.
async fn embed_sample(
    store: &dyn BlobStore,
    source: &dyn EmbeddingSource,
    key: &str,
    dimension: usize,
    timeout: Duration,
) -> Result<Embedding, SkipReason> {
    let work = async move {
        let data = store.get(key).await?;
        let image = tokio::task::spawn_blocking(move || decode_image(&data)).await??;
        let face = source.detect_single(image).await?;
        face.ok_or(SkipReason::NoFace)
    };

    let face = tokio::time::timeout(timeout, work)
        .await
        .map_err(|_| SkipReason::Timeout(timeout))??;

    let got = face.embedding.dimension();
    if got != dimension {
        return Err(SkipReason::Dimension {
            expected: dimension,
            got,
        });
    }
    Ok(face.embedding)
}
