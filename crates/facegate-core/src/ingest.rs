//! Ingestion coordinator: persist a labeled sample, rebuild, publish.
//!
//! Ingestions are serialized through a FIFO gate. A request that arrives
//! while another is in flight waits its turn; it is never rejected. Each
//! ingestion rebuilds the whole index from the store, so a published index
//! always reflects one complete listing of the store.

use crate::embedding::{decode_image, sniff_extension, DecodeError, EmbeddingSource};
use crate::error::ErrorKind;
use crate::index::{rebuild, IndexError, LabelIndex, RebuildOptions};
use crate::store::{validate_label, BlobStore, StoreError};
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{0}")]
    InvalidLabel(#[source] StoreError),
    #[error("image could not be decoded: {0}")]
    InvalidImage(#[from] DecodeError),
    #[error("image decoding timed out")]
    DecodeTimeout,
    #[error("storing sample: {0}")]
    Store(#[source] StoreError),
    #[error("rebuilding index: {0}")]
    Rebuild(#[from] IndexError),
    #[error("decode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::InvalidLabel(_) | IngestError::InvalidImage(_) | IngestError::DecodeTimeout => {
                ErrorKind::InvalidInput
            }
            IngestError::Store(e) => e.kind(),
            IngestError::Rebuild(e) => e.kind(),
            IngestError::Join(_) => ErrorKind::Internal,
        }
    }
}

/// Where the coordinator is in its `Idle -> Ingesting -> Idle` cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    Idle,
    Ingesting,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    /// Store key of the persisted sample.
    pub key: String,
    /// Version of the index published afterwards.
    pub version: u64,
}

/// The only publisher of new [`Index`](crate::Index) snapshots.
pub struct IngestCoordinator {
    store: Arc<dyn BlobStore>,
    source: Arc<dyn EmbeddingSource>,
    index: Arc<LabelIndex>,
    options: RebuildOptions,
    gate: Mutex<()>,
    ingesting: AtomicBool,
}

impl IngestCoordinator {
    pub fn new(
        store: Arc<dyn BlobStore>,
        source: Arc<dyn EmbeddingSource>,
        index: Arc<LabelIndex>,
        options: RebuildOptions,
    ) -> Self {
        Self {
            store,
            source,
            index,
            options,
            gate: Mutex::new(()),
            ingesting: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> &Arc<LabelIndex> {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn state(&self) -> IngestState {
        if self.ingesting.load(Ordering::SeqCst) {
            IngestState::Ingesting
        } else {
            IngestState::Idle
        }
    }

    /// Validate, persist and index one labeled sample.
    ///
    /// Invalid labels and undecodable images are rejected before anything
    /// is written. If the store fails, the current index stays in place.
    pub async fn ingest(&self, label: &str, data: Bytes) -> Result<IngestReceipt, IngestError> {
        let label = validate_label(label).map_err(IngestError::InvalidLabel)?.to_string();

        let candidate = data.clone();
        let decoded = tokio::time::timeout(
            self.options.sample_timeout,
            tokio::task::spawn_blocking(move || decode_image(&candidate).map(|_| ())),
        )
        .await
        .map_err(|_| IngestError::DecodeTimeout)?;
        decoded??;

        let extension = sniff_extension(&data);

        let _turn = self.gate.lock().await;
        let _busy = BusyFlag::raise(&self.ingesting);

        let key = self
            .store
            .put(&label, data, extension)
            .await
            .map_err(IngestError::Store)?;
        tracing::info!(label = %label, key = %key, "sample stored");

        let version = self.rebuild_and_publish().await?;
        Ok(IngestReceipt { key, version })
    }

    /// Rebuild from the store without adding a sample.
    pub async fn reload(&self) -> Result<u64, IngestError> {
        let _turn = self.gate.lock().await;
        let _busy = BusyFlag::raise(&self.ingesting);
        self.rebuild_and_publish().await
    }

    /// Caller must hold the gate.
    async fn rebuild_and_publish(&self) -> Result<u64, IngestError> {
        let previous = self.index.current().version;
        let next = rebuild(self.store.as_ref(), self.source.as_ref(), previous, &self.options).await?;
        Ok(self.index.publish(next).version)
    }
}

/// Sets the flag for as long as it lives, including on early return.
struct BusyFlag<'a>(&'a AtomicBool);

impl<'a> BusyFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
