//! Query path: decode an image, detect every face, match each one.

use crate::embedding::{decode_image, DecodeError, DetectionError, EmbeddingSource};
use crate::error::ErrorKind;
use crate::index::{LabelIndex, DEFAULT_SAMPLE_TIMEOUT};
use crate::matcher::{EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
use crate::types::MatchResult;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("image could not be decoded: {0}")]
    InvalidImage(#[from] DecodeError),
    #[error("face detection failed: {0}")]
    Detection(#[from] DetectionError),
    #[error("decode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl VerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::InvalidImage(e) => e.kind(),
            VerifyError::Detection(e) => e.kind(),
            VerifyError::Join(_) => ErrorKind::Internal,
        }
    }
}

/// Matches query images against whatever index is current when they arrive.
pub struct Verifier {
    index: Arc<LabelIndex>,
    source: Arc<dyn EmbeddingSource>,
    threshold: f32,
    timeout: Duration,
}

impl Verifier {
    pub fn new(index: Arc<LabelIndex>, source: Arc<dyn EmbeddingSource>) -> Self {
        Self {
            index,
            source,
            threshold: DEFAULT_MATCH_THRESHOLD,
            timeout: DEFAULT_SAMPLE_TIMEOUT,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// One result per detected face, in detector order. An image with no
    /// faces yields an empty list.
    pub async fn verify(&self, data: &[u8]) -> Result<Vec<MatchResult>, VerifyError> {
        let owned = data.to_vec();
        let image = tokio::task::spawn_blocking(move || decode_image(&owned)).await??;

        let faces = tokio::time::timeout(self.timeout, self.source.detect_all(image))
            .await
            .map_err(|_| DetectionError::Timeout(self.timeout))??;

        // Snapshot taken after detection so the freshest index is used.
        let index = self.index.current();
        let results = EuclideanMatcher.match_all(&faces, &index, self.threshold);

        tracing::debug!(
            faces = faces.len(),
            known = results.iter().filter(|r| r.is_known()).count(),
            index_version = index.version,
            "verification complete"
        );
        Ok(results)
    }
}
