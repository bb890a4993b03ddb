//! ONNX-backed embedding source.
//!
//! Each worker runs on a dedicated OS thread that owns its own SCRFD and
//! ArcFace sessions (inference needs `&mut`). Async callers talk to the
//! workers through bounded channels and await a oneshot reply.

use crate::detector::{DetectorError, FaceDetector};
use crate::embedding::{DetectionError, EmbeddingSource};
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_EMBEDDING_DIM};
use crate::types::FaceObservation;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const REQUEST_QUEUE_DEPTH: usize = 8;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Model locations and worker count for [`spawn_engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
    pub workers: usize,
}

struct DetectRequest {
    image: DynamicImage,
    reply: oneshot::Sender<Result<Vec<FaceObservation>, EngineError>>,
}

/// Clone-safe handle to the engine workers.
#[derive(Clone)]
pub struct EngineHandle {
    workers: Arc<Vec<mpsc::Sender<DetectRequest>>>,
    next: Arc<AtomicUsize>,
}

impl EngineHandle {
    /// Detect every face in `image` and extract its embedding.
    pub async fn detect(&self, image: DynamicImage) -> Result<Vec<FaceObservation>, EngineError> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.workers[slot]
            .send(DetectRequest {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

#[async_trait]
impl EmbeddingSource for EngineHandle {
    fn dimension(&self) -> usize {
        ARCFACE_EMBEDDING_DIM
    }

    async fn detect_all(&self, image: DynamicImage) -> Result<Vec<FaceObservation>, DetectionError> {
        Ok(self.detect(image).await?)
    }
}

/// Load the models and start the worker threads.
///
/// Every worker loads its sessions before this returns, so a missing or
/// broken model file fails here rather than on the first request.
pub fn spawn_engine(config: &EngineConfig) -> Result<EngineHandle, EngineError> {
    let workers = config.workers.max(1);
    let mut senders = Vec::with_capacity(workers);

    for id in 0..workers {
        let mut detector = FaceDetector::load(&config.detector_model)?;
        let mut recognizer = FaceRecognizer::load(&config.recognizer_model)?;
        let (tx, mut rx) = mpsc::channel::<DetectRequest>(REQUEST_QUEUE_DEPTH);

        std::thread::Builder::new()
            .name(format!("facegate-engine-{id}"))
            .spawn(move || {
                tracing::info!(worker = id, "engine thread started");
                while let Some(req) = rx.blocking_recv() {
                    let result = run_detect(&mut detector, &mut recognizer, &req.image);
                    let _ = req.reply.send(result);
                }
                tracing::info!(worker = id, "engine thread exiting");
            })
            .map_err(EngineError::Spawn)?;

        senders.push(tx);
    }

    tracing::info!(
        workers,
        detector = %config.detector_model.display(),
        recognizer = %config.recognizer_model.display(),
        "face engine ready"
    );

    Ok(EngineHandle {
        workers: Arc::new(senders),
        next: Arc::new(AtomicUsize::new(0)),
    })
}

/// Detect faces, then embed each one that came with landmarks.
fn run_detect(
    detector: &mut FaceDetector,
    recognizer: &mut FaceRecognizer,
    image: &DynamicImage,
) -> Result<Vec<FaceObservation>, EngineError> {
    let rgb = image.to_rgb8();
    let faces = detector.detect(&rgb)?;
    tracing::debug!(faces = faces.len(), width = rgb.width(), height = rgb.height(), "detect");

    let mut observations = Vec::with_capacity(faces.len());
    for face in faces {
        if face.landmarks.is_none() {
            tracing::debug!(confidence = face.confidence, "face without landmarks skipped");
            continue;
        }
        let embedding = recognizer.extract(&rgb, &face)?;
        observations.push(FaceObservation {
            embedding,
            bounding_box: face,
        });
    }
    Ok(observations)
}
