//! Embedding source seam and image decoding.
//!
//! The matcher never sees pixels: an [`EmbeddingSource`] turns a decoded
//! image into face observations, and everything downstream works on those.

use crate::error::ErrorKind;
use crate::types::FaceObservation;
use async_trait::async_trait;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use thiserror::Error;

/// Minimum confidence lead the best face needs over the runner-up before a
/// multi-face sample counts as a single-face sample.
pub const AMBIGUITY_MARGIN: f32 = 0.10;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image payload is empty")]
    Empty,
    #[error("unrecognized image format: {0}")]
    Format(#[source] std::io::Error),
    #[error("could not decode image: {0}")]
    Image(#[from] image::ImageError),
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("engine: {0}")]
    Engine(#[from] crate::engine::EngineError),
    #[error("detection timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("{0}")]
    Other(String),
}

impl DetectionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::DetectionFailure
    }
}

/// Decode an uploaded or stored image, sniffing the format from its bytes.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(DecodeError::Format)?;
    Ok(reader.decode()?)
}

/// File extension for a payload, used when naming stored samples.
pub fn sniff_extension(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("bin")
}

/// Turns decoded images into face observations with fixed-dimension embeddings.
#[async_trait]
pub trait EmbeddingSource: Send + Sync {
    /// Embedding dimension `D` produced by this source.
    fn dimension(&self) -> usize;

    /// Every face in the image. Order is detector-defined but stable within one call.
    async fn detect_all(&self, image: DynamicImage) -> Result<Vec<FaceObservation>, DetectionError>;

    /// The single face of a reference sample, or `None` if there is no face
    /// or the sample is ambiguous.
    async fn detect_single(&self, image: DynamicImage) -> Result<Option<FaceObservation>, DetectionError> {
        Ok(pick_single(self.detect_all(image).await?))
    }
}

/// Reduce a detection list to one unambiguous face.
///
/// Several faces are accepted only when the most confident one leads the
/// runner-up by at least [`AMBIGUITY_MARGIN`].
pub fn pick_single(mut faces: Vec<FaceObservation>) -> Option<FaceObservation> {
    faces.sort_by(|a, b| b.bounding_box.confidence.total_cmp(&a.bounding_box.confidence));
    match faces.len() {
        0 => None,
        1 => faces.pop(),
        _ => {
            let lead = faces[0].bounding_box.confidence - faces[1].bounding_box.confidence;
            if lead >= AMBIGUITY_MARGIN {
                faces.into_iter().next()
            } else {
                None
            }
        }
    }
}
