//! Deterministic stand-ins for tests that cannot load ONNX models.
//!
//! [`ColorFaces`] treats every non-black pixel in the top row of an image as
//! one face whose embedding is that pixel's RGB color scaled to [0, 1].
//! [`strip_png`] builds matching images.

use crate::embedding::{DetectionError, EmbeddingSource};
use crate::types::{BoundingBox, Embedding, FaceObservation};
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const BLACK: [u8; 3] = [0, 0, 0];

/// Fake embedding source keyed on pixel colors.
#[derive(Debug, Default)]
pub struct ColorFaces {
    /// Images containing this color never finish detection.
    stall_on: Option<[u8; 3]>,
    /// Images containing this color fail detection.
    fail_on: Option<[u8; 3]>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ColorFaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stall_on(mut self, color: [u8; 3]) -> Self {
        self.stall_on = Some(color);
        self
    }

    pub fn fail_on(mut self, color: [u8; 3]) -> Self {
        self.fail_on = Some(color);
        self
    }

    /// Sleep this long in every detection call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `detect_all` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// The embedding [`ColorFaces`] reports for a face of `color`.
pub fn color_embedding(color: [u8; 3]) -> Embedding {
    Embedding::new(color.iter().map(|&c| c as f32 / 255.0).collect())
}

#[async_trait]
impl EmbeddingSource for ColorFaces {
    fn dimension(&self) -> usize {
        3
    }

    async fn detect_all(&self, image: DynamicImage) -> Result<Vec<FaceObservation>, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let rgb = image.to_rgb8();
        let colors: Vec<[u8; 3]> = (0..rgb.width()).map(|x| rgb.get_pixel(x, 0).0).collect();

        if self.stall_on.is_some_and(|c| colors.contains(&c)) {
            std::future::pending::<()>().await;
        }
        if self.fail_on.is_some_and(|c| colors.contains(&c)) {
            return Err(DetectionError::Other("injected detector failure".into()));
        }

        Ok(colors
            .into_iter()
            .enumerate()
            .filter(|(_, c)| *c != BLACK)
            .map(|(x, c)| FaceObservation {
                embedding: color_embedding(c),
                bounding_box: BoundingBox {
                    x: x as f32,
                    y: 0.0,
                    width: 1.0,
                    height: 1.0,
                    confidence: 0.9,
                    landmarks: None,
                },
            })
            .collect())
    }
}

/// A one-pixel-high PNG with one pixel per color, left to right.
pub fn strip_png(colors: &[[u8; 3]]) -> Bytes {
    let width = colors.len().max(1) as u32;
    let image = RgbImage::from_fn(width, 1, |x, _| Rgb(colors.get(x as usize).copied().unwrap_or(BLACK)));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("PNG encoding of an in-memory buffer");
    Bytes::from(out.into_inner())
}
