//! facegate-core: labeled face index and matcher.
//!
//! Reference images live in a [`BlobStore`] under one prefix per label.
//! The [`IngestCoordinator`] persists new samples and rebuilds the
//! [`Index`] from the store; the [`Verifier`] matches query faces against
//! whichever index snapshot is current. Detection and embedding go through
//! an [`EmbeddingSource`], backed in production by SCRFD + ArcFace on ONNX
//! Runtime (see [`engine`]).

pub mod alignment;
pub mod detector;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod ingest;
pub mod matcher;
pub mod recognizer;
pub mod store;
pub mod types;
pub mod verify;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use embedding::{decode_image, DecodeError, DetectionError, EmbeddingSource};
pub use engine::{spawn_engine, EngineConfig, EngineError, EngineHandle};
pub use error::ErrorKind;
pub use index::{rebuild, IndexError, LabelIndex, RebuildOptions};
pub use ingest::{IngestCoordinator, IngestError, IngestReceipt, IngestState};
pub use matcher::{EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use store::{BlobStore, FsBlobStore, ObjectBlobStore, S3Settings, StoreError};
pub use types::{BoundingBox, Embedding, FaceObservation, Index, LabeledDescriptorSet, MatchResult};
pub use verify::{VerifyError, Verifier};
