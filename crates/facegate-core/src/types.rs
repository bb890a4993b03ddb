use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings.
    ///
    /// Returns `None` when the dimensions differ; such embeddings come from
    /// different models and are not comparable.
    pub fn euclidean_distance(&self, other: &Embedding) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        let sum = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>();
        Some(sum.sqrt())
    }
}

/// One face found by an embedding source. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceObservation {
    pub embedding: Embedding,
    pub bounding_box: BoundingBox,
}

/// All usable reference embeddings for one label.
///
/// `embeddings` is empty when no stored sample for the label yielded a
/// usable face; such a label can be listed but never matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledDescriptorSet {
    pub label: String,
    pub embeddings: Vec<Embedding>,
    /// Number of stored samples examined for this label.
    pub samples_seen: usize,
    /// Number of samples skipped (undecodable, no face, ambiguous, timed out).
    pub samples_skipped: usize,
}

impl LabeledDescriptorSet {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            embeddings: Vec::new(),
            samples_seen: 0,
            samples_skipped: 0,
        }
    }
}

/// Immutable snapshot of every label and its reference embeddings.
///
/// Entries are keyed in a `BTreeMap` so iteration order is lexicographic by
/// label; the matcher relies on this for its tie-break.
#[derive(Debug, Clone)]
pub struct Index {
    pub version: u64,
    /// Embedding dimension of the source that built this index (0 for the empty start index).
    pub dimension: usize,
    pub built_at: chrono::DateTime<chrono::Utc>,
    pub entries: BTreeMap<String, LabeledDescriptorSet>,
}

impl Index {
    /// The version-0 index every service starts with.
    pub fn empty() -> Self {
        Self {
            version: 0,
            dimension: 0,
            built_at: chrono::Utc::now(),
            entries: BTreeMap::new(),
        }
    }

    pub fn label_count(&self) -> usize {
        self.entries.len()
    }

    pub fn embedding_count(&self) -> usize {
        self.entries.values().map(|s| s.embeddings.len()).sum()
    }

    pub fn get(&self, label: &str) -> Option<&LabeledDescriptorSet> {
        self.entries.get(label)
    }

    /// True when both indexes hold the same labels and embedding sets,
    /// regardless of version or build time.
    pub fn same_contents(&self, other: &Index) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((la, a), (lb, b))| la == lb && a.embeddings == b.embeddings)
    }
}

/// Outcome of matching one face against an index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchResult {
    Known { label: String, distance: f32 },
    /// No label within threshold. `distance` is the best distance found, or
    /// `None` if there was nothing to compare against (infinite distance).
    Unknown { distance: Option<f32> },
}

impl MatchResult {
    pub fn label(&self) -> &str {
        match self {
            MatchResult::Known { label, .. } => label,
            MatchResult::Unknown { .. } => UNKNOWN_LABEL,
        }
    }

    pub fn distance(&self) -> f32 {
        match self {
            MatchResult::Known { distance, .. } => *distance,
            MatchResult::Unknown { distance } => distance.unwrap_or(f32::INFINITY),
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, MatchResult::Known { .. })
    }
}

pub const UNKNOWN_LABEL: &str = "unknown";

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchResult::Known { label, distance } => {
                write!(f, "{label} (distance: {distance:.2})")
            }
            MatchResult::Unknown { .. } => f.write_str(UNKNOWN_LABEL),
        }
    }
}
