//! Nearest-label matching over an index snapshot.
//!
//! Metric is Euclidean distance; a face matches when its best distance is
//! at most the threshold. Equal distances resolve to the label that sorts
//! first, since entries are visited in lexicographic order and only a
//! strictly smaller distance replaces the current best.

use crate::types::{Embedding, FaceObservation, Index, MatchResult};

/// Default threshold for L2-normalized ArcFace embeddings
/// (distance 1.0 corresponds to cosine similarity 0.5).
pub const DEFAULT_MATCH_THRESHOLD: f32 = 1.0;

/// Strategy for scoring a probe embedding against an index.
pub trait Matcher {
    fn best_match(&self, probe: &Embedding, index: &Index, threshold: f32) -> MatchResult;

    /// One result per observation, in input order.
    fn match_all(&self, observations: &[FaceObservation], index: &Index, threshold: f32) -> Vec<MatchResult> {
        observations
            .iter()
            .map(|obs| self.best_match(&obs.embedding, index, threshold))
            .collect()
    }
}

/// Minimum-Euclidean-distance matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn best_match(&self, probe: &Embedding, index: &Index, threshold: f32) -> MatchResult {
        let mut best: Option<(&str, f32)> = None;

        for (label, set) in &index.entries {
            let Some(label_min) = set
                .embeddings
                .iter()
                .filter_map(|e| probe.euclidean_distance(e))
                .min_by(f32::total_cmp)
            else {
                continue;
            };

            if best.is_none_or(|(_, d)| label_min < d) {
                best = Some((label, label_min));
            }
        }

        match best {
            Some((label, distance)) if distance <= threshold => MatchResult::Known {
                label: label.to_string(),
                distance,
            },
            Some((_, distance)) => MatchResult::Unknown {
                distance: Some(distance),
            },
            None => MatchResult::Unknown { distance: None },
        }
    }
}
