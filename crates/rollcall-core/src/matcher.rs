use crate::types::{FaceSignature, Gallery, MatchDecision};

/// Default Euclidean tolerance for "same identity".
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// Strategy for deciding which gallery entry, if any, a probe belongs to.
pub trait Matcher {
    fn decide(&self, probe: &FaceSignature, gallery: &Gallery) -> MatchDecision;
}

/// Nearest neighbour under a Euclidean distance threshold.
///
/// Every gallery entry is compared. The smallest distance wins if it is
/// `<= threshold`; equal distances resolve to the entry seen first in
/// gallery iteration order.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn decide(&self, probe: &FaceSignature, gallery: &Gallery) -> MatchDecision {
        let mut best: Option<(&str, f32)> = None;

        for (student_id, enrolled) in gallery.iter() {
            let Some(distance) = probe.euclidean_distance(enrolled) else {
                tracing::warn!(
                    student_id,
                    probe_dim = probe.dimension(),
                    enrolled_dim = enrolled.dimension(),
                    "signature dimension mismatch, entry skipped"
                );
                continue;
            };
            if !distance.is_finite() {
                tracing::warn!(student_id, "non-finite signature distance, entry skipped");
                continue;
            }
            // Strict comparison keeps the first of equidistant entries.
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((student_id, distance));
            }
        }

        match best {
            Some((student_id, distance)) if distance <= self.threshold => MatchDecision::Match {
                student_id: student_id.to_string(),
                distance,
            },
            other => MatchDecision::NoMatch {
                nearest_distance: other.map(|(_, d)| d),
            },
        }
    }
}
