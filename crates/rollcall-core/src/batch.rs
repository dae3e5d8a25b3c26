//! Identify everyone present across a set of class photos.

use std::collections::HashSet;

use serde::Serialize;

use crate::decoder::ImageInput;
use crate::extractor::SignatureExtractor;
use crate::locator::FaceLocator;
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::pipeline::{FacePipeline, PipelineError};
use crate::types::{FaceRegion, Gallery, MatchDecision};

/// A student recognized for the first time in this batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identification {
    pub student_id: String,
    pub distance: f32,
    /// Index of the image in the batch the student was found in.
    pub image_index: usize,
    pub region: FaceRegion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    Decode(String),
    NoFace,
    Locate(String),
    Extract(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedImage {
    pub image_index: usize,
    pub reason: SkipReason,
}

/// Everything one batch call found.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    /// One entry per student, in the order they were first recognized.
    pub identified: Vec<Identification>,
    pub skipped: Vec<SkippedImage>,
    /// Faces that matched nobody in the gallery.
    pub unmatched_faces: usize,
    /// Faces that matched a student already identified in this call.
    pub repeat_faces: usize,
}

impl BatchOutcome {
    pub fn count(&self) -> usize {
        self.identified.len()
    }

    pub fn student_ids(&self) -> impl Iterator<Item = &str> {
        self.identified.iter().map(|i| i.student_id.as_str())
    }
}

/// Runs locate → extract → match over every image against one gallery.
///
/// A student is reported at most once per call. Images that fail to decode,
/// contain no face, or fail in the models are skipped, never fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchIdentifier {
    matcher: EuclideanMatcher,
}

impl BatchIdentifier {
    pub fn new(matcher: EuclideanMatcher) -> Self {
        Self { matcher }
    }

    pub fn identify_batch<L, X>(
        &self,
        pipeline: &mut FacePipeline<L, X>,
        images: &[ImageInput],
        gallery: &Gallery,
    ) -> BatchOutcome
    where
        L: FaceLocator,
        X: SignatureExtractor,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut outcome = BatchOutcome::default();

        for (image_index, image) in images.iter().enumerate() {
            let faces = match pipeline.faces(image) {
                Ok(faces) if faces.is_empty() => {
                    tracing::debug!(image = image_index, "no face in image, skipped");
                    outcome.skipped.push(SkippedImage {
                        image_index,
                        reason: SkipReason::NoFace,
                    });
                    continue;
                }
                Ok(faces) => faces,
                Err(err) => {
                    tracing::warn!(image = image_index, error = %err, "image skipped");
                    outcome.skipped.push(SkippedImage {
                        image_index,
                        reason: skip_reason(&err),
                    });
                    continue;
                }
            };

            tracing::debug!(image = image_index, faces = faces.len(), "matching faces");

            for face in faces {
                match self.matcher.decide(&face.signature, gallery) {
                    MatchDecision::Match {
                        student_id,
                        distance,
                    } => {
                        if seen.contains(&student_id) {
                            outcome.repeat_faces += 1;
                            continue;
                        }
                        tracing::info!(
                            student_id = %student_id,
                            image = image_index,
                            distance,
                            "student identified"
                        );
                        seen.insert(student_id.clone());
                        outcome.identified.push(Identification {
                            student_id,
                            distance,
                            image_index,
                            region: face.region,
                        });
                    }
                    MatchDecision::NoMatch { nearest_distance } => {
                        tracing::debug!(image = image_index, ?nearest_distance, "face not recognized");
                        outcome.unmatched_faces += 1;
                    }
                }
            }
        }

        outcome
    }
}

fn skip_reason(err: &PipelineError) -> SkipReason {
    match err {
        PipelineError::Decode(e) => SkipReason::Decode(e.to_string()),
        PipelineError::Locate(e) => SkipReason::Locate(e.to_string()),
        PipelineError::Extract(e) => SkipReason::Extract(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn class_gallery() -> Gallery {
        vec![
            ("S1", color_signature(RED)),
            ("S2", color_signature(GREEN)),
            ("S3", color_signature(BLUE)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_identifies_everyone_in_one_photo() {
        let outcome = BatchIdentifier::default().identify_batch(
            &mut tile_pipeline(),
            &[tiles_capture(&[BLUE, BLACK, RED])],
            &class_gallery(),
        );
        let ids: Vec<&str> = outcome.student_ids().collect();
        assert_eq!(ids, vec!["S3", "S1"]);
        assert_eq!(outcome.count(), 2);
        assert_eq!(outcome.identified[1].region.left, 2 * TILE);
    }

    #[test]
    fn test_duplicate_photo_counts_once() {
        let photo = tiles_capture(&[RED]);
        let outcome = BatchIdentifier::default().identify_batch(
            &mut tile_pipeline(),
            &[photo.clone(), photo],
            &class_gallery(),
        );
        assert_eq!(outcome.count(), 1);
        assert_eq!(outcome.identified[0].student_id, "S1");
        assert_eq!(outcome.identified[0].image_index, 0);
        assert_eq!(outcome.repeat_faces, 1);
    }

    #[test]
    fn test_same_student_twice_in_one_photo() {
        let outcome = BatchIdentifier::default().identify_batch(
            &mut tile_pipeline(),
            &[tiles_capture(&[GREEN, GREEN])],
            &class_gallery(),
        );
        assert_eq!(outcome.count(), 1);
        assert_eq!(outcome.repeat_faces, 1);
    }

    #[test]
    fn test_unknown_face_is_ignored() {
        let outcome = BatchIdentifier::default().identify_batch(
            &mut tile_pipeline(),
            &[tiles_capture(&[WHITE, RED])],
            &class_gallery(),
        );
        let ids: Vec<&str> = outcome.student_ids().collect();
        assert_eq!(ids, vec!["S1"]);
        assert_eq!(outcome.unmatched_faces, 1);
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn test_bad_images_are_skipped() {
        let outcome = BatchIdentifier::default().identify_batch(
            &mut tile_pipeline(),
            &[
                ImageInput::Bytes(Vec::new()),
                ImageInput::Base64("data:image/png;base64,!!!".into()),
                tiles_capture(&[BLACK]),
                tiles_capture(&[GREEN]),
            ],
            &class_gallery(),
        );
        let ids: Vec<&str> = outcome.student_ids().collect();
        assert_eq!(ids, vec!["S2"]);
        assert_eq!(outcome.identified[0].image_index, 3);

        let reasons: Vec<(usize, &SkipReason)> = outcome
            .skipped
            .iter()
            .map(|s| (s.image_index, &s.reason))
            .collect();
        assert_eq!(reasons.len(), 3);
        assert!(matches!(reasons[0], (0, SkipReason::Decode(_))));
        assert!(matches!(reasons[1], (1, SkipReason::Decode(_))));
        assert_eq!(reasons[2], (2, &SkipReason::NoFace));
    }

    #[test]
    fn test_locator_failure_skips_image() {
        let mut pipeline = FacePipeline::new(BrokenLocator, MeanColorExtractor);
        let outcome = BatchIdentifier::default().identify_batch(
            &mut pipeline,
            &[tiles_capture(&[RED])],
            &class_gallery(),
        );
        assert_eq!(outcome.count(), 0);
        assert!(matches!(outcome.skipped[0].reason, SkipReason::Locate(_)));
    }

    #[test]
    fn test_empty_batch_and_empty_gallery() {
        let identifier = BatchIdentifier::default();
        let outcome = identifier.identify_batch(&mut tile_pipeline(), &[], &class_gallery());
        assert_eq!(outcome.count(), 0);

        let outcome =
            identifier.identify_batch(&mut tile_pipeline(), &[tiles_capture(&[RED])], &Gallery::new());
        assert_eq!(outcome.count(), 0);
        assert_eq!(outcome.unmatched_faces, 1);
    }

    #[test]
    fn test_dedup_is_scoped_to_one_call() {
        let identifier = BatchIdentifier::default();
        let mut pipeline = tile_pipeline();
        let images = [tiles_capture(&[RED])];
        let first = identifier.identify_batch(&mut pipeline, &images, &class_gallery());
        let second = identifier.identify_batch(&mut pipeline, &images, &class_gallery());
        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 1);
    }

    #[test]
    fn test_near_colour_within_threshold_matches() {
        // A slightly darker red is still S1; halfway to green is nobody.
        let gallery = class_gallery();
        let outcome = BatchIdentifier::new(EuclideanMatcher::new(0.5)).identify_batch(
            &mut tile_pipeline(),
            &[tiles_capture(&[[230, 20, 0], [128, 128, 0]])],
            &gallery,
        );
        let ids: Vec<&str> = outcome.student_ids().collect();
        assert_eq!(ids, vec!["S1"]);
        assert_eq!(outcome.unmatched_faces, 1);
    }
}
