use serde::Serialize;

use crate::decoder::ImageInput;
use crate::directory::DirectoryStore;
use crate::error::AttendanceError;
use crate::extractor::SignatureExtractor;
use crate::locator::FaceLocator;
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::pipeline::FacePipeline;
use crate::types::{Gallery, MatchDecision};

/// Result of checking a capture against one student's enrolled face.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Verification {
    Verified { distance: f32 },
    /// `distance` is `None` when the enrolled signature has a different dimension.
    Mismatch { distance: Option<f32> },
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified { .. })
    }
}

/// Single-probe verification of a claimed identity.
pub struct Verifier<S> {
    store: S,
    matcher: EuclideanMatcher,
}

impl<S: DirectoryStore> Verifier<S> {
    pub fn new(store: S, matcher: EuclideanMatcher) -> Self {
        Self { store, matcher }
    }

    /// Compare the first face in `image` with the signature enrolled for `student_id`.
    pub fn verify<L, X>(
        &self,
        pipeline: &mut FacePipeline<L, X>,
        student_id: &str,
        image: &ImageInput,
    ) -> Result<Verification, AttendanceError>
    where
        L: FaceLocator,
        X: SignatureExtractor,
    {
        let enrolled = self
            .store
            .fetch_signature(student_id)?
            .ok_or_else(|| AttendanceError::NotEnrolled(student_id.to_string()))?;

        let (probe, _) = pipeline
            .primary_face(image)?
            .ok_or(AttendanceError::NoFaceDetected)?;

        let mut gallery = Gallery::new();
        gallery.insert(student_id, enrolled);

        let verification = match self.matcher.decide(&probe.signature, &gallery) {
            MatchDecision::Match { distance, .. } => Verification::Verified { distance },
            MatchDecision::NoMatch { nearest_distance } => Verification::Mismatch {
                distance: nearest_distance,
            },
        };
        tracing::info!(student_id, ?verification, "verification finished");
        Ok(verification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrollment::EnrollmentManager;
    use crate::testing::*;

    fn enrolled_directory() -> MemoryDirectory {
        let dir = MemoryDirectory::new();
        dir.add_student("S1", "BSc", "FY", "A");
        dir.add_student("S2", "BSc", "FY", "A");
        EnrollmentManager::new(&dir)
            .enroll(&mut tile_pipeline(), "S1", &tiles_capture(&[RED]))
            .unwrap();
        dir
    }

    #[test]
    fn test_verify_same_person() {
        let dir = enrolled_directory();
        let result = Verifier::new(&dir, EuclideanMatcher::default())
            .verify(&mut tile_pipeline(), "S1", &tiles_capture(&[RED]))
            .unwrap();
        assert_eq!(result, Verification::Verified { distance: 0.0 });
    }

    #[test]
    fn test_verify_different_person() {
        let dir = enrolled_directory();
        let result = Verifier::new(&dir, EuclideanMatcher::default())
            .verify(&mut tile_pipeline(), "S1", &tiles_capture(&[GREEN]))
            .unwrap();
        match result {
            Verification::Mismatch { distance: Some(d) } => {
                assert!((d - 2.0f32.sqrt()).abs() < 1e-5)
            }
            other => panic!("unexpected verification: {other:?}"),
        }
    }

    #[test]
    fn test_verify_requires_enrollment() {
        let dir = enrolled_directory();
        let err = Verifier::new(&dir, EuclideanMatcher::default())
            .verify(&mut tile_pipeline(), "S2", &tiles_capture(&[RED]))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::NotEnrolled(ref id) if id == "S2"));
    }

    #[test]
    fn test_verify_distinguishes_no_face_from_bad_image() {
        let dir = enrolled_directory();
        let verifier = Verifier::new(&dir, EuclideanMatcher::default());
        let mut pipeline = tile_pipeline();

        let err = verifier
            .verify(&mut pipeline, "S1", &tiles_capture(&[BLACK]))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::NoFaceDetected));

        let err = verifier
            .verify(&mut pipeline, "S1", &ImageInput::Base64("data:,%%%".into()))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::Decode(_)));
    }
}
