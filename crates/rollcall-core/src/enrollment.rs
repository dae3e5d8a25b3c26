use serde::Serialize;

use crate::decoder::ImageInput;
use crate::directory::DirectoryStore;
use crate::error::AttendanceError;
use crate::extractor::SignatureExtractor;
use crate::locator::FaceLocator;
use crate::pipeline::FacePipeline;
use crate::types::FaceRegion;

/// Result of registering a student's face.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentRecord {
    pub student_id: String,
    /// Region the signature was taken from (the first located face).
    pub region: FaceRegion,
    pub faces_found: usize,
    pub dimension: usize,
    /// Whether a previous signature was overwritten.
    pub replaced: bool,
}

/// One-time face registration.
///
/// Only the first face in locator order is enrolled; extra faces are not an
/// error. Re-enrolling overwrites the previous signature wholesale. Nothing is
/// written unless a signature was extracted.
pub struct EnrollmentManager<S> {
    store: S,
}

impl<S: DirectoryStore> EnrollmentManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn enroll<L, X>(
        &self,
        pipeline: &mut FacePipeline<L, X>,
        student_id: &str,
        image: &ImageInput,
    ) -> Result<EnrollmentRecord, AttendanceError>
    where
        L: FaceLocator,
        X: SignatureExtractor,
    {
        let replaced = self.store.fetch_enrollment_state(student_id)?;

        let (face, faces_found) = pipeline
            .primary_face(image)?
            .ok_or(AttendanceError::NoFaceDetected)?;

        if faces_found > 1 {
            tracing::info!(
                student_id,
                faces = faces_found,
                "multiple faces in enrollment capture, using the first"
            );
        }

        self.store.persist_signature(student_id, &face.signature)?;

        tracing::info!(
            student_id,
            confidence = face.region.confidence,
            dimension = face.signature.dimension(),
            replaced,
            "face enrolled"
        );

        Ok(EnrollmentRecord {
            student_id: student_id.to_string(),
            dimension: face.signature.dimension(),
            region: face.region,
            faces_found,
            replaced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecodeError, ImageInput};
    use crate::directory::{PopulationFilter, StoreError};
    use crate::matcher::{EuclideanMatcher, Matcher};
    use crate::testing::*;
    use crate::types::Gallery;

    fn directory() -> MemoryDirectory {
        let dir = MemoryDirectory::new();
        dir.add_student("S1", "BSc", "FY", "A");
        dir.add_student("S2", "BSc", "FY", "A");
        dir
    }

    #[test]
    fn test_enroll_then_match_same_capture() {
        let dir = directory();
        let mut pipeline = tile_pipeline();
        let capture = tiles_capture(&[RED]);

        let record = EnrollmentManager::new(&dir)
            .enroll(&mut pipeline, "S1", &capture)
            .unwrap();
        assert_eq!(record.faces_found, 1);
        assert_eq!(record.dimension, 3);
        assert!(!record.replaced);
        assert!(dir.fetch_enrollment_state("S1").unwrap());

        let enrolled = dir.fetch_signature("S1").unwrap().unwrap();
        let gallery: Gallery = vec![("S1", enrolled)].into_iter().collect();
        let (probe, _) = pipeline.primary_face(&capture).unwrap().unwrap();
        let decision = EuclideanMatcher::default().decide(&probe.signature, &gallery);
        assert_eq!(decision.student_id(), Some("S1"));
    }

    #[test]
    fn test_enroll_uses_first_face() {
        let dir = directory();
        let record = EnrollmentManager::new(&dir)
            .enroll(&mut tile_pipeline(), "S1", &tiles_capture(&[GREEN, RED]))
            .unwrap();
        assert_eq!(record.faces_found, 2);
        assert_eq!(record.region.left, 0);
        assert_eq!(
            dir.fetch_signature("S1").unwrap(),
            Some(color_signature(GREEN))
        );
    }

    #[test]
    fn test_reenroll_overwrites() {
        let dir = directory();
        let manager = EnrollmentManager::new(&dir);
        let mut pipeline = tile_pipeline();
        manager
            .enroll(&mut pipeline, "S1", &tiles_capture(&[RED]))
            .unwrap();
        let record = manager
            .enroll(&mut pipeline, "S1", &tiles_capture(&[BLUE]))
            .unwrap();
        assert!(record.replaced);
        assert_eq!(
            dir.fetch_signature("S1").unwrap(),
            Some(color_signature(BLUE))
        );
        let gallery = dir.fetch_gallery(&PopulationFilter::new("BSc", "FY")).unwrap();
        assert_eq!(gallery.len(), 1);
    }

    #[test]
    fn test_enroll_no_face_leaves_state_untouched() {
        let dir = directory();
        let manager = EnrollmentManager::new(&dir);
        let mut pipeline = tile_pipeline();
        manager
            .enroll(&mut pipeline, "S2", &tiles_capture(&[WHITE]))
            .unwrap();
        let before = dir.raw_signature("S2");

        let err = manager
            .enroll(&mut pipeline, "S2", &tiles_capture(&[BLACK, BLACK]))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::NoFaceDetected));
        assert_eq!(dir.raw_signature("S2"), before);

        let err = manager
            .enroll(&mut pipeline, "S1", &tiles_capture(&[BLACK]))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::NoFaceDetected));
        assert!(!dir.fetch_enrollment_state("S1").unwrap());
    }

    #[test]
    fn test_enroll_rejects_non_image() {
        let dir = directory();
        let manager = EnrollmentManager::new(&dir);
        let mut pipeline = tile_pipeline();

        let err = manager
            .enroll(&mut pipeline, "S1", &ImageInput::Bytes(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::Decode(DecodeError::Empty)));

        let err = manager
            .enroll(&mut pipeline, "S1", &ImageInput::Bytes(b"not an image at all".to_vec()))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::Decode(_)));
        assert!(!dir.fetch_enrollment_state("S1").unwrap());
    }

    #[test]
    fn test_enroll_unknown_student() {
        let dir = directory();
        let err = EnrollmentManager::new(&dir)
            .enroll(&mut tile_pipeline(), "S404", &tiles_capture(&[RED]))
            .unwrap_err();
        assert!(matches!(
            err,
            AttendanceError::Store(StoreError::StudentNotFound(ref id)) if id == "S404"
        ));
    }

    #[test]
    fn test_enroll_locator_failure_is_reported() {
        let dir = directory();
        let mut pipeline = crate::pipeline::FacePipeline::new(BrokenLocator, MeanColorExtractor);
        let err = EnrollmentManager::new(&dir)
            .enroll(&mut pipeline, "S1", &tiles_capture(&[RED]))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::Locator(_)));
    }
}
