use thiserror::Error;

use crate::decoder::DecodeError;
use crate::directory::StoreError;
use crate::extractor::ExtractionError;
use crate::locator::LocatorError;
use crate::pipeline::PipelineError;

/// Errors surfaced by enrollment, verification and batch attendance.
#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("image could not be decoded: {0}")]
    Decode(#[from] DecodeError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("face locator failed: {0}")]
    Locator(#[from] LocatorError),
    #[error("signature extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("directory store: {0}")]
    Store(#[from] StoreError),
    #[error("student {0} has no enrolled face")]
    NotEnrolled(String),
    #[error("no enrolled students in {course} year {class_year}")]
    NoEnrolledStudents { course: String, class_year: String },
    #[error("failed to record attendance for student {student_id}: {source}")]
    Record {
        student_id: String,
        #[source]
        source: StoreError,
    },
}

impl From<PipelineError> for AttendanceError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Decode(e) => AttendanceError::Decode(e),
            PipelineError::Locate(e) => AttendanceError::Locator(e),
            PipelineError::Extract(e) => AttendanceError::Extraction(e),
        }
    }
}
