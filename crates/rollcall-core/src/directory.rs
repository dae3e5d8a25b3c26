//! The directory store: where students, their enrolled signatures and
//! attendance results live. The core never touches storage directly.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::SignatureCodecError;
use crate::types::{FaceSignature, Gallery};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("student {0} not found")]
    StudentNotFound(String),
    #[error("stored signature for student {student_id} is unreadable: {source}")]
    CorruptSignature {
        student_id: String,
        #[source]
        source: SignatureCodecError,
    },
    #[error("directory backend error: {0}")]
    Backend(String),
}

/// Selects the roster of one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationFilter {
    pub course: String,
    pub class_year: String,
    /// `None` selects every division of the class.
    pub division: Option<String>,
}

impl PopulationFilter {
    pub fn new(course: impl Into<String>, class_year: impl Into<String>) -> Self {
        Self {
            course: course.into(),
            class_year: class_year.into(),
            division: None,
        }
    }

    pub fn with_division(mut self, division: impl Into<String>) -> Self {
        self.division = Some(division.into());
        self
    }
}

/// Collaborator interface for everything the core persists or looks up.
///
/// Calls are synchronous. `persist_signature` must be atomic: either the new
/// signature is stored and the student marked enrolled, or nothing changes.
pub trait DirectoryStore {
    /// Signatures of every enrolled student matching `filter`.
    fn fetch_gallery(&self, filter: &PopulationFilter) -> Result<Gallery, StoreError>;

    /// Whether the student has an enrolled signature. Unknown students are an error.
    fn fetch_enrollment_state(&self, student_id: &str) -> Result<bool, StoreError>;

    /// The student's enrolled signature, if any. Unknown students are an error.
    fn fetch_signature(&self, student_id: &str) -> Result<Option<FaceSignature>, StoreError>;

    /// Store `signature` for the student, replacing any previous one.
    fn persist_signature(&self, student_id: &str, signature: &FaceSignature)
        -> Result<(), StoreError>;

    /// Mark the student present for `subject_id` on `date`.
    fn record_identification(
        &self,
        student_id: &str,
        subject_id: &str,
        date: NaiveDate,
    ) -> Result<(), StoreError>;
}

impl<T: DirectoryStore + ?Sized> DirectoryStore for &T {
    fn fetch_gallery(&self, filter: &PopulationFilter) -> Result<Gallery, StoreError> {
        (**self).fetch_gallery(filter)
    }

    fn fetch_enrollment_state(&self, student_id: &str) -> Result<bool, StoreError> {
        (**self).fetch_enrollment_state(student_id)
    }

    fn fetch_signature(&self, student_id: &str) -> Result<Option<FaceSignature>, StoreError> {
        (**self).fetch_signature(student_id)
    }

    fn persist_signature(
        &self,
        student_id: &str,
        signature: &FaceSignature,
    ) -> Result<(), StoreError> {
        (**self).persist_signature(student_id, signature)
    }

    fn record_identification(
        &self,
        student_id: &str,
        subject_id: &str,
        date: NaiveDate,
    ) -> Result<(), StoreError> {
        (**self).record_identification(student_id, subject_id, date)
    }
}
