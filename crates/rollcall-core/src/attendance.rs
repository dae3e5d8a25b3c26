//! Mark a class present from a batch of photos.

use chrono::NaiveDate;
use serde::Serialize;

use crate::batch::{BatchIdentifier, BatchOutcome};
use crate::decoder::ImageInput;
use crate::directory::{DirectoryStore, PopulationFilter};
use crate::error::AttendanceError;
use crate::extractor::SignatureExtractor;
use crate::locator::FaceLocator;
use crate::pipeline::FacePipeline;

/// What a session recorded.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceReport {
    pub subject_id: String,
    pub date: NaiveDate,
    /// Number of enrolled students the photos were matched against.
    pub gallery_size: usize,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

/// Loads the class gallery, identifies the batch and records each student once.
pub struct BatchAttendance<S> {
    store: S,
    identifier: BatchIdentifier,
}

impl<S: DirectoryStore> BatchAttendance<S> {
    pub fn new(store: S, identifier: BatchIdentifier) -> Self {
        Self { store, identifier }
    }

    pub fn mark_present<L, X>(
        &self,
        pipeline: &mut FacePipeline<L, X>,
        filter: &PopulationFilter,
        subject_id: &str,
        date: NaiveDate,
        images: &[ImageInput],
    ) -> Result<AttendanceReport, AttendanceError>
    where
        L: FaceLocator,
        X: SignatureExtractor,
    {
        let gallery = self.store.fetch_gallery(filter)?;
        if gallery.is_empty() {
            return Err(AttendanceError::NoEnrolledStudents {
                course: filter.course.clone(),
                class_year: filter.class_year.clone(),
            });
        }

        tracing::info!(
            course = %filter.course,
            class_year = %filter.class_year,
            division = ?filter.division,
            subject_id,
            %date,
            enrolled = gallery.len(),
            images = images.len(),
            "attendance session started"
        );

        let outcome = self.identifier.identify_batch(pipeline, images, &gallery);

        for identification in &outcome.identified {
            self.store
                .record_identification(&identification.student_id, subject_id, date)
                .map_err(|source| AttendanceError::Record {
                    student_id: identification.student_id.clone(),
                    source,
                })?;
        }

        tracing::info!(
            subject_id,
            present = outcome.count(),
            skipped = outcome.skipped.len(),
            unmatched = outcome.unmatched_faces,
            "attendance recorded"
        );

        Ok(AttendanceReport {
            subject_id: subject_id.to_string(),
            date,
            gallery_size: gallery.len(),
            outcome,
        })
    }
}
