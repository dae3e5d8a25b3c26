//! Decode → locate → extract, shared by enrollment, verification and batch
//! identification.

use thiserror::Error;

use crate::decoder::{DecodeError, ImageInput};
use crate::extractor::{ExtractionError, SignatureExtractor};
use crate::locator::{FaceLocator, LocatorError};
use crate::types::{FaceImage, FaceRegion, FaceSignature};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Locate(#[from] LocatorError),
    #[error(transparent)]
    Extract(#[from] ExtractionError),
}

/// A located face and the signature extracted from it.
#[derive(Debug, Clone)]
pub struct LocatedFace {
    pub region: FaceRegion,
    pub signature: FaceSignature,
}

/// Owns the locator and extractor models.
pub struct FacePipeline<L, X> {
    locator: L,
    extractor: X,
}

impl<L: FaceLocator, X: SignatureExtractor> FacePipeline<L, X> {
    pub fn new(locator: L, extractor: X) -> Self {
        Self { locator, extractor }
    }

    pub fn locate(&mut self, image: &FaceImage) -> Result<Vec<FaceRegion>, LocatorError> {
        self.locator.locate(image)
    }

    /// Every face in the image, in locator order.
    pub fn faces(&mut self, input: &ImageInput) -> Result<Vec<LocatedFace>, PipelineError> {
        let image = input.decode()?;
        let regions = self.locator.locate(&image)?;
        if regions.is_empty() {
            return Ok(Vec::new());
        }
        let signatures = self.extractor.extract_all(&image, &regions)?;
        Ok(regions
            .into_iter()
            .zip(signatures)
            .map(|(region, signature)| LocatedFace { region, signature })
            .collect())
    }

    /// The first face in locator order, plus how many faces were found.
    ///
    /// Only the primary face is extracted. `Ok(None)` means no face.
    pub fn primary_face(
        &mut self,
        input: &ImageInput,
    ) -> Result<Option<(LocatedFace, usize)>, PipelineError> {
        let image = input.decode()?;
        let mut regions = self.locator.locate(&image)?;
        let found = regions.len();
        if found == 0 {
            return Ok(None);
        }
        let region = regions.swap_remove(0);
        let signature = self.extractor.extract(&image, &region)?;
        Ok(Some((LocatedFace { region, signature }, found)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn test_faces_in_locator_order() {
        let faces = tile_pipeline()
            .faces(&tiles_capture(&[GREEN, BLACK, BLUE]))
            .unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].signature, color_signature(GREEN));
        assert_eq!(faces[1].region.left, 2 * TILE);
    }

    #[test]
    fn test_primary_face_reports_count() {
        let (face, found) = tile_pipeline()
            .primary_face(&tiles_capture(&[BLUE, RED, WHITE]))
            .unwrap()
            .unwrap();
        assert_eq!(found, 3);
        assert_eq!(face.signature, color_signature(BLUE));
    }

    #[test]
    fn test_no_face_is_not_an_error() {
        let mut pipeline = tile_pipeline();
        assert!(pipeline.faces(&tiles_capture(&[BLACK])).unwrap().is_empty());
        assert!(pipeline
            .primary_face(&tiles_capture(&[BLACK]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decode_failure_surfaces() {
        let err = tile_pipeline()
            .faces(&ImageInput::Bytes(b"plain text".to_vec()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }
}
