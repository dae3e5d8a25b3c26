//! Deterministic stand-ins for the ONNX models and the directory store.
//!
//! Synthetic frames are a row of 8×8 tiles. Every tile whose top-left pixel
//! is not black counts as one face, and the face's signature is its mean
//! colour scaled to `0.0..=1.0`. Two tiles of the same colour are the same
//! person; pure red and pure green are `√2` apart.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Mutex;

use base64::{engine::general_purpose, Engine as _};
use chrono::NaiveDate;
use image::{ImageFormat, Rgb, RgbImage};

use crate::codec::{decode_signature, encode_signature};
use crate::decoder::ImageInput;
use crate::directory::{DirectoryStore, PopulationFilter, StoreError};
use crate::extractor::{ExtractionError, SignatureExtractor};
use crate::locator::{FaceLocator, LocatorError};
use crate::pipeline::FacePipeline;
use crate::types::{FaceImage, FaceRegion, FaceSignature, Gallery};

pub const TILE: u32 = 8;

pub const RED: [u8; 3] = [255, 0, 0];
pub const GREEN: [u8; 3] = [0, 255, 0];
pub const BLUE: [u8; 3] = [0, 0, 255];
pub const WHITE: [u8; 3] = [255, 255, 255];
pub const BLACK: [u8; 3] = [0, 0, 0];

/// Treats each non-black tile as a face, in row-major scan order.
#[derive(Debug, Default, Clone, Copy)]
pub struct TileLocator;

impl FaceLocator for TileLocator {
    fn locate(&mut self, image: &FaceImage) -> Result<Vec<FaceRegion>, LocatorError> {
        let mut regions = Vec::new();
        for ty in 0..image.height() / TILE {
            for tx in 0..image.width() / TILE {
                let (x, y) = (tx * TILE, ty * TILE);
                if image.pixels().get_pixel(x, y).0 == BLACK {
                    continue;
                }
                regions.extend(FaceRegion::clamped(
                    x as f32,
                    y as f32,
                    TILE as f32,
                    TILE as f32,
                    image.width(),
                    image.height(),
                ));
            }
        }
        Ok(regions)
    }
}

/// Signature = mean colour of the region.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeanColorExtractor;

impl SignatureExtractor for MeanColorExtractor {
    fn extract(
        &mut self,
        image: &FaceImage,
        region: &FaceRegion,
    ) -> Result<FaceSignature, ExtractionError> {
        let mut sum = [0.0f32; 3];
        for y in region.top..region.bottom {
            for x in region.left..region.right {
                let p = image.pixels().get_pixel(x, y);
                for c in 0..3 {
                    sum[c] += p[c] as f32;
                }
            }
        }
        let n = (region.width() * region.height()) as f32 * 255.0;
        Ok(FaceSignature::new(sum.iter().map(|s| s / n).collect()))
    }
}

/// Locator whose model always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrokenLocator;

impl FaceLocator for BrokenLocator {
    fn locate(&mut self, _image: &FaceImage) -> Result<Vec<FaceRegion>, LocatorError> {
        Err(LocatorError::InferenceFailed("model unavailable".into()))
    }
}

pub fn tile_pipeline() -> FacePipeline<TileLocator, MeanColorExtractor> {
    FacePipeline::new(TileLocator, MeanColorExtractor)
}

/// The signature `MeanColorExtractor` produces for a solid tile of `color`.
pub fn color_signature(color: [u8; 3]) -> FaceSignature {
    FaceSignature::new(color.iter().map(|&c| c as f32 / 255.0).collect())
}

/// PNG with one tile per entry; `BLACK` entries leave a gap.
pub fn tiles_png(colors: &[[u8; 3]]) -> Vec<u8> {
    let width = TILE * colors.len().max(1) as u32;
    let img = RgbImage::from_fn(width, TILE, |x, _| {
        Rgb(colors.get((x / TILE) as usize).copied().unwrap_or(BLACK))
    });
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .expect("in-memory PNG encode");
    out
}

/// [`tiles_png`] as a data-URI capture, the way a browser would post it.
pub fn tiles_capture(colors: &[[u8; 3]]) -> ImageInput {
    let encoded = general_purpose::STANDARD.encode(tiles_png(colors));
    ImageInput::Base64(format!("data:image/png;base64,{encoded}"))
}

#[derive(Debug, Clone)]
struct MemoryStudent {
    course: String,
    class_year: String,
    division: String,
    signature: Option<Vec<u8>>,
}

/// In-memory directory. Signatures go through the stored encoding.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    students: Mutex<BTreeMap<String, MemoryStudent>>,
    attendance: Mutex<Vec<(String, String, NaiveDate)>>,
    fail_gallery: bool,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory whose gallery fetch always fails.
    pub fn unreachable() -> Self {
        Self {
            fail_gallery: true,
            ..Self::default()
        }
    }

    pub fn add_student(&self, student_id: &str, course: &str, class_year: &str, division: &str) {
        self.students.lock().unwrap().insert(
            student_id.to_string(),
            MemoryStudent {
                course: course.into(),
                class_year: class_year.into(),
                division: division.into(),
                signature: None,
            },
        );
    }

    /// Overwrite the raw stored blob, bypassing encoding.
    pub fn put_raw_signature(&self, student_id: &str, blob: Vec<u8>) {
        if let Some(s) = self.students.lock().unwrap().get_mut(student_id) {
            s.signature = Some(blob);
        }
    }

    pub fn raw_signature(&self, student_id: &str) -> Option<Vec<u8>> {
        self.students
            .lock()
            .unwrap()
            .get(student_id)
            .and_then(|s| s.signature.clone())
    }

    pub fn attendance(&self) -> Vec<(String, String, NaiveDate)> {
        self.attendance.lock().unwrap().clone()
    }
}

impl DirectoryStore for MemoryDirectory {
    fn fetch_gallery(&self, filter: &PopulationFilter) -> Result<Gallery, StoreError> {
        if self.fail_gallery {
            return Err(StoreError::Backend("connection refused".into()));
        }
        let students = self.students.lock().unwrap();
        let mut gallery = Gallery::new();
        for (id, s) in students.iter() {
            let in_class = s.course == filter.course
                && s.class_year == filter.class_year
                && filter.division.as_ref().map_or(true, |d| *d == s.division);
            if let (true, Some(blob)) = (in_class, &s.signature) {
                let signature = decode_signature(blob).map_err(|source| {
                    StoreError::CorruptSignature {
                        student_id: id.clone(),
                        source,
                    }
                })?;
                gallery.insert(id.clone(), signature);
            }
        }
        Ok(gallery)
    }

    fn fetch_enrollment_state(&self, student_id: &str) -> Result<bool, StoreError> {
        let students = self.students.lock().unwrap();
        let s = students
            .get(student_id)
            .ok_or_else(|| StoreError::StudentNotFound(student_id.to_string()))?;
        Ok(s.signature.is_some())
    }

    fn fetch_signature(&self, student_id: &str) -> Result<Option<FaceSignature>, StoreError> {
        let students = self.students.lock().unwrap();
        let s = students
            .get(student_id)
            .ok_or_else(|| StoreError::StudentNotFound(student_id.to_string()))?;
        s.signature
            .as_deref()
            .map(decode_signature)
            .transpose()
            .map_err(|source| StoreError::CorruptSignature {
                student_id: student_id.to_string(),
                source,
            })
    }

    fn persist_signature(
        &self,
        student_id: &str,
        signature: &FaceSignature,
    ) -> Result<(), StoreError> {
        let mut students = self.students.lock().unwrap();
        let s = students
            .get_mut(student_id)
            .ok_or_else(|| StoreError::StudentNotFound(student_id.to_string()))?;
        s.signature = Some(encode_signature(signature));
        Ok(())
    }

    fn record_identification(
        &self,
        student_id: &str,
        subject_id: &str,
        date: NaiveDate,
    ) -> Result<(), StoreError> {
        if !self.students.lock().unwrap().contains_key(student_id) {
            return Err(StoreError::StudentNotFound(student_id.to_string()));
        }
        self.attendance
            .lock()
            .unwrap()
            .push((student_id.to_string(), subject_id.to_string(), date));
        Ok(())
    }
}
