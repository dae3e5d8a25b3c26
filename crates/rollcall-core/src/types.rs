use std::collections::BTreeMap;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A decoded RGB frame. Never zero-sized.
#[derive(Debug, Clone)]
pub struct FaceImage {
    pixels: RgbImage,
}

impl FaceImage {
    /// Wrap an RGB buffer. Returns `None` for a zero-width or zero-height grid.
    pub fn from_rgb(pixels: RgbImage) -> Option<Self> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return None;
        }
        Some(Self { pixels })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// Bounds of a located face, in pixel coordinates of the source image.
///
/// `left..right` and `top..bottom` are half-open and always non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceRegion {
    /// Build a region from a floating-point box, clamped to a `width` × `height` image.
    ///
    /// Returns `None` when nothing of the box remains inside the image.
    pub fn clamped(
        x: f32,
        y: f32,
        box_width: f32,
        box_height: f32,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        let clamp = |v: f32, max: u32| -> u32 {
            if v.is_nan() {
                0
            } else {
                v.round().clamp(0.0, max as f32) as u32
            }
        };
        let left = clamp(x, width);
        let top = clamp(y, height);
        let right = clamp(x + box_width, width);
        let bottom = clamp(y + box_height, height);

        if right <= left || bottom <= top {
            return None;
        }

        Some(Self {
            top,
            right,
            bottom,
            left,
            confidence: 1.0,
            landmarks: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Face signature vector (128-dimensional for dlib-style models, 512 for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSignature {
    pub values: Vec<f32>,
    /// Model version that produced this signature (e.g., "w600k_r50").
    /// Not part of the stored encoding and ignored by matching.
    pub model_version: Option<String>,
}

impl FaceSignature {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two signatures.
    ///
    /// Returns `None` when the dimensions differ.
    pub fn euclidean_distance(&self, other: &FaceSignature) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        let sum: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum();
        Some(sum.sqrt())
    }
}

/// Known signatures keyed by student id.
///
/// Iterates in ascending student id, so nearest-match tie-breaks are
/// reproducible for a given roster. Inserting an existing id replaces its
/// signature.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: BTreeMap<String, FaceSignature>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the signature for `student_id`, returning the previous one.
    pub fn insert(
        &mut self,
        student_id: impl Into<String>,
        signature: FaceSignature,
    ) -> Option<FaceSignature> {
        self.entries.insert(student_id.into(), signature)
    }

    pub fn get(&self, student_id: &str) -> Option<&FaceSignature> {
        self.entries.get(student_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FaceSignature)> {
        self.entries.iter().map(|(id, sig)| (id.as_str(), sig))
    }
}

impl<S: Into<String>> FromIterator<(S, FaceSignature)> for Gallery {
    fn from_iter<I: IntoIterator<Item = (S, FaceSignature)>>(iter: I) -> Self {
        let mut gallery = Gallery::new();
        for (id, sig) in iter {
            gallery.insert(id, sig);
        }
        gallery
    }
}

/// Outcome of matching one probe against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum MatchDecision {
    Match { student_id: String, distance: f32 },
    /// `nearest_distance` is `None` when no gallery entry was comparable.
    NoMatch { nearest_distance: Option<f32> },
}

impl MatchDecision {
    pub fn student_id(&self) -> Option<&str> {
        match self {
            MatchDecision::Match { student_id, .. } => Some(student_id),
            MatchDecision::NoMatch { .. } => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchDecision::Match { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(values: &[f32]) -> FaceSignature {
        FaceSignature::new(values.to_vec())
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = sig(&[0.3, 0.4, 0.5]);
        assert_eq!(a.euclidean_distance(&a), Some(0.0));
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = sig(&[0.0, 0.0]);
        let b = sig(&[3.0, 4.0]);
        let d = a.euclidean_distance(&b).unwrap();
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_dimension_mismatch() {
        let a = sig(&[1.0, 0.0]);
        let b = sig(&[1.0, 0.0, 0.0]);
        assert_eq!(a.euclidean_distance(&b), None);
    }

    #[test]
    fn test_region_clamped_to_image() {
        let r = FaceRegion::clamped(-10.0, 5.0, 50.0, 200.0, 100, 80).unwrap();
        assert_eq!((r.left, r.top, r.right, r.bottom), (0, 5, 40, 80));
        assert_eq!(r.width(), 40);
        assert_eq!(r.height(), 75);
    }

    #[test]
    fn test_region_outside_image_is_dropped() {
        assert!(FaceRegion::clamped(120.0, 10.0, 30.0, 30.0, 100, 100).is_none());
        assert!(FaceRegion::clamped(10.0, 10.0, 0.0, 30.0, 100, 100).is_none());
    }

    #[test]
    fn test_face_image_rejects_empty_grid() {
        assert!(FaceImage::from_rgb(RgbImage::new(0, 10)).is_none());
        assert!(FaceImage::from_rgb(RgbImage::new(4, 3)).is_some());
    }

    #[test]
    fn test_gallery_insert_replaces() {
        let mut gallery = Gallery::new();
        assert!(gallery.insert("S1", sig(&[1.0])).is_none());
        let previous = gallery.insert("S1", sig(&[2.0]));
        assert_eq!(previous, Some(sig(&[1.0])));
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.get("S1"), Some(&sig(&[2.0])));
    }

    #[test]
    fn test_gallery_iterates_in_id_order() {
        let gallery: Gallery = vec![("S3", sig(&[3.0])), ("S1", sig(&[1.0])), ("S2", sig(&[2.0]))]
            .into_iter()
            .collect();
        let ids: Vec<&str> = gallery.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["S1", "S2", "S3"]);
    }
}
