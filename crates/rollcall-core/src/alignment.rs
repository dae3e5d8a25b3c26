//! Face alignment for signature extraction.
//!
//! Faces with landmarks are warped onto the five InsightFace reference points
//! of a 112×112 crop through a least-squares similarity transform (scale,
//! rotation, translation). Faces without landmarks are cropped to their
//! region and resized.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::types::{FaceImage, FaceRegion};

pub const ALIGNED_SIZE: u32 = 112;

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// 4-DOF similarity transform:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
struct SimilarityTransform {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl SimilarityTransform {
    /// Least-squares fit mapping `src` points onto `dst` points.
    ///
    /// Each pair contributes two rows to A·[a, b, tx, ty]ᵀ = B:
    ///   sx·a − sy·b + tx = dx
    ///   sy·a + sx·b + ty = dy
    /// solved through the normal equations AᵀA·x = AᵀB.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        let (cx, cy) = src
            .iter()
            .fold((0.0, 0.0), |(x, y), &(px, py)| (x + px / 5.0, y + py / 5.0));
        let spread: f32 = src
            .iter()
            .map(|&(px, py)| (px - cx).powi(2) + (py - cy).powi(2))
            .sum();
        if spread < 1e-6 {
            return None;
        }

        let mut normal = [[0.0f32; 5]; 4];

        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            for (row, rhs) in [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)] {
                for j in 0..4 {
                    for k in 0..4 {
                        normal[j][k] += row[j] * row[k];
                    }
                    normal[j][4] += row[j] * rhs;
                }
            }
        }

        let [a, b, tx, ty] = solve_augmented(normal)?;
        Some(Self { a, b, tx, ty })
    }

    /// Map an output-space point back into source-image space.
    fn invert_point(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det.abs() < 1e-12 {
            return None;
        }
        let (dx, dy) = (x - self.tx, y - self.ty);
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

/// Gaussian elimination with partial pivoting on a 4×5 augmented matrix.
fn solve_augmented(mut m: [[f32; 5]; 4]) -> Option<[f32; 4]> {
    for col in 0..4 {
        let pivot_row = (col..4).max_by(|&i, &j| {
            m[i][col]
                .abs()
                .partial_cmp(&m[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return None;
        }
        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let tail: f32 = ((i + 1)..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (m[i][4] - tail) / m[i][i];
    }
    Some(x)
}

/// Warp `src` through the inverse of `transform` into a square RGB crop.
///
/// Bilinear sampling; pixels mapping outside the source are black.
fn warp(src: &RgbImage, transform: &SimilarityTransform, size: u32) -> RgbImage {
    let (w, h) = (src.width() as i64, src.height() as i64);
    let sample = |x: i64, y: i64, c: usize| -> f32 {
        if x >= 0 && x < w && y >= 0 && y < h {
            src.get_pixel(x as u32, y as u32)[c] as f32
        } else {
            0.0
        }
    };

    RgbImage::from_fn(size, size, |ox, oy| {
        let Some((sx, sy)) = transform.invert_point(ox as f32, oy as f32) else {
            return Rgb([0, 0, 0]);
        };
        let (x0, y0) = (sx.floor() as i64, sy.floor() as i64);
        let (fx, fy) = (sx - x0 as f32, sy - y0 as f32);

        let mut out = [0u8; 3];
        for (c, channel) in out.iter_mut().enumerate() {
            let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1, c) * fx * fy;
            *channel = val.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}

/// Crop the region and resize it to the aligned size.
fn crop_and_resize(image: &FaceImage, region: &FaceRegion) -> RgbImage {
    let crop = imageops::crop_imm(
        image.pixels(),
        region.left,
        region.top,
        region.width(),
        region.height(),
    )
    .to_image();
    imageops::resize(&crop, ALIGNED_SIZE, ALIGNED_SIZE, FilterType::Triangle)
}

/// Produce the canonical 112×112 crop for one located face.
pub fn align_face(image: &FaceImage, region: &FaceRegion) -> RgbImage {
    let transform = region
        .landmarks
        .as_ref()
        .and_then(|lms| SimilarityTransform::estimate(lms, &REFERENCE_LANDMARKS_112));

    match transform {
        Some(t) => warp(image.pixels(), &t, ALIGNED_SIZE),
        None => {
            tracing::trace!("no usable landmarks, falling back to region crop");
            crop_and_resize(image, region)
        }
    }
}
