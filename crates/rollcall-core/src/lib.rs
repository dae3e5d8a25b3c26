//! rollcall-core: face enrollment and photo-based attendance.
//!
//! Faces are located with SCRFD and turned into signatures with ArcFace,
//! both through ONNX Runtime on the CPU. Matching is a Euclidean nearest
//! neighbour against the enrolled gallery of one class. Storage sits behind
//! [`DirectoryStore`].

pub mod alignment;
pub mod attendance;
pub mod batch;
pub mod codec;
pub mod decoder;
pub mod directory;
pub mod enrollment;
pub mod error;
pub mod extractor;
pub mod locator;
pub mod matcher;
pub mod pipeline;
pub mod types;
pub mod verification;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use attendance::{AttendanceReport, BatchAttendance};
pub use batch::{BatchIdentifier, BatchOutcome, Identification, SkipReason, SkippedImage};
pub use codec::{decode_signature, encode_signature, SignatureCodecError};
pub use decoder::{DecodeError, ImageInput};
pub use directory::{DirectoryStore, PopulationFilter, StoreError};
pub use enrollment::{EnrollmentManager, EnrollmentRecord};
pub use error::AttendanceError;
pub use extractor::{ArcFaceExtractor, ExtractionError, SignatureExtractor};
pub use locator::{FaceLocator, LocatorError, LocatorSettings, ScrfdLocator};
pub use matcher::{EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use pipeline::{FacePipeline, LocatedFace, PipelineError};
pub use types::{FaceImage, FaceRegion, FaceSignature, Gallery, MatchDecision};
pub use verification::{Verification, Verifier};

/// File name of the SCRFD detector inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognizer inside the model directory.
pub const EXTRACTOR_MODEL_FILE: &str = "w600k_r50.onnx";
