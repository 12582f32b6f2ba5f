//! Biometric data contracts
//!
//! Shared value types flowing through the enrollment and verification
//! pipelines: raw scans, extracted feature sets, synthesized templates,
//! and the per-sample quality judgment.

pub mod extractor;
pub mod matcher;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Opaque integer key correlating a template with a person in the store.
///
/// The core never validates or resolves this key itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub u32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>().map(UserId)
    }
}

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("pixel buffer holds {actual} bytes, expected {width}x{height} = {expected}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("scan has zero area ({width}x{height})")]
    EmptyScan { width: u32, height: u32 },
}

/// One captured grayscale scan as delivered by the reader.
#[derive(Debug, Clone)]
pub struct RawSample {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RawSample {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, SampleError> {
        if width == 0 || height == 0 {
            return Err(SampleError::EmptyScan { width, height });
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(SampleError::DimensionMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// The pipeline a feature set was extracted for.
///
/// Enrollment and verification features are not interchangeable; mixing
/// them is a caller contract violation, rejected at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplePurpose {
    Enrollment,
    Verification,
}

/// Per-sample usability judgment from the extractor.
///
/// Collapses to a binary gate via [`QualityFeedback::is_good`]; anything
/// other than `Good` means the sample is discarded and the finger rescanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityFeedback {
    None,
    Good,
    InsufficientArea,
    PressureTooHigh,
    PressureTooLow,
    Smudge,
    LowContrast,
}

impl QualityFeedback {
    pub fn is_good(&self) -> bool {
        matches!(self, QualityFeedback::Good)
    }
}

impl fmt::Display for QualityFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            QualityFeedback::None => "no quality judgment",
            QualityFeedback::Good => "good",
            QualityFeedback::InsufficientArea => "insufficient contact area",
            QualityFeedback::PressureTooHigh => "too much pressure",
            QualityFeedback::PressureTooLow => "too little pressure",
            QualityFeedback::Smudge => "smudged scan",
            QualityFeedback::LowContrast => "low ridge contrast",
        };
        f.write_str(msg)
    }
}

/// Extracted, comparable representation of one scan.
///
/// Immutable once produced; tagged with the purpose it was extracted for
/// and consumed by either the enroller or the matcher, never both.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    purpose: SamplePurpose,
    vector: Vec<f32>,
}

impl FeatureSet {
    pub fn new(purpose: SamplePurpose, vector: Vec<f32>) -> Self {
        Self { purpose, vector }
    }

    pub fn purpose(&self) -> SamplePurpose {
        self.purpose
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn dim(&self) -> usize {
        self.vector.len()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template blob too short: {actual} bytes, header needs {needed}")]
    TooShort { needed: usize, actual: usize },

    #[error("bad template magic")]
    BadMagic,

    #[error("unsupported template version {0}")]
    UnsupportedVersion(u8),

    #[error("template length mismatch: header says {expected} bytes of data, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

const TEMPLATE_MAGIC: [u8; 4] = *b"RLTP";
const TEMPLATE_VERSION: u8 = 1;
/// magic(4) + version(1) + reserved(3) + samples(4) + dim(4)
const TEMPLATE_HEADER_LEN: usize = 16;

/// Persisted biometric reference synthesized from multiple enrollment scans.
///
/// Immutable after creation. Serializes to a versioned binary blob; the
/// store only ever sees a complete, successfully serialized template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    vector: Vec<f32>,
    samples: u32,
}

impl Template {
    /// Synthesize a template as the unit-normalized mean of the accumulated
    /// feature vectors.
    pub(crate) fn synthesize(sets: &[FeatureSet]) -> Self {
        let mut vector = mean(sets.iter().map(|s| s.vector()));
        normalize(&mut vector);
        Self {
            vector,
            samples: sets.len() as u32,
        }
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    /// Number of enrollment samples folded into this template.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TEMPLATE_HEADER_LEN + self.vector.len() * 4);
        out.extend_from_slice(&TEMPLATE_MAGIC);
        out.push(TEMPLATE_VERSION);
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&self.samples.to_le_bytes());
        out.extend_from_slice(&(self.vector.len() as u32).to_le_bytes());
        for value in &self.vector {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TemplateError> {
        if bytes.len() < TEMPLATE_HEADER_LEN {
            return Err(TemplateError::TooShort {
                needed: TEMPLATE_HEADER_LEN,
                actual: bytes.len(),
            });
        }
        if bytes[0..4] != TEMPLATE_MAGIC {
            return Err(TemplateError::BadMagic);
        }
        if bytes[4] != TEMPLATE_VERSION {
            return Err(TemplateError::UnsupportedVersion(bytes[4]));
        }
        let samples = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let dim = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
        let data = &bytes[TEMPLATE_HEADER_LEN..];
        if data.len() != dim * 4 {
            return Err(TemplateError::LengthMismatch {
                expected: dim * 4,
                actual: data.len(),
            });
        }
        let vector = data
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self { vector, samples })
    }
}

/// Cosine similarity between two vectors. Length mismatch scores 0.0.
pub(crate) fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Scale a vector to unit length. A zero vector is left untouched.
pub(crate) fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Element-wise mean over an iterator of equal-length vectors.
pub(crate) fn mean<'a>(vectors: impl Iterator<Item = &'a [f32]>) -> Vec<f32> {
    let mut avg: Vec<f32> = Vec::new();
    let mut count = 0usize;

    for vector in vectors {
        if avg.is_empty() {
            avg = vec![0.0; vector.len()];
        }
        for (slot, &val) in avg.iter_mut().zip(vector.iter()) {
            *slot += val;
        }
        count += 1;
    }

    if count > 0 {
        for val in avg.iter_mut() {
            *val /= count as f32;
        }
    }

    avg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine(&a, &b) - 1.0).abs() < 0.001);

        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine(&a, &b) - 0.0).abs() < 0.001);

        let a = vec![1.0, 1.0];
        let b = vec![-1.0, -1.0];
        assert!((cosine(&a, &b) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_mean() {
        let vectors = [
            vec![1.0, 2.0, 3.0],
            vec![2.0, 3.0, 4.0],
            vec![3.0, 4.0, 5.0],
        ];
        let avg = mean(vectors.iter().map(|v| v.as_slice()));
        assert_eq!(avg, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_raw_sample_rejects_mismatched_buffer() {
        assert!(RawSample::new(4, 4, vec![0u8; 16]).is_ok());
        assert!(matches!(
            RawSample::new(4, 4, vec![0u8; 15]),
            Err(SampleError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            RawSample::new(0, 4, vec![]),
            Err(SampleError::EmptyScan { .. })
        ));
    }

    #[test]
    fn test_template_round_trip() {
        let sets = vec![
            FeatureSet::new(SamplePurpose::Enrollment, vec![0.5, 0.1, -0.3, 0.2]),
            FeatureSet::new(SamplePurpose::Enrollment, vec![0.4, 0.2, -0.2, 0.1]),
        ];
        let template = Template::synthesize(&sets);
        assert_eq!(template.samples(), 2);

        let bytes = template.to_bytes();
        let restored = Template::from_bytes(&bytes).expect("round trip");
        assert_eq!(restored, template);
    }

    #[test]
    fn test_template_is_unit_length() {
        let sets = vec![FeatureSet::new(
            SamplePurpose::Enrollment,
            vec![3.0, 4.0, 0.0, 0.0],
        )];
        let template = Template::synthesize(&sets);
        let norm: f32 = template.vector().iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_template_decode_errors() {
        assert_eq!(
            Template::from_bytes(&[0u8; 4]),
            Err(TemplateError::TooShort {
                needed: 16,
                actual: 4
            })
        );

        let mut bytes = Template::synthesize(&[FeatureSet::new(
            SamplePurpose::Enrollment,
            vec![1.0, 0.0],
        )])
        .to_bytes();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert_eq!(Template::from_bytes(&bad_magic), Err(TemplateError::BadMagic));

        let mut bad_version = bytes.clone();
        bad_version[4] = 99;
        assert_eq!(
            Template::from_bytes(&bad_version),
            Err(TemplateError::UnsupportedVersion(99))
        );

        bytes.truncate(bytes.len() - 4);
        assert!(matches!(
            Template::from_bytes(&bytes),
            Err(TemplateError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_user_id_parse_and_display() {
        let id: UserId = "42".parse().expect("parse");
        assert_eq!(id, UserId(42));
        assert_eq!(id.to_string(), "42");
        assert!("not-a-number".parse::<UserId>().is_err());
    }
}
