//! Feature extraction boundary
//!
//! The extraction algorithm is an external capability: the pipelines only
//! require [`FeatureExtractor`]. [`GridExtractor`] is the built-in
//! development stand-in; a production deployment wires a vendor SDK behind
//! the same trait.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{normalize, FeatureSet, QualityFeedback, RawSample, SamplePurpose};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("scan {width}x{height} is smaller than the {min}x{min} analysis grid")]
    ScanTooSmall { width: u32, height: u32, min: u32 },
}

/// Converts a raw scan into a comparable feature representation, judging
/// the scan's usability at the same time.
///
/// Callers must check [`QualityFeedback::is_good`] before feeding the
/// feature set into enrollment or matching.
pub trait FeatureExtractor {
    fn extract(
        &self,
        sample: &RawSample,
        purpose: SamplePurpose,
    ) -> Result<(FeatureSet, QualityFeedback), ExtractError>;
}

/// Configuration for the built-in grid extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Analysis grid side length; feature dimension is `grid * grid`
    pub grid: u32,
    /// Pixels darker than this count as ridge contact
    pub ridge_threshold: u8,
    /// Minimum fraction of ridge pixels before a scan counts as touching
    pub min_coverage: f32,
    /// Minimum intensity standard deviation
    pub min_contrast: f32,
    /// Mean intensity below this reads as the finger pressed too hard
    pub min_mean_intensity: f32,
    /// Mean intensity above this reads as barely touching
    pub max_mean_intensity: f32,
    /// Fraction of near-mean pixels above which the scan reads as smudged
    pub max_midtone_fraction: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            grid: 8,
            ridge_threshold: 128,
            min_coverage: 0.12,
            min_contrast: 10.0,
            min_mean_intensity: 40.0,
            max_mean_intensity: 215.0,
            max_midtone_fraction: 0.60,
        }
    }
}

/// Block-grid ridge-density extractor.
///
/// Splits the scan into a `grid` x `grid` block raster and measures mean
/// ridge darkness per block; the centered, unit-normalized block vector is
/// the feature representation. Deterministic for identical input.
pub struct GridExtractor {
    config: ExtractorConfig,
}

impl GridExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Judge scan usability from global intensity statistics.
    fn quality(&self, sample: &RawSample) -> QualityFeedback {
        let pixels = sample.pixels();
        let total = pixels.len() as f32;

        let mean = pixels.iter().map(|&p| p as f32).sum::<f32>() / total;
        if mean < self.config.min_mean_intensity {
            return QualityFeedback::PressureTooHigh;
        }
        if mean > self.config.max_mean_intensity {
            return QualityFeedback::PressureTooLow;
        }

        let coverage = pixels
            .iter()
            .filter(|&&p| p < self.config.ridge_threshold)
            .count() as f32
            / total;
        if coverage < self.config.min_coverage {
            return QualityFeedback::InsufficientArea;
        }

        let variance = pixels
            .iter()
            .map(|&p| {
                let d = p as f32 - mean;
                d * d
            })
            .sum::<f32>()
            / total;
        if variance.sqrt() < self.config.min_contrast {
            return QualityFeedback::LowContrast;
        }

        let midtone = pixels
            .iter()
            .filter(|&&p| (p as f32 - mean).abs() < 16.0)
            .count() as f32
            / total;
        if midtone > self.config.max_midtone_fraction {
            return QualityFeedback::Smudge;
        }

        QualityFeedback::Good
    }

    /// Mean ridge darkness per grid block, centered and unit-normalized.
    fn features(&self, sample: &RawSample) -> Vec<f32> {
        let grid = self.config.grid as usize;
        let width = sample.width() as usize;
        let height = sample.height() as usize;
        let pixels = sample.pixels();

        let mut vector = Vec::with_capacity(grid * grid);
        for by in 0..grid {
            let y0 = by * height / grid;
            let y1 = (by + 1) * height / grid;
            for bx in 0..grid {
                let x0 = bx * width / grid;
                let x1 = (bx + 1) * width / grid;

                let mut sum = 0.0f32;
                for y in y0..y1 {
                    let row = &pixels[y * width..(y + 1) * width];
                    for &p in &row[x0..x1] {
                        sum += (255 - p) as f32 / 255.0;
                    }
                }
                let count = ((y1 - y0) * (x1 - x0)) as f32;
                vector.push(sum / count);
            }
        }

        // Center so cosine comparison measures pattern, not overall darkness
        let mean = vector.iter().sum::<f32>() / vector.len() as f32;
        for v in vector.iter_mut() {
            *v -= mean;
        }
        normalize(&mut vector);
        vector
    }
}

impl FeatureExtractor for GridExtractor {
    fn extract(
        &self,
        sample: &RawSample,
        purpose: SamplePurpose,
    ) -> Result<(FeatureSet, QualityFeedback), ExtractError> {
        if sample.width() < self.config.grid || sample.height() < self.config.grid {
            return Err(ExtractError::ScanTooSmall {
                width: sample.width(),
                height: sample.height(),
                min: self.config.grid,
            });
        }

        let feedback = self.quality(sample);
        let features = FeatureSet::new(purpose, self.features(sample));

        log::debug!(
            "extracted {} features for {:?}: quality={}",
            features.dim(),
            purpose,
            feedback
        );

        Ok((features, feedback))
    }
}
