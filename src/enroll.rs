//! Enrollment accumulator
//!
//! Collects successive good-quality enrollment feature sets from the same
//! physical finger until enough independent samples exist to synthesize a
//! template, rejecting inconsistent material without losing prior progress.
//!
//! The caller is responsible for the quality gate: only feature sets judged
//! `Good` may be fed in. The accumulator's consistency checks assume each
//! input sample is individually trustworthy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::biometric::{cosine, FeatureSet, SamplePurpose, Template};

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("feature set extracted for {actual:?} cannot be enrolled, expected Enrollment")]
    PurposeMismatch { actual: SamplePurpose },

    #[error("enroller is {0:?}; clear() before adding more samples")]
    NotAccumulating(EnrollmentStatus),

    #[error("no template available")]
    NoTemplateAvailable,
}

/// Accumulator session state.
///
/// `Failed` is recoverable: `clear()` always returns the accumulator to
/// `Accumulating` with zero samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrollmentStatus {
    Accumulating,
    Ready,
    Failed,
}

/// Configuration for one enrollment session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentConfig {
    /// Number of good samples required to synthesize a template
    pub required_samples: u32,
    /// Minimum pairwise cosine similarity between samples of one finger
    pub consistency_floor: f32,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            required_samples: 4,
            consistency_floor: 0.40,
        }
    }
}

/// Multi-sample enrollment state machine.
///
/// Feed quality-gated enrollment feature sets via [`Enroller::add_features`]
/// until the status reaches `Ready`, then retrieve the synthesized template
/// exactly once with [`Enroller::take_template`].
pub struct Enroller {
    required: u32,
    consistency_floor: f32,
    samples: Vec<FeatureSet>,
    status: EnrollmentStatus,
    template: Option<Template>,
}

impl Enroller {
    pub fn new(config: &EnrollmentConfig) -> Self {
        Self {
            required: config.required_samples,
            consistency_floor: config.consistency_floor,
            samples: Vec::new(),
            status: EnrollmentStatus::Accumulating,
            template: None,
        }
    }

    /// Fold one enrollment sample into the in-progress template material.
    ///
    /// The only externally driven transition: stays in `Accumulating` while
    /// more samples are needed, moves to `Failed` when the accumulated
    /// material is inconsistent, and to `Ready` once the required count is
    /// met. Returns the status after the fold.
    pub fn add_features(&mut self, features: FeatureSet) -> Result<EnrollmentStatus, EnrollError> {
        if self.status != EnrollmentStatus::Accumulating {
            return Err(EnrollError::NotAccumulating(self.status));
        }
        if features.purpose() != SamplePurpose::Enrollment {
            return Err(EnrollError::PurposeMismatch {
                actual: features.purpose(),
            });
        }

        for (index, kept) in self.samples.iter().enumerate() {
            let similarity = cosine(features.vector(), kept.vector());
            if similarity < self.consistency_floor {
                log::warn!(
                    "sample inconsistent with sample {} (similarity {:.3} < floor {:.3})",
                    index + 1,
                    similarity,
                    self.consistency_floor
                );
                self.status = EnrollmentStatus::Failed;
                return Ok(self.status);
            }
            // Two honest scans of one finger never agree bit-for-bit; an
            // identical vector means a replayed scan.
            if features.vector() == kept.vector() {
                log::warn!("duplicate of sample {} rejected", index + 1);
                self.status = EnrollmentStatus::Failed;
                return Ok(self.status);
            }
        }

        self.samples.push(features);
        log::info!(
            "enrollment progress: {}/{} samples",
            self.samples.len(),
            self.required
        );

        if self.samples.len() as u32 >= self.required {
            self.template = Some(Template::synthesize(&self.samples));
            self.status = EnrollmentStatus::Ready;
        }
        Ok(self.status)
    }

    pub fn status(&self) -> EnrollmentStatus {
        self.status
    }

    /// Remaining number of good samples the caller should prompt for.
    pub fn features_needed(&self) -> u32 {
        self.required.saturating_sub(self.samples.len() as u32)
    }

    /// Retrieve the completed template. Available exactly once per
    /// successful session; further calls signal `NoTemplateAvailable`.
    pub fn take_template(&mut self) -> Result<Template, EnrollError> {
        self.template.take().ok_or(EnrollError::NoTemplateAvailable)
    }

    /// Reset to `Accumulating` with zero samples. Valid from any state;
    /// required after `Failed` before retrying.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.template = None;
        self.status = EnrollmentStatus::Accumulating;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometric::normalize;

    fn enroller() -> Enroller {
        Enroller::new(&EnrollmentConfig::default())
    }

    /// A consistent finger: one base direction with a small per-scan tilt.
    fn finger_sample(scan: u32) -> FeatureSet {
        let mut vector = vec![1.0, 0.2, -0.3, 0.1];
        vector[1] += scan as f32 * 0.01;
        normalize(&mut vector);
        FeatureSet::new(SamplePurpose::Enrollment, vector)
    }

    fn outlier_sample() -> FeatureSet {
        FeatureSet::new(SamplePurpose::Enrollment, vec![0.0, 0.0, 1.0, 0.0])
    }

    #[test]
    fn test_ready_exactly_at_required_count() {
        let mut e = enroller();

        for scan in 0..3 {
            let status = e.add_features(finger_sample(scan)).unwrap();
            assert_eq!(status, EnrollmentStatus::Accumulating);
        }
        assert_eq!(e.features_needed(), 1);

        let status = e.add_features(finger_sample(3)).unwrap();
        assert_eq!(status, EnrollmentStatus::Ready);
        assert_eq!(e.features_needed(), 0);
    }

    #[test]
    fn test_template_retrievable_exactly_once() {
        let mut e = enroller();
        for scan in 0..4 {
            e.add_features(finger_sample(scan)).unwrap();
        }

        let template = e.take_template().expect("first retrieval");
        assert_eq!(template.samples(), 4);
        assert!(matches!(
            e.take_template(),
            Err(EnrollError::NoTemplateAvailable)
        ));
    }

    #[test]
    fn test_no_template_before_ready() {
        let mut e = enroller();
        e.add_features(finger_sample(0)).unwrap();
        assert!(matches!(
            e.take_template(),
            Err(EnrollError::NoTemplateAvailable)
        ));
    }

    #[test]
    fn test_verification_purpose_rejected() {
        let mut e = enroller();
        let wrong = FeatureSet::new(SamplePurpose::Verification, vec![1.0, 0.0, 0.0, 0.0]);

        assert!(matches!(
            e.add_features(wrong),
            Err(EnrollError::PurposeMismatch { .. })
        ));
        // Rejection leaves the session untouched
        assert_eq!(e.status(), EnrollmentStatus::Accumulating);
        assert_eq!(e.features_needed(), 4);
    }

    #[test]
    fn test_outlier_fails_session() {
        let mut e = enroller();
        e.add_features(finger_sample(0)).unwrap();
        e.add_features(finger_sample(1)).unwrap();

        let status = e.add_features(outlier_sample()).unwrap();
        assert_eq!(status, EnrollmentStatus::Failed);
    }

    #[test]
    fn test_duplicate_fails_session() {
        let mut e = enroller();
        e.add_features(finger_sample(0)).unwrap();

        let status = e.add_features(finger_sample(0)).unwrap();
        assert_eq!(status, EnrollmentStatus::Failed);
    }

    #[test]
    fn test_failed_requires_clear() {
        let mut e = enroller();
        e.add_features(finger_sample(0)).unwrap();
        e.add_features(outlier_sample()).unwrap();
        assert_eq!(e.status(), EnrollmentStatus::Failed);

        // No partial-retry-in-place
        assert!(matches!(
            e.add_features(finger_sample(1)),
            Err(EnrollError::NotAccumulating(EnrollmentStatus::Failed))
        ));

        e.clear();
        assert_eq!(e.status(), EnrollmentStatus::Accumulating);
        assert_eq!(e.features_needed(), 4);

        // A full fresh run succeeds after the reset
        for scan in 0..4 {
            e.add_features(finger_sample(scan)).unwrap();
        }
        assert_eq!(e.status(), EnrollmentStatus::Ready);
    }

    #[test]
    fn test_add_after_ready_rejected() {
        let mut e = enroller();
        for scan in 0..4 {
            e.add_features(finger_sample(scan)).unwrap();
        }
        assert!(matches!(
            e.add_features(finger_sample(5)),
            Err(EnrollError::NotAccumulating(EnrollmentStatus::Ready))
        ));
    }

    #[test]
    fn test_template_matches_sample_direction() {
        let mut e = enroller();
        for scan in 0..4 {
            e.add_features(finger_sample(scan)).unwrap();
        }
        let template = e.take_template().unwrap();

        // The synthesized mean stays close to every contributing sample
        let similarity = cosine(template.vector(), finger_sample(0).vector());
        assert!(similarity > 0.99, "similarity {similarity}");
    }
}
