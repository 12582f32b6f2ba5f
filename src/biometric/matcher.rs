//! Verification decision logic
//!
//! Compares one live, quality-gated feature set against one stored
//! template and produces the binary match decision. The scoring algorithm
//! is a swappable capability behind [`Matcher`]; [`CosineMatcher`] is the
//! built-in implementation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{cosine, FeatureSet, SamplePurpose, Template};

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("feature set extracted for {actual:?} cannot be matched, expected Verification")]
    PurposeMismatch { actual: SamplePurpose },
}

/// Outcome of one verification attempt.
///
/// `verified` is the contract; `score` is informational only.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    pub verified: bool,
    pub score: Option<f32>,
}

/// Compares a live feature set against a stored template.
///
/// Implementations must be stateless and side-effect-free per call:
/// repeated calls with the same inputs return the same decision.
pub trait Matcher {
    fn compare(
        &self,
        live: &FeatureSet,
        stored: &Template,
    ) -> Result<VerificationResult, MatchError>;
}

/// Configuration for the built-in cosine matcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Cosine similarity threshold for a positive decision
    pub verify_threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            verify_threshold: 0.82,
        }
    }
}

/// Cosine-similarity matcher with a fixed decision threshold.
pub struct CosineMatcher {
    threshold: f32,
}

impl CosineMatcher {
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            threshold: config.verify_threshold,
        }
    }
}

impl Matcher for CosineMatcher {
    fn compare(
        &self,
        live: &FeatureSet,
        stored: &Template,
    ) -> Result<VerificationResult, MatchError> {
        if live.purpose() != SamplePurpose::Verification {
            return Err(MatchError::PurposeMismatch {
                actual: live.purpose(),
            });
        }

        let score = cosine(live.vector(), stored.vector());
        let verified = score >= self.threshold;

        log::info!(
            "match decision: score={:.3}, threshold={:.3}, result={}",
            score,
            self.threshold,
            if verified { "PASS" } else { "FAIL" }
        );

        Ok(VerificationResult {
            verified,
            score: Some(score),
        })
    }
}
