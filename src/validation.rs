//! Input validation
//!
//! Centralized range and format checks for CLI inputs and loaded
//! configuration.

use thiserror::Error;

use crate::biometric::UserId;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Validate a user identifier (zero is reserved)
pub fn validate_user_id(id: u32) -> Result<UserId, ValidationError> {
    if id == 0 {
        return Err(ValidationError::InvalidFormat(
            "User id 0 is reserved".to_string(),
        ));
    }
    Ok(UserId(id))
}

/// Validate the verification decision threshold (0.0 to 1.0)
pub fn validate_verify_threshold(threshold: f32) -> Result<f32, ValidationError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ValidationError::InvalidRange(format!(
            "Verify threshold must be between 0.0 and 1.0, got {}",
            threshold
        )));
    }
    Ok(threshold)
}

/// Validate the enrollment consistency floor (0.0 to 1.0)
pub fn validate_consistency_floor(floor: f32) -> Result<f32, ValidationError> {
    if !(0.0..=1.0).contains(&floor) {
        return Err(ValidationError::InvalidRange(format!(
            "Consistency floor must be between 0.0 and 1.0, got {}",
            floor
        )));
    }
    Ok(floor)
}

/// Validate the required enrollment sample count (2 to 16)
pub fn validate_required_samples(count: u32) -> Result<u32, ValidationError> {
    if !(2..=16).contains(&count) {
        return Err(ValidationError::InvalidRange(format!(
            "Required samples must be between 2 and 16, got {}",
            count
        )));
    }
    Ok(count)
}

/// Validate a simulated scan count (1 to 64)
pub fn validate_scan_count(count: u32) -> Result<u32, ValidationError> {
    if !(1..=64).contains(&count) {
        return Err(ValidationError::InvalidRange(format!(
            "Scan count must be between 1 and 64, got {}",
            count
        )));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_valid() {
        assert_eq!(validate_user_id(1).unwrap(), UserId(1));
        assert_eq!(validate_user_id(u32::MAX).unwrap(), UserId(u32::MAX));
    }

    #[test]
    fn test_user_id_invalid() {
        assert!(validate_user_id(0).is_err());
    }

    #[test]
    fn test_verify_threshold_valid() {
        assert!(validate_verify_threshold(0.0).is_ok());
        assert!(validate_verify_threshold(0.82).is_ok());
        assert!(validate_verify_threshold(1.0).is_ok());
    }

    #[test]
    fn test_verify_threshold_invalid() {
        assert!(validate_verify_threshold(-0.1).is_err());
        assert!(validate_verify_threshold(1.1).is_err());
        assert!(validate_verify_threshold(f32::NAN).is_err());
    }

    #[test]
    fn test_required_samples_range() {
        assert!(validate_required_samples(2).is_ok());
        assert!(validate_required_samples(4).is_ok());
        assert!(validate_required_samples(16).is_ok());
        assert!(validate_required_samples(1).is_err());
        assert!(validate_required_samples(17).is_err());
    }

    #[test]
    fn test_scan_count_range() {
        assert!(validate_scan_count(1).is_ok());
        assert!(validate_scan_count(64).is_ok());
        assert!(validate_scan_count(0).is_err());
        assert!(validate_scan_count(65).is_err());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn threshold_in_unit_interval(x in 0.0f32..1.0) {
            prop_assert!(validate_verify_threshold(x).is_ok());
        }

        #[test]
        fn threshold_outside_unit_interval(x in any::<f32>().prop_filter("out of [0,1]", |v| !(0.0..=1.0).contains(v))) {
            prop_assert!(validate_verify_threshold(x).is_err());
        }

        #[test]
        fn floor_in_unit_interval(x in 0.0f32..1.0) {
            prop_assert!(validate_consistency_floor(x).is_ok());
        }

        #[test]
        fn nonzero_user_ids_accepted(id in 1u32..) {
            prop_assert!(validate_user_id(id).is_ok());
        }

        #[test]
        fn sample_count_outside_range_rejected(n in any::<u32>().prop_filter("out of [2,16]", |v| !(2..=16).contains(v))) {
            prop_assert!(validate_required_samples(n).is_err());
        }
    }
}
