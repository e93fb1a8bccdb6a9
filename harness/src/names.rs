//! Randomized resource names for one test run.
//!
//! Every resource created by a run embeds the same short suffix so that
//! concurrent runs against one project never collide, and so that leaked
//! resources can be traced back to the run that created them.

use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Length of the suffix produced by [`unique_id`]
pub const UNIQUE_ID_LENGTH: usize = 6;

pub const CI_RUNNER_SA_PREFIX: &str = "ci-runner-sa-";
pub const TERRAFORM_BUCKET_PREFIX: &str = "terraform-bucket-";
pub const WORKLOAD_IDENTITY_POOL_PREFIX: &str = "github-";

/// Short random identifier, lower-cased so it can be embedded in GCP names
pub fn unique_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(UNIQUE_ID_LENGTH)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNames {
    pub suffix: String,
    pub ci_runner_sa_name: String,
    pub terraform_bucket_name: String,
    pub workload_identity_pool_id: String,
}

impl ResourceNames {
    pub fn from_suffix(suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        Self {
            ci_runner_sa_name: format!("{}{}", CI_RUNNER_SA_PREFIX, suffix),
            terraform_bucket_name: format!("{}{}", TERRAFORM_BUCKET_PREFIX, suffix),
            workload_identity_pool_id: format!("{}{}", WORKLOAD_IDENTITY_POOL_PREFIX, suffix),
            suffix,
        }
    }

    pub fn generate() -> Self {
        Self::from_suffix(unique_id())
    }

    /// Check the names against GCP's naming rules before anything is
    /// sent to the provider.
    pub fn validate(&self) -> Result<(), String> {
        if self.suffix.is_empty() {
            return Err("Suffix cannot be empty".to_string());
        }
        if !is_match("^[a-z0-9]+$", &self.suffix)? {
            return Err(format!(
                "Suffix '{}' must be lower-case letters and digits",
                self.suffix
            ));
        }

        check_name(
            "Service account id",
            &self.ci_runner_sa_name,
            6..=30,
            "^[a-z]([-a-z0-9]*[a-z0-9])$",
        )?;
        check_name(
            "Bucket name",
            &self.terraform_bucket_name,
            3..=63,
            "^[a-z0-9][-_a-z0-9]*[a-z0-9]$",
        )?;
        check_name(
            "Workload identity pool id",
            &self.workload_identity_pool_id,
            4..=32,
            "^[a-z0-9-]+$",
        )?;
        if self.workload_identity_pool_id.starts_with("gcp-") {
            return Err("Workload identity pool id cannot start with 'gcp-'".to_string());
        }

        Ok(())
    }
}

fn is_match(pattern: &str, value: &str) -> Result<bool, String> {
    Regex::new(pattern)
        .map(|regex| regex.is_match(value))
        .map_err(|e| format!("Invalid name pattern {}: {}", pattern, e))
}

fn check_name(
    what: &str,
    value: &str,
    length: std::ops::RangeInclusive<usize>,
    pattern: &str,
) -> Result<(), String> {
    if !length.contains(&value.len()) {
        return Err(format!(
            "{} '{}' must be {}-{} characters (got {})",
            what,
            value,
            length.start(),
            length.end(),
            value.len()
        ));
    }
    if !is_match(pattern, value)? {
        return Err(format!("{} '{}' must match {}", what, value, pattern));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_from_fixed_suffix() {
        let names = ResourceNames::from_suffix("abc123");
        assert_eq!(names.suffix, "abc123");
        assert_eq!(names.ci_runner_sa_name, "ci-runner-sa-abc123");
        assert_eq!(names.terraform_bucket_name, "terraform-bucket-abc123");
        assert_eq!(names.workload_identity_pool_id, "github-abc123");
        assert!(names.validate().is_ok());
    }

    #[test]
    fn test_unique_id_shape() {
        for _ in 0..50 {
            let id = unique_id();
            assert_eq!(id.len(), UNIQUE_ID_LENGTH);
            assert!(id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_unique_ids_do_not_collide() {
        let ids: HashSet<String> = (0..100).map(|_| unique_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_generated_names_are_valid() {
        let names = ResourceNames::generate();
        assert!(names.ci_runner_sa_name.ends_with(&names.suffix));
        assert!(names.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_suffix() {
        assert!(ResourceNames::from_suffix("").validate().is_err());
        assert!(ResourceNames::from_suffix("ABC123").validate().is_err());
        assert!(ResourceNames::from_suffix("abc_12").validate().is_err());
    }

    #[test]
    fn test_validation_rejects_long_service_account() {
        let names = ResourceNames::from_suffix("a".repeat(20));
        let err = names.validate().unwrap_err();
        assert!(err.contains("Service account id"));
    }

    #[test]
    fn test_validation_rejects_reserved_pool_prefix() {
        let mut names = ResourceNames::from_suffix("abc123");
        names.workload_identity_pool_id = "gcp-abc123".to_string();
        assert!(names.validate().is_err());
    }
}
