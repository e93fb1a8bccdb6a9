use gcp::StorageClient;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

pub const BUCKET_NAME_OUTPUT: &str = "terraform_bucket_name";
pub const SERVICE_ACCOUNT_EMAIL_OUTPUT: &str = "ci_runner_sa_email";
pub const WORKLOAD_IDENTITY_POOL_NAME_OUTPUT: &str = "workload_identity_pool_name";

/// Outputs read back from the applied configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapOutputs {
    pub bucket_name: String,
    pub service_account_email: String,
    pub workload_identity_pool_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub message: Option<String>,
}

impl CheckOutcome {
    fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: Some(message.into()),
        }
    }
}

/// Result of every check; one failing check does not stop the others
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub checks: Vec<CheckOutcome>,
}

impl Verification {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    pub fn failures(&self) -> Vec<&CheckOutcome> {
        self.checks.iter().filter(|check| !check.passed).collect()
    }

    pub fn into_result(self) -> Result<(), Verification> {
        if self.passed() {
            Ok(())
        } else {
            Err(self)
        }
    }

    fn record(&mut self, outcome: CheckOutcome) {
        match &outcome.message {
            Some(message) => warn!("Check '{}' failed: {}", outcome.name, message),
            None => info!("Check '{}' passed", outcome.name),
        }
        self.checks.push(outcome);
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures = self.failures();
        if failures.is_empty() {
            return write!(f, "all {} checks passed", self.checks.len());
        }
        write!(f, "{} of {} checks failed", failures.len(), self.checks.len())?;
        for failure in failures {
            write!(
                f,
                "\n  - {}: {}",
                failure.name,
                failure.message.as_deref().unwrap_or("failed")
            )?;
        }
        Ok(())
    }
}

pub fn check_service_account_email(email: &str) -> CheckOutcome {
    const NAME: &str = "service_account_email";
    match email.matches('@').count() {
        1 => CheckOutcome::pass(NAME),
        0 => CheckOutcome::fail(NAME, "Output ci_runner_sa_email does not contain '@'"),
        n => CheckOutcome::fail(
            NAME,
            format!("Output ci_runner_sa_email contains {} '@' characters", n),
        ),
    }
}

pub fn check_workload_identity_pool_name(pool_name: &str) -> CheckOutcome {
    const NAME: &str = "workload_identity_pool_name";
    if pool_name.is_empty() {
        CheckOutcome::fail(NAME, "Output workload_identity_pool_name is empty")
    } else {
        CheckOutcome::pass(NAME)
    }
}

pub async fn check_bucket_exists<S>(storage: &S, bucket_name: &str) -> CheckOutcome
where
    S: StorageClient + ?Sized,
{
    const NAME: &str = "storage_bucket_exists";
    match gcp::assert_storage_bucket_exists(storage, bucket_name).await {
        Ok(()) => CheckOutcome::pass(NAME),
        Err(e) => CheckOutcome::fail(NAME, e.to_string()),
    }
}

/// Run every check against the outputs of an applied configuration
pub async fn verify_outputs<S>(outputs: &BootstrapOutputs, storage: &S) -> Verification
where
    S: StorageClient + ?Sized,
{
    let mut verification = Verification::default();
    verification.record(check_bucket_exists(storage, &outputs.bucket_name).await);
    verification.record(check_service_account_email(&outputs.service_account_email));
    verification.record(check_workload_identity_pool_name(
        &outputs.workload_identity_pool_name,
    ));
    verification
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gcp::{GcpError, GcpResult};

    struct FixedStorage {
        existing: Vec<String>,
    }

    #[async_trait]
    impl StorageClient for FixedStorage {
        async fn bucket_exists(&self, name: &str) -> GcpResult<bool> {
            if name == "unreachable" {
                return Err(GcpError::Authentication {
                    message: "no credentials".to_string(),
                });
            }
            Ok(self.existing.iter().any(|b| b == name))
        }
    }

    fn outputs() -> BootstrapOutputs {
        BootstrapOutputs {
            bucket_name: "terraform-bucket-abc123".to_string(),
            service_account_email: "ci-runner-sa-abc123@proj.iam.gserviceaccount.com".to_string(),
            workload_identity_pool_name:
                "projects/123/locations/global/workloadIdentityPools/github-abc123".to_string(),
        }
    }

    fn storage() -> FixedStorage {
        FixedStorage {
            existing: vec!["terraform-bucket-abc123".to_string()],
        }
    }

    #[test]
    fn test_service_account_email_check() {
        assert!(check_service_account_email("sa@proj.iam.gserviceaccount.com").passed);

        let outcome = check_service_account_email("not-an-email");
        assert!(!outcome.passed);
        assert_eq!(
            outcome.message.as_deref(),
            Some("Output ci_runner_sa_email does not contain '@'")
        );

        assert!(!check_service_account_email("a@b@c").passed);
    }

    #[test]
    fn test_pool_name_check() {
        assert!(check_workload_identity_pool_name("github-abc123").passed);

        let outcome = check_workload_identity_pool_name("");
        assert!(!outcome.passed);
        assert_eq!(
            outcome.message.as_deref(),
            Some("Output workload_identity_pool_name is empty")
        );
    }

    #[test]
    fn test_pool_name_check_only_rejects_empty() {
        // Whitespace is a value; only a missing name fails
        assert!(check_workload_identity_pool_name(" ").passed);
    }

    #[tokio::test]
    async fn test_all_checks_pass() {
        let verification = verify_outputs(&outputs(), &storage()).await;
        assert_eq!(verification.checks.len(), 3);
        assert!(verification.passed());
        assert!(verification.to_string().contains("all 3 checks passed"));
        assert!(verification.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_failures_are_collected() {
        let outputs = BootstrapOutputs {
            bucket_name: "terraform-bucket-missing".to_string(),
            service_account_email: "broken".to_string(),
            workload_identity_pool_name: String::new(),
        };

        let verification = verify_outputs(&outputs, &storage()).await;
        assert_eq!(verification.checks.len(), 3);
        assert_eq!(verification.failures().len(), 3);

        let report = verification.to_string();
        assert!(report.contains("3 of 3 checks failed"));
        assert!(report.contains("does not exist"));
        assert!(verification.into_result().is_err());
    }

    #[tokio::test]
    async fn test_storage_error_fails_bucket_check() {
        let outcome = check_bucket_exists(&storage(), "unreachable").await;
        assert!(!outcome.passed);
        assert!(outcome.message.unwrap().contains("no credentials"));
    }
}
