//! Apply, verify and destroy the bootstrap configuration.
//!
//! ```text
//! names ─► DestroyGuard ─► init+apply ─► outputs ─► checks ─► destroy
//!               │                                              ▲
//!               └──────────── on error or panic ───────────────┘
//! ```
//!
//! The guard is armed before `apply` so that a half-applied configuration
//! is torn down as well. Destroy runs exactly once per run.

use crate::environment::{EnvironmentError, TestEnvironment};
use crate::names::ResourceNames;
use crate::verify::{
    verify_outputs, BootstrapOutputs, Verification, BUCKET_NAME_OUTPUT,
    SERVICE_ACCOUNT_EMAIL_OUTPUT, WORKLOAD_IDENTITY_POOL_NAME_OUTPUT,
};
use gcp::StorageClient;
use serde::{Deserialize, Serialize};
use terraform::{DestroyGuard, Provisioner, TerraformError};
use thiserror::Error;
use tracing::{error, info};

/// Errors that end a bootstrap test run
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Generated or supplied names break GCP naming rules
    #[error("Invalid resource names: {0}")]
    InvalidNames(String),

    /// Configuration or environment could not be read
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    /// `terraform init` or `terraform apply` failed
    #[error("Terraform init/apply failed: {0}")]
    Apply(#[source] TerraformError),

    /// An output the checks need could not be read
    #[error("Failed to read output '{key}': {source}")]
    Output {
        key: String,
        #[source]
        source: TerraformError,
    },

    /// One or more checks on the outputs failed
    #[error("Verification failed: {0}")]
    VerificationFailed(Verification),

    /// Everything else passed but `terraform destroy` failed
    #[error("Terraform destroy failed, resources may be orphaned: {0}")]
    Destroy(#[source] TerraformError),

    /// The run failed and the destroy that followed failed too
    #[error("{failure}\nTerraform destroy also failed, resources may be orphaned: {destroy_error}")]
    DestroyAfterFailure {
        failure: Box<HarnessError>,
        destroy_error: TerraformError,
    },
}

impl HarnessError {
    /// The failure that ended the run, ignoring any destroy failure after it
    pub fn root_cause(&self) -> &HarnessError {
        match self {
            HarnessError::DestroyAfterFailure { failure, .. } => failure,
            other => other,
        }
    }

    /// Destroy failure, if teardown did not complete
    pub fn destroy_error(&self) -> Option<&TerraformError> {
        match self {
            HarnessError::Destroy(e) => Some(e),
            HarnessError::DestroyAfterFailure { destroy_error, .. } => Some(destroy_error),
            _ => None,
        }
    }

    fn with_destroy_result<T>(self, destroyed: Result<T, TerraformError>) -> Self {
        match destroyed {
            Ok(_) => self,
            Err(destroy_error) => {
                error!(
                    "Destroy after failed run also failed, resources may be orphaned: {}",
                    destroy_error
                );
                HarnessError::DestroyAfterFailure {
                    failure: Box::new(self),
                    destroy_error,
                }
            }
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Summary of a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub names: ResourceNames,
    pub outputs: BootstrapOutputs,
    pub verification: Verification,
}

/// Read the three outputs the checks depend on
pub fn read_outputs<P>(provisioner: &P) -> HarnessResult<BootstrapOutputs>
where
    P: Provisioner + ?Sized,
{
    let read = |key: &str| {
        provisioner.output(key).map_err(|source| HarnessError::Output {
            key: key.to_string(),
            source,
        })
    };

    Ok(BootstrapOutputs {
        bucket_name: read(BUCKET_NAME_OUTPUT)?,
        service_account_email: read(SERVICE_ACCOUNT_EMAIL_OUTPUT)?,
        workload_identity_pool_name: read(WORKLOAD_IDENTITY_POOL_NAME_OUTPUT)?,
    })
}

/// Verify an already-applied configuration without touching its lifecycle
pub async fn verify_applied<P, S>(provisioner: &P, storage: &S) -> HarnessResult<Verification>
where
    P: Provisioner + ?Sized,
    S: StorageClient + ?Sized,
{
    let outputs = read_outputs(provisioner)?;
    Ok(verify_outputs(&outputs, storage).await)
}

async fn apply_and_verify<P, S>(
    provisioner: &P,
    storage: &S,
) -> HarnessResult<(BootstrapOutputs, Verification)>
where
    P: Provisioner + ?Sized,
    S: StorageClient + ?Sized,
{
    provisioner.init_and_apply().map_err(HarnessError::Apply)?;
    info!("Apply complete, reading outputs");

    let outputs = read_outputs(provisioner)?;
    let verification = verify_outputs(&outputs, storage).await;
    Ok((outputs, verification))
}

/// Run the full apply → verify → destroy cycle for `names`.
///
/// The first failure wins: an apply, output or verification failure is
/// returned as the [`HarnessError::root_cause`] even if the destroy that
/// follows also fails; that destroy failure rides along in
/// [`HarnessError::DestroyAfterFailure`].
pub async fn run_bootstrap_test<P, S>(
    names: &ResourceNames,
    provisioner: &P,
    storage: &S,
) -> HarnessResult<BootstrapReport>
where
    P: Provisioner + ?Sized,
    S: StorageClient + ?Sized,
{
    names.validate().map_err(HarnessError::InvalidNames)?;
    info!("Starting bootstrap test run with suffix {}", names.suffix);

    let guard = DestroyGuard::new(provisioner);
    let outcome = apply_and_verify(provisioner, storage).await;
    let destroyed = guard.finish();

    match (outcome, destroyed) {
        (Err(e), destroyed) => Err(e.with_destroy_result(destroyed)),
        (Ok((_, verification)), destroyed) if !verification.passed() => {
            Err(HarnessError::VerificationFailed(verification).with_destroy_result(destroyed))
        }
        (Ok(_), Err(destroy_error)) => Err(HarnessError::Destroy(destroy_error)),
        (Ok((outputs, verification)), Ok(_)) => {
            info!("Bootstrap test run {} passed: {}", names.suffix, verification);
            Ok(BootstrapReport {
                names: names.clone(),
                outputs,
                verification,
            })
        }
    }
}

/// Generate fresh names and run against the real Terraform configuration
pub async fn run_with_terraform<S>(
    environment: &TestEnvironment,
    storage: &S,
) -> HarnessResult<BootstrapReport>
where
    S: StorageClient + ?Sized,
{
    environment
        .validate()
        .map_err(|e| HarnessError::Environment(EnvironmentError::InvalidConfig(e)))?;

    let names = ResourceNames::generate();
    let terraform = environment.terraform(&names);
    run_bootstrap_test(&names, &terraform, storage).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = HarnessError::Output {
            key: "ci_runner_sa_email".to_string(),
            source: TerraformError::InvalidOptions("boom".to_string()),
        };
        assert!(error.to_string().contains("ci_runner_sa_email"));

        let error = HarnessError::VerificationFailed(Verification::default());
        assert!(error.to_string().contains("all 0 checks passed"));
    }

    #[test]
    fn test_destroy_after_failure_keeps_both_errors() {
        let error = HarnessError::Apply(TerraformError::InvalidOptions("apply broke".to_string()))
            .with_destroy_result::<String>(Err(TerraformError::InvalidOptions(
                "destroy broke".to_string(),
            )));

        let message = error.to_string();
        assert!(message.contains("apply broke"));
        assert!(message.contains("destroy broke"));
        assert!(matches!(error.root_cause(), HarnessError::Apply(_)));
        assert!(error.destroy_error().is_some());
    }

    #[test]
    fn test_successful_destroy_leaves_error_untouched() {
        let error = HarnessError::InvalidNames("bad".to_string())
            .with_destroy_result(Ok("Destroy complete!".to_string()));
        assert!(matches!(error, HarnessError::InvalidNames(_)));
        assert!(error.destroy_error().is_none());
    }
}
