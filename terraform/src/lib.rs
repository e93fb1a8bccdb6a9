//! Terraform CLI wrapper for infrastructure tests
//!
//! Drives the `terraform` binary through `init`, `apply`, `output` and
//! `destroy`, re-running commands that fail with known transient errors.
//! [`DestroyGuard`] ties teardown to scope so a failed test still cleans up
//! the resources it created.

pub mod command;
pub mod ops;
pub mod options;
pub mod provisioner;

pub use command::run_terraform_command;
pub use ops::{apply, destroy, init, init_and_apply, output, output_all};
pub use options::{default_retryable_errors, with_default_retryable_errors, Options};
pub use provisioner::{DestroyGuard, Provisioner, Terraform};

use thiserror::Error;

/// Errors raised while running Terraform
#[derive(Error, Debug)]
pub enum TerraformError {
    /// The Terraform binary could not be started
    #[error("Terraform binary '{binary}' not found. Install Terraform or set the binary path.")]
    BinaryNotFound { binary: String },

    /// [`Options`] failed validation
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// A command exited non-zero with a non-retryable error
    #[error("Command '{command}' failed with exit code {exit_code:?}:\n{output}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// A retryable error persisted through every retry
    #[error("Command '{command}' still failing after {attempts} attempts ({reason}):\n{output}")]
    RetriesExhausted {
        command: String,
        attempts: u32,
        reason: String,
        output: String,
    },

    /// A retryable error pattern is not a valid regex
    #[error("Invalid retryable error pattern '{pattern}': {source}")]
    InvalidRetryPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// `terraform output -json` returned something unparseable
    #[error("Output '{key}' is not valid JSON: {source}")]
    OutputParse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Spawning or reading the process failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TerraformResult<T> = Result<T, TerraformError>;
