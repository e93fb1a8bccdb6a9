//! Everything a run reads from the outside world, gathered into one value.
//!
//! Nothing below the CLI reads environment variables directly; the test
//! procedure receives a [`TestEnvironment`] so that runs are reproducible
//! and unit tests can build one by hand.

use crate::names::ResourceNames;
use gcp::GcpError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use terraform::{with_default_retryable_errors, Options, Terraform};
use thiserror::Error;

pub const WORKLOAD_IDENTITY_REPOSITORY_ENV: &str = "WORKLOAD_IDENTITY_REPOSITORY";
pub const TERRAFORM_DIR_ENV: &str = "TERRAFORM_DIR";
pub const TERRAFORM_BINARY_ENV: &str = "TERRAFORM_BINARY";

/// Errors raised while gathering run inputs
#[derive(Error, Debug)]
pub enum EnvironmentError {
    /// A required variable is unset or empty
    #[error("Required environment variable {name} is not set")]
    MissingVariable { name: String },

    /// [`HarnessConfig`] or [`TestEnvironment`] failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The TOML config file is malformed
    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// Project id lookup failed
    #[error("GCP error: {0}")]
    Gcp(#[from] GcpError),

    /// The config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Harness settings, optionally loaded from a TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub terraform_dir: PathBuf,
    pub terraform_binary: String,
    pub max_retries: u32,
    pub time_between_retries_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            terraform_dir: PathBuf::from("infra"),
            terraform_binary: "terraform".to_string(),
            max_retries: 3,
            time_between_retries_secs: 5,
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, EnvironmentError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&contents).map_err(|source| EnvironmentError::ConfigParse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate().map_err(EnvironmentError::InvalidConfig)?;
        Ok(config)
    }

    /// `TERRAFORM_DIR` and `TERRAFORM_BINARY` win over file values
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = non_empty_env(TERRAFORM_DIR_ENV) {
            self.terraform_dir = PathBuf::from(dir);
        }
        if let Some(binary) = non_empty_env(TERRAFORM_BINARY_ENV) {
            self.terraform_binary = binary;
        }
        self
    }

    pub fn with_terraform_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.terraform_dir = dir.into();
        self
    }

    pub fn with_terraform_binary(mut self, binary: impl Into<String>) -> Self {
        self.terraform_binary = binary.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.terraform_dir.as_os_str().is_empty() {
            return Err("Terraform directory cannot be empty".to_string());
        }
        if self.terraform_binary.trim().is_empty() {
            return Err("Terraform binary cannot be empty".to_string());
        }
        if self.max_retries > 0 && self.time_between_retries_secs == 0 {
            return Err("Time between retries must be greater than 0 when retrying".to_string());
        }
        Ok(())
    }

    /// Binary, directory and retry policy shared by every Terraform call
    pub fn terraform_options(&self) -> Options {
        let options =
            Options::new(&self.terraform_dir).with_binary(&self.terraform_binary);

        with_default_retryable_errors(options)
            .with_max_retries(self.max_retries)
            .with_time_between_retries(Duration::from_secs(self.time_between_retries_secs))
    }
}

/// Inputs for one run of the bootstrap test
#[derive(Debug, Clone, PartialEq)]
pub struct TestEnvironment {
    pub project_id: String,
    pub workload_identity_repository: String,
    pub config: HarnessConfig,
}

impl TestEnvironment {
    pub fn new(
        project_id: impl Into<String>,
        workload_identity_repository: impl Into<String>,
        config: HarnessConfig,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            workload_identity_repository: workload_identity_repository.into(),
            config,
        }
    }

    /// Read the project id and repository from the process environment
    pub fn from_env(config: HarnessConfig) -> Result<Self, EnvironmentError> {
        let repository = non_empty_env(WORKLOAD_IDENTITY_REPOSITORY_ENV).ok_or_else(|| {
            EnvironmentError::MissingVariable {
                name: WORKLOAD_IDENTITY_REPOSITORY_ENV.to_string(),
            }
        })?;
        let project_id = gcp::project_id_from_env()?;

        let environment = Self::new(project_id, repository, config);
        environment
            .validate()
            .map_err(EnvironmentError::InvalidConfig)?;
        Ok(environment)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.project_id.trim().is_empty() {
            return Err("Project id cannot be empty".to_string());
        }
        if self.workload_identity_repository.trim().is_empty() {
            return Err("Workload identity repository cannot be empty".to_string());
        }
        self.config.validate()
    }

    /// Terraform options for a run using `names`
    pub fn terraform_options(&self, names: &ResourceNames) -> Options {
        self.config
            .terraform_options()
            .with_var("project_id", self.project_id.as_str())
            .with_var("ci_runner_sa_name", names.ci_runner_sa_name.as_str())
            .with_var("terraform_bucket_name", names.terraform_bucket_name.as_str())
            .with_var(
                "workload_identity_pool_id",
                names.workload_identity_pool_id.as_str(),
            )
            .with_var(
                "workload_identity_repositories",
                vec![self.workload_identity_repository.clone()],
            )
            .with_env("GOOGLE_CLOUD_PROJECT", &self.project_id)
    }

    pub fn terraform(&self, names: &ResourceNames) -> Terraform {
        Terraform::new(self.terraform_options(names))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
