use crate::{TerraformError, TerraformResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Patterns for Terraform failures that usually clear up on a second try,
/// mapped to a short description that ends up in the logs.
const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    (
        ".*read: connection reset by peer.*",
        "Failed to reach helm charts repository.",
    ),
    (".*transport is closing.*", "Failed to reach Kubernetes API."),
    (
        ".*unable to verify signature.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*unable to verify checksum.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*no provider exists with the given name.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*registry service is unreachable.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*Error installing provider.*",
        "Failed to install provider due to transient network error.",
    ),
    (
        ".*Failed to query available provider packages.*",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        ".*timeout while waiting for plugin to start.*",
        "Failed to start plugin due to transient network error.",
    ),
    (
        ".*timed out waiting for server handshake.*",
        "Failed to start plugin due to transient network error.",
    ),
    (
        "could not query provider registry for",
        "Failed to query provider registry due to transient network error.",
    ),
    (
        ".*Could not retrieve the list of available versions for provider.*",
        "Failed to retrieve provider versions due to transient network error.",
    ),
    (
        ".*Client.Timeout exceeded while awaiting headers.*",
        "Client timeout exceeded while awaiting headers.",
    ),
    (
        ".*TLS handshake timeout.*",
        "TLS handshake timed out due to transient network error.",
    ),
];

/// Settings shared by every Terraform invocation of a test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Binary to execute, `terraform` unless overridden (e.g. `tofu`)
    pub binary: String,
    /// Directory holding the Terraform configuration
    pub terraform_dir: PathBuf,
    /// Input variables passed with `-var`
    pub vars: BTreeMap<String, Value>,
    /// Extra environment for the Terraform process
    pub env_vars: BTreeMap<String, String>,
    /// Regex pattern -> description of failures worth retrying
    pub retryable_errors: BTreeMap<String, String>,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub time_between_retries: Duration,
    pub no_color: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            binary: "terraform".to_string(),
            terraform_dir: PathBuf::from("."),
            vars: BTreeMap::new(),
            env_vars: BTreeMap::new(),
            retryable_errors: BTreeMap::new(),
            max_retries: 0,
            time_between_retries: Duration::from_secs(5),
            no_color: true,
        }
    }
}

impl Options {
    pub fn new(terraform_dir: impl Into<PathBuf>) -> Self {
        Self {
            terraform_dir: terraform_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Add an input variable. Strings go to Terraform verbatim, anything
    /// else is encoded as JSON, which Terraform reads as an HCL literal.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_retryable_error(
        mut self,
        pattern: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.retryable_errors
            .insert(pattern.into(), description.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_time_between_retries(mut self, time_between_retries: Duration) -> Self {
        self.time_between_retries = time_between_retries;
        self
    }

    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.binary.trim().is_empty() {
            return Err("Terraform binary cannot be empty".to_string());
        }

        if !self.terraform_dir.is_dir() {
            return Err(format!(
                "Terraform directory '{}' does not exist",
                self.terraform_dir.display()
            ));
        }

        if let Some(key) = self.vars.keys().find(|key| key.trim().is_empty()) {
            return Err(format!("Variable name cannot be empty (got {:?})", key));
        }

        Ok(())
    }

    /// `-var key=value` pairs in a stable (sorted) order
    pub fn var_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.vars.len() * 2);
        for (key, value) in &self.vars {
            args.push("-var".to_string());
            args.push(format!("{}={}", key, format_var_value(value)));
        }
        args
    }

    /// Description of the first retryable pattern found in `output`
    pub fn retryable_reason(&self, output: &str) -> TerraformResult<Option<String>> {
        for (pattern, description) in &self.retryable_errors {
            let regex =
                Regex::new(pattern).map_err(|source| TerraformError::InvalidRetryPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            if regex.is_match(output) {
                return Ok(Some(description.clone()));
            }
        }
        Ok(None)
    }
}

fn format_var_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn default_retryable_errors() -> BTreeMap<String, String> {
    DEFAULT_RETRYABLE_ERRORS
        .iter()
        .map(|(pattern, description)| (pattern.to_string(), description.to_string()))
        .collect()
}

/// Fill in the well-known transient Terraform errors, 3 retries and a 5s
/// pause. Patterns already present on `options` are kept.
pub fn with_default_retryable_errors(mut options: Options) -> Options {
    for (pattern, description) in default_retryable_errors() {
        options.retryable_errors.entry(pattern).or_insert(description);
    }
    options.max_retries = 3;
    options.time_between_retries = Duration::from_secs(5);
    options
}
