use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    pub storage_endpoint: String,
    pub timeout: Duration,
    /// OAuth2 bearer token; resolved from the environment or gcloud when unset
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            storage_endpoint: DEFAULT_STORAGE_ENDPOINT.to_string(),
            timeout: Duration::from_secs(30),
            access_token: None,
        }
    }
}

impl GcpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with `STORAGE_EMULATOR_HOST` and `GOOGLE_OAUTH_ACCESS_TOKEN`
    /// applied when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(host) = non_empty_env("STORAGE_EMULATOR_HOST") {
            config.storage_endpoint = if host.starts_with("http://") || host.starts_with("https://")
            {
                host
            } else {
                format!("http://{}", host)
            };
        }

        config.access_token = non_empty_env("GOOGLE_OAUTH_ACCESS_TOKEN");
        config
    }

    pub fn with_storage_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.storage_endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.storage_endpoint.is_empty() {
            return Err("Storage endpoint cannot be empty".to_string());
        }

        if !self.storage_endpoint.starts_with("http://")
            && !self.storage_endpoint.starts_with("https://")
        {
            return Err("Storage endpoint must start with http:// or https://".to_string());
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        if matches!(&self.access_token, Some(token) if token.trim().is_empty()) {
            return Err("Access token cannot be blank".to_string());
        }

        Ok(())
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
