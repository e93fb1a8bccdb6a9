use crate::config::{GcpConfig, DEFAULT_STORAGE_ENDPOINT};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by the Google Cloud helpers
#[derive(Error, Debug)]
pub enum GcpError {
    /// HTTP request to Cloud Storage failed
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// None of the project id variables is set
    #[error("No GCP project id found. Set one of: {checked}")]
    MissingProjectId { checked: String },

    /// [`GcpConfig`] failed validation
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The name cannot be a Cloud Storage bucket
    #[error("Invalid bucket name '{name}'")]
    InvalidBucketName { name: String },

    /// The bucket lookup came back 404
    #[error("Storage bucket '{name}' does not exist")]
    BucketNotFound { name: String },

    /// No access token, or the token was rejected
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Any other status from the JSON API
    #[error("Unexpected response {status} from Cloud Storage: {body}")]
    UnexpectedResponse { status: u16, body: String },
}

pub type GcpResult<T> = Result<T, GcpError>;

/// Cloud Storage lookups used to verify provisioned resources
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn bucket_exists(&self, name: &str) -> GcpResult<bool>;
}

/// Cloud Storage JSON API client
pub struct GcsClient {
    http_client: reqwest::Client,
    config: GcpConfig,
}

impl GcsClient {
    pub fn new(config: GcpConfig) -> GcpResult<Self> {
        config
            .validate()
            .map_err(|message| GcpError::InvalidConfig { message })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn from_env() -> GcpResult<Self> {
        Self::new(GcpConfig::from_env())
    }

    fn bucket_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/b/{}",
            self.config.storage_endpoint.trim_end_matches('/'),
            name
        )
    }

    /// Token to send, if any. Emulators accept unauthenticated requests, so
    /// gcloud is only consulted for the real endpoint.
    fn access_token(&self) -> GcpResult<Option<String>> {
        if let Some(token) = &self.config.access_token {
            return Ok(Some(token.clone()));
        }
        if self.config.storage_endpoint != DEFAULT_STORAGE_ENDPOINT {
            return Ok(None);
        }
        gcloud_access_token().map(Some)
    }
}

fn gcloud_access_token() -> GcpResult<String> {
    let output = Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .map_err(|e| GcpError::Authentication {
            message: format!(
                "could not run gcloud ({}); set GOOGLE_OAUTH_ACCESS_TOKEN instead",
                e
            ),
        })?;

    if !output.status.success() {
        return Err(GcpError::Authentication {
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(GcpError::Authentication {
            message: "gcloud returned an empty access token".to_string(),
        });
    }
    Ok(token)
}

fn is_valid_bucket_name(name: &str) -> bool {
    (3..=222).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}

#[async_trait]
impl StorageClient for GcsClient {
    async fn bucket_exists(&self, name: &str) -> GcpResult<bool> {
        if !is_valid_bucket_name(name) {
            return Err(GcpError::InvalidBucketName {
                name: name.to_string(),
            });
        }

        let url = self.bucket_url(name);
        debug!("Looking up bucket: {}", url);

        let mut request = self.http_client.get(&url);
        if let Some(token) = self.access_token()? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Err(GcpError::Authentication {
                    message: format!("{} while reading bucket '{}'", status, name),
                })
            }
            status => Err(GcpError::UnexpectedResponse {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// Fails unless the bucket exists
pub async fn assert_storage_bucket_exists<C>(client: &C, name: &str) -> GcpResult<()>
where
    C: StorageClient + ?Sized,
{
    info!("Verifying storage bucket exists: {}", name);
    if client.bucket_exists(name).await? {
        Ok(())
    } else {
        Err(GcpError::BucketNotFound {
            name: name.to_string(),
        })
    }
}
