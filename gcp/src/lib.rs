//! Google Cloud helpers for infrastructure tests
//!
//! Resolves the project id from the environment and checks provisioned
//! Cloud Storage buckets through the JSON API.

pub mod config;
pub mod project;
pub mod storage;

pub use config::GcpConfig;
pub use project::{project_id_from_env, PROJECT_ID_ENV_VARS};
pub use storage::{assert_storage_bucket_exists, GcpError, GcpResult, GcsClient, StorageClient};
