use crate::config::non_empty_env;
use crate::storage::{GcpError, GcpResult};

/// Environment variables checked for the project id, in order
pub const PROJECT_ID_ENV_VARS: &[&str] = &[
    "GOOGLE_PROJECT",
    "GOOGLE_CLOUD_PROJECT",
    "GOOGLE_CLOUD_PROJECT_ID",
    "GCLOUD_PROJECT",
    "CLOUDSDK_CORE_PROJECT",
];

/// First non-empty project id found in [`PROJECT_ID_ENV_VARS`]
pub fn project_id_from_env() -> GcpResult<String> {
    PROJECT_ID_ENV_VARS
        .iter()
        .find_map(|key| non_empty_env(key))
        .ok_or_else(|| GcpError::MissingProjectId {
            checked: PROJECT_ID_ENV_VARS.join(", "),
        })
}
