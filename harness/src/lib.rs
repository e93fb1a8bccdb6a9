pub mod environment;
pub mod lifecycle;
pub mod names;
pub mod verify;

pub use environment::{EnvironmentError, HarnessConfig, TestEnvironment};
pub use lifecycle::{
    read_outputs, run_bootstrap_test, run_with_terraform, verify_applied, BootstrapReport,
    HarnessError, HarnessResult,
};
pub use names::{unique_id, ResourceNames};
pub use verify::{
    check_bucket_exists, check_service_account_email, check_workload_identity_pool_name,
    verify_outputs, BootstrapOutputs, CheckOutcome, Verification,
};
