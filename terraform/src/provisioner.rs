use crate::ops;
use crate::options::Options;
use crate::TerraformResult;
use std::collections::BTreeMap;
use tracing::{error, info};

/// Lifecycle operations a test needs from an infrastructure tool
pub trait Provisioner {
    fn init_and_apply(&self) -> TerraformResult<String>;

    fn output(&self, key: &str) -> TerraformResult<String>;

    fn destroy(&self) -> TerraformResult<String>;
}

/// [`Provisioner`] backed by the Terraform CLI
#[derive(Debug, Clone)]
pub struct Terraform {
    options: Options,
}

impl Terraform {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn output_all(&self) -> TerraformResult<BTreeMap<String, serde_json::Value>> {
        ops::output_all(&self.options)
    }
}

impl Provisioner for Terraform {
    fn init_and_apply(&self) -> TerraformResult<String> {
        ops::init_and_apply(&self.options)
    }

    fn output(&self, key: &str) -> TerraformResult<String> {
        ops::output(&self.options, key)
    }

    fn destroy(&self) -> TerraformResult<String> {
        ops::destroy(&self.options)
    }
}

/// Tears infrastructure down when it goes out of scope.
///
/// Create it *before* applying so that a failed apply still destroys
/// whatever was partially created. [`DestroyGuard::finish`] destroys
/// explicitly and hands back the result; otherwise `Drop` does it and
/// only logs failures. Destroy runs at most once per guard.
pub struct DestroyGuard<'a, P: Provisioner + ?Sized> {
    provisioner: &'a P,
    destroyed: bool,
}

impl<'a, P: Provisioner + ?Sized> DestroyGuard<'a, P> {
    pub fn new(provisioner: &'a P) -> Self {
        Self {
            provisioner,
            destroyed: false,
        }
    }

    pub fn finish(mut self) -> TerraformResult<String> {
        self.destroyed = true;
        self.provisioner.destroy()
    }
}

impl<P: Provisioner + ?Sized> Drop for DestroyGuard<'_, P> {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        info!("Destroy guard dropped, tearing down infrastructure");
        if let Err(e) = self.provisioner.destroy() {
            error!("Destroy during cleanup failed, resources may be orphaned: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TerraformError;
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingProvisioner {
        destroys: Cell<u32>,
        fail_destroy: bool,
    }

    impl Provisioner for CountingProvisioner {
        fn init_and_apply(&self) -> TerraformResult<String> {
            Ok(String::new())
        }

        fn output(&self, key: &str) -> TerraformResult<String> {
            Ok(key.to_string())
        }

        fn destroy(&self) -> TerraformResult<String> {
            self.destroys.set(self.destroys.get() + 1);
            if self.fail_destroy {
                return Err(TerraformError::InvalidOptions("destroy failed".to_string()));
            }
            Ok("Destroy complete!".to_string())
        }
    }

    #[test]
    fn test_finish_destroys_once() {
        let provisioner = CountingProvisioner::default();
        let guard = DestroyGuard::new(&provisioner);
        assert_eq!(guard.finish().unwrap(), "Destroy complete!");
        assert_eq!(provisioner.destroys.get(), 1);
    }

    #[test]
    fn test_drop_destroys_once() {
        let provisioner = CountingProvisioner::default();
        {
            let _guard = DestroyGuard::new(&provisioner);
        }
        assert_eq!(provisioner.destroys.get(), 1);
    }

    #[test]
    fn test_drop_swallows_destroy_error() {
        let provisioner = CountingProvisioner {
            fail_destroy: true,
            ..Default::default()
        };
        {
            let _guard = DestroyGuard::new(&provisioner);
        }
        assert_eq!(provisioner.destroys.get(), 1);
    }

    #[test]
    fn test_destroy_runs_on_panic() {
        let provisioner = CountingProvisioner::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = DestroyGuard::new(&provisioner);
            panic!("assertion failed inside test body");
        }));
        assert!(result.is_err());
        assert_eq!(provisioner.destroys.get(), 1);
    }

    #[test]
    fn test_terraform_exposes_options() {
        let terraform = Terraform::new(Options::new("infra"));
        assert_eq!(
            terraform.options().terraform_dir,
            std::path::PathBuf::from("infra")
        );
    }
}
