use crate::options::Options;
use crate::{TerraformError, TerraformResult};
use std::io::ErrorKind;
use std::process::Command;
use std::thread::sleep;
use tracing::{debug, info, warn};

/// Run `binary args...` inside the Terraform directory and return stdout.
///
/// A failing command is retried while its output matches one of
/// `options.retryable_errors`, at most `options.max_retries` times.
pub fn run_terraform_command(options: &Options, args: &[String]) -> TerraformResult<String> {
    options.validate().map_err(TerraformError::InvalidOptions)?;

    let description = format!("{} {}", options.binary, args.join(" "));
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        info!("Running command: {} (attempt {})", description, attempt);

        let error = match run_once(options, args, &description) {
            Ok(stdout) => return Ok(stdout),
            Err(e) => e,
        };

        let output = match &error {
            TerraformError::CommandFailed { output, .. } => output.clone(),
            _ => return Err(error),
        };

        let Some(reason) = options.retryable_reason(&output)? else {
            return Err(error);
        };

        if attempt > options.max_retries {
            return Err(TerraformError::RetriesExhausted {
                command: description,
                attempts: attempt,
                reason,
                output,
            });
        }

        warn!(
            "{} returned a retryable error ({}); retrying in {:?}",
            description, reason, options.time_between_retries
        );
        sleep(options.time_between_retries);
    }
}

fn run_once(options: &Options, args: &[String], description: &str) -> TerraformResult<String> {
    let result = Command::new(&options.binary)
        .args(args)
        .current_dir(&options.terraform_dir)
        .env("TF_IN_AUTOMATION", "1")
        .env("TF_INPUT", "0")
        .envs(&options.env_vars)
        .output();

    let output = match result {
        Ok(output) => output,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(TerraformError::BinaryNotFound {
                binary: options.binary.clone(),
            })
        }
        Err(e) => return Err(TerraformError::Io(e)),
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(TerraformError::CommandFailed {
            command: description.to_string(),
            exit_code: output.status.code(),
            output: format!("{}{}", stdout, stderr),
        });
    }

    if !stderr.trim().is_empty() {
        debug!("{} stderr: {}", description, stderr.trim());
    }

    Ok(stdout)
}
