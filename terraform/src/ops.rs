use crate::command::run_terraform_command;
use crate::options::Options;
use crate::{TerraformError, TerraformResult};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Deserialize)]
struct OutputEntry {
    value: Value,
    #[allow(dead_code)]
    #[serde(default)]
    sensitive: bool,
}

fn with_color_flag(options: &Options, mut args: Vec<String>) -> Vec<String> {
    if options.no_color {
        args.push("-no-color".to_string());
    }
    args
}

pub(crate) fn init_args(options: &Options) -> Vec<String> {
    let args = vec![
        "init".to_string(),
        "-upgrade=false".to_string(),
        "-input=false".to_string(),
    ];
    with_color_flag(options, args)
}

pub(crate) fn apply_args(options: &Options) -> Vec<String> {
    let mut args = vec![
        "apply".to_string(),
        "-input=false".to_string(),
        "-auto-approve".to_string(),
        "-lock=false".to_string(),
    ];
    args.extend(options.var_args());
    with_color_flag(options, args)
}

pub(crate) fn destroy_args(options: &Options) -> Vec<String> {
    let mut args = vec![
        "destroy".to_string(),
        "-auto-approve".to_string(),
        "-input=false".to_string(),
        "-lock=false".to_string(),
    ];
    args.extend(options.var_args());
    with_color_flag(options, args)
}

pub(crate) fn output_args(key: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "output".to_string(),
        "-no-color".to_string(),
        "-json".to_string(),
    ];
    if let Some(key) = key {
        args.push(key.to_string());
    }
    args
}

/// `terraform init`
pub fn init(options: &Options) -> TerraformResult<String> {
    run_terraform_command(options, &init_args(options))
}

/// `terraform apply` with the configured variables, auto-approved
pub fn apply(options: &Options) -> TerraformResult<String> {
    run_terraform_command(options, &apply_args(options))
}

/// `init` followed by `apply`; returns the apply output
pub fn init_and_apply(options: &Options) -> TerraformResult<String> {
    init(options)?;
    apply(options)
}

/// Read a single output. String outputs come back unquoted, other values
/// as compact JSON.
pub fn output(options: &Options, key: &str) -> TerraformResult<String> {
    let stdout = run_terraform_command(options, &output_args(Some(key)))?;
    let value: Value =
        serde_json::from_str(stdout.trim()).map_err(|source| TerraformError::OutputParse {
            key: key.to_string(),
            source,
        })?;

    Ok(match value {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Read every output of the configuration
pub fn output_all(options: &Options) -> TerraformResult<BTreeMap<String, Value>> {
    let stdout = run_terraform_command(options, &output_args(None))?;
    let entries: BTreeMap<String, OutputEntry> =
        serde_json::from_str(stdout.trim()).map_err(|source| TerraformError::OutputParse {
            key: "*".to_string(),
            source,
        })?;

    Ok(entries
        .into_iter()
        .map(|(key, entry)| (key, entry.value))
        .collect())
}

/// `terraform destroy` with the same variables used for apply
pub fn destroy(options: &Options) -> TerraformResult<String> {
    info!(
        "Destroying resources in {}",
        options.terraform_dir.display()
    );
    run_terraform_command(options, &destroy_args(options))
}


#[cfg(all(test, unix))]
mod script_tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Fake terraform that logs its arguments and answers `output` calls
    fn fake_terraform(dir: &TempDir) -> Options {
        let log = dir.path().join("calls.log");
        let path = dir.path().join("fake-terraform");
        let script = format!(
            r#"#!/bin/sh
echo "$@" >> {log}
if [ "$1" = "output" ]; then
  case "$4" in
    bucket) echo '"terraform-bucket-abc123"' ;;
    count) echo '3' ;;
    broken) echo 'not json' ;;
    "") echo '{{"bucket":{{"sensitive":false,"type":"string","value":"b"}},"ids":{{"sensitive":false,"type":["list","string"],"value":["x","y"]}}}}' ;;
  esac
fi
exit 0
"#,
            log = log.display()
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        Options::new(dir.path())
            .with_binary(path.display().to_string())
            .with_var("name", "value")
    }

    fn calls(dir: &TempDir) -> Vec<String> {
        fs::read_to_string(dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_init_and_apply_runs_both() {
        let dir = TempDir::new().unwrap();
        let options = fake_terraform(&dir);

        init_and_apply(&options).unwrap();

        let calls = calls(&dir);
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("init"));
        assert!(calls[1].starts_with("apply"));
        assert!(calls[1].contains("-var name=value"));
    }

    #[test]
    fn test_output_values() {
        let dir = TempDir::new().unwrap();
        let options = fake_terraform(&dir);

        assert_eq!(
            output(&options, "bucket").unwrap(),
            "terraform-bucket-abc123"
        );
        assert_eq!(output(&options, "count").unwrap(), "3");
        assert!(matches!(
            output(&options, "broken"),
            Err(TerraformError::OutputParse { .. })
        ));
    }

    #[test]
    fn test_output_all() {
        let dir = TempDir::new().unwrap();
        let options = fake_terraform(&dir);

        let outputs = output_all(&options).unwrap();
        assert_eq!(outputs["bucket"], Value::String("b".to_string()));
        assert_eq!(outputs["ids"], serde_json::json!(["x", "y"]));
    }

    #[test]
    fn test_destroy_passes_vars() {
        let dir = TempDir::new().unwrap();
        let options = fake_terraform(&dir);

        destroy(&options).unwrap();

        let calls = calls(&dir);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("destroy -auto-approve"));
        assert!(calls[0].contains("-var name=value"));
    }
}
