use clap::{Parser, Subcommand};
use gcp::GcsClient;
use harness::{
    run_bootstrap_test, verify_applied, HarnessConfig, HarnessError, ResourceNames,
    TestEnvironment,
};
use std::path::PathBuf;
use terraform::{Provisioner, Terraform};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "bootstrap-test")]
#[command(about = "Apply, verify and destroy the GCP CI bootstrap Terraform module")]
struct Cli {
    /// Harness config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Terraform configuration directory (overrides config and TERRAFORM_DIR)
    #[arg(long, global = true)]
    terraform_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply with fresh names, verify the outputs, then destroy
    Run {
        /// Reuse a suffix instead of generating one
        #[arg(long)]
        suffix: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the resource names derived from a suffix
    Names {
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Verify the outputs of an already-applied configuration
    Verify,
    /// Destroy the resources created with a given suffix
    Destroy {
        #[arg(long)]
        suffix: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.terraform_dir)?;

    match cli.command {
        Commands::Run { suffix, json } => run(config, suffix, json).await?,
        Commands::Names { suffix } => print_names(suffix)?,
        Commands::Verify => verify(config).await?,
        Commands::Destroy { suffix } => destroy(config, &suffix)?,
    }

    Ok(())
}

fn load_config(
    path: Option<&std::path::Path>,
    terraform_dir: Option<PathBuf>,
) -> Result<HarnessConfig, HarnessError> {
    let config = match path {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    let config = config.with_env_overrides();

    Ok(match terraform_dir {
        Some(dir) => config.with_terraform_dir(dir),
        None => config,
    })
}

fn names_for(suffix: Option<String>) -> Result<ResourceNames, HarnessError> {
    let names = match suffix {
        Some(suffix) => ResourceNames::from_suffix(suffix),
        None => ResourceNames::generate(),
    };
    names.validate().map_err(HarnessError::InvalidNames)?;
    Ok(names)
}

async fn run(
    config: HarnessConfig,
    suffix: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let environment = TestEnvironment::from_env(config)?;
    let names = names_for(suffix)?;
    let terraform = environment.terraform(&names);
    let storage = GcsClient::from_env()?;

    info!(
        "Running bootstrap test in project {} with suffix {}",
        environment.project_id, names.suffix
    );

    match run_bootstrap_test(&names, &terraform, &storage).await {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("✓ Bootstrap test passed ({})", report.verification);
                println!("  bucket:          {}", report.outputs.bucket_name);
                println!("  service account: {}", report.outputs.service_account_email);
                println!(
                    "  identity pool:   {}",
                    report.outputs.workload_identity_pool_name
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("Bootstrap test failed: {}", e);
            println!("✗ Bootstrap test failed: {}", e);
            Err(e.into())
        }
    }
}

fn print_names(suffix: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let names = names_for(suffix)?;
    println!("suffix:                    {}", names.suffix);
    println!("ci_runner_sa_name:         {}", names.ci_runner_sa_name);
    println!("terraform_bucket_name:     {}", names.terraform_bucket_name);
    println!("workload_identity_pool_id: {}", names.workload_identity_pool_id);
    Ok(())
}

async fn verify(config: HarnessConfig) -> Result<(), Box<dyn std::error::Error>> {
    let terraform = Terraform::new(config.terraform_options());
    let storage = GcsClient::from_env()?;

    let verification = verify_applied(&terraform, &storage).await?;
    println!("{}", verification);
    verification
        .into_result()
        .map_err(|v| HarnessError::VerificationFailed(v).into())
}

fn destroy(config: HarnessConfig, suffix: &str) -> Result<(), Box<dyn std::error::Error>> {
    let environment = TestEnvironment::from_env(config)?;
    let names = names_for(Some(suffix.to_string()))?;
    let terraform = environment.terraform(&names);

    terraform.destroy().map_err(HarnessError::Destroy)?;
    println!("✓ Destroyed resources with suffix {}", names.suffix);
    Ok(())
}
