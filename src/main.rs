//! apprun-provisioner CLI entrypoint.
//!
//! This is the main entrypoint for the apprun-provisioner command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use apprun_provisioner::apprun::ApiClient;
use apprun_provisioner::cli::{Cli, Commands, OutputFormat, OutputFormatter};
use apprun_provisioner::config::{ClusterConfig, ConfigParser, ConfigValidator, find_config_file};
use apprun_provisioner::error::{ConfigError, ProvisionerError, Result};
use apprun_provisioner::ledger::{LocalLedgerStore, MemoryLedgerStore};
use apprun_provisioner::planner::ApplyOptions;
use apprun_provisioner::reconciler::Reconciler;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    let formatter = OutputFormatter::new(cli.output);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(async {
        tokio::select! {
            result = run(cli, &formatter) => result,
            _ = tokio::signal::ctrl_c() => Err(ProvisionerError::Cancelled),
        }
    });

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, format: OutputFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        OutputFormat::Json => builder.json().init(),
        OutputFormat::Text => builder.init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli, formatter: &OutputFormatter) -> Result<()> {
    if let Commands::Dump { cluster } = &cli.command {
        return cmd_dump(cluster, cli.api_url.as_deref(), formatter).await;
    }

    let config_file = resolve_config_path(cli.config.as_ref())?;
    let parser = ConfigParser::new().with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")));
    parser.load_dotenv()?;

    debug!("Loading configuration from: {}", config_file.display());
    let config = parser.load_file(&config_file)?;

    if let Commands::Validate { warnings } = cli.command {
        return cmd_validate(&config, warnings, formatter);
    }

    let client = create_client(cli.api_url.as_deref())?;
    let ledger_store = LocalLedgerStore::for_config(&config_file);
    let reconciler = Reconciler::new(&client, &ledger_store);

    match cli.command {
        Commands::Plan => {
            ConfigValidator::new().validate(&config)?;
            let plan = reconciler.plan(&config).await?;
            println!("{}", formatter.format_plan(&plan));
        }
        Commands::Apply { activate, auto_approve } => {
            ConfigValidator::new().validate(&config)?;
            let plan = reconciler.plan(&config).await?;
            println!("{}", formatter.format_plan(&plan));

            if !plan.has_changes() {
                return Ok(());
            }
            if !auto_approve && !confirm("Do you want to apply this plan?")? {
                eprintln!("Apply cancelled.");
                return Ok(());
            }

            let options = ApplyOptions::default().with_activate(activate);
            let result = reconciler.apply(&config, &plan, options).await?;
            println!("{}", formatter.format_execution(&result));
        }
        Commands::Versions { app } => {
            let cluster = cluster_name(&config)?;
            let list = reconciler.list_versions(cluster, &app).await?;
            println!("{}", formatter.format_versions(&list));
        }
        Commands::Diff { app, from, to } => {
            let cluster = cluster_name(&config)?;
            let diff = reconciler.version_diff(cluster, &app, from, to).await?;
            println!("{}", formatter.format_version_diff(&diff));
        }
        Commands::Activate { app, target } => {
            let cluster = cluster_name(&config)?;
            let version = reconciler.activate_version(cluster, &app, target).await?;
            println!("{}", formatter.format_activation(&app, version));
        }
        Commands::Validate { .. } | Commands::Dump { .. } => {}
    }

    Ok(())
}

/// Validate configuration.
fn cmd_validate(config: &ClusterConfig, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    info!("Validating configuration for cluster: {}", config.cluster_name);

    let result = ConfigValidator::new().check(config);
    println!("{}", formatter.format_validation(&result, show_warnings));

    if let Some(first) = result.errors.first() {
        return Err(ConfigError::validation(first.message.clone(), first.field.clone()).into());
    }
    Ok(())
}

/// Print the live cluster as a configuration file.
async fn cmd_dump(cluster: &str, api_url: Option<&str>, formatter: &OutputFormatter) -> Result<()> {
    ConfigParser::new().load_dotenv()?;
    let client = create_client(api_url)?;
    let ledger_store = MemoryLedgerStore::new();
    let reconciler = Reconciler::new(&client, &ledger_store);

    let config = reconciler.dump_cluster_config(cluster).await?;
    let yaml = ConfigParser::to_yaml(&config)?;
    print!("{}", formatter.format_config(&config, &yaml));
    Ok(())
}

/// Asks the user for a y/N confirmation on stderr.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt} [y/N]: ");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn cluster_name(config: &ClusterConfig) -> Result<&str> {
    if config.cluster_name.is_empty() {
        return Err(ConfigError::validation("clusterName is required", "clusterName").into());
    }
    Ok(&config.cluster_name)
}

fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

fn create_client(api_url: Option<&str>) -> Result<ApiClient> {
    let credentials = ConfigParser::credentials()?;
    let client = ApiClient::new(credentials)?;
    Ok(match api_url {
        Some(url) => {
            warn!("Using API base URL override: {url}");
            client.with_base_url(url)
        }
        None => client,
    })
}
