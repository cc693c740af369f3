//! op-sync CLI entrypoint.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use op_sync::backend::{GitHubBackend, SecretsManagerBackend, SsmBackend, TemplateBackend};
use op_sync::cli::{Cli, Commands, LogFormat, OutputFormatter, Selection, confirm};
use op_sync::config::{ConfigHasher, ConfigParser, SyncConfig, find_config_file};
use op_sync::error::Result;
use op_sync::planner::{PendingChange, PlanExecutor, Planner};
use op_sync::services::{AwsServices, GitHubClient, OpCli};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let formatter = OutputFormatter::new(cli.output);
    let outcome = runtime.block_on(run(cli, &formatter));
    // A prompt abandoned on cancellation still holds a blocking stdin read.
    runtime.shutdown_background();

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. Logs go to stderr so stdout stays
/// parseable with `--output json`.
fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli, formatter: &OutputFormatter) -> Result<()> {
    let cancel = CancellationToken::new();
    watch_for_cancellation(&cancel, cli.timeout);

    let config = load_config(cli.config.as_ref())?;
    let planner = build_planner(cancel.clone())?;

    match cli.command {
        Commands::Validate => {
            let count = planner.validate_all(&config)?;
            println!("{}", formatter.format_validated(count));
            Ok(())
        }
        Commands::Plan { selection } => {
            let changes = plan(&planner, &config, &selection, formatter).await?;
            debug!("{} change(s) pending", changes.len());
            Ok(())
        }
        Commands::Apply { selection, force } => {
            let changes = plan(&planner, &config, &selection, formatter).await?;
            if changes.is_empty() {
                return Ok(());
            }
            if !force && !confirm(&cancel).await? {
                eprintln!("Apply cancelled.");
                return Ok(());
            }
            let result = PlanExecutor::new(cancel).execute(&changes).await?;
            println!("{}", formatter.format_result(&result));
            Ok(())
        }
    }
}

/// Cancels `cancel` on Ctrl-C or when the deadline passes.
fn watch_for_cancellation(cancel: &CancellationToken, timeout: Option<u64>) {
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            token.cancel();
        }
    });

    if let Some(secs) = timeout {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("Timed out after {secs}s, cancelling");
            token.cancel();
        });
    }
}

/// Plans the selected specs and prints the preview.
async fn plan(
    planner: &Planner,
    config: &SyncConfig,
    selection: &Selection,
    formatter: &OutputFormatter,
) -> Result<Vec<PendingChange>> {
    let (changes, names) = if let Some(backend) = &selection.backend {
        let changes = planner.plan_type(config, backend).await?;
        (changes, config.names_of_type(backend)?)
    } else if selection.names.is_empty() {
        (planner.plan_all(config).await?, config.names().collect())
    } else {
        let changes = planner.plan_names(config, &selection.names).await?;
        (changes, selection.names.iter().map(String::as_str).collect())
    };

    let fingerprint = ConfigHasher::new().fingerprint(config, &names);
    println!("{}", formatter.format_plan(&changes, &fingerprint));
    Ok(changes)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads `.env` next to the configuration file, then the configuration.
fn load_config(config_path: Option<&PathBuf>) -> Result<SyncConfig> {
    let config_file = resolve_config_path(config_path)?;
    info!("Loading configuration from: {}", config_file.display());

    let base_path = config_file.parent().unwrap_or_else(|| Path::new("."));
    let parser = ConfigParser::new().with_base_path(base_path);
    parser.load_dotenv()?;
    parser.load_file(&config_file)
}

/// Wires the real collaborators into every backend.
fn build_planner(cancel: CancellationToken) -> Result<Planner> {
    let op = Arc::new(OpCli::new());
    let aws = Arc::new(AwsServices::new());
    let github = Arc::new(GitHubClient::new()?);

    Ok(Planner::new(op.clone(), cancel)
        .with_backend(Arc::new(TemplateBackend::new(op.clone())))
        .with_backend(Arc::new(SsmBackend::new(op.clone(), aws.clone(), aws.clone())))
        .with_backend(Arc::new(SecretsManagerBackend::new(op.clone(), aws.clone(), aws)))
        .with_backend(Arc::new(GitHubBackend::new(op.clone(), op, github))))
}
