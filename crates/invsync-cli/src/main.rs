//! InvSync - cloud inventory reconciliation
//!
//! Fetches the live resource listing of a subscription, compares it with the
//! stored inventory and brings the store in line, with operator-driven
//! conflict resolution and a persisted run history.

mod display;
mod json_output;
mod progress;
mod prompt;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use invsync_config::{Config, ConfigLoader, LoggingConfig};
use invsync_store::{query_resources, store_stats, ResourceQuery};
use invsync_sync::{EventSink, SyncApiResponse, SyncRequest, SyncService};
use invsync_types::{
    parse_resolutions, Environment, ResourceStore, ServiceType, SyncSource, TriggerSource,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use crate::json_output::JsonEnvelope;
use crate::progress::LiveLog;

/// InvSync - cloud inventory reconciliation
#[derive(Parser)]
#[command(
    name = "invsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Reconcile a cloud subscription with a stored resource inventory",
    long_about = "InvSync fetches the live resources of a subscription, compares them with the\n\
                  stored inventory and applies creates, updates and deletes. Conflicting fields\n\
                  can be resolved interactively or from a resolutions file."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synchronization
    Sync {
        /// JSON file with per-field resolutions
        #[arg(short, long)]
        resolutions: Option<PathBuf>,
        /// Operator recorded in the history
        #[arg(short, long)]
        user: Option<String>,
        /// Origin stamped on written records
        #[arg(short, long, value_enum)]
        source: Option<SourceArg>,
        /// Print the API response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what a synchronization would change
    Preview {
        /// Print the API response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve conflicts interactively, then synchronize
    Resolve {
        /// Operator recorded in the history
        #[arg(short, long)]
        user: Option<String>,
    },
    /// List stored resources
    List {
        /// Resource type, e.g. "Virtual Machine"
        #[arg(short = 't', long = "type", value_parser = parse_service_type)]
        resource_type: Option<ServiceType>,
        /// Environment
        #[arg(short, long, value_enum)]
        environment: Option<EnvironmentArg>,
        /// Resource group
        #[arg(long)]
        resource_group: Option<String>,
        /// Location
        #[arg(long)]
        location: Option<String>,
        /// Only resources with (true) or without (false) a linked repository
        #[arg(long)]
        has_git: Option<bool>,
        /// Page size
        #[arg(long, default_value = "50")]
        limit: usize,
        /// Items to skip
        #[arg(long, default_value = "0")]
        offset: usize,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent synchronization runs
    History {
        /// Number of runs, defaults to sync.history_limit
        #[arg(short, long)]
        limit: Option<usize>,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Show inventory statistics
    Stats {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
        /// Write a default configuration file
        #[arg(long)]
        generate: Option<PathBuf>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum SourceArg {
    Manual,
    Automatic,
    Script,
}

impl From<SourceArg> for SyncSource {
    fn from(source: SourceArg) -> Self {
        match source {
            SourceArg::Manual => SyncSource::Manual,
            SourceArg::Automatic => SyncSource::Automatic,
            SourceArg::Script => SyncSource::Script,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum EnvironmentArg {
    Production,
    Development,
    Unknown,
}

impl From<EnvironmentArg> for Environment {
    fn from(environment: EnvironmentArg) -> Self {
        match environment {
            EnvironmentArg::Production => Environment::Production,
            EnvironmentArg::Development => Environment::Development,
            EnvironmentArg::Unknown => Environment::Unknown,
        }
    }
}

fn parse_service_type(value: &str) -> std::result::Result<ServiceType, String> {
    value.parse().map_err(|e: invsync_types::Error| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&config.logging, cli.debug, cli.quiet, cli.verbose)?;

    info!("InvSync v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Sync {
            resolutions,
            user,
            source,
            json,
        } => {
            sync_command(
                &config,
                resolutions.as_deref(),
                user,
                source.map(Into::into),
                json,
                cli.quiet,
                cli.verbose || cli.debug,
            )
            .await?;
        }
        Commands::Preview { json } => {
            preview_command(&config, json, cli.quiet).await?;
        }
        Commands::Resolve { user } => {
            resolve_command(&config, user, cli.verbose || cli.debug).await?;
        }
        Commands::List {
            resource_type,
            environment,
            resource_group,
            location,
            has_git,
            limit,
            offset,
            json,
        } => {
            let query = ResourceQuery {
                resource_type,
                environment: environment.map(Into::into),
                resource_group,
                location,
                has_git_repository: has_git,
                ..ResourceQuery::new()
            }
            .paginate(offset, limit);
            list_command(&config, &query, json).await?;
        }
        Commands::History { limit, json } => {
            history_command(&config, limit.unwrap_or(config.sync.history_limit), json).await?;
        }
        Commands::Stats { json } => {
            stats_command(&config, json).await?;
        }
        Commands::Config { default, generate } => {
            config_command(&config, default, generate.as_deref())?;
        }
    }

    Ok(())
}

fn init_logging(
    logging: &LoggingConfig,
    debug: bool,
    quiet: bool,
    verbose: bool,
) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let console_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let console_layer = if logging.json_format {
        fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(logging.colored_output)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = if logging.enable_file_logging {
        let path = logging
            .log_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("invsync.log"));
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let file_name = path
            .file_name()
            .map_or_else(|| "invsync.log".into(), |name| name.to_os_string());

        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
        let layer = fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(EnvFilter::try_new(&logging.level)?);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer.with_filter(console_filter))
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

fn build_service(config: &Config) -> Result<SyncService> {
    SyncService::from_config(config).context("Failed to set up sync service")
}

async fn connected_store(config: &Config) -> Result<Arc<dyn ResourceStore>> {
    let service = build_service(config)?;
    let store = Arc::clone(service.store());
    store.connect().await.context("Failed to connect to store")?;
    Ok(store)
}

async fn sync_command(
    config: &Config,
    resolutions: Option<&Path>,
    user: Option<String>,
    source: Option<SyncSource>,
    json: bool,
    quiet: bool,
    show_debug: bool,
) -> Result<()> {
    info!("Starting sync operation");

    let mut request = SyncRequest::new().with_trigger(TriggerSource::Cli);
    if let Some(path) = resolutions {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read resolutions file {}", path.display()))?;
        request = request.with_resolutions(parse_resolutions(&text)?);
    }
    if let Some(user) = user {
        request = request.with_user_id(user);
    }
    if let Some(source) = source {
        request = request.with_source(source);
    }

    let service = build_service(config)?;
    if !quiet && !json {
        println!(
            "{} Synchronizing inventory from {}",
            style("⟲").blue().bold(),
            style(service.provider().name()).cyan()
        );
    }

    let (sink, rx) = EventSink::channel();
    let live_log = tokio::spawn(LiveLog::new(quiet || json, show_debug).run(rx));
    let outcome = service.run(request, &sink).await;
    drop(sink);
    live_log.await.context("Live log task failed")?;

    match outcome {
        Ok(result) => {
            if json {
                println!("{}", SyncApiResponse::from_result(&result).to_json_pretty()?);
            } else if !quiet {
                display::print_sync_result(&result);
            }
            if !result.success {
                bail!("{} of {} actions failed", result.errors.len(), result.stats.resources_processed);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                println!("{}", SyncApiResponse::from_error(&e).to_json_pretty()?);
            }
            Err(e).context("Synchronization aborted")
        }
    }
}

async fn preview_command(config: &Config, json: bool, quiet: bool) -> Result<()> {
    let service = build_service(config)?;

    let (sink, rx) = EventSink::channel();
    let live_log = tokio::spawn(LiveLog::new(quiet || json, false).run(rx));
    let outcome = service.preview(&sink).await;
    drop(sink);
    live_log.await.context("Live log task failed")?;

    let report = outcome.context("Preview failed")?;
    if json {
        println!("{}", SyncApiResponse::from_preview(&report).to_json_pretty()?);
    } else {
        display::print_preview(&report);
    }
    Ok(())
}

async fn resolve_command(config: &Config, user: Option<String>, show_debug: bool) -> Result<()> {
    let service = build_service(config)?;

    let (sink, rx) = EventSink::channel();
    let live_log = tokio::spawn(LiveLog::new(false, show_debug).run(rx));
    let outcome = service.preview(&sink).await;
    drop(sink);
    live_log.await.context("Live log task failed")?;
    let report = outcome.context("Preview failed")?;

    if report.conflicts.is_empty() {
        display::display_success("No conflicts to resolve");
        return Ok(());
    }

    display::display_info(&format!(
        "{} conflicts on {} resources",
        report.conflicts.len(),
        report.conflicting_resources().len()
    ));
    let resolutions = prompt::collect_resolutions(&report.conflicts, prompt::ask_resolution)?;

    let mut request = SyncRequest::new()
        .with_trigger(TriggerSource::Cli)
        .with_resolutions(resolutions);
    if let Some(user) = user {
        request = request.with_user_id(user);
    }

    let (sink, rx) = EventSink::channel();
    let live_log = tokio::spawn(LiveLog::new(false, show_debug).run(rx));
    let outcome = service.run(request, &sink).await;
    drop(sink);
    live_log.await.context("Live log task failed")?;

    let result = outcome.context("Synchronization aborted")?;
    display::print_sync_result(&result);
    if !result.success {
        bail!("{} of {} actions failed", result.errors.len(), result.stats.resources_processed);
    }
    Ok(())
}

async fn list_command(config: &Config, query: &ResourceQuery, json: bool) -> Result<()> {
    let store = connected_store(config).await?;
    let page = query_resources(store.as_ref(), query).await?;

    if json {
        println!("{}", JsonEnvelope::new("list", &page).to_json_pretty()?);
    } else {
        display::print_resource_page(&page);
    }
    Ok(())
}

async fn history_command(config: &Config, limit: usize, json: bool) -> Result<()> {
    let store = connected_store(config).await?;
    let history = store.list_history(limit).await?;

    if json {
        println!("{}", JsonEnvelope::new("history", &history).to_json_pretty()?);
    } else {
        display::print_history(&history);
    }
    Ok(())
}

async fn stats_command(config: &Config, json: bool) -> Result<()> {
    let store = connected_store(config).await?;
    let stats = store_stats(store.as_ref()).await?;

    if json {
        println!("{}", JsonEnvelope::new("stats", &stats).to_json_pretty()?);
    } else {
        display::print_store_stats(&stats);
    }
    Ok(())
}

fn config_command(config: &Config, default: bool, generate: Option<&Path>) -> Result<()> {
    if let Some(path) = generate {
        ConfigLoader::generate_default_config(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        display::display_success(&format!("Default configuration written to {}", path.display()));
        return Ok(());
    }

    if default {
        println!("{} Default configuration:", style("⚙").blue().bold());
        print!("{}", serde_yaml::to_string(&Config::default())?);
    } else {
        match ConfigLoader::config_exists() {
            Some(path) => println!(
                "{} Current configuration ({}):",
                style("⚙").blue().bold(),
                style(path.display()).cyan()
            ),
            None => println!(
                "{} Current configuration (defaults, no file found):",
                style("⚙").blue().bold()
            ),
        }
        print!("{}", serde_yaml::to_string(config)?);
    }
    Ok(())
}
