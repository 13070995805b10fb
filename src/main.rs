use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use regex::Regex;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use versions::{
    config::Config,
    diff::{DiffEngine, NameFilter},
    model::{Application, VersionKind},
    output::{print_applications, print_diff, print_remote, OutputFormat},
    registry::Registry,
    store::{fetch_snapshots, list_snapshots, snapshot_key, DirectoryStore, ObjectStore, StoreError},
};

mod exit_codes {
    pub const SUCCESS: u8 = 0;
    /// The object store refused access or is not configured.
    pub const ACCESS_DENIED: u8 = 1;
    pub const ERROR: u8 = 2;
}

#[derive(Parser)]
#[command(name = "versions")]
#[command(
    author,
    version,
    about = "Track deployed application versions and compare them across hosts"
)]
struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Override the configured environment name
    #[arg(short, long, global = true)]
    environment: Option<String>,

    /// Override the configured instance id
    #[arg(long, global = true)]
    instance_id: Option<String>,

    /// Override the directory holding per-application metadata files
    #[arg(long, global = true)]
    version_directory: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List application versions on this host
    List {
        /// Application name must match this regex (repeatable, all must match)
        #[arg(short, long)]
        filter: Vec<String>,

        /// Output format (table, json)
        #[arg(long)]
        format: Option<String>,
    },

    /// List host snapshots in the object store
    ListRemote {
        /// Object key must match this regex (repeatable, all must match)
        #[arg(short, long)]
        filter: Vec<String>,

        /// Last-modified time must match this regex, e.g. 2017-05
        #[arg(short = 'm', long)]
        filter_last_modified: Option<String>,

        /// Output format (table, json)
        #[arg(long)]
        format: Option<String>,
    },

    /// Compare application versions across all hosts
    ShowDiff {
        /// Application name must match this regex (repeatable, all must match)
        #[arg(short, long)]
        filter: Vec<String>,

        /// Output format (table, json)
        #[arg(long)]
        format: Option<String>,
    },

    /// Write this host's snapshot to the tmp directory
    GenerateMetadataFile,

    /// Record a new version (optional) and upload this host's snapshot
    Update {
        /// Application name
        #[arg(short, long, requires = "version")]
        application: Option<String>,

        /// Version that is now deployed
        #[arg(short = 'v', long = "version", requires = "application")]
        version: Option<String>,

        /// Record the version as previous instead of promoting it to current
        #[arg(long, requires = "version")]
        previous: bool,
    },

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

impl Commands {
    fn uses_store(&self) -> bool {
        matches!(
            self,
            Commands::ListRemote { .. } | Commands::ShowDiff { .. } | Commands::Update { .. }
        )
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS),
        Err(e) => {
            let (code, message) = failure_report(&e);
            eprintln!("{}", message);
            ExitCode::from(code)
        }
    }
}

/// Exit status and operator message for a failed run.
fn failure_report(error: &anyhow::Error) -> (u8, String) {
    match store_error(error) {
        Some(StoreError::NotConfigured) => (
            exit_codes::ACCESS_DENIED,
            "Warning: No credentials found for the object store (store.directory is not set). Abort.".to_string(),
        ),
        Some(StoreError::AccessDenied { key }) => (
            exit_codes::ACCESS_DENIED,
            format!(
                "Warning: Object store rejected our credentials for {}. Access Denied. Abort.",
                key
            ),
        ),
        _ => (exit_codes::ERROR, format!("Error: {:#}", error)),
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Finds a store failure anywhere in the error chain.
fn store_error(error: &anyhow::Error) -> Option<&StoreError> {
    error.chain().find_map(|cause| {
        cause.downcast_ref::<StoreError>().or_else(|| {
            match cause.downcast_ref::<versions::Error>() {
                Some(versions::Error::Store(e)) => Some(e),
                _ => None,
            }
        })
    })
}

fn run(cli: Cli) -> Result<()> {
    let mut config = resolve_config(Config::load(), cli.command.uses_store())?;

    if let Some(environment) = cli.environment {
        config.environment_name = environment;
    }
    if let Some(instance_id) = cli.instance_id {
        config.instance_id = instance_id;
    }
    if let Some(directory) = cli.version_directory {
        config.version_directory = directory;
    }

    match cli.command {
        Commands::List { filter, format } => {
            list(&config, &filter, resolve_format(format, &config)?)
        }
        Commands::ListRemote {
            filter,
            filter_last_modified,
            format,
        } => list_remote(
            &config,
            &filter,
            filter_last_modified.as_deref(),
            resolve_format(format, &config)?,
        ),
        Commands::ShowDiff { filter, format } => {
            show_diff(&config, &filter, resolve_format(format, &config)?)
        }
        Commands::GenerateMetadataFile => {
            let path = generate_metadata_file(&config)?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::Update {
            application,
            version,
            previous,
        } => update(&config, application, version, previous),
        Commands::Config { init, path } => handle_config(init, path),
    }
}

/// Local actions run on defaults when the config file is broken; actions
/// that reach the object store refuse to, since the store location would be lost.
fn resolve_config(loaded: versions::Result<Config>, uses_store: bool) -> Result<Config> {
    match loaded {
        Ok(config) => Ok(config),
        Err(e) if uses_store => Err(e).with_context(|| {
            format!("Failed to load config file {}", Config::config_path().display())
        }),
        Err(e) => {
            warn!("Ignoring unreadable config file: {}", e);
            Ok(Config::default())
        }
    }
}

fn resolve_format(format: Option<String>, config: &Config) -> Result<OutputFormat> {
    let format = format.unwrap_or_else(|| config.default_format.clone());
    OutputFormat::from_str(&format).map_err(|e| anyhow::anyhow!(e))
}

fn list(config: &Config, filters: &[String], format: OutputFormat) -> Result<()> {
    let filter = NameFilter::new(filters)?;

    let mut registry = Registry::from_config(config);
    let applications: Vec<&Application> = registry
        .collect()
        .context("Failed to load local version metadata")?
        .values()
        .filter(|app| filter.matches(app.name()))
        .collect();

    print_applications(&applications, format)?;
    Ok(())
}

fn list_remote(
    config: &Config,
    filters: &[String],
    last_modified: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let filter = NameFilter::new(filters)?;
    let last_modified = last_modified
        .map(Regex::new)
        .transpose()
        .context("Invalid --filter-last-modified pattern")?;

    let store = DirectoryStore::from_config(config)?;
    let objects = list_snapshots(&store, &filter, last_modified.as_ref())?;

    print_remote(&objects, format)?;
    Ok(())
}

fn show_diff(config: &Config, filters: &[String], format: OutputFormat) -> Result<()> {
    let filter = NameFilter::new(filters)?;

    let store = DirectoryStore::from_config(config)?;
    let snapshots = fetch_snapshots(&store, &config.tmp_directory, config.group())
        .context("Failed to fetch remote snapshots")?;

    let report = DiffEngine::new(filter).diff(&snapshots);
    print_diff(&report, format)?;
    Ok(())
}

fn generate_metadata_file(config: &Config) -> Result<PathBuf> {
    let mut registry = Registry::from_config(config);
    let path = registry
        .write_metadata_file(&config.tmp_directory)
        .context("Failed to generate metadata file")?;
    Ok(path)
}

fn update(
    config: &Config,
    application: Option<String>,
    version: Option<String>,
    previous: bool,
) -> Result<()> {
    let store = DirectoryStore::from_config(config)?;
    let mut registry = Registry::from_config(config);

    match (application, version) {
        (Some(application), Some(version)) => {
            let kind = if previous {
                VersionKind::Previous
            } else {
                VersionKind::Current
            };
            registry
                .update(&application, &version, Utc::now(), kind)
                .with_context(|| format!("Failed to record {} {}", application, version))?;
        }
        (None, None) => {}
        _ => bail!("--application and --version must be given together"),
    }

    let path = registry
        .write_metadata_file(&config.tmp_directory)
        .context("Failed to generate metadata file")?;
    let key = snapshot_key(registry.environment_name(), registry.instance_id());
    store.upload(&path, &key)?;

    Ok(())
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        Config::default().save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'versions config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
