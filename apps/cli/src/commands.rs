//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing::info;

use viewsync_core::{DocumentOutcome, ViewSync};
use viewsync_shared::{AppConfig, init_config, load_config, load_config_from};
use viewsync_storage::{DestinationStore, SqlStore};

use crate::fragments::{ChangeMessage, NotesFragment, StatusFragment};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ViewSync: keep denormalized documents in sync with their fragments.
#[derive(Parser)]
#[command(
    name = "viewsync",
    version,
    about = "Build, merge, and remove composite documents from fragment sources.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file to use instead of ~/.viewsync/viewsync.toml.
    #[arg(long, global = true, env = "VIEWSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fully rebuild and store one or more documents.
    Index {
        /// Document ids.
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Remove one or more documents from the store.
    Unindex {
        /// Document ids.
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Deliver a change message, e.g. '{"type":"statusUpdated","applicationId":"app1"}'.
    Message {
        /// Message as JSON.
        json: String,
    },

    /// Print a stored document.
    Show {
        /// Document id.
        id: String,
    },

    /// List stored document ids.
    List,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "viewsync=info",
        1 => "viewsync=debug",
        _ => "viewsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Index { ids } => cmd_index(&resolve_config(config_path)?, &ids).await,
        Command::Unindex { ids } => cmd_unindex(&resolve_config(config_path)?, &ids).await,
        Command::Message { json } => cmd_message(&resolve_config(config_path)?, &json).await,
        Command::Show { id } => cmd_show(&resolve_config(config_path)?, &id).await,
        Command::List => cmd_list(&resolve_config(config_path)?).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&resolve_config(config_path)?).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

/// Open the store read-write and start an engine with the demo fragments.
async fn start_engine(config: &AppConfig) -> Result<Arc<ViewSync<ChangeMessage, SqlStore>>> {
    let store = SqlStore::open(Path::new(&config.store.path)).await?;
    let sources = PathBuf::from(&config.sources.path);

    let mut engine = ViewSync::with_config(store, config.reconcile.clone());
    engine
        .register_fragment(StatusFragment::new(&sources))?
        .register_fragment(NotesFragment::new(&sources))?;

    let engine = Arc::new(engine);
    engine.start().await?;
    Ok(engine)
}

async fn open_readonly(config: &AppConfig) -> Result<SqlStore> {
    let path = Path::new(&config.store.path);
    if !path.exists() {
        return Err(eyre!(
            "no store at '{}'; index a document first",
            path.display()
        ));
    }
    Ok(SqlStore::open_readonly(path).await?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_index(config: &AppConfig, ids: &[String]) -> Result<()> {
    let engine = start_engine(config).await?;
    for id in ids {
        engine.index(id).await?;
        println!("  indexed   {id}");
    }
    Ok(())
}

async fn cmd_unindex(config: &AppConfig, ids: &[String]) -> Result<()> {
    let engine = start_engine(config).await?;
    for id in ids {
        engine.unindex(id).await?;
        println!("  unindexed {id}");
    }
    Ok(())
}

async fn cmd_message(config: &AppConfig, json: &str) -> Result<()> {
    let message: ChangeMessage =
        serde_json::from_str(json).map_err(|e| eyre!("invalid message '{json}': {e}"))?;
    info!(?message, "delivering message");

    let engine = start_engine(config).await?;
    let report = engine.on_message(&message).await?;

    if report.is_empty() {
        println!("  no fragment reacted to this message");
        return Ok(());
    }
    for (id, outcome) in &report.outcomes {
        println!("  {id:<12} {}", describe(outcome));
    }
    Ok(())
}

fn describe(outcome: &DocumentOutcome) -> String {
    match outcome {
        DocumentOutcome::Unindexed => "unindexed".into(),
        DocumentOutcome::Reindexed => "reindexed".into(),
        DocumentOutcome::Rebuilt => "rebuilt (was not stored)".into(),
        DocumentOutcome::Merged { fragments } => format!("merged [{}]", fragments.join(", ")),
        DocumentOutcome::Unchanged => "unchanged".into(),
        DocumentOutcome::Conflict => "skipped: conflicting instructions".into(),
    }
}

async fn cmd_show(config: &AppConfig, id: &str) -> Result<()> {
    let store = open_readonly(config).await?;
    let document = store
        .get(id)
        .await?
        .ok_or_else(|| eyre!("document '{id}' not found"))?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

async fn cmd_list(config: &AppConfig) -> Result<()> {
    let store = open_readonly(config).await?;
    let ids = store.list_ids().await?;
    if ids.is_empty() {
        println!("  (no documents)");
    }
    for id in ids {
        println!("  {id}");
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
