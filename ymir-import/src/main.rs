//! ymir-import - bulk importer for 3D-print model directories
//!
//! `import` walks a directory tree, writes a `model.json` manifest for every
//! project found and, with `--db`, commits the models to the ymir server or,
//! when no server answers, to the local store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ymir_common::config::{load_config, ConfigSource, TomlConfig};
use ymir_common::db::ModelStore;
use ymir_common::model::parse_tags;
use ymir_import::config::{ImportOverrides, ImportSettings};
use ymir_import::services::gcode_parser;
use ymir_import::{run_import, CommitSettings, ImportRequest, WalkOptions};

/// Command-line arguments for ymir-import
#[derive(Parser, Debug)]
#[command(name = "ymir-import")]
#[command(about = "Bulk importer for 3D-print model directories")]
#[command(version)]
struct Args {
    /// Config file (overrides YMIR_CONFIG and the default locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find models under a directory and optionally commit them
    Import(ImportArgs),

    /// Print the metadata of one G-code file as JSON
    Gcode {
        /// G-code file
        file: PathBuf,
    },

    /// Local store maintenance
    Db {
        #[command(subcommand)]
        action: DbAction,

        /// Store file (defaults to the configured datastore)
        #[arg(long, env = "YMIR_DB_FILE")]
        db_file: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct ImportArgs {
    /// Root directory to scan
    #[arg(short, long)]
    path: PathBuf,

    /// Tags attached to every model found
    #[arg(short, long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Commit found models to the ymir server or the local store
    #[arg(long)]
    db: bool,

    /// Copy models into the models directory (default)
    #[arg(long, overrides_with = "no_cp")]
    cp: bool,

    /// Leave models where they are
    #[arg(long = "no-cp", overrides_with = "cp")]
    no_cp: bool,

    /// Canonical models directory
    #[arg(long)]
    models_dir: Option<String>,

    /// ymir server as hostname:port
    #[arg(long)]
    ymir_host: Option<String>,

    /// Skip G-code header parsing
    #[arg(long)]
    no_metadata: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum DbAction {
    /// Create the store file and bucket
    Create,
    /// Remove every stored model
    Truncate,
    /// Print every stored model
    List,
    /// Print the number of stored models
    Count,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = load_config(args.config.as_deref());
    init_tracing(&loaded.config, args.verbose);
    loaded.log_diagnostics();

    match &loaded.source {
        ConfigSource::File(path) => info!("Using config file: {}", path.display()),
        ConfigSource::Defaults => info!("No usable config file. Continuing with defaults."),
    }

    let config = loaded.config;

    match args.command {
        Command::Import(import) => import_command(&config, import).await,
        Command::Gcode { file } => gcode_command(file),
        Command::Db { action, db_file } => db_command(&config, action, db_file).await,
    }
}

fn init_tracing(config: &TomlConfig, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("ymir_import={},ymir_common={}", level, level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn import_command(config: &TomlConfig, args: ImportArgs) -> Result<()> {
    let tags = parse_tags(args.tags.as_slice()).context("Invalid tag")?;

    let settings = ImportSettings::resolve(
        config,
        &ImportOverrides {
            models_dir: args.models_dir,
            ymir_host: args.ymir_host,
            db_file: None,
        },
    );

    let relocate = args.cp || !args.no_cp;
    info!(
        path = %args.path.display(),
        relocate,
        commit = args.db,
        "Starting import"
    );

    let request = ImportRequest {
        root: args.path,
        tags,
        walk: WalkOptions {
            models_dir: relocate.then(|| settings.models_dir.clone()),
            extract_print_metadata: !args.no_metadata,
        },
        commit: args.db.then(|| CommitSettings {
            ymir_host: settings.ymir_host.clone(),
            db_file: settings.db_file.clone(),
        }),
    };

    let summary = run_import(request).await.context("Import failed")?;

    println!("{}", summary.headline());
    for model in &summary.models {
        println!("  {} ({} files) {}", model.display_name, model.file_count(), model.base_path);
    }

    if let Some(report) = &summary.commit {
        for outcome in report.outcomes.iter().filter(|o| !o.is_success()) {
            if let Err(e) = &outcome.result {
                println!("  FAILED {}: {}", outcome.display_name, e);
            }
        }
        println!(
            "{} committed, {} failed",
            report.succeeded(),
            report.failed()
        );
    }

    Ok(())
}

fn gcode_command(file: PathBuf) -> Result<()> {
    let metadata = gcode_parser::parse(&file)
        .with_context(|| format!("Failed to read G-code metadata from {}", file.display()))?;
    let json = serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;
    println!("{}", json);
    Ok(())
}

async fn db_command(config: &TomlConfig, action: DbAction, db_file: Option<String>) -> Result<()> {
    let settings = ImportSettings::resolve(
        config,
        &ImportOverrides {
            db_file,
            ..Default::default()
        },
    );
    info!("Store: {}", settings.db_file.display());

    let store = ModelStore::open(&settings.db_file)
        .await
        .with_context(|| format!("Failed to open store {}", settings.db_file.display()))?;

    match action {
        DbAction::Create => println!("Store ready at {}", settings.db_file.display()),
        DbAction::Truncate => {
            store.truncate().await.context("Failed to truncate store")?;
            println!("Store truncated");
        }
        DbAction::List => {
            for (id, model) in store.list().await.context("Failed to list models")? {
                println!("{}  {}  {}", id, model.display_name, model.base_path);
            }
        }
        DbAction::Count => {
            println!("{}", store.count().await.context("Failed to count models")?);
        }
    }

    store.close().await;
    Ok(())
}
