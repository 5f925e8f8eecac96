use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use luach::background::HttpImageLoader;
use luach::cache::{BoardCache, KvStore};
use luach::config::{Config, LoggingConfig};
use luach::engine::{Engine, LogRenderer};
use luach::prelude::{HttpDataSource, JsonFileStore};
use luach::schedule;

#[derive(Parser)]
#[command(
    name = "luach",
    version,
    about = "Synagogue display board rotation engine",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the rotation engine until interrupted
    Run {
        /// Configuration file path (TOML); environment variables otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate configuration and exit
    Check {
        /// Configuration file path (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the effective playlist (persisted or default)
    Playlist {
        /// Configuration file path (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Fetch one collection from the backend and print it
    Fetch {
        /// Collection name (times, halacha, announcements, memorials, events)
        collection: String,

        /// Configuration file path (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.command.config_path())?;
    setup_tracing(&config.logging, cli.log_format.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Run { .. } => {
            run(config).await?;
        }

        Commands::Check { .. } => {
            println!("configuration valid");
            println!("  backend: {}", config.backend.base_url);
            println!("  storage: {}", config.cache.storage_dir.display());
            println!("  refresh every {}s", config.cache.refresh_interval_secs);
            println!("  theme: {}", config.display.theme_preset);
        }

        Commands::Playlist { .. } => {
            let store = JsonFileStore::new(&config.cache.storage_dir);
            let playlist = schedule::load_playlist(&store).await;
            println!("{}", schedule::serialize_playlist(&playlist)?);
        }

        Commands::Fetch { collection, .. } => {
            let records = fetch_collection(&config, &collection).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}

impl Commands {
    fn config_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Run { config }
            | Self::Check { config }
            | Self::Playlist { config }
            | Self::Fetch { config, .. } => config.as_deref(),
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(
        backend = %config.backend.base_url,
        storage = %config.cache.storage_dir.display(),
        "luach display engine starting"
    );

    let store: Arc<dyn KvStore> = Arc::new(JsonFileStore::new(&config.cache.storage_dir));
    let source = Arc::new(HttpDataSource::new(&config.backend)?);
    let cache = BoardCache::open(source, store.clone(), (&config.cache).into()).await;

    let playlist = schedule::load_playlist(store.as_ref()).await;
    let loader = Arc::new(HttpImageLoader::new(config.request_timeout()));

    let (engine, handle) = Engine::new(&config, cache.clone(), playlist, loader, Box::new(LogRenderer));
    let engine_task = tokio::spawn(engine.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received, shutting down");

    let _ = handle.shutdown.send(());
    engine_task.await?;
    cache.shutdown();

    tracing::info!("luach stopped cleanly");
    Ok(())
}

async fn fetch_collection(
    config: &Config,
    collection: &str,
) -> luach::error::Result<Vec<serde_json::Value>> {
    let source = HttpDataSource::new(&config.backend)?;
    use luach::cache::DataSource;
    let records = source.list(collection).await?;
    tracing::info!(collection = %collection, count = records.len(), "collection fetched");
    Ok(records)
}

fn setup_tracing(logging: &LoggingConfig, format_override: Option<&str>, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::new(log_filter(logging, verbose));
    let format = format_override.unwrap_or(&logging.format);

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Level comes from the config file; `--verbose` wins when set
fn log_filter(logging: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        String::from("luach=debug,info")
    } else {
        format!("luach={},warn", logging.level)
    }
}
