use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rendergate::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "rendergate",
    version,
    about = "Dynamic rendering gateway: headless-browser snapshots for crawlers, redirects for humans",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (environment variables are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Listening port (overrides configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Render a single path through the engine and print the HTML
    Render {
        /// Path and query on the origin, e.g. /products/42
        path: String,

        /// User-Agent used for classification
        #[arg(short, long)]
        user_agent: Option<String>,
    },

    /// Show how a User-Agent is classified
    Classify {
        /// User-Agent string
        user_agent: String,
    },

    /// Manage the render cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every snapshot under the cache prefix
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    // Initialize tracing/logging
    let log_format = cli
        .log_format
        .as_deref()
        .unwrap_or(config.logging.format.as_str());
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Serve { port } => {
            tracing::info!(port = ?port, "Starting serve command");
            commands::serve(config, port).await?;
        }

        Commands::Render { path, user_agent } => {
            tracing::info!(path = %path, user_agent = ?user_agent, "Starting render command");
            commands::render(&config, &path, user_agent.as_deref()).await?;
        }

        Commands::Classify { user_agent } => {
            commands::classify(&config, &user_agent)?;
        }

        Commands::Cache {
            action: CacheAction::Clear,
        } => {
            tracing::info!(prefix = %config.cache.key_prefix, "Starting cache clear command");
            commands::cache_clear(&config).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("rendergate=debug,tower_http=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(format!("rendergate={level},warn")))?
    };

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
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}
