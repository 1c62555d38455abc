use std::path::{Path, PathBuf};
use std::sync::Arc;

use butler::butler::{Butler, ShutdownOutcome};
use butler::chat::{DeliveryHandler, SlackClient};
use butler::config::Config;
use butler::dispatch::Dispatcher;
use butler::shutdown::{serve_until, KillSignals};
use butler::watchers::CodingLove;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "butler", about = "Slack notification bot", version)]
struct Cli {
    /// Config file (default: ~/.butler/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Slack bot token, overrides the config file and environment
    #[arg(long, global = true)]
    token: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled sender until SIGINT, SIGHUP or SIGTERM
    Run,
    /// Validate the configuration and print a summary
    Check,
    /// Run a single CodingLove scan now and print what happened
    Scan,
    /// Write a default config file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::config_path()?,
    };

    match cli.command {
        Commands::Run => run_bot(load_config(&config_path, cli.token, cli.debug)?).await?,
        Commands::Check => {
            run_check(&config_path, &load_config(&config_path, cli.token, cli.debug)?)?
        }
        Commands::Scan => run_scan(load_config(&config_path, cli.token, cli.debug)?).await?,
        Commands::Init => run_init(&config_path)?,
    }

    Ok(())
}

/// Load config, apply command-line overrides and start logging.
fn load_config(path: &Path, token: Option<String>, debug: bool) -> Result<Config> {
    let mut config = Config::load_from_path(path)?;
    if let Some(token) = token {
        config.slack_token = token;
    }
    config.debug |= debug;

    init_tracing(config.debug)?;
    Ok(config)
}

fn build_butler(config: &Config) -> Result<Butler> {
    let slack = SlackClient::new(&config.slack_token)?;
    let handler = Arc::new(DeliveryHandler::new(Arc::new(slack)));

    let mut builder = Butler::builder(handler).workers(config.workers);
    if config.codinglove.enabled {
        let watcher = CodingLove::from_config(&config.codinglove)
            .wrap_err("failed to set up codinglove watcher")?;
        builder = builder.register_sender(Arc::new(watcher));
    }
    Ok(builder.build())
}

async fn run_bot(config: Config) -> Result<()> {
    config.validate()?;

    let butler = Arc::new(build_butler(&config)?);
    if butler.sender_names().is_empty() {
        warn!("no senders enabled, nothing to do");
        return Ok(());
    }
    info!(senders = ?butler.sender_names(), "butler starting");

    let signals = KillSignals::install()?;
    let trigger = async move {
        let name = signals.recv().await;
        info!(signal = name, "received termination signal");
    };

    match serve_until(butler, trigger, config.grace_period()).await {
        ShutdownOutcome::Graceful => {
            info!("butler stopped");
            Ok(())
        }
        ShutdownOutcome::Forced => {
            error!(
                grace_secs = config.grace_period_secs,
                "shutdown did not finish in time, forcing exit"
            );
            std::process::exit(1);
        }
    }
}

fn run_check(config_path: &Path, config: &Config) -> Result<()> {
    config.validate()?;

    println!("Config: {}", config_path.display());
    println!("Workers: {}", config.workers);
    println!("Grace period: {}s", config.grace_period_secs);
    if config.codinglove.enabled {
        println!(
            "CodingLove: every {}s from {} to {} (db {})",
            config.codinglove.interval_secs,
            config.codinglove.source_url,
            config.codinglove.channel,
            config.codinglove.posts_db_path()?.display()
        );
    } else {
        println!("CodingLove: disabled");
    }
    Ok(())
}

async fn run_scan(config: Config) -> Result<()> {
    config.validate()?;

    let slack = SlackClient::new(&config.slack_token)?;
    let handler = Arc::new(DeliveryHandler::new(Arc::new(slack)));
    let watcher = CodingLove::from_config(&config.codinglove)
        .wrap_err("failed to set up codinglove watcher")?;

    let settings = watcher.settings();
    println!(
        "Scanning {} for channel {}",
        settings.source_url, settings.channel_id
    );

    let (dispatcher, jobs) = Dispatcher::new(config.workers, handler).start();
    let report = watcher.scan_once(&jobs).await;
    drop(jobs);
    dispatcher.shutdown().await;

    println!("Delivered: {}", report.delivered.len());
    for key in &report.delivered {
        println!("  {}", key);
    }
    println!("Already posted: {}", report.skipped_seen);
    println!("Without image: {}", report.skipped_missing_key);
    if let Some(abort) = &report.aborted {
        println!("Aborted: {:?}", abort);
    }
    Ok(())
}

fn run_init(config_path: &Path) -> Result<()> {
    if Config::write_default(config_path)? {
        println!("Created config file: {}", config_path.display());
        println!("Edit it to add your Slack token and channel.");
    } else {
        println!("Config file already exists: {}", config_path.display());
        println!("Delete it first to start over.");
    }
    Ok(())
}

fn env_filter(debug: bool) -> tracing_subscriber::EnvFilter {
    let default = if debug { "butler=debug" } else { "butler=info" };
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default))
}

/// Log to a daily-rolled file under ~/.butler/logs and to stderr.
fn init_tracing(debug: bool) -> Result<()> {
    let log_dir = butler::config::log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .wrap_err_with(|| format!("failed to create log dir {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "butler.log");
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_filter(env_filter(debug));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter(debug));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}
