mod console;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lib::channels::{InboundRequest, TelegramChannel, Transport};
use lib::config::{self, Config};
use lib::llm::CompletionClient;
use lib::relay::{run_dispatcher, Relay, ReplyState};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "Relay chat messages to a streaming completion backend, correcting one reply in place", long_about = None)]
struct Cli {
    /// Only log errors
    #[arg(long, short, global = true, conflicts_with = "debug")]
    quiet: bool,

    /// Log debug output (including every streamed fragment)
    #[arg(long, short, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: MURMUR_CONFIG_PATH or ~/.murmur/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the Telegram relay until interrupted. Needs a bot token (config or TELEGRAM_BOT_TOKEN).
    Run {
        /// Config file path (default: MURMUR_CONFIG_PATH or ~/.murmur/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Send one message to the backend and print the streamed reply.
    Ask {
        /// Config file path (default: MURMUR_CONFIG_PATH or ~/.murmur/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Message text
        #[arg(required = true)]
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.debug {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Some(Commands::Version) => {
            println!("murmur {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config }) => {
            if let Err(e) = run_relay(config).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask { config, text }) => match run_ask(config, text.join(" ")).await {
            Ok(ReplyState::Failed) => std::process::exit(2),
            Ok(_) => {}
            Err(e) => {
                log::error!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        },
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn build_relay(config: &Config, transport: Arc<dyn Transport>) -> anyhow::Result<Relay> {
    let base_url = config::resolve_backend_url(config);
    let client = CompletionClient::new(Some(base_url), config.backend.timeout())
        .context("building completion client")?;
    log::info!("completion backend: {}", client.base_url());
    Ok(Relay::new(
        Arc::new(client),
        transport,
        config.backend.prompt.clone(),
        config.backend.parameters.clone(),
        config.relay.clone(),
    ))
}

async fn run_relay(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    log::debug!("loaded config from {}", path.display());
    let token = config::resolve_telegram_token(&config).with_context(|| {
        format!(
            "telegram bot token not configured (set TELEGRAM_BOT_TOKEN or channels.telegram.botToken in {})",
            path.display()
        )
    })?;

    let telegram = Arc::new(TelegramChannel::new(Some(token)));
    let relay = Arc::new(build_relay(&config, telegram.clone())?);

    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let dispatcher = tokio::spawn(run_dispatcher(relay, inbound_rx));
    let poller = telegram.clone().start_inbound(inbound_tx);
    log::info!("telegram relay running; press Ctrl+C to stop");

    shutdown_signal().await?;
    log::info!("shutdown signal received, stopping telegram channel and draining replies");
    telegram.stop();
    poller.await.context("telegram poll task")?;
    let handled = dispatcher.await.context("dispatcher task")?;
    log::info!("relay stopped after {} reply cycle(s)", handled);
    Ok(())
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("installing SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("installing Ctrl+C handler")?,
            _ = terminate.recv() => {},
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("installing Ctrl+C handler")?;
    Ok(())
}

async fn run_ask(config_path: Option<PathBuf>, text: String) -> anyhow::Result<ReplyState> {
    let (config, _) = config::load_config(config_path)?;
    let relay = build_relay(&config, Arc::new(console::ConsoleTransport::new()))?;
    let outcome = relay
        .handle(InboundRequest {
            sender: "console".to_string(),
            text,
            thread: None,
        })
        .await;
    Ok(outcome.state)
}
