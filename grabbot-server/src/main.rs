use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use grabbot_common::models::Config;
use grabbot_common::traits::AdminNotifier;
use grabbot_core::eventbus::EventBus;
use grabbot_core::platforms::PlatformIntegration;
use grabbot_core::platforms::binance::BinancePayClient;
use grabbot_core::platforms::telegram::{TelegramClient, TelegramNotifier, TelegramPlatform};
use grabbot_core::repositories::{ClaimRepository, JsonClaimStore};
use grabbot_core::services::code_extractor;
use grabbot_core::services::{
    ClaimCoordinator, ClaimSettings, CommandService, MessageService, SessionState,
};
use grabbot_core::utils::time::SystemClock;

mod config;

#[derive(Parser, Debug)]
#[command(name = "grabbot")]
#[command(author, version, about = "grabbot - watches Telegram chats and claims crypto-box codes")]
struct Args {
    /// JSON config file (default: ./grabbot.json)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor chats and claim codes (default)
    Run,
    /// Print the codes found in TEXT
    Extract {
        #[arg(long)]
        text: String,
    },
    /// Print the claim history summary
    Summary {
        /// How many recent claims to list
        #[arg(long, default_value_t = 10)]
        recent: usize,
    },
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("grabbot=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {e}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    match args.command.unwrap_or(Command::Run) {
        Command::Extract { text } => {
            for code in code_extractor::extract(&text) {
                println!("{code}");
            }
            Ok(())
        }
        Command::Summary { recent } => {
            let cfg = config::load_config(args.config.as_deref())?;
            let store = JsonClaimStore::open(&cfg.claim.storage_path);
            print!("{}", store.summary(recent));
            Ok(())
        }
        Command::Run => {
            let cfg = config::load_config(args.config.as_deref())?;
            if let Err(e) = run_bot(cfg).await {
                error!("grabbot stopped: {:?}", e);
                return Err(e);
            }
            Ok(())
        }
    }
}

async fn run_bot(cfg: Config) -> Result<()> {
    if cfg.telegram.bot_token.trim().is_empty() {
        bail!("no Telegram bot token; set telegram.bot_token or {}", config::ENV_BOT_TOKEN);
    }
    info!("grabbot starting. store={}", cfg.claim.storage_path.display());

    let bus = Arc::new(EventBus::new());
    let store = Arc::new(JsonClaimStore::open(&cfg.claim.storage_path));

    let telegram = Arc::new(
        TelegramClient::with_poll_timeout(
            &cfg.telegram.api_base,
            &cfg.telegram.bot_token,
            cfg.telegram.poll_timeout_secs,
        )
        .context("building Telegram client")?,
    );
    let notifier = Arc::new(TelegramNotifier::new(telegram.clone(), cfg.telegram.admin_chat_id));
    let api = Arc::new(BinancePayClient::from_config(&cfg.claim).context("building claim client")?);

    let coordinator = Arc::new(
        ClaimCoordinator::new(
            api,
            notifier.clone(),
            store.clone(),
            Arc::new(SystemClock),
            ClaimSettings::from(&cfg.claim),
        )
        .with_event_bus(bus.clone()),
    );
    let commands = Arc::new(CommandService::new(coordinator.clone(), cfg.telegram.admin_chat_id));
    let service = Arc::new(MessageService::new(
        coordinator,
        commands,
        telegram.clone(),
        SessionState::from_config(&cfg.telegram),
        cfg.telegram.ignored_senders.iter().copied(),
    ));

    let rx = bus.subscribe(None).await;
    let service_task = {
        let bus = bus.clone();
        let service = service.clone();
        tokio::spawn(async move { service.run(&bus, rx).await })
    };

    let mut platform = TelegramPlatform::new(telegram, bus.clone(), cfg.telegram.poll_timeout_secs);
    platform.connect().await.context("connecting to Telegram")?;

    let started = format!(
        "🤖 grabbot is running.\nKnown codes: {}\nHourly ceiling: {}\nSend /help for commands.",
        store.len(),
        cfg.claim.max_hour_requests
    );
    if let Err(e) = notifier.notify_admin(&started).await {
        warn!("Startup notification failed: {}", e);
    }

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Ctrl-C received; shutting down");

    bus.shutdown();
    platform.disconnect().await?;
    if let Err(e) = service_task.await {
        warn!("Message service task ended abnormally: {}", e);
    }
    info!("grabbot stopped.");
    Ok(())
}
