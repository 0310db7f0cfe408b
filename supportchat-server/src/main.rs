use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use supportchat_ai::{AssistantResponder, CannedResponder, OpenAIProvider, ProviderConfig};
use supportchat_common::traits::{BotResponder, ChatArchive};
use supportchat_core::eventbus::event_logger::spawn_event_logger_task;
use supportchat_core::tasks::pending_reaper::spawn_pending_reaper_task;
use supportchat_core::{ChatEngine, Database, EngineConfig, Error, EventBus};

mod console;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum BotKind {
    /// Keyword-matched canned answers
    Canned,
    /// OpenAI-compatible chat model (needs OPENAI_API_KEY)
    Openai,
    /// No assistant: bot-track messages wait for escalation
    None,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "supportchat")]
#[command(author, version, about = "Support chat engine with an operator console")]
struct Args {
    /// Postgres connection URL. Falls back to SUPPORTCHAT_DATABASE_URL;
    /// without either, sessions live in memory only.
    #[arg(long)]
    db_url: Option<String>,

    /// Which assistant answers sessions on the bot track
    #[arg(long, value_enum, default_value = "canned")]
    bot: BotKind,

    /// Close sessions left waiting for an agent this long (0 disables)
    #[arg(long)]
    pending_timeout_secs: Option<u64>,

    /// Run without the stdin operator console; stop with Ctrl-C
    #[arg(long, default_value = "false")]
    no_console: bool,
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    tracing_log::LogTracer::init()?;
    let filter = EnvFilter::from_default_env()
        .add_directive("supportchat=info".parse()?);
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;
    let args = Args::parse();
    info!(
        "Support chat starting. bot={:?}, console={}, db={}",
        args.bot,
        !args.no_console,
        args.db_url.is_some()
    );

    if let Err(e) = run_server(args).await {
        error!("Server error: {:?}", e);
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

fn build_bot(kind: BotKind) -> Result<Option<Arc<dyn BotResponder>>, Error> {
    match kind {
        BotKind::Canned => Ok(Some(Arc::new(CannedResponder::default()))),
        BotKind::Openai => {
            let cfg = ProviderConfig::from_env()
                .ok_or_else(|| Error::Config("--bot openai requires OPENAI_API_KEY".into()))?;
            info!("Using model {} at {}", cfg.default_model, cfg.api_base());
            let provider = Arc::new(OpenAIProvider::new(cfg));
            Ok(Some(Arc::new(AssistantResponder::new(provider))))
        }
        BotKind::None => {
            warn!("No assistant configured; bot-track sessions get no replies.");
            Ok(None)
        }
    }
}

async fn open_archive(db_url: Option<String>) -> Result<Option<Arc<dyn ChatArchive>>, Error> {
    let Some(url) = db_url.or_else(|| std::env::var("SUPPORTCHAT_DATABASE_URL").ok()) else {
        info!("No database configured; sessions live in memory only.");
        return Ok(None);
    };
    let db = Database::new(&url).await?;
    db.migrate().await?;
    Ok(Some(Arc::new(db.archive())))
}

async fn run_server(args: Args) -> Result<(), Error> {
    // 1) Config: .env + SUPPORTCHAT_* variables, then CLI overrides
    let mut config = EngineConfig::from_env()?;
    if let Some(secs) = args.pending_timeout_secs {
        config.pending_timeout_secs = (secs > 0).then_some(secs);
    }
    config.validate()?;

    // 2) Collaborators
    let archive = open_archive(args.db_url.clone()).await?;
    let bot = build_bot(args.bot)?;

    // 3) Engine, then reload whatever the archive holds
    let event_bus = Arc::new(EventBus::with_buffer_size(config.subscriber_buffer));
    let engine = ChatEngine::new(config, event_bus.clone(), bot, archive);
    engine.restore().await?;

    // 4) Background tasks
    let logger_handle = spawn_event_logger_task(event_bus.clone()).await;
    let reaper_handle = spawn_pending_reaper_task(engine.clone());

    let eb_for_ctrlc = event_bus.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
            return;
        }
        info!("Ctrl-C detected; shutting down.");
        eb_for_ctrlc.shutdown();
    });

    // 5) Console (or just wait for Ctrl-C)
    if args.no_console {
        let mut shutdown_rx = event_bus.shutdown_rx.clone();
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }
    } else {
        console::run_console(engine.clone()).await;
        engine.shutdown();
    }

    if let Err(e) = logger_handle.await {
        error!("Event logger task failed: {:?}", e);
    }
    if let Some(handle) = reaper_handle {
        if let Err(e) = handle.await {
            error!("Pending reaper task failed: {:?}", e);
        }
    }
    info!("Server shutdown complete.");
    Ok(())
}
