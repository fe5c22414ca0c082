//! CLI binary for vesper.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use vesper::ai::http::HttpAiClient;
use vesper::ai::{AiClient, AiGateway, UnconfiguredClient};
use vesper::cache::ResponseCache;
use vesper::dispatch::DispatcherDeps;
use vesper::ratelimit::RateLimiter;
use vesper::reminders::ReminderScheduler;
use vesper::store::JsonStore;
use vesper::tempfiles::TempRegistry;
use vesper::traits::{ConsoleExecutor, ConsoleSynthesizer, NullTranscriber};
use vesper::{AssistantConfig, AssistantRuntime, CommandDispatcher, StateMachine};

/// Vesper: voice-activated desktop assistant core.
#[derive(Parser)]
#[command(name = "vesper", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Keyboard REPL: type commands instead of speaking them.
    Keyboard,

    /// Voice conversation loop (requires a wired speech backend).
    Chat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vesper=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        AssistantConfig::from_file(path)?
    } else {
        AssistantConfig::default()
    };

    // The only startup failure allowed to terminate the process.
    let _instance_lock = vesper::singleton::acquire(config.runtime.singleton_port)?;

    let state = Arc::new(StateMachine::new());
    state.on_change(|new_state| debug!("state -> {new_state}"));

    let temp = Arc::new(TempRegistry::new());
    let (speech, speech_worker) = vesper::speech::start(
        Arc::new(ConsoleSynthesizer),
        Arc::clone(&state),
        Arc::clone(&temp),
        config.speech.clone(),
    );

    let client: Arc<dyn AiClient> = match HttpAiClient::from_env(&config.ai) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!("AI fallback disabled: {e}");
            Arc::new(UnconfiguredClient)
        }
    };
    let gateway = Arc::new(AiGateway::new(
        client,
        Arc::new(RateLimiter::new(&config.rate_limit)),
        Arc::clone(&state),
        config.ai.clone(),
    ));

    let store = Arc::new(JsonStore::open(&config.store.resolved_root())?);
    let transcriber = Arc::new(NullTranscriber);

    let dispatcher = Arc::new(CommandDispatcher::new(DispatcherDeps {
        state: Arc::clone(&state),
        speech: speech.clone(),
        gateway,
        executor: Arc::new(ConsoleExecutor),
        transcriber: transcriber.clone(),
        store,
        reminders: ReminderScheduler::new(),
        cache: Arc::new(ResponseCache::new(&config.cache)),
        config: config.clone(),
    }));

    let runtime = AssistantRuntime::new(
        config,
        Arc::clone(&state),
        speech.clone(),
        dispatcher,
        transcriber,
    );

    let cancel = runtime.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            cancel.cancel();
        }
    });

    match cli.command.unwrap_or(Command::Keyboard) {
        Command::Keyboard => runtime.run_keyboard().await?,
        Command::Chat => {
            warn!("no microphone backend is wired in this build; chat mode will only idle");
            runtime.run().await?;
        }
    }

    // Teardown: poison the speech queue exactly once, drain, sweep.
    speech.shutdown();
    tokio::task::spawn_blocking(move || speech_worker.join()).await?;
    temp.cleanup_all();
    Ok(())
}
