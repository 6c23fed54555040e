//! kore-daemon: background core for the Kore desktop agent overlay
//!
//! This daemon provides:
//! - One admission gate for typed, console, hotkey and double-click commands
//! - Remote decision queries with rate limiting and a timeout
//! - Desktop tool execution, spoken replies and single-shot voice capture
//! - A ~60 Hz animation clock producing frames for the overlay renderer
//! - IPC server for the renderer (frames, commands, pushed events)

mod agent;
mod command;
mod config;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod overlay;
mod speech;
mod state;
mod tools;

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::agent::{DisconnectedAgent, OnDemandClient, RemoteAgent};
use crate::command::{Orchestrator, OrchestratorSettings, RateGate, Trigger};
use crate::config::{Config, SpeechConfig};
use crate::events::StateEvent;
use crate::hotkey::{HotkeyError, HotkeyEvent, HotkeyListener};
use crate::ipc::{Server, ServerContext};
use crate::lifecycle::ShutdownSignal;
use crate::overlay::{Animator, Frame, Point};
use crate::speech::{ExternalStt, ExternalTts, SpeechSubsystem, Transcriber};
use crate::state::{StateStore, TickClock};
use crate::tools::{DesktopTools, ToolExecutor};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "kore-daemon starting");

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, "configuration loaded");

    let shutdown = ShutdownSignal::new();

    // Every store write and command lifecycle step lands here
    let (event_tx, _) = broadcast::channel::<StateEvent>(256);
    let store = Arc::new(StateStore::new(TickClock::new(), event_tx.clone()));

    let speech = Arc::new(start_speech(&config.speech, Arc::clone(&store)));
    info!(
        output = speech.can_speak(),
        input = speech.can_listen(),
        "speech initialized"
    );

    let agent: Arc<dyn RemoteAgent> = match OnDemandClient::new(config.remote.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!(%e, "remote agent not configured, commands will fail");
            Arc::new(DisconnectedAgent::new(e.to_string()))
        }
    };
    let tools: Arc<dyn ToolExecutor> = Arc::new(DesktopTools::new());

    let rate_gate = RateGate::new(config.timing.min_request_interval());
    info!(min_interval_ms = rate_gate.min_interval().as_millis() as u64, "rate gate ready");
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&agent),
        tools,
        Arc::clone(&store),
        Arc::clone(&speech),
        rate_gate,
        event_tx.clone(),
        OrchestratorSettings::from(&config.timing),
    ));

    // Animation clock -> renderer
    let (frame_tx, frame_rx) = watch::channel(Frame::default());
    let (hand_tx, hand_rx) = watch::channel(Point::default());
    let animator = Animator::new(Arc::clone(&store));
    let animator_task = tokio::spawn(animator.run(config.timing.tick(), frame_tx, hand_rx));

    // Hotkey listener -> voice flow
    let (hotkey_tx, hotkey_rx) = mpsc::channel(32);
    let hotkey_listener = HotkeyListener::new(hotkey_tx);
    let hotkey_registered = match hotkey_listener.start() {
        Ok(()) => {
            info!("hotkey listener started");
            true
        }
        Err(HotkeyError::Unsupported) => {
            info!("global hotkey not supported here, use double-click or IPC for voice");
            false
        }
        Err(e) => {
            error!(?e, "failed to start hotkey listener");
            warn!("continuing without hotkey support - check Accessibility permissions");
            false
        }
    };
    let hotkey_task = tokio::spawn(route_hotkeys(hotkey_rx, Arc::clone(&orchestrator)));

    let server = Server::new(
        &config.socket_path,
        ServerContext {
            orchestrator: Arc::clone(&orchestrator),
            store: Arc::clone(&store),
            speech: Arc::clone(&speech),
            frames: frame_rx,
            hand_tx,
            event_tx: event_tx.clone(),
        },
    )?;
    server.set_hotkey_registered(hotkey_registered).await;

    spawn_console(Arc::clone(&orchestrator), shutdown.clone())?;
    let log_task = tokio::spawn(log_events(event_tx.subscribe()));

    info!("daemon initialized, entering main loop");
    println!("Kore ready. Type a command, or 'exit' to quit.");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    if hotkey_listener.is_running() {
        hotkey_listener.stop();
    }
    for task in [hotkey_task, log_task, animator_task] {
        task.abort();
    }
    server.shutdown().await;
    agent.close().await;

    // Let queued replies finish
    let draining = Arc::clone(&speech);
    if tokio::task::spawn_blocking(move || draining.shutdown()).await.is_err() {
        warn!("speech shutdown task failed");
    }

    info!("kore-daemon stopped");

    Ok(())
}

/// Start speech from config, degrading to unavailable on any failure
fn start_speech(config: &SpeechConfig, store: Arc<StateStore>) -> SpeechSubsystem {
    if !config.enabled {
        info!("speech disabled in config");
        return SpeechSubsystem::unavailable();
    }

    let engine = match ExternalTts::new(&config.tts_program, config.tts_args.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            warn!(%e, "speech output unavailable");
            return SpeechSubsystem::unavailable();
        }
    };

    let transcriber = config.stt_program.as_deref().and_then(|program| {
        match ExternalStt::new(program, config.stt_args.clone()) {
            Ok(stt) => Some(Box::new(stt) as Box<dyn Transcriber>),
            Err(e) => {
                warn!(%e, "voice input unavailable");
                None
            }
        }
    });

    SpeechSubsystem::start(Box::new(engine), transcriber, store).unwrap_or_else(|e| {
        warn!(%e, "speech worker failed to start");
        SpeechSubsystem::unavailable()
    })
}

async fn route_hotkeys(mut hotkey_rx: mpsc::Receiver<HotkeyEvent>, orchestrator: Arc<Orchestrator>) {
    while let Some(event) = hotkey_rx.recv().await {
        match event {
            HotkeyEvent::VoiceTriggered => {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    orchestrator.voice_command(Trigger::VoiceHotkey).await;
                });
            }
            HotkeyEvent::TapDisabled => warn!("hotkey tap was disabled by the system"),
        }
    }
    debug!("hotkey channel closed");
}

/// Read commands from stdin; `exit` or `quit` stops the daemon
///
/// Runs on a detached thread: a blocking stdin read cannot be cancelled and
/// must not hold up runtime shutdown.
fn spawn_console(orchestrator: Arc<Orchestrator>, shutdown: ShutdownSignal) -> Result<()> {
    let runtime = tokio::runtime::Handle::current();

    std::thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(?e, "console read failed");
                        return;
                    }
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if text.eq_ignore_ascii_case("exit") || text.eq_ignore_ascii_case("quit") {
                    shutdown.trigger();
                    return;
                }

                let orchestrator = Arc::clone(&orchestrator);
                let text = text.to_string();
                runtime.spawn(async move {
                    orchestrator.submit(&text, Trigger::Console).await;
                });
            }
            // Detached from a terminal, e.g. running as a LaunchAgent
            debug!("console closed");
        })
        .context("failed to spawn console thread")?;

    Ok(())
}

async fn log_events(mut event_rx: broadcast::Receiver<StateEvent>) {
    loop {
        match event_rx.recv().await {
            Ok(event) => debug!(%event, "state event"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "state event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
