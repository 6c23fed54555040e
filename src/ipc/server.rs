//! Unix domain socket server for IPC
//!
//! Provides request-response communication for the overlay renderer and
//! pushes events to subscribed clients. Commands are handed to the
//! orchestrator on their own tasks; the connection answers `accepted`
//! immediately and the outcome arrives as events.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::command::{Orchestrator, SubmitOutcome, Trigger};
use crate::events::StateEvent;
use crate::overlay::{Frame, Point};
use crate::speech::SpeechSubsystem;
use crate::state::StateStore;

use super::protocol::{DaemonStatus, Request, Response, MAX_MESSAGE_LEN};

/// Handles the server needs to answer requests
pub struct ServerContext {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<StateStore>,
    pub speech: Arc<SpeechSubsystem>,
    pub frames: watch::Receiver<Frame>,
    pub hand_tx: watch::Sender<Point>,
    pub event_tx: broadcast::Sender<StateEvent>,
}

/// Mutable server bookkeeping
struct ServerState {
    start_time: Instant,
    hotkey_registered: bool,
}

struct Shared {
    ctx: ServerContext,
    state: RwLock<ServerState>,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket, replacing a stale one
    pub fn new(socket_path: &Path, ctx: ServerContext) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only access
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to restrict socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let shared = Arc::new(Shared {
            ctx,
            state: RwLock::new(ServerState {
                start_time: Instant::now(),
                hotkey_registered: false,
            }),
        });

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            shared,
            shutdown_tx,
        })
    }

    pub async fn set_hotkey_registered(&self, registered: bool) {
        self.shared.state.write().await.hotkey_registered = registered;
    }

    /// Accept connections until the task is dropped
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Disconnect clients and remove the socket file
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// A request as read off the wire; parse failures are answered, not fatal
type Incoming = std::result::Result<Request, String>;

async fn handle_client(stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();

    // Reads are not cancel-safe, so they run on their own task
    let (request_tx, mut request_rx) = mpsc::channel::<Incoming>(16);
    let read_task = tokio::spawn(read_requests(reader, request_tx));

    let mut events: Option<(broadcast::Receiver<StateEvent>, bool)> = None;

    let result = loop {
        tokio::select! {
            incoming = request_rx.recv() => {
                let Some(incoming) = incoming else {
                    debug!("client disconnected");
                    break Ok(());
                };
                let response = match incoming {
                    Ok(Request::Subscribe { presentation_only }) => {
                        if events.is_none() {
                            events = Some((shared.ctx.event_tx.subscribe(), presentation_only));
                            debug!(presentation_only, "client subscribed to events");
                        }
                        Response::Subscribed
                    }
                    Ok(request) => {
                        debug!(?request, "received request");
                        process_request(request, &shared).await
                    }
                    Err(message) => Response::error("bad_request", message),
                };
                if let Err(e) = send_message(&mut writer, &response).await {
                    break Err(e);
                }
            }
            event = next_event(&mut events) => {
                match event {
                    Some(event) => {
                        if let Err(e) = send_message(&mut writer, &Response::Event { event }).await {
                            break Err(e);
                        }
                    }
                    None => events = None,
                }
            }
        }
    };

    read_task.abort();
    result
}

/// Next event for a subscribed client; pending forever when not subscribed
async fn next_event(
    events: &mut Option<(broadcast::Receiver<StateEvent>, bool)>,
) -> Option<StateEvent> {
    let Some((rx, presentation_only)) = events else {
        return std::future::pending().await;
    };

    loop {
        match rx.recv().await {
            Ok(event) if *presentation_only && !event.is_presentation() => continue,
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

async fn read_requests<R>(mut reader: R, request_tx: mpsc::Sender<Incoming>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let Some(body) = read_message(&mut reader).await? else {
            return Ok(());
        };
        let incoming = serde_json::from_slice::<Request>(&body).map_err(|e| e.to_string());
        if request_tx.send(incoming).await.is_err() {
            return Ok(());
        }
    }
}

/// Read one length-prefixed body; `None` on clean disconnect
async fn read_message<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        warn!(len, "message too large, disconnecting");
        return Ok(None);
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .context("truncated message")?;
    Ok(Some(body))
}

/// Send a length-prefixed JSON message
async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

async fn process_request(request: Request, shared: &Shared) -> Response {
    let ctx = &shared.ctx;
    match request {
        Request::Ping => Response::Pong,

        Request::GetStatus => {
            let state = shared.state.read().await;
            let mut status = DaemonStatus::from_state(&ctx.store.snapshot());
            status.busy = ctx.orchestrator.is_busy();
            status.speech_output = ctx.speech.can_speak();
            status.voice_input = ctx.speech.can_listen();
            status.hotkey_registered = state.hotkey_registered;
            status.uptime_secs = state.start_time.elapsed().as_secs();
            Response::Status(status)
        }

        Request::GetFrame => Response::Frame(ctx.frames.borrow().clone()),

        Request::Submit { text } => {
            let orchestrator = Arc::clone(&ctx.orchestrator);
            tokio::spawn(async move {
                let outcome = orchestrator.submit(&text, Trigger::Text).await;
                log_outcome(Trigger::Text, &outcome);
            });
            Response::Accepted
        }

        Request::Voice { trigger } => {
            if !trigger.wants_speech() {
                return Response::error("invalid_trigger", format!("{} is not a voice trigger", trigger));
            }
            if !ctx.speech.can_listen() {
                return Response::error("voice_unavailable", "no speech recognizer configured");
            }
            let orchestrator = Arc::clone(&ctx.orchestrator);
            tokio::spawn(async move {
                let outcome = orchestrator.voice_command(trigger).await;
                log_outcome(trigger, &outcome);
            });
            Response::Accepted
        }

        Request::PointAt { x, y } => {
            ctx.hand_tx.send_replace(Point::new(x, y));
            Response::Accepted
        }

        // Handled by the connection loop
        Request::Subscribe { .. } => Response::Subscribed,
    }
}

fn log_outcome(trigger: Trigger, outcome: &SubmitOutcome) {
    match outcome {
        SubmitOutcome::Completed { tool, .. } => debug!(%trigger, %tool, "command completed"),
        SubmitOutcome::Failed(e) => debug!(%trigger, %e, "command failed"),
        other => debug!(%trigger, ?other, "command not run"),
    }
}
