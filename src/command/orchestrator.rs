//! Command orchestration
//!
//! Every input source enters through [`Orchestrator::submit`] or
//! [`Orchestrator::voice_command`]. Both take the one global
//! [`CommandSlot`] without waiting; a command arriving while another is in
//! flight is dropped, never queued. An admitted command runs:
//!
//! thinking → rate gate → remote query (bounded) → thought (+ speech) →
//! tool → happy/sad → release slot → detached settle back to idle.
//!
//! The orchestrator is the only writer of `emotion` and `thought`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::agent::{Decision, RemoteAgent};
use crate::config::TimingConfig;
use crate::events::StateEvent;
use crate::speech::SpeechSubsystem;
use crate::state::{Emotion, StateStore};
use crate::tools::{Tool, ToolExecutor};

use super::{CommandError, CommandSlot, RateGate, SlotPermit, Trigger};

const REMOTE_FAILURE_LINE: &str = "Sorry, I had trouble with that";
const LISTENING_PROMPT: &str = "Yes? I'm listening";
const CAPTURE_EMPTY_LINE: &str = "I didn't catch that";
const UNKNOWN_TOOL_LINE: &str = "I don't know how to do that yet";

/// Longest failure detail shown in the bubble
const FAILURE_DETAIL_CHARS: usize = 80;

/// Timing knobs for one orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub remote_timeout: Duration,
    pub listen_timeout: Duration,
    /// How long happy/sad is held before returning to idle
    pub settle: Duration,
    pub thought_ticks: u64,
    pub failure_thought_ticks: u64,
    /// The listening prompt stays up for the whole capture
    pub listen_prompt_ticks: u64,
}

impl From<&TimingConfig> for OrchestratorSettings {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            remote_timeout: timing.remote_timeout(),
            listen_timeout: timing.listen_timeout(),
            settle: timing.settle(),
            thought_ticks: timing.thought_ticks,
            failure_thought_ticks: timing.failure_thought_ticks,
            listen_prompt_ticks: timing.listen_ticks(),
        }
    }
}

/// What happened to one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input, nothing done
    Ignored,
    /// Another command held the slot
    Dropped,
    /// Voice input requested but no capture device is available
    Unavailable,
    /// Decision executed successfully
    Completed { tool: String, detail: String },
    /// Admitted but failed; already surfaced to the user
    Failed(CommandError),
}

pub struct Orchestrator {
    slot: CommandSlot,
    rate_gate: RateGate,
    agent: Arc<dyn RemoteAgent>,
    tools: Arc<dyn ToolExecutor>,
    store: Arc<StateStore>,
    speech: Arc<SpeechSubsystem>,
    event_tx: broadcast::Sender<StateEvent>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        agent: Arc<dyn RemoteAgent>,
        tools: Arc<dyn ToolExecutor>,
        store: Arc<StateStore>,
        speech: Arc<SpeechSubsystem>,
        rate_gate: RateGate,
        event_tx: broadcast::Sender<StateEvent>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            slot: CommandSlot::new(),
            rate_gate,
            agent,
            tools,
            store,
            speech,
            event_tx,
            settings,
        }
    }

    /// Whether a command is in flight
    pub fn is_busy(&self) -> bool {
        self.slot.is_occupied()
    }

    /// Run a text command if the slot is free
    pub async fn submit(&self, raw_text: &str, trigger: Trigger) -> SubmitOutcome {
        let text = raw_text.trim();
        if text.is_empty() {
            debug!(%trigger, "ignoring blank command");
            return SubmitOutcome::Ignored;
        }

        let Some(permit) = self.admit(trigger) else {
            return SubmitOutcome::Dropped;
        };
        self.run(permit, text, trigger.wants_speech()).await
    }

    /// Capture one spoken command and run it if the slot is free
    ///
    /// The slot is held from before capture until the command finishes.
    pub async fn voice_command(&self, trigger: Trigger) -> SubmitOutcome {
        if !self.speech.can_listen() {
            warn!(%trigger, "voice input unavailable");
            return SubmitOutcome::Unavailable;
        }

        let Some(permit) = self.admit(trigger) else {
            return SubmitOutcome::Dropped;
        };

        self.store.set_listening(true);
        self.store
            .set_thought(LISTENING_PROMPT, self.settings.listen_prompt_ticks);
        let speech = Arc::clone(&self.speech);
        let listen_timeout = self.settings.listen_timeout;
        let heard = tokio::task::spawn_blocking(move || speech.listen_once(listen_timeout))
            .await
            .unwrap_or_else(|e| {
                warn!(?e, "voice capture task failed");
                None
            });
        // Cleared before any reply can start speaking
        self.store.set_listening(false);

        match heard {
            Some(text) => {
                info!(%text, "voice command");
                self.store.clear_thought();
                self.run(permit, &text, true).await
            }
            None => {
                let revision = self.store.set_emotion(Emotion::Sad);
                self.store
                    .set_thought(CAPTURE_EMPTY_LINE, self.settings.failure_thought_ticks);
                self.speech.enqueue(CAPTURE_EMPTY_LINE);
                self.release(permit, None, false, revision);
                SubmitOutcome::Failed(CommandError::VoiceCaptureEmpty)
            }
        }
    }

    fn admit(&self, trigger: Trigger) -> Option<SlotPermit> {
        match self.slot.try_acquire() {
            Some(permit) => {
                debug!(%trigger, "command admitted");
                self.publish(StateEvent::CommandAdmitted { trigger });
                Some(permit)
            }
            None => {
                info!(%trigger, "already processing, command dropped");
                self.publish(StateEvent::CommandDropped { trigger });
                None
            }
        }
    }

    async fn run(&self, permit: SlotPermit, text: &str, wants_speech: bool) -> SubmitOutcome {
        info!(%text, wants_speech, "processing command");
        self.store.set_emotion(Emotion::Thinking);

        self.rate_gate.wait().await;
        let decision = match timeout(self.settings.remote_timeout, self.agent.query(text)).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => return self.fail_remote(permit, e.into(), wants_speech),
            Err(_) => {
                let secs = self.settings.remote_timeout.as_secs_f32();
                let error = CommandError::RemoteUnavailable(format!("timed out after {:.1}s", secs));
                return self.fail_remote(permit, error, wants_speech);
            }
        };

        info!(thought = %decision.thought, tool = %decision.tool, "decision");
        self.store
            .set_thought(&decision.thought, self.settings.thought_ticks);
        if wants_speech {
            self.speech.enqueue(&decision.thought);
        }

        let result = if Tool::is_conversation(&decision.tool) {
            Ok(String::new())
        } else {
            self.execute_tool(&decision).await
        };

        match result {
            Ok(detail) => {
                if !detail.is_empty() {
                    info!(%detail, "tool succeeded");
                    self.store.set_thought(&detail, self.settings.thought_ticks);
                }
                let revision = self.store.set_emotion(Emotion::Happy);
                self.release(permit, Some(decision.tool.clone()), true, revision);
                SubmitOutcome::Completed {
                    tool: decision.tool,
                    detail,
                }
            }
            Err(error) => {
                warn!(%error, tool = %decision.tool, "tool failed");
                let line = failure_line(&error);
                self.store
                    .set_thought(&line, self.settings.failure_thought_ticks);
                if wants_speech {
                    self.speech.enqueue(&line);
                }
                let revision = self.store.set_emotion(Emotion::Sad);
                self.release(permit, Some(decision.tool), false, revision);
                SubmitOutcome::Failed(error)
            }
        }
    }

    async fn execute_tool(&self, decision: &Decision) -> Result<String, CommandError> {
        let tools = Arc::clone(&self.tools);
        let tool = decision.tool.clone();
        let parameter = decision.parameter.clone();

        match tokio::task::spawn_blocking(move || tools.execute(&tool, &parameter)).await {
            Ok(result) => result.map_err(CommandError::from),
            Err(e) => Err(CommandError::ToolExecutionFailed(format!(
                "tool task failed: {}",
                e
            ))),
        }
    }

    fn fail_remote(
        &self,
        permit: SlotPermit,
        error: CommandError,
        wants_speech: bool,
    ) -> SubmitOutcome {
        warn!(%error, "remote query failed");
        let revision = self.store.set_emotion(Emotion::Sad);
        self.store
            .set_thought(REMOTE_FAILURE_LINE, self.settings.failure_thought_ticks);
        if wants_speech {
            self.speech.enqueue(REMOTE_FAILURE_LINE);
        }
        self.release(permit, None, false, revision);
        SubmitOutcome::Failed(error)
    }

    /// Free the slot and start the detached settle back to idle
    fn release(&self, permit: SlotPermit, tool: Option<String>, ok: bool, revision: u64) {
        let duration_ms = permit.held_ms();
        drop(permit);
        self.publish(StateEvent::CommandFinished {
            tool,
            ok,
            duration_ms,
        });

        let store = Arc::clone(&self.store);
        let settle = self.settings.settle;
        tokio::spawn(async move {
            sleep(settle).await;
            store.settle_to_idle(revision);
        });
    }

    fn publish(&self, event: StateEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// User-facing line for a failed tool
fn failure_line(error: &CommandError) -> String {
    match error {
        CommandError::ToolNotRecognized(_) => UNKNOWN_TOOL_LINE.to_string(),
        CommandError::ToolExecutionFailed(detail) => {
            detail.chars().take(FAILURE_DETAIL_CHARS).collect()
        }
        other => other.to_string(),
    }
}
