//! Command admission and execution
//!
//! - CommandSlot: the single global admission gate
//! - RateGate: minimum spacing between remote requests
//! - Orchestrator: runs one admitted command from words to tool outcome

mod orchestrator;
mod rate_gate;
mod slot;

use serde::{Deserialize, Serialize};

pub use orchestrator::{Orchestrator, OrchestratorSettings, SubmitOutcome};
pub use rate_gate::RateGate;
pub use slot::{CommandSlot, SlotPermit};

/// Which input source issued a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Text typed into the overlay's input box
    Text,
    /// A line typed on the daemon's console
    Console,
    /// Global voice hotkey
    VoiceHotkey,
    /// Double-click on the mascot
    DoubleClick,
}

impl Trigger {
    /// Spoken commands get spoken replies
    pub fn wants_speech(self) -> bool {
        matches!(self, Trigger::VoiceHotkey | Trigger::DoubleClick)
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Text => write!(f, "text"),
            Trigger::Console => write!(f, "console"),
            Trigger::VoiceHotkey => write!(f, "voice_hotkey"),
            Trigger::DoubleClick => write!(f, "double_click"),
        }
    }
}

/// Failures of an admitted command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("remote agent unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("remote agent response malformed: {0}")]
    RemoteMalformedResponse(String),

    #[error("tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("tool not recognized: {0}")]
    ToolNotRecognized(String),

    #[error("no speech captured")]
    VoiceCaptureEmpty,
}

impl From<crate::agent::AgentError> for CommandError {
    fn from(e: crate::agent::AgentError) -> Self {
        use crate::agent::AgentError;
        match e {
            AgentError::Unavailable(msg) => CommandError::RemoteUnavailable(msg),
            AgentError::Malformed(msg) => CommandError::RemoteMalformedResponse(msg),
        }
    }
}

impl From<crate::tools::ToolError> for CommandError {
    fn from(e: crate::tools::ToolError) -> Self {
        use crate::tools::ToolError;
        match e {
            ToolError::NotRecognized(name) => CommandError::ToolNotRecognized(name),
            ToolError::Failed(detail) => CommandError::ToolExecutionFailed(detail),
        }
    }
}
