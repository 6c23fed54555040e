//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::command::Trigger;
use crate::events::StateEvent;
use crate::overlay::Frame;
use crate::state::{Emotion, PresentationState};

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

fn default_voice_trigger() -> Trigger {
    Trigger::DoubleClick
}

/// Requests from the overlay renderer (or any client) to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Latest animation frame
    GetFrame,

    /// Run a typed command
    Submit { text: String },

    /// Start a voice capture
    Voice {
        #[serde(default = "default_voice_trigger")]
        trigger: Trigger,
    },

    /// Move the animated hand towards a point
    PointAt { x: f32, y: f32 },

    /// Receive pushed events on this connection
    Subscribe {
        /// Skip command lifecycle events
        #[serde(default)]
        presentation_only: bool,
    },
}

/// Responses and pushed notifications from daemon to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Latest animation frame
    Frame(Frame),

    /// Command handed to the orchestrator; its outcome arrives as events
    Accepted,

    /// Subscription confirmed
    Subscribed,

    /// Pushed to subscribed clients
    Event { event: StateEvent },

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub emotion: Emotion,
    pub listening: bool,
    pub speaking: bool,
    pub thought: Option<String>,
    /// A command holds the admission slot
    pub busy: bool,
    pub speech_output: bool,
    pub voice_input: bool,
    pub hotkey_registered: bool,
    pub uptime_secs: u64,
}

impl DaemonStatus {
    pub fn from_state(state: &PresentationState) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            emotion: state.emotion,
            listening: state.listening,
            speaking: state.speaking,
            thought: state.thought.as_ref().map(|t| t.text.clone()),
            busy: false,
            speech_output: false,
            voice_input: false,
            hotkey_registered: false,
            uptime_secs: 0,
        }
    }
}
