//! Events module for presentation and command lifecycle changes
//!
//! Every StateStore write publishes exactly one presentation event, and the
//! orchestrator publishes admission and completion events. IPC subscribers
//! receive the same stream.

use serde::{Deserialize, Serialize};

use crate::command::Trigger;
use crate::state::Emotion;

/// Events published on the shared broadcast channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Mascot expression changed
    EmotionChanged { from: Emotion, to: Emotion },

    /// Voice capture started or stopped
    ListeningChanged { active: bool },

    /// Speech output started or stopped
    SpeakingChanged { active: bool },

    /// A thought bubble was shown
    ThoughtShown {
        text: String,
        /// Display duration in animation ticks
        ticks: u64,
    },

    /// The thought bubble was removed (expired or cleared)
    ThoughtCleared,

    /// A command entered the admission gate
    CommandAdmitted { trigger: Trigger },

    /// A command arrived while another was in flight and was dropped
    CommandDropped { trigger: Trigger },

    /// An admitted command finished and released the gate
    CommandFinished {
        tool: Option<String>,
        ok: bool,
        /// Time from admission to release in milliseconds
        duration_ms: u64,
    },
}

impl StateEvent {
    /// Whether this event corresponds to a StateStore write
    pub fn is_presentation(&self) -> bool {
        matches!(
            self,
            StateEvent::EmotionChanged { .. }
                | StateEvent::ListeningChanged { .. }
                | StateEvent::SpeakingChanged { .. }
                | StateEvent::ThoughtShown { .. }
                | StateEvent::ThoughtCleared
        )
    }
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::EmotionChanged { from, to } => {
                write!(f, "EMOTION_CHANGED ({} -> {})", from, to)
            }
            StateEvent::ListeningChanged { active } => write!(f, "LISTENING ({})", active),
            StateEvent::SpeakingChanged { active } => write!(f, "SPEAKING ({})", active),
            StateEvent::ThoughtShown { ticks, .. } => write!(f, "THOUGHT_SHOWN ({} ticks)", ticks),
            StateEvent::ThoughtCleared => write!(f, "THOUGHT_CLEARED"),
            StateEvent::CommandAdmitted { trigger } => write!(f, "COMMAND_ADMITTED ({})", trigger),
            StateEvent::CommandDropped { trigger } => write!(f, "COMMAND_DROPPED ({})", trigger),
            StateEvent::CommandFinished { ok, duration_ms, .. } => {
                write!(f, "COMMAND_FINISHED (ok={}, {}ms)", ok, duration_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = StateEvent::EmotionChanged {
            from: Emotion::Idle,
            to: Emotion::Thinking,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("emotion_changed"));
        assert!(json.contains("thinking"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"command_dropped","trigger":"voice_hotkey"}"#;
        let event: StateEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            StateEvent::CommandDropped {
                trigger: Trigger::VoiceHotkey
            }
        );
    }

    #[test]
    fn test_presentation_filter() {
        assert!(StateEvent::ThoughtCleared.is_presentation());
        assert!(!StateEvent::CommandAdmitted {
            trigger: Trigger::Text
        }
        .is_presentation());
    }
}
