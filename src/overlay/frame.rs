//! Render-ready frame derived from one state snapshot

use serde::{Deserialize, Serialize};

use crate::state::{Emotion, PresentationState};

/// 2D position in overlay pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Move `factor` of the way towards `target`
    pub fn lerp(self, target: Point, factor: f32) -> Point {
        Point {
            x: self.x + (target.x - self.x) * factor,
            y: self.y + (target.y - self.y) * factor,
        }
    }
}

/// Mouth drawn by the renderer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum MouthShape {
    Smile,
    Frown,
    Flat,
    /// Round "O" while listening
    Open,
    /// Moving mouth while speaking; amplitude in 0.0..=1.0
    Talking { amplitude: f32 },
    #[default]
    Neutral,
}

/// Animation inputs owned by the animator
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct Motion {
    pub phase: u64,
    pub blinking: bool,
    pub gaze: Point,
    pub hand: Point,
    pub pulse: f32,
}

/// Everything the renderer needs for one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub tick: u64,
    pub emotion: Emotion,
    pub listening: bool,
    pub speaking: bool,
    pub thought: Option<String>,
    pub thought_ticks_left: u64,
    pub eye_scale: f32,
    pub pupil_size: u8,
    pub mouth: MouthShape,
    /// Empty while a thought is shown
    pub status_text: String,
    pub blinking: bool,
    pub gaze: Point,
    pub hand: Point,
    /// Listening pulse in 0.0..=1.0
    pub pulse: f32,
}

impl Frame {
    pub(super) fn compose(state: &PresentationState, now: u64, motion: Motion) -> Self {
        let (thought, thought_ticks_left) = match &state.thought {
            Some(thought) => (
                Some(thought.text.clone()),
                thought.expires_at_tick.saturating_sub(now),
            ),
            None => (None, 0),
        };

        Self {
            tick: now,
            emotion: state.emotion,
            listening: state.listening,
            speaking: state.speaking,
            status_text: status_text(state).to_string(),
            thought,
            thought_ticks_left,
            eye_scale: eye_scale(state),
            pupil_size: pupil_size(state),
            mouth: mouth_shape(state, motion.phase),
            blinking: motion.blinking,
            gaze: motion.gaze,
            hand: motion.hand,
            pulse: motion.pulse,
        }
    }
}

// Emotion wins over the listening flag for the eyes and mouth.

fn eye_scale(state: &PresentationState) -> f32 {
    match state.emotion {
        Emotion::Thinking => 0.7,
        Emotion::Happy => 0.5,
        Emotion::Sad => 1.0,
        Emotion::Idle if state.listening => 1.2,
        Emotion::Idle => 1.0,
    }
}

fn pupil_size(state: &PresentationState) -> u8 {
    match state.emotion {
        Emotion::Thinking => 5,
        Emotion::Happy => 4,
        Emotion::Sad => 6,
        Emotion::Idle if state.listening => 3,
        Emotion::Idle => 5,
    }
}

fn mouth_shape(state: &PresentationState, phase: u64) -> MouthShape {
    match state.emotion {
        Emotion::Happy => MouthShape::Smile,
        Emotion::Sad => MouthShape::Frown,
        Emotion::Thinking => MouthShape::Flat,
        Emotion::Idle if state.listening => MouthShape::Open,
        Emotion::Idle if state.speaking => MouthShape::Talking {
            amplitude: triangle(phase, 20),
        },
        Emotion::Idle => MouthShape::Neutral,
    }
}

fn status_text(state: &PresentationState) -> &'static str {
    if state.thought.is_some() {
        return "";
    }
    if state.listening {
        return "LISTENING...";
    }
    if state.speaking {
        return "SPEAKING...";
    }
    match state.emotion {
        Emotion::Thinking => "THINKING...",
        Emotion::Happy => "SUCCESS!",
        Emotion::Sad => "FAILED",
        Emotion::Idle => "Click: Chat | Double-click: Voice",
    }
}

/// Triangle wave over `period` ticks: 1.0 → 0.0 → 1.0
pub(super) fn triangle(counter: u64, period: u64) -> f32 {
    let half = period / 2;
    let position = counter % period;
    position.abs_diff(half) as f32 / half as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Thought;

    fn state(emotion: Emotion) -> PresentationState {
        PresentationState {
            emotion,
            ..Default::default()
        }
    }

    #[test]
    fn test_expression_per_emotion() {
        let thinking = Frame::compose(&state(Emotion::Thinking), 0, Motion::default());
        assert_eq!(thinking.eye_scale, 0.7);
        assert_eq!(thinking.mouth, MouthShape::Flat);
        assert_eq!(thinking.status_text, "THINKING...");

        let happy = Frame::compose(&state(Emotion::Happy), 0, Motion::default());
        assert_eq!(happy.pupil_size, 4);
        assert_eq!(happy.mouth, MouthShape::Smile);

        let sad = Frame::compose(&state(Emotion::Sad), 0, Motion::default());
        assert_eq!(sad.mouth, MouthShape::Frown);
        assert_eq!(sad.status_text, "FAILED");
    }

    #[test]
    fn test_listening_face() {
        let mut listening = state(Emotion::Idle);
        listening.listening = true;
        let frame = Frame::compose(&listening, 0, Motion::default());
        assert_eq!(frame.eye_scale, 1.2);
        assert_eq!(frame.pupil_size, 3);
        assert_eq!(frame.mouth, MouthShape::Open);
        assert_eq!(frame.status_text, "LISTENING...");
    }

    #[test]
    fn test_speaking_mouth_moves() {
        let mut speaking = state(Emotion::Idle);
        speaking.speaking = true;
        let a = Frame::compose(&speaking, 0, Motion { phase: 0, ..Default::default() });
        let b = Frame::compose(&speaking, 0, Motion { phase: 10, ..Default::default() });
        assert_eq!(a.mouth, MouthShape::Talking { amplitude: 1.0 });
        assert_eq!(b.mouth, MouthShape::Talking { amplitude: 0.0 });
    }

    #[test]
    fn test_thought_hides_status() {
        let mut with_thought = state(Emotion::Happy);
        with_thought.thought = Some(Thought {
            text: "Opening Chrome".into(),
            expires_at_tick: 50,
        });
        let frame = Frame::compose(&with_thought, 20, Motion::default());
        assert_eq!(frame.status_text, "");
        assert_eq!(frame.thought.as_deref(), Some("Opening Chrome"));
        assert_eq!(frame.thought_ticks_left, 30);
    }

    #[test]
    fn test_idle_hint() {
        let frame = Frame::compose(&state(Emotion::Idle), 0, Motion::default());
        assert_eq!(frame.status_text, "Click: Chat | Double-click: Voice");
        assert_eq!(frame.mouth, MouthShape::Neutral);
    }

    #[test]
    fn test_triangle_wave() {
        assert_eq!(triangle(0, 40), 1.0);
        assert_eq!(triangle(20, 40), 0.0);
        assert_eq!(triangle(30, 40), 0.5);
        assert_eq!(triangle(40, 40), 1.0);
    }

    #[test]
    fn test_frame_json_shape() {
        let json = serde_json::to_value(Frame::default()).unwrap();
        assert_eq!(json["emotion"], "idle");
        assert_eq!(json["mouth"]["shape"], "neutral");
    }
}
