//! Shared presentation state
//!
//! Holds the fields every thread agrees on: emotion, listening/speaking
//! flags and the transient thought bubble. Each setter is a single write
//! under one lock and publishes its event while the lock is held, so the
//! event stream is ordered exactly like the writes.
//!
//! The store does not enforce that `listening` and `speaking` are never both
//! true. Callers set `listening = false` before any speech starts.

use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::events::StateEvent;

use super::clock::TickClock;

/// Mascot expression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    #[default]
    Idle,
    Thinking,
    Happy,
    Sad,
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Emotion::Idle => write!(f, "Idle"),
            Emotion::Thinking => write!(f, "Thinking"),
            Emotion::Happy => write!(f, "Happy"),
            Emotion::Sad => write!(f, "Sad"),
        }
    }
}

/// Transient message shown in the bubble
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thought {
    pub text: String,
    /// First tick at which the thought is no longer visible
    pub expires_at_tick: u64,
}

/// Consistent copy of the store at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentationState {
    pub emotion: Emotion,
    pub listening: bool,
    pub speaking: bool,
    pub thought: Option<Thought>,
    /// Bumped on every emotion write
    pub revision: u64,
}

/// Thread-safe owner of [`PresentationState`]
pub struct StateStore {
    inner: RwLock<PresentationState>,
    clock: TickClock,
    event_tx: broadcast::Sender<StateEvent>,
}

impl StateStore {
    /// Create a store reading thought expiry from `clock`
    pub fn new(clock: TickClock, event_tx: broadcast::Sender<StateEvent>) -> Self {
        Self {
            inner: RwLock::new(PresentationState::default()),
            clock,
            event_tx,
        }
    }

    /// The clock used for thought expiry
    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// Set the emotion and return the new revision
    pub fn set_emotion(&self, emotion: Emotion) -> u64 {
        let mut state = self.write();
        let from = state.emotion;
        state.emotion = emotion;
        state.revision += 1;
        if from != emotion {
            self.publish(StateEvent::EmotionChanged { from, to: emotion });
        }
        state.revision
    }

    /// Reset to idle if nobody wrote the emotion since `revision`
    ///
    /// Returns true when the reset happened.
    pub fn settle_to_idle(&self, revision: u64) -> bool {
        let mut state = self.write();
        if state.revision != revision {
            debug!(
                expected = revision,
                actual = state.revision,
                "settle skipped, emotion changed since"
            );
            return false;
        }
        let from = state.emotion;
        state.emotion = Emotion::Idle;
        state.revision += 1;
        if from != Emotion::Idle {
            self.publish(StateEvent::EmotionChanged {
                from,
                to: Emotion::Idle,
            });
        }
        true
    }

    pub fn set_listening(&self, active: bool) {
        let mut state = self.write();
        if state.listening != active {
            state.listening = active;
            self.publish(StateEvent::ListeningChanged { active });
        }
    }

    pub fn set_speaking(&self, active: bool) {
        let mut state = self.write();
        if state.speaking != active {
            state.speaking = active;
            self.publish(StateEvent::SpeakingChanged { active });
        }
    }

    /// Show `text` for `ticks` animation ticks, replacing any current thought
    pub fn set_thought(&self, text: impl Into<String>, ticks: u64) {
        let text = text.into();
        let mut state = self.write();
        state.thought = Some(Thought {
            text: text.clone(),
            expires_at_tick: self.clock.now().saturating_add(ticks),
        });
        self.publish(StateEvent::ThoughtShown { text, ticks });
    }

    pub fn clear_thought(&self) {
        let mut state = self.write();
        if state.thought.take().is_some() {
            self.publish(StateEvent::ThoughtCleared);
        }
    }

    /// Read a consistent copy of the state
    ///
    /// An expired thought is cleared here, at the first read that sees it
    /// expired, so no two consecutive frames can both observe it.
    pub fn snapshot(&self) -> PresentationState {
        let now = self.clock.now();
        {
            let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            if !is_expired(&state, now) {
                return state.clone();
            }
        }

        let mut state = self.write();
        if is_expired(&state, now) {
            state.thought = None;
            self.publish(StateEvent::ThoughtCleared);
        }
        state.clone()
    }

    fn write(&self) -> RwLockWriteGuard<'_, PresentationState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: StateEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

fn is_expired(state: &PresentationState, now: u64) -> bool {
    state
        .thought
        .as_ref()
        .is_some_and(|thought| now >= thought.expires_at_tick)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_store() -> (StateStore, broadcast::Receiver<StateEvent>) {
        let (tx, rx) = broadcast::channel(64);
        (StateStore::new(TickClock::new(), tx), rx)
    }

    fn drain(rx: &mut broadcast::Receiver<StateEvent>) -> Vec<StateEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_initial_state() {
        let (store, _) = create_store();
        let state = store.snapshot();
        assert_eq!(state.emotion, Emotion::Idle);
        assert!(!state.listening);
        assert!(!state.speaking);
        assert!(state.thought.is_none());
    }

    #[test]
    fn test_emotion_events_only_on_change() {
        let (store, mut rx) = create_store();
        store.set_emotion(Emotion::Thinking);
        store.set_emotion(Emotion::Thinking);
        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![StateEvent::EmotionChanged {
                from: Emotion::Idle,
                to: Emotion::Thinking
            }]
        );
    }

    #[test]
    fn test_settle_respects_newer_writes() {
        let (store, _) = create_store();
        let revision = store.set_emotion(Emotion::Happy);
        store.set_emotion(Emotion::Thinking);
        assert!(!store.settle_to_idle(revision));
        assert_eq!(store.snapshot().emotion, Emotion::Thinking);

        let revision = store.set_emotion(Emotion::Sad);
        assert!(store.settle_to_idle(revision));
        assert_eq!(store.snapshot().emotion, Emotion::Idle);
    }

    #[test]
    fn test_thought_expires_on_tick() {
        let (store, mut rx) = create_store();
        store.set_thought("hello", 3);

        store.clock().advance();
        store.clock().advance();
        assert_eq!(store.snapshot().thought.unwrap().text, "hello");

        store.clock().advance();
        assert!(store.snapshot().thought.is_none());

        let events = drain(&mut rx);
        assert_eq!(events.last(), Some(&StateEvent::ThoughtCleared));
    }

    #[test]
    fn test_newer_thought_replaces_older() {
        let (store, _) = create_store();
        store.set_thought("first", 100);
        store.clock().advance();
        store.set_thought("second", 2);
        let thought = store.snapshot().thought.unwrap();
        assert_eq!(thought.text, "second");
        assert_eq!(thought.expires_at_tick, 3);
    }

    #[test]
    fn test_unbounded_thought_never_expires() {
        let (store, _) = create_store();
        store.clock().advance();
        store.set_thought("forever", u64::MAX);
        let thought = store.snapshot().thought.unwrap();
        assert_eq!(thought.expires_at_tick, u64::MAX);

        store.clock().advance();
        assert_eq!(store.snapshot().thought.unwrap().text, "forever");
    }

    #[test]
    fn test_flags_publish_once_per_change() {
        let (store, mut rx) = create_store();
        store.set_listening(true);
        store.set_listening(true);
        store.set_listening(false);
        store.set_speaking(true);
        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                StateEvent::ListeningChanged { active: true },
                StateEvent::ListeningChanged { active: false },
                StateEvent::SpeakingChanged { active: true },
            ]
        );
    }
}
