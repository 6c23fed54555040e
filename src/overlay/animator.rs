//! Fixed-rate overlay animation clock
//!
//! Each tick advances the shared [`TickClock`], steps the animator's own
//! motion variables and reads the store exactly once. Nothing here writes
//! business state; the only store-visible effect is the eager thought
//! expiry that `snapshot()` performs.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::state::{Emotion, PresentationState, StateStore};

use super::frame::{triangle, Frame, Motion, Point};

const HAND_LERP: f32 = 0.1;
const GAZE_LERP: f32 = 0.05;
/// Ticks between new idle gaze targets
const GAZE_PERIOD: u64 = 120;
const BLINK_TICKS: u32 = 10;
const BLINK_BASE: u32 = 180;
const BLINK_JITTER: u32 = 100;
const PULSE_PERIOD: u64 = 40;

pub struct Animator {
    store: Arc<StateStore>,
    rng: StdRng,
    phase: u64,
    hand: Point,
    hand_target: Point,
    gaze: Point,
    gaze_target: Point,
    since_blink: u32,
    next_blink: u32,
    blink_left: u32,
    pulse_counter: u64,
    was_listening: bool,
}

impl Animator {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self::with_rng(store, StdRng::from_entropy())
    }

    fn with_rng(store: Arc<StateStore>, rng: StdRng) -> Self {
        Self {
            store,
            rng,
            phase: 0,
            hand: Point::default(),
            hand_target: Point::default(),
            gaze: Point::default(),
            gaze_target: Point::default(),
            since_blink: 0,
            next_blink: BLINK_BASE,
            blink_left: 0,
            pulse_counter: 0,
            was_listening: false,
        }
    }

    pub fn set_hand_target(&mut self, target: Point) {
        self.hand_target = target;
    }

    /// Advance one tick and produce its frame
    pub fn tick(&mut self) -> Frame {
        let now = self.store.clock().advance();
        let state = self.store.snapshot();
        self.step(&state);

        let motion = Motion {
            phase: self.phase,
            blinking: self.blink_left > 0,
            gaze: self.gaze,
            hand: self.hand,
            pulse: if state.listening {
                triangle(self.pulse_counter, PULSE_PERIOD)
            } else {
                0.0
            },
        };
        Frame::compose(&state, now, motion)
    }

    fn step(&mut self, state: &PresentationState) {
        self.phase += 1;
        self.hand = self.hand.lerp(self.hand_target, HAND_LERP);

        // The arming tick counts as the first blinking tick
        self.blink_left = self.blink_left.saturating_sub(1);
        self.since_blink += 1;
        if self.since_blink >= self.next_blink {
            self.blink_left = BLINK_TICKS;
            self.since_blink = 0;
            self.next_blink = BLINK_BASE + self.rng.gen_range(0..BLINK_JITTER);
        }

        if state.listening {
            if !self.was_listening {
                self.pulse_counter = 0;
            }
            self.pulse_counter += 1;
        }
        self.was_listening = state.listening;

        // Eyes wander only while idle
        if state.emotion == Emotion::Idle && !state.listening {
            if self.phase % GAZE_PERIOD == 0 {
                self.gaze_target = Point::new(
                    self.rng.gen_range(-6.0..6.0),
                    self.rng.gen_range(-4.0..4.0),
                );
            }
        } else {
            self.gaze_target = Point::default();
        }
        self.gaze = self.gaze.lerp(self.gaze_target, GAZE_LERP);
    }

    /// Tick forever, publishing every frame
    ///
    /// Late ticks are skipped rather than bursted.
    pub async fn run(
        mut self,
        period: Duration,
        frame_tx: watch::Sender<Frame>,
        mut hand_rx: watch::Receiver<Point>,
    ) {
        info!(period_ms = period.as_millis() as u64, "animator started");
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if hand_rx.has_changed().unwrap_or(false) {
                let target = *hand_rx.borrow_and_update();
                debug!(x = target.x, y = target.y, "hand target");
                self.set_hand_target(target);
            }
            frame_tx.send_replace(self.tick());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StateEvent;
    use crate::state::TickClock;
    use tokio::sync::broadcast;

    fn create_animator() -> (Animator, Arc<StateStore>) {
        let (tx, _) = broadcast::channel::<StateEvent>(64);
        let store = Arc::new(StateStore::new(TickClock::new(), tx));
        let animator = Animator::with_rng(Arc::clone(&store), StdRng::seed_from_u64(7));
        (animator, store)
    }

    #[test]
    fn test_thought_visible_until_expiry_tick() {
        let (mut animator, store) = create_animator();
        store.set_thought("Opening Chrome", 180);

        let mut frame = Frame::default();
        for _ in 0..179 {
            frame = animator.tick();
        }
        assert_eq!(frame.thought.as_deref(), Some("Opening Chrome"));
        assert_eq!(frame.thought_ticks_left, 1);

        let frame = animator.tick();
        assert_eq!(frame.thought, None);
        assert!(store.snapshot().thought.is_none());
    }

    #[test]
    fn test_hand_eases_towards_target() {
        let (mut animator, _) = create_animator();
        animator.set_hand_target(Point::new(100.0, 0.0));
        let first = animator.tick().hand.x;
        assert!((first - 10.0).abs() < 1e-4);
        let second = animator.tick().hand.x;
        assert!(second > first && second < 100.0);
    }

    #[test]
    fn test_blinks_within_jitter_window() {
        let (mut animator, _) = create_animator();
        let first_blink = (1..=BLINK_BASE + BLINK_JITTER)
            .find(|_| animator.tick().blinking)
            .unwrap();
        assert_eq!(first_blink, BLINK_BASE);

        let blink_len = (0..).take_while(|_| animator.tick().blinking).count() as u32;
        assert_eq!(blink_len, BLINK_TICKS - 1);
    }

    #[test]
    fn test_gaze_recentres_when_busy() {
        let (mut animator, store) = create_animator();
        for _ in 0..GAZE_PERIOD * 3 {
            animator.tick();
        }
        store.set_emotion(Emotion::Thinking);
        let mut frame = Frame::default();
        for _ in 0..400 {
            frame = animator.tick();
        }
        assert!(frame.gaze.x.abs() < 0.01 && frame.gaze.y.abs() < 0.01);
    }

    #[test]
    fn test_pulse_only_while_listening() {
        let (mut animator, store) = create_animator();
        assert_eq!(animator.tick().pulse, 0.0);
        store.set_listening(true);
        let pulses: Vec<f32> = (0..20).map(|_| animator.tick().pulse).collect();
        assert!(pulses.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn test_animator_never_touches_emotion() {
        let (mut animator, store) = create_animator();
        store.set_emotion(Emotion::Happy);
        let revision = store.snapshot().revision;
        for _ in 0..500 {
            animator.tick();
        }
        let state = store.snapshot();
        assert_eq!(state.emotion, Emotion::Happy);
        assert_eq!(state.revision, revision);
    }

    #[tokio::test]
    async fn test_run_publishes_frames() {
        let (animator, store) = create_animator();
        let (frame_tx, mut frame_rx) = watch::channel(Frame::default());
        let (_hand_tx, hand_rx) = watch::channel(Point::default());
        let task = tokio::spawn(animator.run(Duration::from_millis(16), frame_tx, hand_rx));

        frame_rx.changed().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.clock().now() >= 5);
        task.abort();
    }
}
