//! Speech output queue and single-shot voice capture
//!
//! Output runs on one dedicated worker thread that drains a FIFO queue and
//! speaks each utterance to completion before taking the next. Capture is
//! a blocking call guarded by its own lock so only one caller uses the
//! device at a time.

mod external;

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::state::StateStore;

pub use external::{ExternalStt, ExternalTts};

/// Errors from speech backends
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("speech program not found: {0}")]
    ProgramNotFound(String),

    #[error("speech backend failed: {0}")]
    Backend(String),

    #[error("failed to spawn speech worker: {0}")]
    ThreadSpawn(String),
}

/// Blocking text-to-speech
pub trait SpeechEngine: Send {
    /// Speak `text`, returning when playback ends
    fn speak(&mut self, text: &str) -> Result<(), SpeechError>;
}

/// Blocking speech-to-text for one utterance
pub trait Transcriber: Send {
    /// Capture and transcribe; `Ok(None)` when nothing intelligible was heard
    fn listen_once(&mut self, timeout: Duration) -> Result<Option<String>, SpeechError>;
}

/// Speech output worker plus the shared capture device
pub struct SpeechSubsystem {
    queue_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    capture: Option<Arc<Mutex<Box<dyn Transcriber>>>>,
}

impl SpeechSubsystem {
    /// Start the output worker; `transcriber` may be absent
    pub fn start(
        engine: Box<dyn SpeechEngine>,
        transcriber: Option<Box<dyn Transcriber>>,
        store: Arc<StateStore>,
    ) -> Result<Self, SpeechError> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let worker = thread::Builder::new()
            .name("speech-output".to_string())
            .spawn(move || run_worker(engine, queue_rx, store))
            .map_err(|e| SpeechError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            queue_tx: Mutex::new(Some(queue_tx)),
            worker: Mutex::new(Some(worker)),
            capture: transcriber.map(|t| Arc::new(Mutex::new(t))),
        })
    }

    /// A subsystem with no output and no capture
    pub fn unavailable() -> Self {
        Self {
            queue_tx: Mutex::new(None),
            worker: Mutex::new(None),
            capture: None,
        }
    }

    pub fn can_speak(&self) -> bool {
        self.sender().is_some()
    }

    pub fn can_listen(&self) -> bool {
        self.capture.is_some()
    }

    /// Queue `text` for speaking; never blocks
    pub fn enqueue(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match self.sender() {
            Some(tx) => {
                if tx.send(text.to_string()).is_err() {
                    warn!("speech worker gone, dropping utterance");
                }
            }
            None => debug!(text, "speech unavailable, not speaking"),
        }
    }

    /// Capture one utterance, blocking the calling thread
    ///
    /// Timeouts, unintelligible audio and backend failures all yield `None`.
    pub fn listen_once(&self, timeout: Duration) -> Option<String> {
        let capture = self.capture.as_ref()?;
        let mut transcriber = capture.lock().unwrap_or_else(PoisonError::into_inner);

        info!(timeout_secs = timeout.as_secs(), "listening");
        match transcriber.listen_once(timeout) {
            Ok(Some(text)) if !text.trim().is_empty() => {
                info!(heard = %text.trim(), "voice captured");
                Some(text.trim().to_string())
            }
            Ok(_) => {
                info!("no speech detected");
                None
            }
            Err(e) => {
                warn!(?e, "voice capture failed");
                None
            }
        }
    }

    /// Close the queue and wait for queued utterances to finish
    pub fn shutdown(&self) {
        self.queue_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!("speech worker panicked");
            }
        }
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<String>> {
        self.queue_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn run_worker(
    mut engine: Box<dyn SpeechEngine>,
    mut queue_rx: mpsc::UnboundedReceiver<String>,
    store: Arc<StateStore>,
) {
    info!("speech worker started");

    while let Some(text) = queue_rx.blocking_recv() {
        debug!(%text, "speaking");
        store.set_speaking(true);
        if let Err(e) = engine.speak(&text) {
            warn!(?e, "speech output failed");
        }
        store.set_speaking(false);
    }

    info!("speech worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StateEvent;
    use crate::state::TickClock;
    use std::time::Instant;
    use tokio::sync::broadcast;

    struct RecordingEngine {
        spoken: Arc<Mutex<Vec<String>>>,
        delay: Duration,
    }

    impl SpeechEngine for RecordingEngine {
        fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
            thread::sleep(self.delay);
            self.spoken.lock().unwrap().push(text.to_string());
            if text == "fail" {
                return Err(SpeechError::Backend("synthetic".into()));
            }
            Ok(())
        }
    }

    struct ScriptedTranscriber(Vec<Result<Option<String>, SpeechError>>);

    impl Transcriber for ScriptedTranscriber {
        fn listen_once(&mut self, _timeout: Duration) -> Result<Option<String>, SpeechError> {
            self.0.remove(0)
        }
    }

    fn create_store() -> (Arc<StateStore>, broadcast::Receiver<StateEvent>) {
        let (tx, rx) = broadcast::channel(64);
        (Arc::new(StateStore::new(TickClock::new(), tx)), rx)
    }

    fn start(
        delay: Duration,
        transcriber: Option<Box<dyn Transcriber>>,
    ) -> (SpeechSubsystem, Arc<Mutex<Vec<String>>>, broadcast::Receiver<StateEvent>) {
        let (store, rx) = create_store();
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let engine = RecordingEngine {
            spoken: Arc::clone(&spoken),
            delay,
        };
        let speech = SpeechSubsystem::start(Box::new(engine), transcriber, store).unwrap();
        (speech, spoken, rx)
    }

    #[test]
    fn test_fifo_order() {
        let (speech, spoken, _) = start(Duration::from_millis(5), None);
        speech.enqueue("A");
        speech.enqueue("B");
        speech.enqueue("C");
        speech.shutdown();
        assert_eq!(*spoken.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_enqueue_does_not_block_on_slow_engine() {
        let (speech, spoken, _) = start(Duration::from_millis(150), None);
        let start = Instant::now();
        speech.enqueue("one");
        speech.enqueue("two");
        assert!(start.elapsed() < Duration::from_millis(100));
        speech.shutdown();
        assert_eq!(spoken.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_blank_text_is_skipped_and_failures_continue() {
        let (speech, spoken, _) = start(Duration::ZERO, None);
        speech.enqueue("   ");
        speech.enqueue("fail");
        speech.enqueue("after");
        speech.shutdown();
        assert_eq!(*spoken.lock().unwrap(), vec!["fail", "after"]);
    }

    #[test]
    fn test_speaking_flag_wraps_each_utterance() {
        let (speech, _, mut rx) = start(Duration::ZERO, None);
        speech.enqueue("hello");
        speech.shutdown();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                StateEvent::SpeakingChanged { active: true },
                StateEvent::SpeakingChanged { active: false },
            ]
        );
    }

    #[test]
    fn test_listen_failures_become_none() {
        let transcriber = ScriptedTranscriber(vec![
            Ok(Some("  open chrome ".to_string())),
            Ok(None),
            Ok(Some("   ".to_string())),
            Err(SpeechError::Backend("mic unplugged".into())),
        ]);
        let (speech, _, _) = start(Duration::ZERO, Some(Box::new(transcriber)));
        let timeout = Duration::from_secs(1);

        assert_eq!(speech.listen_once(timeout).as_deref(), Some("open chrome"));
        assert_eq!(speech.listen_once(timeout), None);
        assert_eq!(speech.listen_once(timeout), None);
        assert_eq!(speech.listen_once(timeout), None);
    }

    #[test]
    fn test_unavailable_subsystem_is_inert() {
        let speech = SpeechSubsystem::unavailable();
        assert!(!speech.can_speak());
        assert!(!speech.can_listen());
        speech.enqueue("nobody hears this");
        assert_eq!(speech.listen_once(Duration::from_millis(10)), None);
    }
}
