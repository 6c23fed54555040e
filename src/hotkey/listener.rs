//! Global voice hotkey listener
//!
//! On macOS a CGEventTap watches modifier changes system-wide on a
//! dedicated thread with its own CFRunLoop. Other platforms have no global
//! listener; `start` reports [`HotkeyError::Unsupported`] and the daemon
//! keeps running without it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Events sent from the hotkey listener to the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The voice chord was pressed
    VoiceTriggered,
    /// macOS disabled the event tap
    TapDisabled,
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("global hotkeys are not supported on this platform")]
    Unsupported,
}

pub struct HotkeyListener {
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    event_tx: mpsc::Sender<HotkeyEvent>,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    pub fn new(event_tx: mpsc::Sender<HotkeyEvent>) -> Self {
        Self {
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start listening on a dedicated thread
    ///
    /// Runs until `stop()` is called or the receiving side is dropped.
    #[cfg(target_os = "macos")]
    pub fn start(&self) -> Result<(), HotkeyError> {
        use tracing::{error, info};

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);

        let spawned = std::thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("hotkey listener thread started");
                if let Err(e) = tap::run_event_loop(event_tx, Arc::clone(&running)) {
                    error!(?e, "hotkey listener error");
                }
                running.store(false, Ordering::SeqCst);
                info!("hotkey listener thread stopped");
            });

        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(HotkeyError::ThreadSpawn(e.to_string()));
        }
        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    pub fn start(&self) -> Result<(), HotkeyError> {
        Err(HotkeyError::Unsupported)
    }

    /// Ask the listener thread to exit at its next poll
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(target_os = "macos")]
mod tap {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
    use core_graphics::event::{
        CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
        CGEventTapPlacement, CGEventTapProxy, CGEventType,
    };
    use tokio::sync::mpsc;
    use tracing::{debug, error, info, warn};

    use super::{HotkeyError, HotkeyEvent};
    use crate::hotkey::keys::{ModifierState, VoiceChord};

    /// Tap callbacks can only be received while the run loop is running
    const RUN_LOOP_SLICE: Duration = Duration::from_millis(100);

    enum TapSignal {
        Flags(CGEventFlags),
        Disabled,
    }

    pub(super) fn run_event_loop(
        event_tx: mpsc::Sender<HotkeyEvent>,
        running: Arc<AtomicBool>,
    ) -> Result<(), HotkeyError> {
        let mut chord = VoiceChord::default();
        let (callback_tx, callback_rx) = std::sync::mpsc::channel::<TapSignal>();

        // Must be fast and non-blocking
        let callback = move |_proxy: CGEventTapProxy,
                             event_type: CGEventType,
                             event: &CGEvent|
              -> Option<CGEvent> {
            match event_type {
                CGEventType::FlagsChanged => {
                    let _ = callback_tx.send(TapSignal::Flags(event.get_flags()));
                }
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    let _ = callback_tx.send(TapSignal::Disabled);
                }
                _ => {}
            }
            Some(event.clone())
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![CGEventType::FlagsChanged],
            callback,
        )
        .map_err(|_| {
            error!("failed to create event tap - is Accessibility permission granted?");
            HotkeyError::EventTapCreation
        })?;
        tap.enable();

        let source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| HotkeyError::EventTapCreation)?;
        let run_loop = CFRunLoop::get_current();
        unsafe {
            run_loop.add_source(&source, kCFRunLoopCommonModes);
        }
        info!("event tap created and enabled");

        while running.load(Ordering::SeqCst) {
            unsafe {
                CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, RUN_LOOP_SLICE, true);
            }

            while let Ok(signal) = callback_rx.try_recv() {
                let event = match signal {
                    TapSignal::Flags(flags) => {
                        let state = ModifierState::from_flags(flags);
                        if !chord.update(state) {
                            continue;
                        }
                        debug!(?state, "voice chord pressed");
                        HotkeyEvent::VoiceTriggered
                    }
                    TapSignal::Disabled => {
                        warn!("event tap disabled, re-enabling");
                        tap.enable();
                        HotkeyEvent::TapDisabled
                    }
                };

                // Not in an async context here
                if event_tx.blocking_send(event).is_err() {
                    warn!("hotkey channel closed, stopping listener");
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}
