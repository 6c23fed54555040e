//! Modifier key state and the voice chord
//!
//! The voice hotkey is Control + Option held together. It fires once when
//! the chord is completed, not again until it has been released.

#[cfg(target_os = "macos")]
use core_graphics::event::CGEventFlags;

/// Modifier key flag masks from macOS CGEventFlags
#[cfg(target_os = "macos")]
pub mod flags {
    use core_graphics::event::CGEventFlags;

    pub const CONTROL: CGEventFlags = CGEventFlags::CGEventFlagControl;
    pub const OPTION: CGEventFlags = CGEventFlags::CGEventFlagAlternate;
    pub const SHIFT: CGEventFlags = CGEventFlags::CGEventFlagShift;
    pub const COMMAND: CGEventFlags = CGEventFlags::CGEventFlagCommand;
}

/// Tracks which modifier keys are currently pressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    pub control: bool,
    pub option: bool,
    pub shift: bool,
    pub command: bool,
}

impl ModifierState {
    #[cfg(target_os = "macos")]
    pub fn from_flags(flags: CGEventFlags) -> Self {
        Self {
            control: flags.contains(flags::CONTROL),
            option: flags.contains(flags::OPTION),
            shift: flags.contains(flags::SHIFT),
            command: flags.contains(flags::COMMAND),
        }
    }

    /// Exactly Control + Option; extra modifiers belong to other shortcuts
    pub fn is_voice_chord(&self) -> bool {
        self.control && self.option && !self.shift && !self.command
    }
}

/// Rising-edge detector for the voice chord
#[derive(Debug, Default)]
pub struct VoiceChord {
    held: bool,
}

impl VoiceChord {
    /// Feed the latest modifier state; true when the chord was just completed
    pub fn update(&mut self, state: ModifierState) -> bool {
        let now = state.is_voice_chord();
        let fired = now && !self.held;
        self.held = now;
        fired
    }
}
