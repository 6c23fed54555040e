//! Global voice hotkey
//!
//! Watches modifier keys system-wide and reports when the voice chord
//! (Control + Option) is pressed.

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod keys;
mod listener;

pub use listener::{HotkeyError, HotkeyEvent, HotkeyListener};
