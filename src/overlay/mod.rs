//! Overlay animation
//!
//! The animator turns the shared presentation state into a stream of
//! frames for the external renderer. Hand, gaze, blink and pulse live only
//! inside the animator, so the render loop and the command pipeline share
//! nothing but the store.

mod animator;
mod frame;

pub use animator::Animator;
pub use frame::{Frame, Point};
