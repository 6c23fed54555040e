//! Presentation state shared across threads
//!
//! - TickClock: animation tick counter, advanced by the overlay animator
//! - StateStore: emotion, listening/speaking flags and the thought bubble,
//!   written by the command pipeline and speech worker, read every frame

mod clock;
mod store;

pub use clock::TickClock;
pub use store::{Emotion, PresentationState, StateStore};
#[cfg(test)]
pub use store::Thought;
