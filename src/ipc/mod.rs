//! IPC module for daemon-overlay communication

mod protocol;
mod server;

pub use server::{Server, ServerContext};
