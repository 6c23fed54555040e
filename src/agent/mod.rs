//! Remote decision service
//!
//! The agent turns a user's words into a [`Decision`]: a line to show the
//! user plus the tool and parameter to execute. The service is opaque; this
//! module only owns the request/response contract.

mod decision;
mod ondemand;

use std::future::Future;
use std::pin::Pin;

pub use decision::{parse_decision, Decision};
pub use ondemand::OnDemandClient;

/// Errors from a remote query
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("remote agent unavailable: {0}")]
    Unavailable(String),

    #[error("remote agent returned a malformed response: {0}")]
    Malformed(String),
}

/// Common trait for remote decision services (dyn-compatible)
pub trait RemoteAgent: Send + Sync {
    /// Ask the agent what to do with `text`
    fn query<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Decision, AgentError>> + Send + 'a>>;

    /// Drop any server-side session state
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// Stand-in used when the remote client could not be configured
///
/// Every query fails as unavailable, so commands surface the usual
/// apology instead of the daemon refusing to start.
pub struct DisconnectedAgent {
    reason: String,
}

impl DisconnectedAgent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RemoteAgent for DisconnectedAgent {
    fn query<'a>(
        &'a self,
        _text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Decision, AgentError>> + Send + 'a>> {
        Box::pin(async move { Err(AgentError::Unavailable(self.reason.clone())) })
    }
}
