//! Signal handling for graceful shutdown

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Resolves on SIGTERM, SIGINT or an explicit [`ShutdownSignal::trigger`]
///
/// Clones share the same trigger.
#[derive(Clone)]
pub struct ShutdownSignal {
    requested: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (requested, _) = watch::channel(false);
        Self {
            requested: Arc::new(requested),
        }
    }

    /// Request shutdown from inside the process
    pub fn trigger(&self) {
        self.requested.send_replace(true);
    }

    /// Wait for a shutdown signal or request
    pub async fn wait(&self) {
        let mut requested = self.requested.subscribe();
        let requested = async move {
            let _ = requested.wait_for(|requested| *requested).await;
            debug!("shutdown requested");
        };

        tokio::select! {
            _ = requested => {}
            _ = wait_for_signal() => {}
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_signal() {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(e), _) | (_, Err(e)) => {
            warn!(?e, "failed to register signal handlers");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            debug!("received SIGTERM");
        }
        _ = sigint.recv() => {
            debug!("received SIGINT");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_resolves_wait() {
        tokio_test::block_on(async {
            let shutdown = ShutdownSignal::new();
            let handle = shutdown.clone();
            handle.trigger();
            tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
                .await
                .expect("wait should resolve after trigger");
        });
    }

    #[tokio::test]
    async fn test_trigger_from_another_task() {
        let shutdown = ShutdownSignal::new();
        let handle = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.trigger();
        });
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .unwrap();
    }
}
