//! Stop signal for the maintenance loop.
//!
//! The flag lives in a `tokio::sync::watch` channel, so a loop that
//! subscribes after the stop was requested still sees it.

use std::fmt;

use tokio::signal;
use tokio::sync::watch;

/// Why the service is stopping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Interrupt,
    Terminate,
    Requested,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Requested => "stop requested",
        })
    }
}

pub struct ShutdownController {
    tx: watch::Sender<Option<StopReason>>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// The first reason recorded wins; later calls are no-ops.
    pub fn stop(&self, reason: StopReason) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn shutdown(&self) {
        self.stop(StopReason::Requested);
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.tx.borrow()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.reason().is_some()
    }

    /// Wait for SIGINT or SIGTERM (or a programmatic stop) and return why.
    pub async fn wait_for_signal(&self) -> StopReason {
        let mut listener = self.subscribe();

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "SIGTERM handler not installed");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = signal::ctrl_c() => self.stop(StopReason::Interrupt),
            _ = terminate => self.stop(StopReason::Terminate),
            _ = listener.stopped() => {}
        }

        let reason = self.reason().unwrap_or(StopReason::Requested);
        tracing::info!(%reason, "masternode service stopping");
        reason
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half handed to long-running tasks.
pub struct ShutdownListener {
    rx: watch::Receiver<Option<StopReason>>,
}

impl ShutdownListener {
    /// Resolves once a stop has been requested, immediately if it already was.
    /// Also resolves if the controller is dropped.
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|reason| reason.is_some()).await;
    }
}
