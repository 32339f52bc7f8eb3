use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured duration elapsed
    DeadlineReached,
    /// The host stopped the session through its handle
    Cancelled,
    /// The listener failed and the session was torn down early
    ListenerFailed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::DeadlineReached => "deadline reached",
            StopReason::Cancelled => "cancelled",
            StopReason::ListenerFailed => "listener failed",
        };
        f.write_str(text)
    }
}

/// Report from a running session to the host
#[derive(Debug, Clone)]
pub enum ShareEvent {
    /// Listener is accepting connections
    ServerStarted { url: String },

    /// Served resource was sent to a client
    DownloadServed { from: Option<String>, name: String },

    /// Request refused with 401 or 403
    AccessDenied {
        from: Option<String>,
        status: u16,
        path: String,
    },

    ShuttingDown { reason: StopReason },

    /// Listener closed and temp artifact handled
    ServerStopped { reason: StopReason },

    /// Temp artifact could not be deleted (non-fatal)
    CleanupFailed { path: PathBuf, error: String },

    ServerError(String),
}

/// Optional, non-blocking event channel.
///
/// Uses `try_send` so a slow or missing consumer never stalls serving.
#[derive(Debug, Clone, Default)]
pub struct EventSink(Option<mpsc::Sender<ShareEvent>>);

impl EventSink {
    pub fn new(tx: mpsc::Sender<ShareEvent>) -> Self {
        Self(Some(tx))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn emit(&self, event: ShareEvent) {
        if let Some(tx) = &self.0 {
            if let Err(e) = tx.try_send(event) {
                tracing::debug!("Dropped share event: {}", e);
            }
        }
    }
}
