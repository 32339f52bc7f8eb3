//! Synchronous facade for hosts without a tokio runtime.
//!
//! The session gets its own thread and runtime, which live until the session
//! stops.

use crate::config::ShareConfig;
use crate::download_url::DownloadUrl;
use crate::error::{Result, ShareError};
use crate::events::StopReason;
use crate::session::{ServeRequest, ShareServer};
use std::sync::mpsc;
use std::thread;
use tokio_util::sync::CancellationToken;

pub struct BlockingShare {
    url: DownloadUrl,
    cancel: CancellationToken,
    thread: thread::JoinHandle<Option<StopReason>>,
}

/// Start a share and block only until its URL is known
pub fn start_download_server_blocking(
    request: ServeRequest,
    config: ShareConfig,
) -> Result<BlockingShare> {
    let server = ShareServer::new(config)?;
    let (ready_tx, ready_rx) = mpsc::channel();

    let thread = thread::Builder::new()
        .name("qrdrop-session".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = ready_tx.send(Err(ShareError::Io(e)));
                    return None;
                }
            };

            rt.block_on(async move {
                match server.start(request).await {
                    Ok(handle) => {
                        let _ = ready_tx.send(Ok((handle.url().clone(), handle.cancellation_token())));
                        handle.join().await.ok()
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        None
                    }
                }
            })
        })?;

    let (url, cancel) = ready_rx
        .recv()
        .map_err(|_| ShareError::Supervisor("session thread exited before starting".to_string()))??;

    Ok(BlockingShare {
        url,
        cancel,
        thread,
    })
}

impl BlockingShare {
    pub fn url(&self) -> &DownloadUrl {
        &self.url
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Block until the session has stopped and cleaned up
    pub fn join(self) -> Result<StopReason> {
        self.thread
            .join()
            .map_err(|_| ShareError::Supervisor("session thread panicked".to_string()))?
            .ok_or_else(|| ShareError::Supervisor("session ended without a stop reason".to_string()))
    }
}
