//! Session lifecycle: stage, bind, serve in the background, and tear down at
//! the deadline.
//!
//! `ShareServer::start` returns as soon as the listener is accepting. A
//! supervisor task owns the listener and the countdown; the returned
//! [`ShareHandle`] can observe, stop or join it. Dropping the handle detaches
//! the session, and the deadline still applies.

use crate::archive::{self, StagedResource};
use crate::config::ShareConfig;
use crate::download_url::DownloadUrl;
use crate::error::{Result, ShareError};
use crate::events::{EventSink, ShareEvent, StopReason};
use crate::http_share::{Credential, ServedResource, ShareState, create_router, serve};
use crate::net::{PortAllocator, resolve_advertise_host};
use crate::qr::{self, QrArtifact};
use axum::Router;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Fresh ports tried when a probed-free port is taken before we bind it
const BIND_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Listener bound, background loop not started yet
    Starting,
    Running,
    ShuttingDown,
    /// Listener closed and temp artifact handled
    Stopped,
}

/// What the caller wants shared
#[derive(Debug, Clone)]
pub struct ServeRequest {
    pub source_path: PathBuf,
    pub credential: Option<Credential>,
    /// `None` uses the config's default duration
    pub duration_secs: Option<u64>,
}

impl ServeRequest {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            credential: None,
            duration_secs: None,
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    fn duration(&self, config: &ShareConfig) -> Result<Duration> {
        match self.duration_secs.unwrap_or(config.default_duration_secs) {
            0 => Err(ShareError::InvalidRequest(
                "duration must be at least one second".to_string(),
            )),
            secs => Ok(Duration::from_secs(secs)),
        }
    }
}

/// Snapshot of a running session's parameters
#[derive(Debug, Clone)]
pub struct ServerSession {
    pub bound_port: u16,
    pub bind_host: String,
    pub served_name: String,
    pub root_dir: PathBuf,
    pub temp_artifact: Option<PathBuf>,
    pub started_at: Instant,
    pub deadline: Instant,
}

impl ServerSession {
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Starts sessions with a shared config and event sink
#[derive(Debug, Clone)]
pub struct ShareServer {
    config: ShareConfig,
    events: EventSink,
}

impl ShareServer {
    pub fn new(config: ShareConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            events: EventSink::none(),
        })
    }

    /// Report lifecycle and access events on `tx`
    pub fn with_events(mut self, tx: mpsc::Sender<ShareEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn config(&self) -> &ShareConfig {
        &self.config
    }

    /// Start serving `request` and return once the listener is accepting.
    ///
    /// Fails before any port is touched if the path is missing or the
    /// duration is zero.
    pub async fn start(&self, request: ServeRequest) -> Result<ShareHandle> {
        let duration = request.duration(&self.config)?;
        let staged = archive::stage(&request.source_path).await?;

        match self.launch(request.credential.as_ref(), duration, &staged).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                if let Some(artifact) = &staged.temp_artifact {
                    remove_temp_artifact(artifact, &self.events).await;
                }
                Err(e)
            }
        }
    }

    async fn launch(
        &self,
        credential: Option<&Credential>,
        duration: Duration,
        staged: &StagedResource,
    ) -> Result<ShareHandle> {
        let challenge = self.config.auth_challenge()?;
        let host = resolve_advertise_host(&self.config).await?;
        let (listener, port) = self.bind_free_port().await?;
        let url = DownloadUrl::new(&host, port, &staged.served_name)?;

        let router = create_router(ShareState::new(
            ServedResource {
                root_dir: staged.root_dir.clone(),
                served_name: staged.served_name.clone(),
            },
            credential,
            challenge,
            self.events.clone(),
        ));

        let started_at = Instant::now();
        let session = ServerSession {
            bound_port: port,
            bind_host: self.config.bind_host().to_string(),
            served_name: staged.served_name.clone(),
            root_dir: staged.root_dir.clone(),
            temp_artifact: staged.temp_artifact.clone(),
            started_at,
            deadline: started_at + duration,
        };

        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Starting);
        let supervisor = Supervisor {
            listener,
            router,
            url: url.to_string(),
            duration,
            drain_timeout: self.config.drain_timeout(),
            temp_artifact: staged.temp_artifact.clone(),
            cancel: cancel.clone(),
            state_tx,
            events: self.events.clone(),
        };
        let task = tokio::spawn(supervisor.run());

        tracing::info!(
            "Sharing {} at {} for {}s",
            session.served_name,
            url,
            duration.as_secs()
        );

        Ok(ShareHandle {
            url,
            session,
            cancel,
            state_rx,
            task,
            qr_module_pixels: self.config.qr_module_pixels,
        })
    }

    async fn bind_free_port(&self) -> Result<(TcpListener, u16)> {
        let allocator = PortAllocator::from_config(&self.config);
        let host = self.config.bind_host();
        let mut last_err = None;

        for _ in 0..BIND_ATTEMPTS {
            let port = allocator.allocate().await?;
            match TcpListener::bind((host, port)).await {
                Ok(listener) => return Ok((listener, port)),
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    tracing::warn!("Port {} was taken before bind, picking another", port);
                    last_err = Some(ShareError::Bind {
                        addr: format!("{}:{}", host, port),
                        source: e,
                    });
                }
                Err(e) => {
                    return Err(ShareError::Bind {
                        addr: format!("{}:{}", host, port),
                        source: e,
                    });
                }
            }
        }

        Err(last_err.unwrap_or(ShareError::ResourceExhausted {
            attempts: allocator.max_attempts(),
        }))
    }
}

/// Caller's view of a running session
pub struct ShareHandle {
    url: DownloadUrl,
    session: ServerSession,
    cancel: CancellationToken,
    state_rx: watch::Receiver<SessionState>,
    task: JoinHandle<StopReason>,
    qr_module_pixels: u32,
}

impl ShareHandle {
    pub fn url(&self) -> &DownloadUrl {
        &self.url
    }

    pub fn session(&self) -> &ServerSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// QR code of the download URL
    pub fn qr(&self) -> Result<QrArtifact> {
        Ok(qr::encode_url(self.url.as_str())?.with_module_pixels(self.qr_module_pixels))
    }

    /// Token that stops the session when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// End the session before its deadline
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait until the session reaches `Stopped`
    pub async fn stopped(&self) {
        let mut rx = self.state_rx.clone();
        let _ = rx.wait_for(|state| *state == SessionState::Stopped).await;
    }

    /// Wait for the supervisor to finish and report why it stopped
    pub async fn join(self) -> Result<StopReason> {
        self.task
            .await
            .map_err(|e| ShareError::Supervisor(e.to_string()))
    }

    /// Give up the handle; the session runs until its deadline
    pub fn detach(self) -> DownloadUrl {
        self.url
    }
}

struct Supervisor {
    listener: TcpListener,
    router: Router,
    url: String,
    duration: Duration,
    drain_timeout: Duration,
    temp_artifact: Option<PathBuf>,
    cancel: CancellationToken,
    state_tx: watch::Sender<SessionState>,
    events: EventSink,
}

impl Supervisor {
    async fn run(self) -> StopReason {
        let Supervisor {
            listener,
            router,
            url,
            duration,
            drain_timeout,
            temp_artifact,
            cancel,
            state_tx,
            events,
        } = self;

        let server_shutdown = cancel.child_token();
        let mut server = tokio::spawn(serve(listener, router, server_shutdown.clone()));
        state_tx.send_replace(SessionState::Running);
        events.emit(ShareEvent::ServerStarted { url });

        let reason = tokio::select! {
            _ = tokio::time::sleep(duration) => StopReason::DeadlineReached,
            _ = cancel.cancelled() => StopReason::Cancelled,
            result = &mut server => {
                let msg = match result {
                    Ok(Ok(())) => "listener closed unexpectedly".to_string(),
                    Ok(Err(e)) => format!("listener error: {}", e),
                    Err(e) => format!("server task failed: {}", e),
                };
                tracing::error!("HTTP server stopped early: {}", msg);
                events.emit(ShareEvent::ServerError(msg));
                StopReason::ListenerFailed
            }
        };

        if reason != StopReason::ListenerFailed {
            tracing::info!("Shutting down share ({})", reason);
            state_tx.send_replace(SessionState::ShuttingDown);
            events.emit(ShareEvent::ShuttingDown { reason });
            server_shutdown.cancel();

            match tokio::time::timeout(drain_timeout, &mut server).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    tracing::error!("HTTP server error during shutdown: {}", e);
                    events.emit(ShareEvent::ServerError(e.to_string()));
                }
                Ok(Err(e)) => {
                    tracing::error!("HTTP server task failed: {}", e);
                    events.emit(ShareEvent::ServerError(e.to_string()));
                }
                Err(_) => {
                    tracing::warn!(
                        "Downloads still open after {}s, stopping server anyway",
                        drain_timeout.as_secs()
                    );
                    server.abort();
                }
            }
        }

        if let Some(artifact) = &temp_artifact {
            remove_temp_artifact(artifact, &events).await;
        }

        state_tx.send_replace(SessionState::Stopped);
        events.emit(ShareEvent::ServerStopped { reason });
        tracing::info!("Share stopped ({})", reason);
        reason
    }
}

/// Delete a session's temp artifact; failures are logged, never fatal
async fn remove_temp_artifact(path: &Path, events: &EventSink) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) => {
            tracing::warn!("Could not remove {}: {}", path.display(), e);
            events.emit(ShareEvent::CleanupFailed {
                path: path.to_path_buf(),
                error: e.to_string(),
            });
        }
    }
}
