//! Ephemeral single-file HTTP sharing over the local network.
//!
//! Give it a file or directory and a duration: it stages the path (zipping
//! directories), picks a free port, serves that one resource with optional
//! Basic auth, and returns a download URL that can be shown as a QR code.
//! The server shuts itself down and removes any temp archive at the deadline.

use std::path::PathBuf;

pub mod archive;
pub mod blocking;
pub mod config;
pub mod download_url;
pub mod error;
pub mod events;
pub mod http_share;
pub mod net;
pub mod qr;
pub mod session;

pub use config::ShareConfig;
pub use download_url::DownloadUrl;
pub use error::{Result, ShareError};
pub use events::{ShareEvent, StopReason};
pub use http_share::Credential;
pub use qr::{QrArtifact, encode_url};
pub use session::{ServeRequest, ServerSession, SessionState, ShareHandle, ShareServer};

/// Share `file_path` for `duration_secs` seconds using the default config.
///
/// Returns once the server is listening; the handle's URL is ready to hand
/// out. Must be called inside a tokio runtime.
pub async fn start_download_server(
    file_path: impl Into<PathBuf>,
    credential: Option<Credential>,
    duration_secs: u64,
) -> Result<ShareHandle> {
    let mut request = ServeRequest::new(file_path).with_duration_secs(duration_secs);
    request.credential = credential;
    ShareServer::new(ShareConfig::default())?.start(request).await
}
