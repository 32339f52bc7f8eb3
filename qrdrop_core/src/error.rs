use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to the caller before a session is running.
///
/// Failures during the background lifetime never come back through this type;
/// they are logged and reported as [`crate::ShareEvent`]s instead.
#[derive(Error, Debug)]
pub enum ShareError {
    #[error("No such file or directory: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No free port found after {attempts} attempts")]
    ResourceExhausted { attempts: u32 },

    #[error("Cannot determine local network address: {0}")]
    NetworkUnavailable(String),

    #[error("Failed to archive directory: {0}")]
    Archive(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("QR encoding failed: {0}")]
    Qr(String),

    #[error("Supervisor task failed: {0}")]
    Supervisor(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ShareError>;

impl From<zip::result::ZipError> for ShareError {
    fn from(e: zip::result::ZipError) -> Self {
        ShareError::Archive(e.to_string())
    }
}

impl From<walkdir::Error> for ShareError {
    fn from(e: walkdir::Error) -> Self {
        ShareError::Archive(e.to_string())
    }
}

impl From<qrcode::types::QrError> for ShareError {
    fn from(e: qrcode::types::QrError) -> Self {
        ShareError::Qr(e.to_string())
    }
}
