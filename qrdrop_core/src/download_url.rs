//! Download URL construction and request-path matching.

use crate::error::{Result, ShareError};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::fmt;
use url::Url;

/// Everything except RFC 3986 unreserved characters gets encoded
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a served name for use as a single URL path segment
pub fn encode_segment(name: &str) -> String {
    utf8_percent_encode(name, PATH_SEGMENT).to_string()
}

/// Decode a request path (leading `/` stripped) back to the raw name.
/// Returns `None` for paths that don't decode to UTF-8.
pub fn decode_request_path(path: &str) -> Option<String> {
    let segment = path.strip_prefix('/').unwrap_or(path);
    percent_decode_str(segment)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

/// `http://host:port/<encoded-name>`, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadUrl(Url);

impl DownloadUrl {
    pub fn new(host: &str, port: u16, served_name: &str) -> Result<Self> {
        let raw = format!("http://{}:{}/{}", host, port, encode_segment(served_name));
        Url::parse(&raw)
            .map(Self)
            .map_err(|e| ShareError::InvalidRequest(format!("cannot build URL {:?}: {}", raw, e)))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }

    pub fn port(&self) -> Option<u16> {
        self.0.port()
    }

    /// Encoded path, including the leading `/`
    pub fn path(&self) -> &str {
        self.0.path()
    }
}

impl fmt::Display for DownloadUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DownloadUrl> for String {
    fn from(url: DownloadUrl) -> Self {
        url.0.into()
    }
}
