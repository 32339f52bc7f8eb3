//! Single static credential checked with HTTP Basic authentication.

use crate::error::{Result, ShareError};
use axum::http::{HeaderMap, header};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse `username:password` (the password may itself contain `:`)
    pub fn parse(pair: &str) -> Result<Self> {
        let (username, password) = pair.split_once(':').ok_or_else(|| {
            ShareError::InvalidRequest("credential must look like user:password".to_string())
        })?;
        if username.is_empty() {
            return Err(ShareError::InvalidRequest(
                "credential username is empty".to_string(),
            ));
        }
        Ok(Self::new(username, password))
    }

    /// Build from an already base64-encoded `username:password` token
    pub fn from_basic_token(token: &str) -> Result<Self> {
        let decoded = STANDARD
            .decode(token.trim())
            .map_err(|e| ShareError::InvalidRequest(format!("invalid base64 credential: {}", e)))?;
        let pair = String::from_utf8(decoded).map_err(|_| {
            ShareError::InvalidRequest("credential is not valid UTF-8".to_string())
        })?;
        Self::parse(&pair)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// base64 of `username:password`, as carried after `Basic `
    pub fn basic_token(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.username, self.password))
    }

    /// Full `Authorization` header value
    pub fn header_value(&self) -> String {
        format!("Basic {}", self.basic_token())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Precomputed expected token for the request path
#[derive(Debug, Clone)]
pub struct BasicAuth {
    expected_token: String,
}

impl BasicAuth {
    pub fn new(credential: &Credential) -> Self {
        Self {
            expected_token: credential.basic_token(),
        }
    }

    /// Whether the request carries exactly the configured credential
    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(value) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };

        match value.trim().split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("basic") => {
                constant_time_eq(token.trim().as_bytes(), self.expected_token.as_bytes())
            }
            _ => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
