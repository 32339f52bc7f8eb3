//! HTTP file sharing module
//!
//! Serves a single staged file over plain HTTP on the LAN.

pub mod auth;
pub mod server;

pub use auth::{BasicAuth, Credential};
pub use server::{ServedResource, ShareState, create_router, serve};
