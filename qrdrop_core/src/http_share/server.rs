//! Scoped HTTP file server
//!
//! Serves exactly one file from an explicit root directory. Every other path
//! is refused with 403, and a configured credential is enforced with 401.

use crate::download_url::decode_request_path;
use crate::events::{EventSink, ShareEvent};
use crate::http_share::auth::{BasicAuth, Credential};
use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::services::ServeFile;

/// The single file a session exposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedResource {
    pub root_dir: PathBuf,
    /// Raw file name; requests are percent-decoded before comparison
    pub served_name: String,
}

impl ServedResource {
    pub fn file_path(&self) -> PathBuf {
        self.root_dir.join(&self.served_name)
    }
}

/// Per-session handler parameters
#[derive(Clone)]
pub struct ShareState {
    resource: Arc<ServedResource>,
    auth: Option<BasicAuth>,
    challenge: HeaderValue,
    events: EventSink,
}

impl ShareState {
    pub fn new(
        resource: ServedResource,
        credential: Option<&Credential>,
        challenge: HeaderValue,
        events: EventSink,
    ) -> Self {
        Self {
            resource: Arc::new(resource),
            auth: credential.map(BasicAuth::new),
            challenge,
            events,
        }
    }

    pub fn resource(&self) -> &ServedResource {
        &self.resource
    }
}

fn peer_of(request: &Request) -> Option<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
}

/// Middleware to add security headers
async fn add_security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    response
}

/// Middleware rejecting requests without the session credential
async fn require_credential(State(state): State<ShareState>, req: Request, next: Next) -> Response {
    if let Some(auth) = &state.auth {
        if !auth.is_authorized(req.headers()) {
            let from = peer_of(&req);
            tracing::warn!(
                "Rejected request for {} from {}: missing or invalid credential",
                req.uri().path(),
                from.as_deref().unwrap_or("unknown")
            );
            state.events.emit(ShareEvent::AccessDenied {
                from,
                status: StatusCode::UNAUTHORIZED.as_u16(),
                path: req.uri().path().to_string(),
            });
            return (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, state.challenge.clone())],
            )
                .into_response();
        }
    }

    next.run(req).await
}

/// Handler for every path: only the served name gets through
async fn serve_resource(State(state): State<ShareState>, req: Request) -> Response {
    let from = peer_of(&req);
    let requested = decode_request_path(req.uri().path());

    if requested.as_deref() != Some(state.resource.served_name.as_str()) {
        tracing::debug!(
            "Forbidden path {} from {}",
            req.uri().path(),
            from.as_deref().unwrap_or("unknown")
        );
        state.events.emit(ShareEvent::AccessDenied {
            from,
            status: StatusCode::FORBIDDEN.as_u16(),
            path: req.uri().path().to_string(),
        });
        return StatusCode::FORBIDDEN.into_response();
    }

    if !matches!(*req.method(), Method::GET | Method::HEAD) {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, HeaderValue::from_static("GET, HEAD"))],
        )
            .into_response();
    }

    // No ranges or conditionals: every served GET is a 200 with the full body
    let is_get = req.method() == Method::GET;
    let (mut parts, body) = req.into_parts();
    for name in [
        header::RANGE,
        header::IF_RANGE,
        header::IF_MODIFIED_SINCE,
        header::IF_UNMODIFIED_SINCE,
        header::IF_NONE_MATCH,
        header::IF_MATCH,
    ] {
        parts.headers.remove(name);
    }
    let req = Request::from_parts(parts, body);

    let mut response = match ServeFile::new(state.resource.file_path()).oneshot(req).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };
    response.headers_mut().remove(header::ACCEPT_RANGES);

    if is_get && response.status() == StatusCode::OK {
        tracing::info!(
            "Serving {} to {}",
            state.resource.served_name,
            from.as_deref().unwrap_or("unknown")
        );
        state.events.emit(ShareEvent::DownloadServed {
            from,
            name: state.resource.served_name.clone(),
        });
    }

    response
}

/// Build the axum router for one served resource
pub fn create_router(state: ShareState) -> Router {
    Router::new()
        .fallback(serve_resource)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_credential,
        ))
        .layer(middleware::from_fn(add_security_headers))
        .with_state(state)
}

/// Run the accept loop until `shutdown` fires.
///
/// On shutdown the listener is closed at once; open connections finish their
/// current response before the returned future completes.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("HTTP server listening on {}", addr);
    }

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.cancelled().await;
        tracing::info!("HTTP server shutting down gracefully");
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;

    fn state_for(dir: &std::path::Path, credential: Option<&Credential>) -> ShareState {
        ShareState::new(
            ServedResource {
                root_dir: dir.to_path_buf(),
                served_name: "my photo.jpg".to_string(),
            },
            credential,
            HeaderValue::from_static("Basic realm=\"qrdrop\""),
            EventSink::none(),
        )
    }

    #[tokio::test]
    async fn test_security_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("my photo.jpg"), b"jpeg").unwrap();
        let router = create_router(state_for(dir.path(), None));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/my%20photo.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
        assert_eq!(headers.get("cache-control").unwrap(), "no-store");
        assert_eq!(headers.get("content-type").unwrap(), "image/jpeg");
        assert!(headers.get("accept-ranges").is_none());
    }

    #[tokio::test]
    async fn test_range_header_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("my photo.jpg"), b"0123456789").unwrap();
        let router = create_router(state_for(dir.path(), None));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/my%20photo.jpg")
                    .header("Range", "bytes=2-4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_conditional_headers_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("my photo.jpg"), b"0123456789").unwrap();

        for (name, value) in [
            ("If-Modified-Since", "Fri, 01 Jan 2100 00:00:00 GMT"),
            ("If-Unmodified-Since", "Thu, 01 Jan 1970 00:00:00 GMT"),
            ("If-None-Match", "*"),
            ("If-Match", "\"nope\""),
        ] {
            let router = create_router(state_for(dir.path(), None));
            let response = router
                .oneshot(
                    Request::builder()
                        .uri("/my%20photo.jpg")
                        .header(name, value)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK, "{}", name);
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&body[..], b"0123456789", "{}", name);
        }
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("my photo.jpg"), b"0123456789").unwrap();
        let router = create_router(state_for(dir.path(), None));

        let response = router
            .oneshot(
                Request::builder()
                    .method("HEAD")
                    .uri("/my%20photo.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }
}
