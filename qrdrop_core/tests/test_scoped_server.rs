use axum::body::{Body, to_bytes};
use axum::http::{HeaderValue, Request, StatusCode};
use qrdrop_core::events::EventSink;
use qrdrop_core::http_share::{Credential, ServedResource, ShareState, create_router};
use tower::ServiceExt;

const BODY: &[u8] = b"hello world!";

fn router(dir: &std::path::Path, credential: Option<&Credential>) -> axum::Router {
    std::fs::write(dir.join("notes.txt"), BODY).unwrap();
    create_router(ShareState::new(
        ServedResource {
            root_dir: dir.to_path_buf(),
            served_name: "notes.txt".to_string(),
        },
        credential,
        HeaderValue::from_static("Basic realm=\"qrdrop\""),
        EventSink::none(),
    ))
}

fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(value) = auth {
        builder = builder.header("Authorization", value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_of(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_served_name_returns_file() {
    let dir = tempfile::tempdir().unwrap();
    let response = router(dir.path(), None)
        .oneshot(get("/notes.txt", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
    assert_eq!(body_of(response).await, BODY);
}

#[tokio::test]
async fn test_query_string_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let response = router(dir.path(), None)
        .oneshot(get("/notes.txt?download=1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_other_paths_are_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("secret.txt"), b"secret").unwrap();

    for uri in [
        "/",
        "/secret.txt",
        "/NOTES.TXT",
        "/notes.txt/",
        "/../notes.txt",
        "/%2e%2e/notes.txt",
        "/notes.txt%00",
    ] {
        let response = router(dir.path(), None).oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "uri {}", uri);
        assert!(body_of(response).await.is_empty(), "uri {}", uri);
    }
}

#[tokio::test]
async fn test_missing_credential_is_challenged() {
    let dir = tempfile::tempdir().unwrap();
    let cred = Credential::new("user", "pass");
    let response = router(dir.path(), Some(&cred))
        .oneshot(get("/notes.txt", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("www-authenticate").unwrap(),
        "Basic realm=\"qrdrop\""
    );
    assert!(body_of(response).await.is_empty());
}

#[tokio::test]
async fn test_repeated_bad_credentials_never_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let cred = Credential::new("user", "pass");
    let app = router(dir.path(), Some(&cred));

    let wrong = [
        Credential::new("user", "wrong").header_value(),
        Credential::new("admin", "pass").header_value(),
        "Basic not-base64".to_string(),
        "Bearer dXNlcjpwYXNz".to_string(),
    ];
    for _ in 0..3 {
        for value in &wrong {
            let response = app
                .clone()
                .oneshot(get("/notes.txt", Some(value)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(response.headers().contains_key("www-authenticate"));
        }
    }

    let response = app
        .oneshot(get("/notes.txt", Some(&cred.header_value())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_of(response).await, BODY);
}

#[tokio::test]
async fn test_valid_credential_on_wrong_path_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    let cred = Credential::new("user", "pass");
    let response = router(dir.path(), Some(&cred))
        .oneshot(get("/other.txt", Some(&cred.header_value())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_credential_checked_before_path() {
    let dir = tempfile::tempdir().unwrap();
    let cred = Credential::new("user", "pass");
    let response = router(dir.path(), Some(&cred))
        .oneshot(get("/other.txt", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_other_methods_not_allowed() {
    let dir = tempfile::tempdir().unwrap();
    for method in ["POST", "PUT", "DELETE", "PATCH"] {
        let response = router(dir.path(), None)
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/notes.txt")
                    .body(Body::from("payload"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
        assert_eq!(response.headers().get("allow").unwrap(), "GET, HEAD");
    }
    assert_eq!(std::fs::read(dir.path().join("notes.txt")).unwrap(), BODY);
}

#[tokio::test]
async fn test_encoded_names_match() {
    let dir = tempfile::tempdir().unwrap();
    let name = "party pics & more.zip";
    std::fs::write(dir.path().join(name), b"PK").unwrap();
    let app = create_router(ShareState::new(
        ServedResource {
            root_dir: dir.path().to_path_buf(),
            served_name: name.to_string(),
        },
        None,
        HeaderValue::from_static("Basic realm=\"qrdrop\""),
        EventSink::none(),
    ));

    for uri in [
        "/party%20pics%20%26%20more.zip",
        "/party%20pics%20&%20more.zip",
    ] {
        let response = app.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "uri {}", uri);
        assert_eq!(body_of(response).await, b"PK");
    }
}
