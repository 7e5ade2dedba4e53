//! Static asset server tests

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use headroom::StaticServer;
use headroom::config::ServerConfig;
use tower::ServiceExt;

fn asset_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    std::fs::write(dir.path().join("index.html"), "<h1>headroom</h1>").unwrap();
    std::fs::write(dir.path().join("style.css"), "body {}").unwrap();
    std::fs::create_dir(dir.path().join("js")).unwrap();
    std::fs::write(dir.path().join("js/app.js"), "console.log(1)").unwrap();
    std::fs::write(dir.path().join("blob.bin"), [0u8, 1, 2]).unwrap();
    dir
}

fn router(dir: &tempfile::TempDir) -> axum::Router {
    StaticServer::new(&ServerConfig {
        port: 0,
        root: dir.path().to_path_buf(),
    })
    .router()
}

async fn get(router: axum::Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8_lossy(&body).into_owned())
}

#[tokio::test]
async fn root_serves_index() {
    let dir = asset_tree();
    let (status, content_type, body) = get(router(&dir), "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/html"));
    assert_eq!(body, "<h1>headroom</h1>");
}

#[tokio::test]
async fn files_are_typed_by_extension() {
    let dir = asset_tree();

    let (_, css, _) = get(router(&dir), "/style.css").await;
    assert_eq!(css.as_deref(), Some("text/css"));

    let (status, js, body) = get(router(&dir), "/js/app.js?v=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(js.as_deref(), Some("text/javascript"));
    assert_eq!(body, "console.log(1)");

    let (_, bin, _) = get(router(&dir), "/blob.bin").await;
    assert_eq!(bin.as_deref(), Some("application/octet-stream"));
}

#[tokio::test]
async fn missing_file_is_404() {
    let dir = asset_tree();
    let (status, _, body) = get(router(&dir), "/nope.html").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "404 File Not Found");
}

#[tokio::test]
async fn escaping_the_root_is_404() {
    let dir = asset_tree();
    let secret = dir.path().parent().unwrap().join("headroom-secret.txt");
    let (status, _, body) = get(router(&dir), "/../headroom-secret.txt").await;

    assert!(!secret.exists());
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "404 File Not Found");
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_path_is_500() {
    let dir = asset_tree();
    let (status, _, body) = get(router(&dir), "/js").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("Server Error: "), "unexpected body {body}");
}
