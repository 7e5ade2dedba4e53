//! Static asset server
//!
//! Serves the page assets from a root directory: `/` maps to `index.html`,
//! everything else to the file of the same path, typed by extension.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::{Error, Result};

const NOT_FOUND_BODY: &str = "404 File Not Found";

/// Content type for a file, by extension
#[must_use]
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// Map a request path to a file under `root`
///
/// Returns `None` for paths that would leave the root.
#[must_use]
pub fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let relative = if relative.is_empty() {
        "index.html"
    } else {
        relative
    };

    let mut resolved = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

struct AssetRoot {
    root: PathBuf,
}

/// Static file server for the page assets
pub struct StaticServer {
    root: PathBuf,
    port: u16,
}

impl StaticServer {
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            root: config.root.clone(),
            port: config.port,
        }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let state = Arc::new(AssetRoot {
            root: self.root.clone(),
        });

        Router::new()
            .fallback(serve_asset)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured port on all interfaces and serve until the process ends
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind asset server: {e}")))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener
    ///
    /// # Errors
    ///
    /// Returns error if the server fails while running
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let port = listener.local_addr().map_or(self.port, |a| a.port());
        tracing::info!(
            port,
            root = %self.root.display(),
            "server running at http://localhost:{port}/"
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("asset server error: {e}")))?;

        Ok(())
    }
}

async fn serve_asset(State(assets): State<Arc<AssetRoot>>, uri: Uri) -> Response {
    let Some(path) = resolve(&assets.root, uri.path()) else {
        tracing::debug!(path = uri.path(), "path escapes asset root");
        return not_found();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response(),
        Err(e) if e.kind() == ErrorKind::NotFound => not_found(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read asset");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Server Error: {:?}", e.kind()),
            )
                .into_response()
        }
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/html")],
        NOT_FOUND_BODY,
    )
        .into_response()
}
