//! In-process HTTP fixtures for integration tests.
//!
//! [`spawn_echo_server`] starts an axum server on an ephemeral localhost port that reflects
//! every request back as JSON, so tests can assert on exactly what went over the wire.

use anyhow::Context as _;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Multipart, Path};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use serde_json::{Map, Value, json};
use std::net::TcpListener as StdTcpListener;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A running echo server; shuts down gracefully when dropped.
pub struct EchoServer {
    pub base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl EchoServer {
    /// Absolute URL for `path` on this server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Start the echo server.
///
/// Routes:
/// - `POST /upload` reflects multipart parts (`name`, `fileName`, `contentType`, `size`, `text`).
/// - `ANY /status/{code}` answers with that status and a JSON error body.
/// - `GET /text` answers `hello` as `text/plain`.
/// - `GET /binary` answers non-UTF-8 bytes as `application/octet-stream`.
/// - anything else reflects `method`, `path`, `query`, `headers`, `contentType` and `body`.
///
/// # Errors
///
/// Returns an error if binding a localhost port fails.
pub async fn spawn_echo_server() -> anyhow::Result<EchoServer> {
    let app = Router::new()
        .route("/upload", post(upload_handler))
        .route("/status/{code}", any(status_handler))
        .route("/text", get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "hello") }))
        .route(
            "/binary",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "application/octet-stream")],
                    vec![0xffu8, 0xfe, 0x00, 0x01],
                )
            }),
        )
        .fallback(echo_handler);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind echo server")?;
    let addr = listener.local_addr().context("echo server local_addr")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });
    let handle = tokio::spawn(async move {
        let _ = server.await;
    });

    Ok(EchoServer {
        base_url: format!("http://{addr}"),
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}

/// A localhost base URL that nothing listens on.
///
/// Note: the port is released before returning; another process could bind it in between.
///
/// # Errors
///
/// Returns an error if binding an ephemeral localhost port fails.
pub fn unreachable_base_url() -> anyhow::Result<String> {
    let listener = StdTcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(format!("http://127.0.0.1:{port}"))
}

fn header_map(headers: &HeaderMap) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            out.insert(name.as_str().to_string(), Value::String(v.to_string()));
        }
    }
    out
}

async fn echo_handler(
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> axum::Json<Value> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    axum::Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query().unwrap_or(""),
        "headers": header_map(&headers),
        "contentType": content_type,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn status_handler(Path(code): Path<u16>) -> impl IntoResponse {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(json!({"error": format!("status {code}")})))
}

async fn upload_handler(headers: HeaderMap, mut multipart: Multipart) -> impl IntoResponse {
    let mut parts: Vec<Value> = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, axum::Json(json!({"error": e.to_string()})));
            }
        };
        let name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, axum::Json(json!({"error": e.to_string()})));
            }
        };
        parts.push(json!({
            "name": name,
            "fileName": file_name,
            "contentType": content_type,
            "size": bytes.len(),
            "text": String::from_utf8_lossy(&bytes),
        }));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    (
        StatusCode::OK,
        axum::Json(json!({"contentType": content_type, "parts": parts})),
    )
}
