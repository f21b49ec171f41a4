//! In-process HTTP backend for integration tests: an axum router that answers
//! every request with one canned response and records what it received.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use tokio::net::TcpListener;

/// One request as seen by the test server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body should be JSON")
    }
}

#[derive(Clone)]
struct Canned {
    status: StatusCode,
    body: String,
    sink: Arc<dyn Fn(Recorded) + Send + Sync>,
}

async fn canned_reply(
    State(canned): State<Canned>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    (canned.sink)(Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        headers,
        body: body.to_vec(),
    });
    (
        canned.status,
        [(header::CONTENT_TYPE, "application/json")],
        canned.body,
    )
}

fn router(status: u16, body: &str, sink: Arc<dyn Fn(Recorded) + Send + Sync>) -> Router {
    let canned = Canned {
        status: StatusCode::from_u16(status).expect("valid status code"),
        body: body.to_string(),
        sink,
    };
    Router::new().fallback(canned_reply).with_state(canned)
}

/// Pick a free port by binding to :0; nothing listens on it afterwards.
pub fn free_port() -> u16 {
    let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    l.local_addr().unwrap().port()
}

/// Spawn a server task on the current runtime. Returns its base URL and a
/// channel yielding every request received.
pub async fn spawn_server(
    status: u16,
    body: &str,
) -> (String, tokio::sync::mpsc::UnboundedReceiver<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let app = router(
        status,
        body,
        Arc::new(move |req: Recorded| {
            let _ = tx.send(req);
        }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (base, rx)
}

/// Spawn a server that accepts requests and never answers them.
pub async fn spawn_stalled_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = Router::new().fallback(|| async {
        std::future::pending::<()>().await;
    });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    base
}

/// Same as [`spawn_server`] but on its own thread and runtime, for tests that
/// run the `medkb` binary synchronously.
pub fn spawn_server_thread(
    status: u16,
    body: &str,
) -> (String, std::sync::mpsc::Receiver<Recorded>) {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let base = format!("http://{}", std_listener.local_addr().unwrap());
    let (tx, rx) = std::sync::mpsc::channel();
    let app = router(
        status,
        body,
        Arc::new(move |req: Recorded| {
            let _ = tx.send(req);
        }),
    );
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = TcpListener::from_std(std_listener).unwrap();
            let _ = axum::serve(listener, app).await;
        });
    });
    (base, rx)
}
