//! Mock Vault server for E2E tests
//!
//! Serves the slice of the Vault HTTP API the backend reads: KV v1 and v2
//! secret reads, and the mount metadata endpoint used to detect the engine
//! version. Every request is recorded for assertions.
//!
//! The server runs on its own thread with a single-threaded tokio runtime,
//! so tests drive the blocking backend directly from plain `#[test]`s.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use dashmap::DashMap;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use vault_lookup::KvVersion;

/// Token accepted by every mock server
const ROOT_TOKEN: &str = "s.mock-root-token";

/// A recorded request for test assertions
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    /// Request path as sent, still percent-encoded
    pub path: String,
    /// `X-Vault-Token` header, if any
    pub token: Option<String>,
}

/// State shared with the server thread
struct VaultState {
    root_token: String,
    mounts: DashMap<String, KvVersion>,
    /// Secrets keyed by logical path (`<mount>/<path>`, no `data/` segment)
    secrets: DashMap<String, Map<String, Value>>,
    /// Paths answering with a fixed error status
    failures: DashMap<String, StatusCode>,
    requests: RwLock<Vec<RecordedRequest>>,
}

/// An in-process Vault stand-in listening on an ephemeral port
pub struct MockVault {
    addr: SocketAddr,
    state: Arc<VaultState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MockVault {
    /// Start a mock server on an ephemeral port
    pub fn start() -> Self {
        let listener =
            std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind mock vault");
        listener
            .set_nonblocking(true)
            .expect("Failed to set mock vault listener non-blocking");
        let addr = listener.local_addr().expect("Mock vault has no local address");

        let state = Arc::new(VaultState {
            root_token: ROOT_TOKEN.to_string(),
            mounts: DashMap::new(),
            secrets: DashMap::new(),
            failures: DashMap::new(),
            requests: RwLock::new(Vec::new()),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let thread_state = state.clone();
        let thread = std::thread::Builder::new()
            .name("mock-vault".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("Failed to build mock vault runtime");
                runtime.block_on(serve(listener, thread_state, shutdown_rx));
            })
            .expect("Failed to spawn mock vault thread");

        tracing::debug!("Mock vault listening on {}", addr);

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    /// Base URL, e.g. `http://127.0.0.1:12345`
    pub fn address(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Token that grants access to every secret
    pub fn root_token(&self) -> &str {
        &self.state.root_token
    }

    /// Enable a KV engine at `name`
    pub fn mount(&self, name: &str, version: KvVersion) {
        self.state
            .mounts
            .insert(name.trim_matches('/').to_string(), version);
    }

    /// Store `data` at the logical path `<mount>/<path>`
    ///
    /// For v2 mounts the path is given without the `data/` segment, as the
    /// `vault kv put` CLI takes it.
    pub fn write(&self, path: &str, data: Value) {
        let Value::Object(data) = data else {
            panic!("secret data for {} must be an object", path);
        };
        self.state
            .secrets
            .insert(path.trim_matches('/').to_string(), data);
    }

    /// Answer every request for the logical `path` with `status`
    pub fn fail_path(&self, path: &str, status: StatusCode) {
        self.state
            .failures
            .insert(path.trim_matches('/').to_string(), status);
    }

    /// Get all recorded requests
    pub fn get_requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.read().clone()
    }

    /// Paths of the recorded secret reads (metadata probes excluded)
    pub fn secret_reads(&self) -> Vec<String> {
        self.state
            .requests
            .read()
            .iter()
            .filter(|r| !r.path.starts_with("/v1/sys/"))
            .map(|r| r.path.clone())
            .collect()
    }

    /// Clear recorded requests
    pub fn clear_requests(&self) {
        self.state.requests.write().clear();
    }

    /// Stop the server and wait for its thread
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MockVault {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn serve(
    listener: std::net::TcpListener,
    state: Arc<VaultState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Mock vault failed to start: {}", e);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(conn) => conn,
                    Err(_) => break,
                };

                let state = state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let state = state.clone();
                        async move { Ok::<_, Infallible>(state.handle(&req)) }
                    });

                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        }
    }
}

impl VaultState {
    fn handle(&self, req: &Request<Incoming>) -> Response<Full<Bytes>> {
        let path = req.uri().path().to_string();
        let token = req
            .headers()
            .get("x-vault-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        self.requests.write().push(RecordedRequest {
            method: req.method().to_string(),
            path: path.clone(),
            token: token.clone(),
        });

        if req.method() != Method::GET {
            return respond(StatusCode::METHOD_NOT_ALLOWED, errors(&["unsupported operation"]));
        }
        let Some(rest) = path.strip_prefix("/v1/") else {
            return respond(StatusCode::NOT_FOUND, errors(&[]));
        };
        if token.as_deref() != Some(self.root_token.as_str()) {
            return respond(
                StatusCode::FORBIDDEN,
                errors(&["permission denied", "invalid token"]),
            );
        }

        let rest = percent_decode(rest);
        match rest.strip_prefix("sys/internal/ui/mounts/") {
            Some(mount) => self.mount_metadata(mount),
            None => self.read_secret(&rest),
        }
    }

    fn mount_metadata(&self, mount: &str) -> Response<Full<Bytes>> {
        let mount = mount.trim_matches('/');
        let Some(version) = self.mounts.get(mount).map(|v| *v) else {
            return respond(StatusCode::NOT_FOUND, errors(&[]));
        };

        let options = match version {
            KvVersion::V1 => json!({ "version": "1" }),
            KvVersion::V2 => json!({ "version": "2" }),
        };
        respond(
            StatusCode::OK,
            json!({
                "data": {
                    "path": format!("{}/", mount),
                    "type": "kv",
                    "options": options
                }
            }),
        )
    }

    fn read_secret(&self, path: &str) -> Response<Full<Bytes>> {
        let (mount, rest) = path.split_once('/').unwrap_or((path, ""));
        let Some(version) = self.mounts.get(mount).map(|v| *v) else {
            return respond(
                StatusCode::NOT_FOUND,
                errors(&[&format!("no handler for route \"{}\"", path)]),
            );
        };

        let logical = match version {
            KvVersion::V1 => Some(rest),
            KvVersion::V2 => rest.strip_prefix("data/"),
        };
        let Some(logical) = logical.map(|p| format!("{}/{}", mount, p)) else {
            return respond(StatusCode::NOT_FOUND, errors(&[]));
        };

        if let Some(status) = self.failures.get(&logical).map(|s| *s) {
            return respond(status, errors(&["internal error"]));
        }

        let Some(data) = self.secrets.get(&logical).map(|d| Value::Object(d.clone())) else {
            return respond(StatusCode::NOT_FOUND, errors(&[]));
        };

        let body = match version {
            KvVersion::V1 => json!({
                "lease_duration": 2764800,
                "renewable": false,
                "data": data,
                "warnings": null
            }),
            KvVersion::V2 => json!({
                "lease_duration": 0,
                "renewable": false,
                "data": {
                    "data": data,
                    "metadata": {
                        "created_time": "2024-01-01T00:00:00Z",
                        "deletion_time": "",
                        "destroyed": false,
                        "version": 1
                    }
                },
                "warnings": null
            }),
        };
        respond(StatusCode::OK, body)
    }
}

fn errors(messages: &[&str]) -> Value {
    json!({ "errors": messages })
}

fn respond(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

/// Decode `%XX` escapes; malformed escapes are kept as-is
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
