//! In-process stand-in for an Incus daemon, served over a Unix socket.
//!
//! Integration tests are compiled as separate crates, so this file is shared
//! via:
//!
//! ```rust
//! #[path = "common/fake_incus.rs"]
//! mod fake_incus;
//! ```
//!
//! The fake keeps instances in memory, completes every operation at once, and
//! records each request for assertions. Stopped instances report a `null`
//! network, as the real daemon does.

#![expect(dead_code, reason = "each test crate uses a different subset")]

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use garm_provider_incus::IncusConfig;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

/// One request received by the fake daemon.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: String,
    /// Path without the query string.
    pub path: String,
    /// Raw query string, empty when absent.
    pub query: String,
    /// Decoded JSON body, `Null` when absent.
    pub body: Value,
}

impl RecordedRequest {
    /// `METHOD /path` for compact assertions.
    pub fn summary(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

#[derive(Default)]
struct FakeState {
    instances: BTreeMap<String, Value>,
    operations: BTreeMap<String, Value>,
    requests: Vec<RecordedRequest>,
    fail_start: bool,
    next_operation: u64,
    next_address: u8,
}

/// Running fake daemon. Dropping it stops the listener.
pub struct FakeIncus {
    _dir: TempDir,
    socket: Utf8PathBuf,
    state: Arc<Mutex<FakeState>>,
    task: JoinHandle<()>,
}

impl Drop for FakeIncus {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl FakeIncus {
    /// Binds a fresh socket in a temporary directory and starts serving.
    pub async fn start() -> Self {
        let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let socket = Utf8PathBuf::from_path_buf(dir.path().join("incus.socket"))
            .unwrap_or_else(|path| panic!("socket path should be utf8: {}", path.display()));
        let listener = UnixListener::bind(socket.as_std_path())
            .unwrap_or_else(|err| panic!("bind {socket}: {err}"));

        let state = Arc::new(Mutex::new(FakeState::default()));
        let shared = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let per_connection = Arc::clone(&shared);
                tokio::spawn(async move {
                    let service =
                        service_fn(move |request| handle(Arc::clone(&per_connection), request));
                    http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                        .ok();
                });
            }
        });

        Self {
            _dir: dir,
            socket,
            state,
            task,
        }
    }

    /// Socket the daemon listens on.
    pub fn socket(&self) -> &Utf8Path {
        &self.socket
    }

    /// Provider configuration pointing at this daemon.
    pub fn config(&self) -> IncusConfig {
        IncusConfig {
            unix_socket_path: Some(self.socket.to_string()),
            ..IncusConfig::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds an instance as if another client had created it.
    pub fn insert_instance(&self, name: &str, controller_id: &str, pool_id: &str, running: bool) {
        let config = json!({
            "user.garm-controller-id": controller_id,
            "user.garm-pool-id": pool_id,
            "user.os-type": "linux",
        });
        let mut state = self.lock();
        let mut instance = new_instance(name, "x86_64", &config);
        if running {
            let address = state.allocate_address();
            set_power(&mut instance, true, &address);
        }
        state.instances.insert(name.to_owned(), instance);
    }

    /// Makes every subsequent start operation fail.
    pub fn fail_starts(&self) {
        self.lock().fail_start = true;
    }

    /// Current record of `name`, if present.
    pub fn instance(&self, name: &str) -> Option<Value> {
        self.lock().instances.get(name).cloned()
    }

    /// Names of every stored instance, sorted.
    pub fn instance_names(&self) -> Vec<String> {
        self.lock().instances.keys().cloned().collect()
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// `METHOD /path` of every request except the server info request.
    pub fn request_summaries(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|request| request.path != "/1.0")
            .map(RecordedRequest::summary)
            .collect()
    }
}

impl FakeState {
    fn allocate_address(&mut self) -> String {
        self.next_address = self.next_address.wrapping_add(1);
        format!("10.0.0.{}", self.next_address.saturating_add(1))
    }

    fn complete_operation(&mut self, failure: Option<&str>) -> Value {
        self.next_operation += 1;
        let id = format!("op-{}", self.next_operation);
        let (status, status_code, err) = match failure {
            Some(message) => ("Failure", 400, message),
            None => ("Success", 200, ""),
        };
        self.operations.insert(
            id.clone(),
            json!({"id": id, "status": status, "status_code": status_code, "err": err}),
        );
        async_envelope(&id)
    }
}

fn new_instance(name: &str, architecture: &str, config: &Value) -> Value {
    let mut expanded = json!({
        "image.os": "Ubuntu",
        "image.release": "jammy",
    });
    if let (Some(target), Some(source)) = (expanded.as_object_mut(), config.as_object()) {
        target.extend(source.iter().map(|(key, value)| (key.clone(), value.clone())));
    }
    json!({
        "name": name,
        "architecture": architecture,
        "status": "Stopped",
        "config": config,
        "expanded_config": expanded,
        "state": {"status": "Stopped", "network": null},
    })
}

fn set_power(instance: &mut Value, running: bool, address: &str) {
    let status = if running { "Running" } else { "Stopped" };
    let network = if running {
        json!({"eth0": {"addresses": [
            {"family": "inet", "address": address, "netmask": "24", "scope": "global"}
        ]}})
    } else {
        Value::Null
    };
    instance["status"] = json!(status);
    instance["state"] = json!({"status": status, "network": network});
}

fn is_running(instance: &Value) -> bool {
    instance["status"] == "Running"
}

fn sync_envelope(metadata: Value) -> (StatusCode, Value) {
    (
        StatusCode::OK,
        json!({
            "type": "sync",
            "status": "Success",
            "status_code": 200,
            "operation": "",
            "error_code": 0,
            "error": "",
            "metadata": metadata,
        }),
    )
}

fn async_envelope(id: &str) -> Value {
    json!({
        "type": "async",
        "status": "Operation created",
        "status_code": 100,
        "operation": format!("/1.0/operations/{id}"),
        "error_code": 0,
        "error": "",
        "metadata": {"id": id, "status": "Running", "status_code": 103},
    })
}

fn error_envelope(status: StatusCode, message: &str) -> (StatusCode, Value) {
    (
        status,
        json!({
            "type": "error",
            "error": message,
            "error_code": status.as_u16(),
            "metadata": null,
        }),
    )
}

fn not_found() -> (StatusCode, Value) {
    error_envelope(StatusCode::NOT_FOUND, "Instance not found")
}

async fn handle(
    state: Arc<Mutex<FakeState>>,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = request.method().as_str().to_owned();
    let path = request.uri().path().to_owned();
    let query = request.uri().query().unwrap_or_default().to_owned();
    let raw = request
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();
    let body = serde_json::from_slice(&raw).unwrap_or(Value::Null);

    let (status, payload) = {
        let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        guard.requests.push(RecordedRequest {
            method: method.clone(),
            path: path.clone(),
            query,
            body: body.clone(),
        });
        route(&mut guard, &method, &path, &body)
    };

    let response = Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(payload.to_string())))
        .unwrap_or_else(|err| panic!("build response: {err}"));
    Ok(response)
}

fn route(state: &mut FakeState, method: &str, path: &str, body: &Value) -> (StatusCode, Value) {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match (method, segments.as_slice()) {
        ("GET", ["1.0"]) => sync_envelope(json!({
            "api_version": "1.0",
            "auth": "trusted",
            "environment": {"server": "incus", "server_version": "6.0.0"},
        })),
        ("GET", ["1.0", "instances"]) => {
            sync_envelope(Value::Array(state.instances.values().cloned().collect()))
        }
        ("POST", ["1.0", "instances"]) => create(state, body),
        ("GET", ["1.0", "instances", name]) => state
            .instances
            .get(*name)
            .map_or_else(not_found, |instance| sync_envelope(instance.clone())),
        ("DELETE", ["1.0", "instances", name]) => delete(state, name),
        ("PUT", ["1.0", "instances", name, "state"]) => change_state(state, name, body),
        ("GET", ["1.0", "operations", id, "wait"]) => state
            .operations
            .get(*id)
            .cloned()
            .map_or_else(
                || error_envelope(StatusCode::NOT_FOUND, "Operation not found"),
                sync_envelope,
            ),
        _ => error_envelope(StatusCode::NOT_FOUND, "not found"),
    }
}

fn create(state: &mut FakeState, body: &Value) -> (StatusCode, Value) {
    let Some(name) = body["name"].as_str().filter(|name| !name.is_empty()) else {
        return error_envelope(StatusCode::BAD_REQUEST, "Instance name is required");
    };
    if state.instances.contains_key(name) {
        return error_envelope(StatusCode::CONFLICT, "Instance already exists");
    }
    let architecture = body["architecture"].as_str().unwrap_or("x86_64");
    let instance = new_instance(name, architecture, &body["config"]);
    state.instances.insert(name.to_owned(), instance);
    (StatusCode::ACCEPTED, state.complete_operation(None))
}

fn delete(state: &mut FakeState, name: &str) -> (StatusCode, Value) {
    match state.instances.get(name) {
        None => not_found(),
        Some(instance) if is_running(instance) => {
            error_envelope(StatusCode::BAD_REQUEST, "Instance is running")
        }
        Some(_) => {
            state.instances.remove(name);
            (StatusCode::ACCEPTED, state.complete_operation(None))
        }
    }
}

fn change_state(state: &mut FakeState, name: &str, body: &Value) -> (StatusCode, Value) {
    if !state.instances.contains_key(name) {
        return not_found();
    }
    let running = match body["action"].as_str() {
        Some("start") if state.fail_start => {
            return (
                StatusCode::ACCEPTED,
                state.complete_operation(Some("Failed to start instance")),
            );
        }
        Some("start") => true,
        Some("stop") => false,
        _ => return error_envelope(StatusCode::BAD_REQUEST, "unsupported action"),
    };
    let address = state.allocate_address();
    if let Some(instance) = state.instances.get_mut(name) {
        set_power(instance, running, &address);
    }
    (StatusCode::ACCEPTED, state.complete_operation(None))
}
