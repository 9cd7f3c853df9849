//! In-process mock of the upscaling backend.
//!
//! Serves the REST endpoints and the per-job WebSocket from an axum router
//! bound to an ephemeral port. Behaviour is scripted through [`Script`];
//! every request is recorded so tests can assert on what the client did.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use upscale_client::config::ClientConfig;

/// PNG magic bytes, enough to look like an image.
pub const SOURCE_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Bytes served by `GET /download/{job_id}`.
pub const ARTIFACT_BYTES: &[u8] = b"upscaled-image-bytes";

/// Scripted backend behaviour.
#[derive(Debug, Clone)]
pub struct Script {
    /// Status code of `POST /upscale`.
    pub submit_status: StatusCode,
    /// Answer the submit with a `completed` payload and download location.
    pub complete_on_submit: bool,
    /// Text frames pushed over the WebSocket once the job is submitted.
    pub frames: Vec<String>,
    pub frame_delay: Duration,
    /// Close the WebSocket after the last frame instead of idling.
    pub close_after_frames: bool,
    /// Number of initial `GET /job/{id}` calls answered with 404, as the
    /// backend does until its background task registers the job.
    pub unregistered_polls: usize,
    /// Successive `GET /job/{id}` states after registration; the last one
    /// repeats.
    pub statuses: Vec<&'static str>,
    pub status_message: &'static str,
    pub status_filename: &'static str,
    pub status_delay: Duration,
    pub download_status: StatusCode,
    pub delete_status: StatusCode,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            submit_status: StatusCode::OK,
            complete_on_submit: false,
            frames: Vec::new(),
            frame_delay: Duration::from_millis(10),
            close_after_frames: false,
            unregistered_polls: 0,
            statuses: vec!["completed"],
            status_message: "",
            status_filename: "",
            status_delay: Duration::ZERO,
            download_status: StatusCode::OK,
            delete_status: StatusCode::OK,
        }
    }
}

/// One recorded `POST /upscale` form.
#[derive(Debug, Clone, Default)]
pub struct SubmitRecord {
    pub job_id: String,
    pub file_name: String,
    pub content_type: String,
    pub file_len: usize,
    pub scales: String,
    pub resample_mode: String,
    pub show_progress: String,
}

#[derive(Debug, Clone)]
pub struct DeleteRecord {
    pub job_id: String,
    pub at: Instant,
}

struct MockState {
    script: Script,
    submitted: watch::Sender<bool>,
    submits: Mutex<Vec<SubmitRecord>>,
    status_polls: AtomicUsize,
    downloads: Mutex<Vec<(String, Instant)>>,
    deletes: Mutex<Vec<DeleteRecord>>,
    ws_connections: Mutex<Vec<String>>,
}

/// Handle to a running mock backend.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start(script: Script) -> Self {
        let (submitted, _) = watch::channel(false);
        let state = Arc::new(MockState {
            script,
            submitted,
            submits: Mutex::new(Vec::new()),
            status_polls: AtomicUsize::new(0),
            downloads: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            ws_connections: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/", get(health))
            .route("/models", get(models))
            .route("/upscale", post(submit))
            .route("/job/{job_id}", get(job_status).delete(delete_job))
            .route("/download/{job_id}", get(download))
            .route("/ws/{job_id}", get(ws_upgrade))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn api_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client configuration with test-friendly timings.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::from_api_url(&self.api_url())
            .with_ready_timeout(Duration::from_secs(2))
            .with_cleanup_delay(Duration::from_millis(100))
            .with_poll_interval(Duration::from_millis(20))
    }

    pub fn submits(&self) -> Vec<SubmitRecord> {
        self.state.submits.lock().unwrap().clone()
    }

    pub fn status_polls(&self) -> usize {
        self.state.status_polls.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.state.downloads.lock().unwrap().len()
    }

    pub fn last_download_at(&self) -> Option<Instant> {
        self.state.downloads.lock().unwrap().last().map(|(_, at)| *at)
    }

    pub fn deletes(&self) -> Vec<DeleteRecord> {
        self.state.deletes.lock().unwrap().clone()
    }

    pub fn ws_connections(&self) -> Vec<String> {
        self.state.ws_connections.lock().unwrap().clone()
    }
}

/// Accepts TCP connections but never completes a WebSocket handshake.
/// Returns the `ws://` base URL.
pub async fn silent_ws_listener() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    format!("ws://{addr}")
}

/// Progress frame as the backend emits it.
pub fn frame(progress: f64, message: &str) -> String {
    json!({ "progress": progress, "message": message }).to_string()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(json!({ "message": "Image Upscaler API is running" }))
}

async fn models() -> Json<Value> {
    Json(json!({
        "factors": ["x2", "x4", "x8"],
        "resample_modes": ["nearest", "bilinear", "bicubic", "area", "nearest-exact"],
        "resample_desc": { "nearest-exact": "Nearest-exact interpolation" },
    }))
}

async fn submit(State(state): State<Arc<MockState>>, mut multipart: Multipart) -> Response {
    let mut record = SubmitRecord::default();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                record.file_name = field.file_name().unwrap_or_default().to_string();
                record.content_type = field.content_type().unwrap_or_default().to_string();
                record.file_len = field.bytes().await.unwrap().len();
            }
            "scales" => record.scales = field.text().await.unwrap(),
            "resample_mode" => record.resample_mode = field.text().await.unwrap(),
            "show_progress" => record.show_progress = field.text().await.unwrap(),
            "job_id" => record.job_id = field.text().await.unwrap(),
            _ => {}
        }
    }

    let job_id = record.job_id.clone();
    state.submits.lock().unwrap().push(record);

    if !state.script.submit_status.is_success() {
        return (state.script.submit_status, "upscale failed").into_response();
    }
    state.submitted.send_replace(true);

    if state.script.complete_on_submit {
        let body = json!({
            "job_id": job_id,
            "status": "completed",
            "message": "Upscaling completed",
            "filename": state.script.status_filename,
            "download_url": format!("/download/{job_id}"),
        });
        return Json(body).into_response();
    }

    let ack = json!({ "job_id": job_id, "status": "accepted" });
    (StatusCode::ACCEPTED, Json(ack)).into_response()
}

async fn job_status(State(state): State<Arc<MockState>>, Path(job_id): Path<String>) -> Response {
    let poll = state.status_polls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(state.script.status_delay).await;

    if poll < state.script.unregistered_polls {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "Job not found" })),
        )
            .into_response();
    }

    let statuses = &state.script.statuses;
    let registered_poll = poll - state.script.unregistered_polls;
    let status = statuses[registered_poll.min(statuses.len() - 1)];
    let progress = if status == "completed" { 1.0 } else { 0.5 };

    Json(json!({
        "job_id": job_id,
        "status": status,
        "progress": progress,
        "message": state.script.status_message,
        "filename": state.script.status_filename,
    }))
    .into_response()
}

async fn download(State(state): State<Arc<MockState>>, Path(job_id): Path<String>) -> Response {
    state
        .downloads
        .lock()
        .unwrap()
        .push((job_id, Instant::now()));

    if !state.script.download_status.is_success() {
        return (state.script.download_status, "file not found").into_response();
    }
    ARTIFACT_BYTES.to_vec().into_response()
}

async fn delete_job(State(state): State<Arc<MockState>>, Path(job_id): Path<String>) -> Response {
    state.deletes.lock().unwrap().push(DeleteRecord {
        job_id,
        at: Instant::now(),
    });

    if !state.script.delete_status.is_success() {
        return (state.script.delete_status, "delete failed").into_response();
    }
    Json(json!({ "message": "deleted" })).into_response()
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<MockState>>,
    Path(job_id): Path<String>,
) -> Response {
    state.ws_connections.lock().unwrap().push(job_id);
    ws.on_upgrade(move |socket| push_frames(socket, state))
}

async fn push_frames(mut socket: WebSocket, state: Arc<MockState>) {
    let mut submitted = state.submitted.subscribe();
    if submitted.wait_for(|done| *done).await.is_err() {
        return;
    }

    for text in &state.script.frames {
        tokio::time::sleep(state.script.frame_delay).await;
        if socket.send(Message::Text(text.clone().into())).await.is_err() {
            return;
        }
    }

    if state.script.close_after_frames {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    // Idle until the client hangs up.
    while let Some(Ok(msg)) = socket.recv().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }
}
