//! In-process stand-in for a ComfyUI instance.
//!
//! Serves `/ws`, `/prompt` and `/queue` on an ephemeral port. Each
//! accepted prompt is answered with a [`Script`] chosen by the test:
//! a sequence of frames pushed over the submitting client's socket, or
//! an HTTP rejection.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use comfy_sync_core::sink::ArtifactSink;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// One thing the fake does on a client's socket.
#[derive(Debug, Clone)]
pub enum Step {
    Text(String),
    Binary(Vec<u8>),
    Pause(Duration),
    /// Send a close frame and end the connection.
    Close,
    /// Drop the connection without a close handshake.
    Drop,
}

/// How the fake answers one `POST /prompt`.
#[derive(Debug, Clone)]
pub enum Script {
    Run(Vec<Step>),
    Reject(StatusCode, String),
}

type Responder = Arc<dyn Fn(&Value) -> Script + Send + Sync>;

#[derive(Clone)]
struct FakeState {
    responder: Responder,
    sockets: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Step>>>>,
    prompts: Arc<Mutex<Vec<Value>>>,
    deletes: Arc<Mutex<Vec<Value>>>,
    open_sockets: Arc<AtomicUsize>,
    next_prompt: Arc<AtomicUsize>,
}

/// Handle to a running fake backend.
pub struct FakeComfyUI {
    pub addr: SocketAddr,
    state: FakeState,
}

impl FakeComfyUI {
    /// Start a fake whose answer depends on the submitted workflow.
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&Value) -> Script + Send + Sync + 'static,
    {
        let state = FakeState {
            responder: Arc::new(responder),
            sockets: Arc::default(),
            prompts: Arc::default(),
            deletes: Arc::default(),
            open_sockets: Arc::default(),
            next_prompt: Arc::default(),
        };

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/prompt", post(prompt_handler))
            .route("/queue", post(queue_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Start a fake that plays the same steps for every prompt.
    pub async fn scripted(steps: Vec<Step>) -> Self {
        Self::start(move |_| Script::Run(steps.clone())).await
    }

    /// Start a fake that rejects every prompt.
    pub async fn rejecting(status: StatusCode, body: &str) -> Self {
        let body = body.to_string();
        Self::start(move |_| Script::Reject(status, body.clone())).await
    }

    /// Server address as accepted by `BackendEndpoints::from_server`.
    pub fn server(&self) -> String {
        self.addr.to_string()
    }

    /// Bodies of every `POST /prompt` received so far.
    pub fn prompts(&self) -> Vec<Value> {
        self.state.prompts.lock().unwrap().clone()
    }

    /// Bodies of every `POST /queue` received so far.
    pub fn queue_deletes(&self) -> Vec<Value> {
        self.state.deletes.lock().unwrap().clone()
    }

    pub fn open_sockets(&self) -> usize {
        self.state.open_sockets.load(Ordering::SeqCst)
    }

    /// Poll until the fake has no open sockets, or give up after `limit`.
    pub async fn wait_for_sockets_closed(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if self.open_sockets() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.open_sockets() == 0
    }

    /// Poll until at least `count` queue deletions arrived.
    pub async fn wait_for_queue_deletes(&self, count: usize, limit: Duration) -> Vec<Value> {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if self.queue_deletes().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.queue_deletes()
    }
}

#[derive(Deserialize)]
struct WsParams {
    #[serde(rename = "clientId")]
    client_id: String,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<FakeState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, params.client_id, state))
}

async fn serve_socket(mut socket: WebSocket, client_id: String, state: FakeState) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.sockets.lock().unwrap().insert(client_id.clone(), tx);
    state.open_sockets.fetch_add(1, Ordering::SeqCst);

    let status = json!({
        "type": "status",
        "data": {"status": {"exec_info": {"queue_remaining": 0}}, "sid": client_id},
    });
    let _ = socket.send(Message::Text(status.to_string().into())).await;

    loop {
        tokio::select! {
            step = rx.recv() => {
                let Some(step) = step else { break };
                let sent = match step {
                    Step::Text(text) => socket.send(Message::Text(text.into())).await,
                    Step::Binary(data) => socket.send(Message::Binary(data.into())).await,
                    Step::Pause(duration) => {
                        tokio::time::sleep(duration).await;
                        Ok(())
                    }
                    Step::Close => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                    Step::Drop => break,
                };
                if sent.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.sockets.lock().unwrap().remove(&client_id);
    state.open_sockets.fetch_sub(1, Ordering::SeqCst);
}

async fn prompt_handler(State(state): State<FakeState>, Json(body): Json<Value>) -> Response {
    state.prompts.lock().unwrap().push(body.clone());

    let steps = match (state.responder)(&body["prompt"]) {
        Script::Reject(status, message) => return (status, message).into_response(),
        Script::Run(steps) => steps,
    };

    let client_id = body["client_id"].as_str().unwrap_or_default().to_string();
    let Some(tx) = socket_for(&state, &client_id).await else {
        return (StatusCode::BAD_REQUEST, "no socket for client").into_response();
    };

    let number = state.next_prompt.fetch_add(1, Ordering::SeqCst);
    for step in steps {
        let _ = tx.send(step);
    }

    Json(json!({
        "prompt_id": format!("prompt-{number}"),
        "number": number,
        "node_errors": {},
    }))
    .into_response()
}

/// The upgrade task may still be registering the socket when the prompt
/// arrives, so give it a moment.
async fn socket_for(state: &FakeState, client_id: &str) -> Option<mpsc::UnboundedSender<Step>> {
    for _ in 0..200 {
        if let Some(tx) = state.sockets.lock().unwrap().get(client_id).cloned() {
            return Some(tx);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}

async fn queue_handler(State(state): State<FakeState>, Json(body): Json<Value>) -> Json<Value> {
    state.deletes.lock().unwrap().push(body);
    Json(json!({}))
}

// ---------------------------------------------------------------------------
// Frame builders
// ---------------------------------------------------------------------------

pub fn text(value: Value) -> Step {
    Step::Text(value.to_string())
}

pub fn execution_start() -> Step {
    text(json!({"type": "execution_start", "data": {"prompt_id": "p"}}))
}

pub fn executing(node: Option<&str>) -> Step {
    text(json!({"type": "executing", "data": {"node": node, "prompt_id": "p"}}))
}

pub fn progress(value: i32, max: i32) -> Step {
    text(json!({"type": "progress", "data": {"value": value, "max": max}}))
}

pub fn execution_success() -> Step {
    text(json!({"type": "execution_success", "data": {"prompt_id": "p"}}))
}

pub fn execution_error(message: &str) -> Step {
    text(json!({
        "type": "execution_error",
        "data": {"prompt_id": "p", "exception_message": message},
    }))
}

pub fn interrupted() -> Step {
    text(json!({"type": "execution_interrupted", "data": {"prompt_id": "p"}}))
}

/// PNG-encoded solid image of the given size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        width,
        height,
        image::Rgb([20, 120, 220]),
    ));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// A binary image frame as the backend sends it.
pub fn image_frame(width: u32, height: u32) -> Step {
    let mut data = Vec::new();
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(&2u32.to_be_bytes());
    data.extend_from_slice(&png(width, height));
    Step::Binary(data)
}

/// The usual happy path: start, run the target node, emit its image, finish.
pub fn successful_run(target: &str, width: u32, height: u32) -> Vec<Step> {
    vec![
        execution_start(),
        executing(Some("3")),
        progress(1, 2),
        progress(2, 2),
        executing(Some(target)),
        image_frame(width, height),
        execution_success(),
    ]
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Keeps every stored artifact in memory and returns a fake URL.
#[derive(Default)]
pub struct RecordingSink {
    stored: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingSink {
    pub fn stored(&self) -> Vec<(String, Vec<u8>)> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactSink for RecordingSink {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Option<String> {
        self.stored
            .lock()
            .unwrap()
            .push((suggested_name.to_string(), bytes.to_vec()));
        Some(format!("http://images.test/{suggested_name}"))
    }

    fn kind(&self) -> &'static str {
        "recording"
    }
}

/// A sink that never produces a URL.
pub struct FailingSink;

#[async_trait]
impl ArtifactSink for FailingSink {
    async fn store(&self, _bytes: &[u8], _suggested_name: &str) -> Option<String> {
        None
    }

    fn kind(&self) -> &'static str {
        "failing"
    }
}
