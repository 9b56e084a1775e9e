//! HTTP API Server
//!
//! Thin JSON shim over the channel manager and TPMS state. Handlers lock,
//! invoke one core operation, and serialize the result; no protocol logic
//! lives here.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::channel::ChannelManager;
use crate::device::Device;
use crate::error::Error;
use crate::frame::CanFrame;
use crate::tpms::{self, CollectionSession};

/// State shared across handlers.
///
/// The adapter is a singleton resource: every channel operation serializes
/// through the one mutex. Collection state is independent of the hardware
/// and takes its own lock.
pub struct AppState {
    pub channel: Mutex<ChannelManager>,
    pub collection: Mutex<CollectionSession>,
}

impl AppState {
    pub fn new(device: Box<dyn Device>) -> Self {
        Self {
            channel: Mutex::new(ChannelManager::new(device)),
            collection: Mutex::new(CollectionSession::default()),
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Body of `POST /api/init`. Every field is optional; the whole body may
/// be absent.
#[derive(Debug, Default, Deserialize)]
pub struct InitRequest {
    pub channel: Option<String>,
    pub baudrate: Option<String>,
    #[serde(default)]
    pub is_fd: bool,
}

/// Body of `POST /api/write`.
#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub id: Option<String>,
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub extended: bool,
    #[serde(default)]
    pub rtr: bool,
}

/// Body of `POST /api/tpms/start`.
#[derive(Debug, Default, Deserialize)]
pub struct TpmsStartRequest {
    #[serde(default)]
    pub tire_count: u32,
}

/// Build the application router.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/init", post(init_channel))
        .route("/api/release", post(release_channel))
        .route("/api/status", get(channel_status))
        .route("/api/read", get(read_frame))
        .route("/api/write", post(write_frame))
        .route("/api/tpms/status", get(tpms_status))
        .route("/api/tpms/start", post(tpms_start))
        .route("/api/tpms/stop", post(tpms_stop))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(err: &Error) -> (StatusCode, Json<Value>) {
    let code = match err {
        Error::InvalidFormat(_) => StatusCode::BAD_REQUEST,
        Error::Device(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        Error::NotInitialized => StatusCode::CONFLICT,
    };
    (code, Json(json!({ "success": false, "error": err.to_string() })))
}

pub async fn index() -> &'static str {
    "PCAN bridge is running. Use the /api endpoints to interact with the CAN bus."
}

pub async fn init_channel(
    State(state): State<SharedState>,
    body: Option<Json<InitRequest>>,
) -> (StatusCode, Json<Value>) {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let mut channel = state.channel.lock().await;
    match channel.initialize(req.channel.as_deref(), req.baudrate.as_deref(), req.is_fd) {
        Ok(message) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": message })),
        ),
        Err(err) => error_response(&err),
    }
}

pub async fn release_channel(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    let mut channel = state.channel.lock().await;
    match channel.release() {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Channel released." })),
        ),
        Err(err) => error_response(&err),
    }
}

pub async fn channel_status(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    let mut channel = state.channel.lock().await;
    let report = channel.status_report();
    (
        StatusCode::OK,
        Json(json!({
            "status_code": report.code,
            "status_text": report.text,
            "last_error": report.last_error,
        })),
    )
}

pub async fn read_frame(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    let mut channel = state.channel.lock().await;
    match channel.read() {
        Ok(Some((frame, timestamp_us))) => {
            let parsed = tpms::parse_sensor_data(&frame.data);
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": {
                        "id": frame.id_hex(),
                        "msg_type": frame.msg_type.bits(),
                        "len": frame.len(),
                        "data": frame.data,
                        "parsed": parsed,
                    },
                    "timestamp_us": timestamp_us,
                })),
            )
        }
        Ok(None) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Receive queue is empty." })),
        ),
        Err(err) => error_response(&err),
    }
}

pub async fn write_frame(
    State(state): State<SharedState>,
    body: Option<Json<WriteRequest>>,
) -> (StatusCode, Json<Value>) {
    let Some(Json(req)) = body else {
        return error_response(&Error::InvalidFormat("invalid JSON body".into()));
    };
    let Some(id) = req.id else {
        return error_response(&Error::InvalidFormat("missing frame id".into()));
    };

    let mut channel = state.channel.lock().await;
    let fd_mode = channel.config().is_fd;
    let frame = match CanFrame::from_request(&id, req.data, req.extended, req.rtr, fd_mode) {
        Ok(frame) => frame,
        Err(err) => return error_response(&err),
    };

    match channel.write(&frame) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Message sent successfully." })),
        ),
        Err(err) => error_response(&err),
    }
}

pub async fn tpms_status(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    let session = state.collection.lock().await;
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "is_collecting": session.active,
            "tire_count": session.tire_count,
        })),
    )
}

pub async fn tpms_start(
    State(state): State<SharedState>,
    body: Option<Json<TpmsStartRequest>>,
) -> (StatusCode, Json<Value>) {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let mut session = state.collection.lock().await;
    session.start(req.tire_count);
    info!("TPMS collection started with {} tires", req.tire_count);

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "TPMS collection started.",
            "is_collecting": session.active,
        })),
    )
}

pub async fn tpms_stop(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    let mut session = state.collection.lock().await;
    session.stop();
    info!("TPMS collection stopped");

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "TPMS collection stopped.",
            "is_collecting": session.active,
        })),
    )
}
