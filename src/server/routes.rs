//! HTTP surface: the gesture WebSocket plus thin control endpoints.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State, ws::WebSocketUpgrade},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path as FsPath;

use super::connection;
use super::registry::Control;
use super::SharedState;
use crate::deck::{SlideController, SlideDeck};
use crate::error::UploadError;
use crate::session::Mode;

pub fn router(state: SharedState) -> Router {
    // leave room above the configured cap so oversize bodies get our error
    let body_limit = state.engine().profile.server.max_upload_bytes + 1024;
    Router::new()
        .route("/ws/gesture_control/{presentation_id}", get(ws_gesture))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/mode", post(set_mode))
        .route(
            "/presentation",
            post(upload_presentation).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/slide", get(current_slide))
        .with_state(state)
}

async fn ws_gesture(
    ws: WebSocketUpgrade,
    Path(presentation_id): Path<String>,
    State(state): State<SharedState>,
) -> Response {
    ws.on_upgrade(move |socket| connection::serve(socket, state, presentation_id))
}

pub async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.registry.len(),
    }))
}

pub async fn status(State(state): State<SharedState>) -> Json<Value> {
    let engine = state.engine();
    let deck = state.presenter.lock().status();
    let brush = state.brush.lock().clone();
    Json(json!({
        "ok": true,
        "data": {
            "profile": engine.profile.meta.name,
            "strategy": engine.classifier.strategy(),
            "model_loaded": engine.classifier.model_loaded(),
            "deck": deck,
            "brush": brush,
            "sessions": state.registry.snapshot(),
        }
    }))
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: Mode,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub size: Option<u32>,
}

pub async fn set_mode(
    State(state): State<SharedState>,
    Json(req): Json<ModeRequest>,
) -> Json<Value> {
    let brush = {
        let mut b = state.brush.lock();
        if let Some(c) = req.color {
            b.color = c;
        }
        if let Some(s) = req.size.filter(|s| *s > 0) {
            b.size = s;
        }
        b.clone()
    };
    let reached = state.registry.broadcast(Control::SetMode(req.mode));
    info!("mode -> {:?} ({reached} sessions)", req.mode);
    Json(json!({
        "ok": true,
        "data": { "mode": req.mode, "brush": brush, "sessions": reached }
    }))
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
    pub slides: Option<usize>,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let code = match &self {
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        warn!("upload rejected: {self}");
        (code, Json(json!({"ok": false, "error": self.to_string()}))).into_response()
    }
}

/// File name reduced to its last component, with an allowed extension.
fn checked_name(raw: Option<&str>, allowed: &[String]) -> Result<String, UploadError> {
    let name = raw
        .and_then(|r| FsPath::new(r).file_name())
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or(UploadError::MissingName)?;
    let ext = FsPath::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
        return Err(UploadError::Extension(ext));
    }
    Ok(name.to_string())
}

pub async fn upload_presentation(
    State(state): State<SharedState>,
    Query(q): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<Value>, UploadError> {
    let server = state.engine().profile.server.clone();
    let name = checked_name(q.filename.as_deref(), &server.allowed_extensions)?;
    if body.is_empty() {
        return Err(UploadError::Empty);
    }
    if body.len() > server.max_upload_bytes {
        return Err(UploadError::TooLarge {
            size: body.len(),
            max: server.max_upload_bytes,
        });
    }
    let slides = q.slides.filter(|n| *n > 0).ok_or(UploadError::NoSlides)?;

    tokio::fs::create_dir_all(&server.upload_dir).await?;
    let path = server.upload_dir.join(&name);
    tokio::fs::write(&path, &body).await?;

    state
        .presenter
        .lock()
        .replace_deck(SlideDeck::new(Some(name.clone()), slides));
    info!("loaded '{name}' ({slides} slides, {} bytes)", body.len());
    Ok(Json(json!({
        "ok": true,
        "data": { "filename": name, "slides": slides, "path": path }
    })))
}

pub async fn current_slide(State(state): State<SharedState>) -> Response {
    let deck = state.presenter.lock().status();
    let dir = state.engine().profile.server.upload_dir.clone();
    let path = dir.join(format!("slide_{}.png", deck.current + 1));
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "error": format!("no image for slide {}", deck.current + 1)})),
        )
            .into_response(),
    }
}
