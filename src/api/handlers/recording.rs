use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::browser::Viewport;
use crate::error::{AppError, Result};
use crate::models::{
    Action, CapturedEnvelope, ExportQuery, ExportedScript, GenericResponse, RecordingStatusResponse,
    StartRecordingRequest, StartRecordingResponse, StopRecordingResponse, MAIN_FRAME_ID,
};
use crate::recording::{ExportOptions, HandleOutcome, StartOptions, RECORDER_SCRIPT};

use super::super::state::AppState;

/// Start a recording session, launching the recording browser unless the
/// caller brings its own page recorder
pub async fn start_recording(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRecordingRequest>,
) -> Result<Json<StartRecordingResponse>> {
    if request.viewport_width == 0 || request.viewport_height == 0 {
        return Err(AppError::ValidationError("viewport must be non-empty".to_string()));
    }

    let _recording_guard = state.recording_lock.lock().await;

    let options = StartOptions {
        start_url: request.start_url,
        headless: request.headless.unwrap_or(state.config.headless),
        viewport: Viewport {
            width: request.viewport_width,
            height: request.viewport_height,
        },
        launch_browser: request.launch_browser,
    };
    let snapshot = state.recorder.start(&options).await?;

    Ok(Json(StartRecordingResponse {
        session_id: snapshot.session_id.unwrap_or_default(),
        status: "recording".to_string(),
        browser_launched: options.launch_browser,
    }))
}

pub async fn stop_recording(State(state): State<Arc<AppState>>) -> Result<Json<StopRecordingResponse>> {
    let _recording_guard = state.recording_lock.lock().await;
    let snapshot = state.recorder.stop().await?;

    Ok(Json(StopRecordingResponse {
        session_id: snapshot.session_id,
        action_count: snapshot.action_count,
    }))
}

pub async fn clear_recording(State(state): State<Arc<AppState>>) -> Json<GenericResponse> {
    state.log().clear().await;
    Json(GenericResponse::new("cleared"))
}

pub async fn get_recording_status(State(state): State<Arc<AppState>>) -> Json<RecordingStatusResponse> {
    Json(RecordingStatusResponse {
        session: state.log().snapshot().await,
        frames: state.pipeline().frames().frame_ids(),
        connected_clients: state.active_connection_count(),
    })
}

pub async fn list_actions(State(state): State<Arc<AppState>>) -> Json<Vec<Action>> {
    Json(state.log().actions().await)
}

/// Host inbound `recordAction`: append an already-assembled action
pub async fn record_action(
    State(state): State<Arc<AppState>>,
    Json(mut action): Json<Action>,
) -> Result<(StatusCode, Json<GenericResponse>)> {
    if action.frame_id.is_empty() {
        action.frame_id = MAIN_FRAME_ID.to_string();
    }
    action.is_main_frame = action.frame_id == MAIN_FRAME_ID;

    // Assembled actions carry no document id; one counter per frame
    if let Some(seq) = action.seq {
        state.log().observe_seq(&action.frame_id, "", seq).await;
    }
    state.log().record_action(action).await?;
    Ok((StatusCode::ACCEPTED, Json(GenericResponse::new("recorded"))))
}

/// Raw envelope from an external page recorder. Goes through the same
/// credential filtering as CDP-delivered events.
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<CapturedEnvelope>,
) -> Result<(StatusCode, Json<GenericResponse>)> {
    match state.pipeline().handle(envelope).await {
        HandleOutcome::Recorded(_) => Ok((StatusCode::ACCEPTED, Json(GenericResponse::new("recorded")))),
        HandleOutcome::Deferred => Ok((StatusCode::ACCEPTED, Json(GenericResponse::new("deferred")))),
        HandleOutcome::Skipped(reason) => Ok((StatusCode::OK, Json(GenericResponse::new(reason)))),
        HandleOutcome::Rejected(e) => Err(e.into()),
    }
}

pub async fn export_script(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Json<ExportedScript> {
    let options = ExportOptions {
        consolidate_typing: query.consolidate,
        name: query.name,
    };
    Json(state.log().export(&options).await)
}

/// The in-page recorder bundle for hosts that inject it themselves
pub async fn recorder_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        RECORDER_SCRIPT,
    )
}
