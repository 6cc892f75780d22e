//! HTTP receiver for sensor payloads and recording control.
//!
//! | Method | Path               | Effect                                         |
//! |--------|--------------------|------------------------------------------------|
//! | POST   | `/data`            | ingest one transport message                   |
//! | POST   | `/recording/start` | open a recording (409 if one is open)          |
//! | POST   | `/recording/stop`  | close it and queue analysis (409 if none open) |
//! | GET    | `/jobs/{id}`       | poll an analysis job                           |
//! | GET    | `/recordings`      | archived recordings, most recent first         |
//! | GET    | `/live`            | snapshot of the rolling buffer                 |
//! | GET    | `/health`          | liveness                                       |

use crate::data::storage::PersistedRecording;
use crate::error::SwingError;
use crate::jobs::{JobId, JobStatus};
use crate::session::{LiveSnapshot, SwingSession};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tracing::{error, info, warn};

/// Error returned by handlers, rendered as `{"error", "code"}` JSON.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A pipeline error
    #[error(transparent)]
    Swing(#[from] SwingError),

    /// A request that could not be understood
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Swing(err) => match err {
                SwingError::AlreadyRecording | SwingError::NotRecording => {
                    (StatusCode::CONFLICT, "CONFLICT")
                }
                SwingError::MalformedPayload(_) | SwingError::Serialization(_) => {
                    (StatusCode::BAD_REQUEST, "MALFORMED_PAYLOAD")
                }
                SwingError::JobNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                other => {
                    error!(error = %other, "Request failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };

        let body = json!({
            "error": self.to_string(),
            "code": code,
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the router over a session.
pub fn router(session: SwingSession) -> Router {
    Router::new()
        .route("/data", post(receive_data))
        .route("/recording/start", post(start_recording))
        .route("/recording/stop", post(stop_recording))
        .route("/jobs/{id}", get(job_status))
        .route("/recordings", get(list_recordings))
        .route("/live", get(live))
        .route("/health", get(health))
        .with_state(session)
}

/// Bind `addr` and serve until the listener fails.
pub async fn serve(session: SwingSession, addr: SocketAddr) -> crate::error::AppResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Receiver listening on {}", listener.local_addr()?);
    axum::serve(listener, router(session)).await?;
    Ok(())
}

async fn receive_data(State(session): State<SwingSession>, body: Bytes) -> ApiResult<Json<Value>> {
    let stats = session.ingest_payload(&body).map_err(|e| {
        warn!("Rejected payload: {}", e);
        e
    })?;
    Ok(Json(json!({
        "status": "success",
        "samples": stats.samples,
        "appended": stats.appended,
    })))
}

async fn start_recording(State(session): State<SwingSession>) -> ApiResult<Json<Value>> {
    let recording_id = session.start_recording()?;
    Ok(Json(json!({
        "status": "recording",
        "recording_id": recording_id,
    })))
}

async fn stop_recording(State(session): State<SwingSession>) -> ApiResult<Json<Value>> {
    let body = match session.stop_and_submit().await? {
        Some((job_id, summary)) => json!({
            "status": "analyzing",
            "job_id": job_id,
            "recording_id": summary.recording_id,
            "samples": summary.samples,
            "duration_s": summary.duration_s,
        }),
        None => json!({ "status": "no_data" }),
    };
    Ok(Json(body))
}

async fn job_status(
    State(session): State<SwingSession>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let job_id: JobId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid job id '{}'", id)))?;

    let body = match session.poll(job_id).await? {
        JobStatus::Pending => json!({ "status": "pending" }),
        JobStatus::Completed(recording) => json!({
            "status": "completed",
            "recording": PersistedRecording::from(recording.as_ref()),
        }),
        JobStatus::Failed { error, recording } => json!({
            "status": "failed",
            "error": error,
            "recording": PersistedRecording::from(recording.as_ref()),
        }),
    };
    Ok(Json(body))
}

async fn list_recordings(State(session): State<SwingSession>) -> Json<Vec<PersistedRecording>> {
    Json(
        session
            .recordings()
            .iter()
            .map(PersistedRecording::from)
            .collect(),
    )
}

async fn live(State(session): State<SwingSession>) -> Json<LiveSnapshot> {
    Json(session.live_snapshot())
}

async fn health(State(session): State<SwingSession>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "recording": session.is_recording(),
    }))
}
