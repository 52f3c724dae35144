//! Render API handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::stream;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use framecast_core::{EventReporter, RenderJobSpec, RenderRequest};

use crate::metrics::{FRAMES_RENDERED_TOTAL, RENDERS_ACTIVE, RENDERS_TOTAL, RENDER_DURATION};
use crate::state::AppState;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn bad_request(error: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    RENDERS_TOTAL.with_label_values(&["rejected"]).inc();
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// POST /api/v1/render
///
/// Validates the request, then streams the render's events as NDJSON.
/// Invalid requests are answered with 400 before any event is written.
pub async fn submit_render(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    let job = prepare_job(&state, request).map_err(bad_request)?;

    info!(
        composition = %job.composition_id,
        output = %job.output_path.display(),
        "Render requested"
    );

    let (reporter, events) = EventReporter::channel();
    let orchestrator = Arc::clone(state.orchestrator());
    tokio::spawn(async move {
        RENDERS_ACTIVE.inc();
        let started = Instant::now();
        let result = orchestrator.render_with_events(&job, &reporter).await;
        RENDERS_ACTIVE.dec();

        match result {
            Ok(outcome) => {
                RENDERS_TOTAL.with_label_values(&["completed"]).inc();
                RENDER_DURATION.observe(started.elapsed().as_secs_f64());
                FRAMES_RENDERED_TOTAL.inc_by(outcome.frames);
            }
            Err(e) => {
                RENDERS_TOTAL.with_label_values(&["failed"]).inc();
                warn!(composition = %job.composition_id, error = %e, "Render failed");
            }
        }
    });

    // Ends once the render task drops its reporter.
    let lines = stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        let line = event.to_ndjson_line().map_err(std::io::Error::other);
        Some((line, events))
    });

    Ok((
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(lines),
    )
        .into_response())
}

/// Resolves the request and places its output in the download directory
/// under a unique name.
fn prepare_job(state: &AppState, request: RenderRequest) -> Result<RenderJobSpec, String> {
    if request.output_path.is_some() {
        return Err("outputPath cannot be set over HTTP".to_string());
    }
    if request.sequence == Some(true) {
        return Err("image sequences can only be rendered from the command line".to_string());
    }
    if request.composition_id.contains(['/', '\\']) || request.composition_id.starts_with('.') {
        return Err(format!(
            "invalid composition id: {}",
            request.composition_id
        ));
    }

    let mut job = request
        .into_job(&state.config().render)
        .map_err(|e| e.to_string())?;

    let token = Uuid::new_v4().simple().to_string();
    job.output_path = state.output_dir().join(format!(
        "{}-{}.{}",
        job.composition_id,
        &token[..8],
        job.codec.profile().container_extension
    ));
    Ok(job)
}
