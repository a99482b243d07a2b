use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    models::attempt::{CreateAttemptRequest, SubmitQuestionRequest},
    models::metrics::Period,
    services::{
        attempt_service::AttemptService, metadata_service::provider_from_config,
        metrics_service::resolve_window, AppState,
    },
};

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub async fn create_attempt(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAttemptRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!(
        "Creating attempt for user_id={}, quiz_id={}",
        req.user_id,
        req.quiz_id
    );

    let service = AttemptService::new(state.mongo.clone(), state.config.clone());

    match service.start_attempt(req).await {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(e) => {
            tracing::error!("Failed to create attempt: {}", e);
            Err(e.into_response_parts())
        }
    }
}

pub async fn get_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = AttemptService::new(state.mongo.clone(), state.config.clone());

    match service.get_attempt(&attempt_id).await {
        Ok(attempt) => Ok((StatusCode::OK, Json(attempt))),
        Err(e) => Err(e.into_response_parts()),
    }
}

pub async fn begin_question(
    State(state): State<Arc<AppState>>,
    Path((attempt_id, index)): Path<(String, usize)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = AttemptService::new(state.mongo.clone(), state.config.clone());

    match service.begin_question(&attempt_id, index).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            tracing::warn!(
                "Failed to begin question {} on attempt {}: {}",
                index,
                attempt_id,
                e
            );
            Err(e.into_response_parts())
        }
    }
}

pub async fn submit_question(
    State(state): State<Arc<AppState>>,
    Path((attempt_id, index)): Path<(String, usize)>,
    Json(req): Json<SubmitQuestionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = AttemptService::new(state.mongo.clone(), state.config.clone());

    match service.submit_question(&attempt_id, index, req).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            tracing::warn!(
                "Failed to submit question {} on attempt {}: {}",
                index,
                attempt_id,
                e
            );
            Err(e.into_response_parts())
        }
    }
}

pub async fn abandon_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Abandoning attempt: {}", attempt_id);

    let service = AttemptService::new(state.mongo.clone(), state.config.clone());

    match service.abandon(&attempt_id).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => Err(e.into_response_parts()),
    }
}

/// Maintenance endpoint: rescore every stored attempt. Intended for use
/// after a scoring-window config change.
pub async fn recalculate_scores(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Recalculating scores for all attempts");

    let service = AttemptService::new(state.mongo.clone(), state.config.clone());

    match service.recalculate_scores().await {
        Ok(updated) => Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "updated": updated })),
        )),
        Err(e) => {
            tracing::error!("Score recalculation failed: {}", e);
            Err(e.into_response_parts())
        }
    }
}

pub async fn list_attempts(
    State(state): State<Arc<AppState>>,
    Path((user_id, kid_index)): Path<(String, String)>,
    Query(window): Query<WindowQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (from, to) = resolve_window(window.from, window.to, Period::Custom)
        .map_err(|e| e.into_response_parts())?;

    let service = AttemptService::new(state.mongo.clone(), state.config.clone());
    let metadata = provider_from_config(&state.config, state.mongo.clone());

    match service
        .list_attempts(&user_id, &kid_index, from, to, metadata.as_ref())
        .await
    {
        Ok(attempts) => Ok((StatusCode::OK, Json(attempts))),
        Err(e) => {
            tracing::error!(
                "Failed to list attempts for {}/{}: {}",
                user_id,
                kid_index,
                e
            );
            Err(e.into_response_parts())
        }
    }
}
