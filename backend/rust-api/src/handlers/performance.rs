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
    metrics::METRICS_QUERIES_TOTAL,
    models::metrics::Period,
    services::{
        classifier, metadata_service::provider_from_config, metrics_service::MetricsService,
        AppState,
    },
};

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub period: Option<String>,
}

fn metrics_service(state: &AppState) -> MetricsService {
    let metadata = provider_from_config(&state.config, state.mongo.clone());
    MetricsService::new(state.mongo.clone(), state.config.clone(), metadata)
}

pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    Path((user_id, kid_index)): Path<(String, String)>,
    Query(query): Query<MetricsQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let period = Period::parse(query.period.as_deref());
    METRICS_QUERIES_TOTAL
        .with_label_values(&[period_label(period)])
        .inc();

    let service = metrics_service(&state);

    match service
        .get_metrics(&user_id, &kid_index, query.from, query.to, period)
        .await
    {
        Ok(snapshot) => Ok((StatusCode::OK, Json(snapshot))),
        Err(e) => {
            tracing::error!(
                "Failed to compute metrics for {}/{}: {}",
                user_id,
                kid_index,
                e
            );
            Err(e.into_response_parts())
        }
    }
}

/// Classification codes derived from a fresh metrics snapshot.
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path((user_id, kid_index)): Path<(String, String)>,
    Query(query): Query<MetricsQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let period = Period::parse(query.period.as_deref());
    METRICS_QUERIES_TOTAL
        .with_label_values(&[period_label(period)])
        .inc();

    let service = metrics_service(&state);

    match service
        .get_metrics(&user_id, &kid_index, query.from, query.to, period)
        .await
    {
        Ok(snapshot) => {
            let codes = classifier::classify(&snapshot, period);
            Ok((StatusCode::OK, Json(codes)))
        }
        Err(e) => {
            tracing::error!(
                "Failed to classify metrics for {}/{}: {}",
                user_id,
                kid_index,
                e
            );
            Err(e.into_response_parts())
        }
    }
}

fn period_label(period: Period) -> &'static str {
    match period {
        Period::Week => "week",
        Period::Month => "month",
        Period::Custom => "custom",
    }
}
