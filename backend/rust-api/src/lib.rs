use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/attempts", attempts_routes())
        .nest("/api/v1/kids", kids_routes())
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn attempts_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/", post(handlers::attempts::create_attempt))
        .route("/recalculate", post(handlers::attempts::recalculate_scores))
        .route("/{id}", get(handlers::attempts::get_attempt))
        .route(
            "/{id}/questions/{index}/begin",
            post(handlers::attempts::begin_question),
        )
        .route(
            "/{id}/questions/{index}",
            post(handlers::attempts::submit_question),
        )
        .route("/{id}/abandon", post(handlers::attempts::abandon_attempt))
}

fn kids_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route(
            "/{user_id}/{kid_index}/attempts",
            get(handlers::attempts::list_attempts),
        )
        .route(
            "/{user_id}/{kid_index}/metrics",
            get(handlers::performance::get_metrics),
        )
        .route(
            "/{user_id}/{kid_index}/messages",
            get(handlers::performance::get_messages),
        )
}
