mod auth;
mod errors;
mod handlers;
mod middleware;
mod rate_limit;
mod state;
mod stream;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub use auth::{generate_auth_token, verify_bearer};
pub use errors::HttpError;
pub use handlers::SHUTDOWN_GRACE;
pub use rate_limit::RateLimiter;
pub use state::HttpState;

pub fn router(state: HttpState) -> Router<()> {
    let api = Router::new()
        .route(
            "/metrics",
            get(handlers::query_metrics).post(handlers::ingest_metric),
        )
        .route("/metrics/aggregations", get(handlers::aggregations))
        .route("/metrics/costs", get(handlers::costs))
        .route("/metrics/export", post(handlers::export_metrics))
        .route("/plans", get(handlers::list_plans))
        .route("/plans/:name", get(handlers::get_plan));

    let events = Router::new()
        .route("/metrics", get(stream::metrics_events))
        .route("/plans", get(stream::plans_events));

    Router::new()
        .nest("/api", api)
        .nest("/events", events)
        .route("/shutdown", post(handlers::shutdown))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(axum_middleware::from_fn(middleware::require_loopback_origin))
        .with_state(state)
}
