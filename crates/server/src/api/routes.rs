use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use super::{handlers, middleware::metrics_middleware, render};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Finished outputs, addressed by the `downloadUrl` of the complete event
    let downloads = ServeDir::new(state.output_dir());

    // API routes
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/render", post(render::submit_render))
        .nest_service("/renders", downloads)
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
