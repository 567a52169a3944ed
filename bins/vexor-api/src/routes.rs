// Route definitions for the Vexor API

use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::{handlers, metrics, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/assert", post(handlers::assert_code))
        .route("/execute", post(handlers::execute_tests))
        .route("/analyze", post(handlers::analyze_code))
        .route("/pagespeed", post(handlers::pagespeed))
}

/// Full application: routes, request metrics, tracing and open CORS
pub fn app(state: Arc<AppState>) -> Router {
    routes()
        .route_layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn track_requests(matched: Option<MatchedPath>, request: Request, next: Next) -> Response {
    let endpoint = matched
        .as_ref()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().to_string();

    let response = next.run(request).await;
    metrics::record_request(&endpoint, &method, response.status().as_u16());
    response
}
