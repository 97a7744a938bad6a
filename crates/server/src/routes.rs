//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Protocol endpoint; both methods carry the same arguments
        .route("/", get(handlers::oai_get).post(handlers::oai_post))
        .route("/health", get(handlers::health_check));

    // Keep /metrics network-restricted to the Prometheus scraper when enabled
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
