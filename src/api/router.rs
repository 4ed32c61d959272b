//! Wire/API layer (C10): an Axum router exposing the controller's five
//! public operations as `POST` JSON endpoints under `/v1/...`, plus the
//! teacher's own `/health` and Prometheus `/metrics` (served from a
//! separate listener, see `metrics::router`).

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::api::endpoints::{
    analyze_handler, check_firmware_version_handler, health_handler,
    report_host_configuration_handler, search_firmware_handler, search_report_handler,
};
use crate::controller::Controller;
use crate::metrics::middleware::track_metrics;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
}

pub fn api_router(controller: Arc<Controller>) -> Router {
    let app_state = AppState { controller };

    Router::new()
        .route("/v1/analyze", post(analyze_handler))
        .route("/v1/firmware/search", post(search_firmware_handler))
        .route("/v1/reports/search", post(search_report_handler))
        .route(
            "/v1/host-configuration",
            post(report_host_configuration_handler),
        )
        .route(
            "/v1/firmware/check-versions",
            post(check_firmware_version_handler),
        )
        .route("/health", get(health_handler))
        .layer(middleware::from_fn(track_metrics))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}
