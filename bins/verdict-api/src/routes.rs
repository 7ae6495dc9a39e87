use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/executor/api/executeCode", post(handlers::submit_code))
        .route(
            "/executor/api/results/:submission_id",
            get(handlers::get_submission_result),
        )
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::export_metrics))
}
