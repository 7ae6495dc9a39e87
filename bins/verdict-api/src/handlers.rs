// HTTP route handlers for the Verdict API

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use verdict_common::redis;
use verdict_common::types::{Language, Submission};

use crate::metrics;
use crate::AppState;

/// Body of `POST /executor/api/executeCode`. Matches the queue's wire shape
/// except that the submission id is optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub language: String,
    pub code: String,
    pub problem_name: String,
    #[serde(default)]
    pub problem_id: i64,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub submission_id: Option<String>,
}

impl SubmitRequest {
    /// Build the queued submission, minting an id when the caller sent none.
    pub fn into_submission(self) -> Submission {
        let submission_id = match self.submission_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };

        Submission {
            language: self.language,
            code: self.code,
            problem_name: self.problem_name,
            problem_id: self.problem_id,
            user_id: self.user_id,
            submission_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub submission_id: String,
    pub status: &'static str,
}

/// POST /executor/api/executeCode - Queue a submission for judging
pub async fn submit_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> impl IntoResponse {
    let submission = payload.into_submission();

    // Unknown languages are still queued; the worker answers with a correlated error.
    if Language::from_tag(&submission.language).is_none() {
        warn!(
            submission_id = %submission.submission_id,
            language = %submission.language,
            "Queueing submission with unsupported language"
        );
    }

    let mut conn = state.redis.clone();
    match redis::push_submission(&mut conn, &submission).await {
        Ok(()) => {
            metrics::SUBMISSIONS_ENQUEUED
                .with_label_values(&[submission.language.to_lowercase().as_str()])
                .inc();
            info!(
                submission_id = %submission.submission_id,
                problem = %submission.problem_name,
                language = %submission.language,
                "Submission queued"
            );

            (
                StatusCode::ACCEPTED,
                Json(SubmitResponse {
                    submission_id: submission.submission_id,
                    status: "queued",
                }),
            )
                .into_response()
        }
        Err(e) => {
            metrics::ENQUEUE_FAILURES.inc();
            error!(submission_id = %submission.submission_id, error = %e, "Failed to queue submission");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": format!("Failed to queue submission: {}", e)
                })),
            )
                .into_response()
        }
    }
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /executor/api/results/{submission_id} - Query a judged result
pub async fn get_submission_result(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
) -> impl IntoResponse {
    if submission_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Submission ID must not be empty"
            })),
        )
            .into_response();
    }

    let mut conn = state.redis.clone();
    match redis::get_result(&mut conn, &submission_id).await {
        Ok(Some(result)) => {
            metrics::RESULT_LOOKUPS.with_label_values(&["found"]).inc();
            info!(submission_id = %submission_id, status = ?result.status, "Result retrieved");
            (StatusCode::OK, Json(result)).into_response()
        }
        Ok(None) => {
            metrics::RESULT_LOOKUPS.with_label_values(&["pending"]).inc();
            info!(submission_id = %submission_id, "Submission still pending");
            // Result not found - submission may still be queued or running
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "submissionId": submission_id,
                    "status": "pending",
                    "message": "Submission is queued or still executing"
                })),
            )
                .into_response()
        }
        Err(e) => {
            metrics::RESULT_LOOKUPS.with_label_values(&["error"]).inc();
            error!(submission_id = %submission_id, error = %e, "Failed to fetch result");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": format!("Failed to query submission status: {}", e)
                })),
            )
                .into_response()
        }
    }
}

/// GET /metrics - Prometheus exposition
pub async fn export_metrics() -> impl IntoResponse {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
