//! HTTP request handlers for the admission service

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use std::time::Instant;

use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;

use crate::decision::decide;
use crate::errors::AppError;
use crate::metrics::{AdmissionMetricsHelper, ADMISSION_METRICS};
use crate::AppState;

#[utoipa::path(
    post,
    path = "/validate",
    tag = "admission",
    responses(
        (status = 200, description = "Review evaluated; the verdict is carried inside the response envelope"),
        (status = 400, description = "The submitted review could not be decoded", body = crate::documentation::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::documentation::ErrorResponse)
    )
)]
/// Evaluate one admission review
///
/// Accepts an `AdmissionReview` envelope, compares the effective RBAC
/// grants of the referenced service account against those of the
/// requesting user, and returns the envelope with an allow or deny
/// verdict filled in. The HTTP status is 200 for every evaluated review;
/// denial is expressed through `.response.allowed` and the 403 status
/// code inside the result. Only an undecodable body yields a 400.
pub async fn validate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AdmissionReview<DynamicObject>>, JsonRejection>,
) -> Result<Json<AdmissionReview<DynamicObject>>, AppError> {
    let Json(review) = body.map_err(|rejection| AppError::MalformedReview {
        reason: rejection.body_text(),
    })?;

    let request: AdmissionRequest<DynamicObject> =
        review.try_into().map_err(|err| AppError::MalformedReview {
            reason: format!("{err}"),
        })?;

    let eval_start = Instant::now();
    let decision = decide(
        &request,
        state.cluster.as_ref(),
        state.resolver.as_ref(),
        &state.evaluator,
    )
    .await;
    let eval_duration = eval_start.elapsed();

    let decision_str = if decision.allowed { "allowed" } else { "denied" };
    AdmissionMetricsHelper::record_decision(decision_str, eval_duration);

    // Log the verdict for audit
    tracing::info!(
        request_uid = %request.uid,
        decision = %decision_str,
        duration_ms = %eval_duration.as_millis(),
        "Admission decision made"
    );

    let mut response = AdmissionResponse::from(&request);
    response.allowed = decision.allowed;
    response.result = decision.into_status();

    Ok(Json(response.into_review()))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = crate::documentation::HealthCheckResponse)
    )
)]
/// Health check endpoint
pub async fn health_check() -> Json<crate::documentation::HealthCheckResponse> {
    Json(crate::documentation::HealthCheckResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "metrics",
    responses(
        (status = 200, description = "Prometheus metrics", content_type = "text/plain"),
        (status = 500, description = "Failed to gather metrics")
    )
)]
/// Metrics endpoint
pub async fn get_metrics() -> impl IntoResponse {
    match ADMISSION_METRICS.gather_metrics() {
        Ok(metrics) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            metrics,
        ),
        Err(e) => {
            tracing::error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Error gathering metrics: {e}"),
            )
        }
    }
}
