use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures that can occur while evaluating a single admission request.
///
/// Every variant except `IdentityResolution` turns into an immediate denial.
/// `IdentityResolution` is routed through the configured not-found behavior
/// before a verdict is produced.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("identity resolution failed: {reason}")]
    IdentityResolution { reason: String },

    #[error("cluster cache lookup failed for {what}: {reason}")]
    CacheLookup { what: String, reason: String },

    #[error("role reference not found: {kind} {name} referenced by binding {binding}")]
    RoleReferenceNotFound {
        kind: String,
        name: String,
        binding: String,
    },

    #[error("failed to serialize escalated grants: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EvaluationError {
    pub fn identity_resolution(reason: impl Into<String>) -> Self {
        Self::IdentityResolution {
            reason: reason.into(),
        }
    }

    pub fn cache_lookup(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CacheLookup {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("malformed admission review: {reason}")]
    MalformedReview { reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal server error: {context}")]
    Internal { context: String },
}

impl AppError {
    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MalformedReview { .. } => StatusCode::BAD_REQUEST,

            AppError::Config(_) | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::MalformedReview { .. } => "malformed_review",
            AppError::Config(_) => "configuration_error",
            AppError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();
        let error_message = self.to_string();

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}
