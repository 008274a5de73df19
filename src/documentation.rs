#![allow(clippy::needless_for_each)]

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Admission Service API",
        version = "0.1.0",
        description = "Validating admission webhook that blocks RBAC privilege escalation through service account bindings",
        contact(
            name = "Security Team",
            email = "security@example.com"
        ),
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8443", description = "Local development server"),
        (url = "https://admission-service.kube-system.svc", description = "In-cluster webhook endpoint")
    ),
    paths(
        crate::handlers::validate,
        crate::handlers::health_check,
        crate::handlers::get_metrics,
    ),
    components(
        schemas(
            HealthCheckResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "admission", description = "Admission review operations"),
        (name = "health", description = "Health check operations"),
        (name = "metrics", description = "Metrics operations")
    )
)]
pub struct ApiDoc;

#[derive(serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

#[derive(serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorDetails {
    #[schema(example = "malformed_review")]
    pub r#type: String,
    #[schema(example = "The submitted review could not be decoded")]
    pub message: String,
    #[schema(example = 400)]
    pub status: u16,
}
