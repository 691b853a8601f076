use axum::http::StatusCode;

/// `GET /healthz`: the process is up and serving.
///
/// Readiness depends on each service's backing stores, so `/readyz` lives with the service.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
