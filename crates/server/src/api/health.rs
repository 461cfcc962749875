//! Liveness and database reachability for the pizza service.

use crate::AppResources;
use axum::{Extension, http::StatusCode};

pub const OPS_TAG: &str = "Operations";

/// Answers `ok` once the database answers a ping.
#[tracing::instrument(level = "trace", skip_all)]
#[utoipa::path(
    method(get, head),
    path = "/healthz",
    tag = OPS_TAG,
    operation_id = "Pizza Service Health",
    summary = "Liveness and database ping",
    responses(
        (status = 200, description = "Process is up and the database answers", body = str, content_type = "text/plain", example = "ok"),
        (status = 503, description = "Database unreachable", body = str, content_type = "text/plain", example = "database unavailable"),
    )
)]
pub async fn health(
    Extension(resources): Extension<AppResources>,
) -> Result<&'static str, (StatusCode, &'static str)> {
    resources.db.ping().await.map_err(|e| {
        tracing::warn!(error = %e, "Health check database ping failed");
        (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
    })?;
    Ok("ok")
}
