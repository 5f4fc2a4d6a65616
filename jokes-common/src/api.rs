//! HTTP pieces shared by every service
//!
//! - `IntoResponse` for [`Error`] so handlers can return `Result<_, Error>`
//! - JSON body rejections folded into validation errors
//! - health response body
//! - graceful shutdown signal

use crate::Error;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, info, warn};

/// Error body: `{"status": "error", "message": "..."}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::BrokerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Processing(_)
            | Error::Store(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                status: "error",
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Unwrap a JSON body, turning axum's rejection into [`Error::Validation`]
pub fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> crate::Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| Error::Validation(rejection.body_text()))
}

/// Build identification captured by the services' build script
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub build_profile: &'static str,
}

/// Health check response
///
/// `cached_types` is reported by cache subscribers, `store` by the ETL worker.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    #[serde(flatten)]
    pub build: BuildInfo,
    pub broker: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_types: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
}

impl HealthResponse {
    pub fn new(module: &'static str, build: BuildInfo, broker_connected: bool) -> Self {
        Self {
            status: "ok",
            module,
            build,
            broker: if broker_connected { "connected" } else { "disconnected" },
            cached_types: None,
            store: None,
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            Error::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::BrokerUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::Store("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
