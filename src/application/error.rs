use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{
    infra::error::InfraError,
    purge::{fanout::FanoutError, options::StoreError},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("site {0} not found")]
    UnknownSite(u64),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnknownSite(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Infra(InfraError::Store(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Infra(InfraError::HttpClient { .. }) => StatusCode::BAD_GATEWAY,
            AppError::Infra(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> String {
        match self {
            AppError::UnknownSite(_) | AppError::Validation(_) => self.to_string(),
            AppError::Infra(InfraError::Store(_)) => "Option store unavailable".to_string(),
            AppError::Infra(InfraError::HttpClient { .. }) => "Upstream request failed".to_string(),
            AppError::Infra(_) | AppError::Unexpected(_) => "Unexpected error occurred".to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::UnknownTenant(tenant) => AppError::UnknownSite(tenant.0),
            other => AppError::Infra(InfraError::Store(other)),
        }
    }
}

impl From<FanoutError> for AppError {
    fn from(error: FanoutError) -> Self {
        match error {
            FanoutError::NoTenants => AppError::validation("no sites are registered"),
            FanoutError::Directory(err) => AppError::from(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        }
        let body = json!({
            "status": "error",
            "message": self.presentation_message(),
        });
        (status, Json(body)).into_response()
    }
}
