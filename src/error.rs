//! HTTP error mapping.

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::{AppConfig, Env},
    identity::IdentityError,
    repository::RepositoryError,
    storage::StorageError,
};

pub type ApiResult<T> = Result<T, ApiError>;

/// ApiError
///
/// Every failure a handler can return. Collaborator errors convert through `From`
/// so handlers and services can use `?` throughout.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) | ApiError::Storage(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Repository(e) => match e {
                RepositoryError::Conflict(_) => StatusCode::CONFLICT,
                RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
                RepositoryError::UnknownReference(_) => StatusCode::BAD_REQUEST,
                RepositoryError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Identity(e) => match e {
                IdentityError::NotFound(_) => StatusCode::UNAUTHORIZED,
                IdentityError::InvalidRole(_) => StatusCode::FORBIDDEN,
                IdentityError::Unavailable(_) | IdentityError::Misconfigured(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            },
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_) | ApiError::Repository(RepositoryError::Database(_))
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

const MASKED_DETAIL: &str = "An internal error occurred";

/// Marks responses whose detail comes from an internal failure.
#[derive(Debug, Clone, Copy)]
struct InternalDetail;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }

        let internal = self.is_internal();
        let mut response = (status, Json(ErrorResponse { detail: self.to_string() })).into_response();
        if internal {
            response.extensions_mut().insert(InternalDetail);
        }
        response
    }
}

/// mask_internal_errors
///
/// Outer layer that replaces internal error details with a generic message when the
/// service runs in production.
pub async fn mask_internal_errors(
    State(config): State<AppConfig>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if config.env != Env::Production || response.extensions().get::<InternalDetail>().is_none() {
        return response;
    }
    let detail = MASKED_DETAIL.to_string();
    (response.status(), Json(ErrorResponse { detail })).into_response()
}
