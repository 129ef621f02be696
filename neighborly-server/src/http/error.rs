//! API error types with IntoResponse
//!
//! Every failure leaves the server as `{ "error": "<message>" }` with the
//! matching status. 500-class variants log the detail and return a generic
//! message.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use neighborly_core::ValidationError;
use serde_json::json;

use crate::integrations::GifError;
use crate::store::StoreError;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Input failed domain validation (400)
    Validation(ValidationError),

    /// Request was well-formed but not acceptable (400)
    BadRequest { message: String },

    /// No valid session (401)
    Unauthorized,

    /// Session is fine, role or membership is not (403)
    Forbidden { reason: String },

    /// Resource not found (404)
    NotFound { resource: &'static str, id: String },

    /// Uniqueness or state conflict (409)
    Conflict { reason: String },

    /// Too many requests from this client (429)
    RateLimited { retry_after: u64 },

    /// Optional integration not configured or down (503)
    Unavailable { service: &'static str },

    /// Store failure (500, logged)
    Store(StoreError),

    /// Internal error (500, logged)
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Validation(e) => e.to_string(),
            Self::BadRequest { message } => message.clone(),
            Self::Unauthorized => "authentication required".to_string(),
            Self::Forbidden { reason } => reason.clone(),
            Self::NotFound { resource, id } => format!("{} '{}' not found", resource, id),
            Self::Conflict { reason } => reason.clone(),
            Self::RateLimited { retry_after } => {
                format!("too many requests, retry in {} seconds", retry_after)
            }
            Self::Unavailable { service } => format!("{} is not available", service),
            Self::Store(e) => {
                // Log the actual error, return generic message
                tracing::error!(error = %e, "store error");
                "an internal error occurred".to_string()
            }
            Self::Internal { message } => {
                tracing::error!(%message, "internal error");
                "an internal error occurred".to_string()
            }
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();
        if let Self::RateLimited { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { resource, id } => Self::NotFound { resource, id },
            StoreError::Conflict { reason, .. } => Self::Conflict { reason },
            _ => Self::Store(e),
        }
    }
}

impl From<GifError> for ApiError {
    fn from(e: GifError) -> Self {
        if let GifError::Http(e) = &e {
            tracing::warn!(error = %e, "GIF provider request failed");
        }
        Self::Unavailable {
            service: "GIF search",
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}
