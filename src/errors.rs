use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
///
/// Client-facing variants (`InvalidRequest`, `NotFound`) carry the message returned to the
/// caller. Every other variant carries internal detail that is only logged; the response
/// body gets a fixed message per kind.
#[derive(Debug)]
pub enum AppError {
    /// Missing or invalid request field.
    InvalidRequest(String),
    /// Referenced resource (e.g. an edital) does not exist.
    NotFound(String),
    /// A required backend (score store, webhook) is not configured or reachable.
    ServiceUnavailable(String),
    /// The generation call failed.
    ComputeFailed(String),
    /// The generation call succeeded but its output could not be parsed.
    MalformedOutput(String),
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Upstream service did not answer in time.
    UpstreamTimeout(String),
    /// Error interacting with an external API.
    ExternalApiError(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// True for `ComputeFailed` and its `MalformedOutput` subtype, looking through context.
    pub fn is_compute_failure(&self) -> bool {
        match self {
            AppError::ComputeFailed(_) | AppError::MalformedOutput(_) => true,
            AppError::WithContext { source, .. } => source.is_compute_failure(),
            _ => false,
        }
    }

    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::ExternalApiError(_) => StatusCode::BAD_GATEWAY,
            AppError::WithContext { source, .. } => source.status_code(),
            AppError::ServiceUnavailable(_)
            | AppError::ComputeFailed(_)
            | AppError::MalformedOutput(_)
            | AppError::DatabaseError(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the `error` field of the response body.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidRequest(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::ServiceUnavailable(_) => "Service not configured".to_string(),
            AppError::ComputeFailed(_) | AppError::MalformedOutput(_) => {
                "Score computation failed".to_string()
            }
            AppError::DatabaseError(_) => "Database error".to_string(),
            AppError::UpstreamTimeout(_) => "Upstream service timed out".to_string(),
            AppError::ExternalApiError(_) => "External service error".to_string(),
            AppError::InternalError(_) => "Internal server error".to_string(),
            AppError::WithContext { source, .. } => source.public_message(),
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::ComputeFailed(msg) => write!(f, "Compute failed: {}", msg),
            AppError::MalformedOutput(msg) => write!(f, "Malformed model output: {}", msg),
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::UpstreamTimeout(msg) => write!(f, "Upstream timeout: {}", msg),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Raw detail goes to the log; the body only ever carries `public_message`.
    fn into_response(self) -> Response {
        let status = self.status_code();
        match status {
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                tracing::debug!("Client error: {}", self);
            }
            _ => {
                tracing::error!("Request failed: {}", self);
            }
        }

        let body = Json(json!({
            "error": self.public_message(),
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    /// Converts a `sqlx::Error` into an `AppError`.
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::UpstreamTimeout(err.to_string())
        } else {
            AppError::ExternalApiError(err.to_string())
        }
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_detail_not_exposed() {
        let err = AppError::ComputeFailed("gemini returned 500: quota exceeded".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Score computation failed");
    }

    #[test]
    fn test_context_delegates_status() {
        let err: Result<(), AppError> = Err(AppError::NotFound("Edital not found".to_string()));
        let err = err.context("loading edital").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.public_message(), "Edital not found");
        assert!(err.to_string().starts_with("loading edital: "));
    }

    #[test]
    fn test_malformed_output_is_compute_failure() {
        assert!(AppError::MalformedOutput("no json".into()).is_compute_failure());
        assert!(!AppError::NotFound("x".into()).is_compute_failure());
    }

    #[test]
    fn test_client_errors_keep_message() {
        let err = AppError::InvalidRequest("edital_id and user_id are required".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "edital_id and user_id are required");
    }
}
