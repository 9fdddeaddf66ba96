//! Error handling for edgekit

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unauthorized
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// SOAP fault or malformed SOAP document
    #[error("SOAP error: {0}")]
    Soap(String),

    /// MQTT client error
    #[error("MQTT error: {0}")]
    Mqtt(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Regex compile error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Network error (upstream device unreachable, non-2xx etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// CLI exit status: 1 for bad input, 2 for everything else
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_) | Error::NotFound(_) | Error::Parse(_) => 1,
            _ => 2,
        }
    }
}

impl From<rumqttc::ClientError> for Error {
    fn from(e: rumqttc::ClientError) -> Self {
        Error::Mqtt(e.to_string())
    }
}

impl From<rumqttc::ConnectionError> for Error {
    fn from(e: rumqttc::ConnectionError) -> Self {
        Error::Mqtt(e.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            Error::Soap(msg) => (StatusCode::BAD_REQUEST, "SOAP_ERROR", msg.clone()),
            Error::Mqtt(msg) => (StatusCode::BAD_GATEWAY, "MQTT_ERROR", msg.clone()),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR", e.to_string()),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            Error::Regex(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "REGEX_ERROR",
                e.to_string(),
            ),
            Error::Network(msg) => (StatusCode::BAD_GATEWAY, "NETWORK_ERROR", msg.clone()),
            Error::Parse(msg) => (StatusCode::BAD_REQUEST, "PARSE_ERROR", msg.clone()),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request error"
            );
        } else {
            tracing::warn!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
