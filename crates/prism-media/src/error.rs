use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use prism_core::HttpError;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MediaError>;

/// Failures of a single generation request
///
/// Every variant is fatal to the request it came from. Nothing at this
/// layer retries.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Caller holds no grant for the provider
    #[error("Access to provider '{provider}' is not granted")]
    AuthorizationDenied { provider: String },

    /// No API key configured or supplied for the provider
    #[error("No credential configured for provider '{0}'")]
    MissingCredential(String),

    /// Request is missing a required field or carries an invalid one
    #[error("Invalid request: {0}")]
    RequestBuildFailure(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    TransportFailure(String),

    /// Provider answered with a non-success status
    #[error("Provider API error ({status}): {message}")]
    ProviderRejected { status: u16, message: String },

    /// Reply parsed but carried no known media field
    #[error("Unrecognized provider reply: {0}")]
    UnrecognizedReplyShape(String),

    /// Job never reached a terminal status within its attempt budget
    #[error("Job did not finish after {attempts} status checks")]
    PollTimeout { attempts: u32 },

    /// Job reported failure
    #[error("Job failed: {reason}")]
    PollFailed { reason: String },

    /// Model name matches no provider prefix
    #[error("No provider matches model '{0}'")]
    UnknownProvider(String),

    /// Provider matched but the model is not in its catalog
    #[error("Model '{model}' is not listed for provider '{provider}'")]
    UnknownModel { provider: String, model: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl HttpError for MediaError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
            Self::MissingCredential(_) => StatusCode::UNAUTHORIZED,
            Self::RequestBuildFailure(_) => StatusCode::BAD_REQUEST,
            Self::UnknownProvider(_) | Self::UnknownModel { .. } => StatusCode::NOT_FOUND,
            Self::TransportFailure(_) | Self::UnrecognizedReplyShape(_) | Self::PollFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::ProviderRejected { status, .. } => match *status {
                400 => StatusCode::BAD_REQUEST,
                401 => StatusCode::UNAUTHORIZED,
                403 => StatusCode::FORBIDDEN,
                429 => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::AuthorizationDenied { .. } => "permission_error",
            Self::MissingCredential(_) => "authentication_error",
            Self::RequestBuildFailure(_) => "invalid_request_error",
            Self::UnknownProvider(_) | Self::UnknownModel { .. } => "not_found_error",
            Self::TransportFailure(_)
            | Self::ProviderRejected { .. }
            | Self::UnrecognizedReplyShape(_)
            | Self::PollFailed { .. } => "api_error",
            Self::PollTimeout { .. } => "timeout_error",
            Self::ConfigError(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::ConfigError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    r#type: String,
    code: u16,
}

impl IntoResponse for MediaError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = ErrorResponse {
            error: ErrorDetails {
                message: self.client_message(),
                r#type: self.error_type().to_string(),
                code: status.as_u16(),
            },
        };

        (status, Json(error_response)).into_response()
    }
}
