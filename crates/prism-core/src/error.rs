use http::StatusCode;

/// Domain errors that know how they surface over HTTP
///
/// The server layer turns these into JSON error bodies; domain crates
/// never build responses themselves.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `invalid_request_error`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;
}
