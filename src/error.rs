//! Error type definitions.

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// A `Result` alias where the `Err` case is `facilita_auth::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Lower-cased marker the auth service puts in every throttling rejection,
/// e.g. "Request rate limit reached" or "Email rate limit exceeded".
pub(crate) const RATE_LIMIT_MARKER: &str = "rate limit";

/// The error type for the auth client and the session manager.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Missing auth service URL")]
    MissingUrl,
    #[error("Missing anon key")]
    MissingAnonKey,
    #[error("Invalid anon key (make sure there are no invalid characters)")]
    InvalidAnonKey,
    #[error("Invalid URL: {0}")]
    InvalidUrl(url::ParseError),
    #[error("Failed to setup HTTP client: {0}")]
    HttpClientSetup(reqwest::Error),
    #[error("Failed to deserialize response: {0}")]
    Deserialize(reqwest::Error),
    #[error("Http error: {0}")]
    Http(reqwest::Error),
    #[error(transparent)]
    Auth(AuthError),
    #[error(transparent)]
    InvalidParams(#[from] serde_qs::Error),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error("Session storage failed: {0}")]
    Storage(#[from] std::io::Error),
    #[error("No session to refresh")]
    MissingSession,
}

impl Error {
    /// Returns true if the error message carries the auth service's
    /// rate-limit rejection.
    pub fn is_rate_limited(&self) -> bool {
        self.to_string().to_lowercase().contains(RATE_LIMIT_MARKER)
    }

    /// The backend rejection, if this error is one.
    pub fn auth_error(&self) -> Option<&AuthError> {
        match self {
            Error::Auth(e) => Some(e),
            _ => None,
        }
    }
}

/// An error returned by the auth service.
///
/// Displays as the service's message verbatim, so callers can match known
/// literals (e.g. "Invalid login credentials") to localize them.
#[derive(Debug, Clone)]
pub struct AuthError {
    pub status: u16,
    pub method: http::Method,
    pub path: String,
    /// Machine-readable code such as `invalid_credentials`.
    pub code: Option<String>,
    pub message: Option<String>,
}

impl AuthError {
    pub(crate) fn new(
        status: u16,
        method: http::Method,
        path: String,
        body: Option<ErrorBody>,
    ) -> Self {
        let body = body.unwrap_or_default();
        Self {
            status,
            method,
            path,
            code: body.error_code.or(body.error),
            message: body.msg.or(body.message).or(body.error_description),
        }
    }

    /// True for 4xx rejections that aren't throttling.
    pub(crate) fn is_client_rejection(&self) -> bool {
        (400..500).contains(&self.status) && self.status != 429
    }
}

impl std::error::Error for AuthError {}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(msg) = self.message.as_ref() {
            write!(f, "{}", msg)
        } else {
            write!(
                f,
                "Received {} on {} {}",
                self.status, self.method, self.path
            )
        }
    }
}

/// The shapes the auth service uses for error bodies, across versions.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct ErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    error: Option<String>,
}
