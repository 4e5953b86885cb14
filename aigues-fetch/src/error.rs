//! API error types.

use thiserror::Error;

/// Marker the API puts in the body of a 401 when a token was revoked
/// server-side.
pub const TOKEN_REVOKED_MARKER: &str = "JWT Token Revoked";

/// Marker present in login failures that demand an interactive captcha.
pub const RECAPTCHA_MARKER: &str = "recaptchaClientResponse";

// ============================================================================
// API Error
// ============================================================================

/// Error type for API client operations.
///
/// None of these are retried by the client; retry policy belongs to the
/// caller.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure (connection, DNS, timeout). No HTTP response.
    #[error("Request failed: {0}")]
    Transport(String),

    /// HTTP 503.
    #[error("Service temporarily unavailable")]
    ServiceUnavailable,

    /// HTTP 500.
    #[error("Server error: {0}")]
    Server(String),

    /// HTTP 404.
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP 401.
    #[error("Denied: {0}")]
    Denied(String),

    /// HTTP 400.
    #[error("Bad response: {0}")]
    BadRequest(String),

    /// HTTP 429.
    #[error("Rate-Limited: {0}")]
    RateLimited(String),

    /// Any other non-success status.
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// Login completed but the payload reports a failure.
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// Login requires an interactive captcha; a token must be supplied.
    #[error("Login requires a recaptcha response, provide a token instead")]
    CaptchaRequired,

    /// The installed token has expired.
    #[error("Token has expired")]
    TokenExpired,

    /// No token installed and none could be obtained.
    #[error("No token available")]
    TokenMissing,

    /// Token is not a decodable three-segment token.
    #[error("Token decode error: {0}")]
    TokenDecode(String),

    /// An expected field is missing from the response.
    #[error("Missing field in response: {0}")]
    MissingField(String),

    /// Response could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A single contract was required but the account has several (or none).
    #[error("Provide a contract id, the account has {0} contracts")]
    AmbiguousContract(usize),

    /// Reauthentication produced a different contract list.
    #[error("Contracts do not match: expected {expected:?}, found {found:?}")]
    ContractMismatch {
        /// Contracts stored at setup.
        expected: Vec<String>,
        /// Contracts returned with the new token.
        found: Vec<String>,
    },
}

impl ApiError {
    /// Returns true if the error means the session is no longer valid and
    /// the user must reauthenticate.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthenticated(_)
                | ApiError::CaptchaRequired
                | ApiError::TokenExpired
                | ApiError::TokenMissing
                | ApiError::TokenDecode(_)
        ) || self.is_token_revoked()
    }

    /// Returns true if the error text carries the revoked-token marker.
    ///
    /// The API exposes no structured code for this, so the message is
    /// matched regardless of the HTTP status.
    pub fn is_token_revoked(&self) -> bool {
        self.to_string().contains(TOKEN_REVOKED_MARKER)
    }

    /// Returns true if the error is likely to go away on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Transport(_)
                | ApiError::ServiceUnavailable
                | ApiError::Server(_)
                | ApiError::RateLimited(_)
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Transport(format!("Request timed out: {err}"))
        } else if err.is_connect() {
            ApiError::Transport(format!("Connection failed: {err}"))
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::InvalidUrl(err.to_string())
    }
}
