// Typed failures for remote calls and scrobbling actions

use thiserror::Error;

/// Failure of a single Last.fm call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The request could not be built into a valid HTTP call
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Connectivity problem or timeout
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status without a more specific service error
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Body was not the JSON shape we expected
    #[error("malformed response")]
    MalformedResponse,

    /// Username or password refused by the service
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The service refused our signature or API key; the session needs to be renewed
    #[error("request signature rejected: {0}")]
    SignatureRejected(String),

    /// Service-level error reported in an otherwise successful response
    #[error("Last.fm error {code}: {message}")]
    Api { code: u32, message: String },
}

impl RemoteError {
    /// Whether the user should be asked to log in again
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, RemoteError::SignatureRejected(_))
    }
}

/// Failure of an explicit user action such as love/unlove
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("not logged in to Last.fm")]
    LoggedOut,

    #[error("scrobbling is disabled")]
    ScrobblingDisabled,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
