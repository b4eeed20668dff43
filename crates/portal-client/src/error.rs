use thiserror::Error;

pub type Result<T, E = PortalError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The HTTP layer refused to follow a redirect (policy limit or
    /// cross-origin target). Distinct from [`PortalError::Http`] so callers
    /// can treat it as a navigation outcome rather than a transport failure.
    #[error("redirect not followed: {0}")]
    RedirectBlocked(String),
    /// Non-2xx response. `message` is the server's parsed `error` field when
    /// one is present, the HTTP status text otherwise.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("credentials unavailable: {0}")]
    CredentialsUnavailable(&'static str),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationFailure),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected payload shape: {0}")]
    Envelope(String),
    #[error("project has no published copy")]
    NotPublished,
    #[error("operation cancelled")]
    Cancelled,
}

impl PortalError {
    /// Message shown to the user for a failed request.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Client-side form checks. These block submission locally and never reach
/// the network layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("username cannot be blank")]
    BlankUsername,
    #[error("password cannot be blank")]
    BlankPassword,
    #[error("passwords don't match")]
    PasswordMismatch,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("username or email cannot be blank")]
    BlankUsernameOrEmail,
}
