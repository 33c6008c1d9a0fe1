use thiserror::Error;
use uuid::Uuid;

/// Failures reported by the authentication backend. These are shown to the
/// user as-is, next to the form that triggered them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email address has not been confirmed yet")]
    EmailNotConfirmed,

    #[error("Link is invalid or has expired")]
    ExpiredLink,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Remote data service error: {0}")]
    Remote(String),

    #[error("Text generation error: {0}")]
    Generation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend is not configured: set backend_url and backend_anon_key in {0}")]
    NotConfigured(String),

    #[error("No {kind} with id {id}")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("No user is signed in")]
    NoSession,
}

impl AppError {
    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
