// src/error.rs
use thiserror::Error;

/// Coarse classification of a [`PacError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required value was absent or empty.
    Missing,
    /// A value was present but malformed.
    Invalid,
    /// PAC content could not be obtained from its origin.
    FetchFailed,
    /// The evaluation context could not be set up.
    ScriptLoadFailed,
    /// A native function could not be registered.
    NativeRegistrationFailed,
    /// The decision function was missing or threw at call time.
    EvaluationFailed,
}

/// Errors produced while loading PAC content or resolving proxies.
///
/// URIs carried in messages are redacted: passwords never appear in
/// plaintext.
#[derive(Debug, Error)]
pub enum PacError {
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("invalid proxy directive: {0}")]
    InvalidDirective(String),

    #[error("invalid proxy URI `{uri}`: {reason}")]
    InvalidProxyUri { uri: String, reason: String },

    #[error("invalid authority URI `{uri}`: {reason}")]
    InvalidAuthorityUri { uri: String, reason: String },

    #[error("invalid PAC content: {0}")]
    InvalidContent(String),

    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to retrieve PAC content from {origin}: HTTP {status}")]
    FetchStatus { origin: String, status: u16 },

    #[error("failed to retrieve PAC content from {origin}")]
    Fetch {
        origin: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read PAC file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start PAC engine thread")]
    EngineStart(#[source] std::io::Error),

    #[error("failed to load {stage}: {message}")]
    ScriptLoad {
        stage: &'static str,
        message: String,
    },

    #[error("failed to register native function `{name}`: {reason}")]
    NativeRegistration { name: String, reason: String },

    #[error("failed to call `FindProxyForURL`: {0}")]
    Evaluation(String),
}

impl PacError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PacError::Missing(_) => ErrorKind::Missing,
            PacError::InvalidCredential(_)
            | PacError::InvalidDirective(_)
            | PacError::InvalidProxyUri { .. }
            | PacError::InvalidAuthorityUri { .. }
            | PacError::InvalidContent(_)
            | PacError::InvalidUrl { .. }
            | PacError::InvalidConfig(_)
            | PacError::Read { .. } => ErrorKind::Invalid,
            PacError::FetchStatus { .. } | PacError::Fetch { .. } => ErrorKind::FetchFailed,
            PacError::EngineStart(_) | PacError::ScriptLoad { .. } => ErrorKind::ScriptLoadFailed,
            PacError::NativeRegistration { .. } => ErrorKind::NativeRegistrationFailed,
            PacError::Evaluation(_) => ErrorKind::EvaluationFailed,
        }
    }

    /// HTTP status attached to a failed remote fetch, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            PacError::FetchStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PacError>;
