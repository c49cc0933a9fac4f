//! Error types for mailsift.

use serde::Serialize;

use crate::pipeline::types::MessageId;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Stage '{stage}' panicked: {reason}")]
    StagePanicked { stage: &'static str, reason: String },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse {key}: {value:?} is not a valid number")]
    ParseError { key: String, value: String },
}

/// Errors returned by the external collaborator services.
///
/// The pipeline never interprets these beyond their message — they are
/// folded into a [`StageFailure`] tagged with the failing item's identity.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("malformed response: {0}")]
    InvalidResponse(String),
}

/// A single surfaced stage failure, tagged with the identity of the item
/// that failed.
///
/// Failures travel on a dedicated channel and are merged into the final
/// report alongside (not instead of) successfully processed items. One
/// failing item never aborts the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageFailure {
    /// The resolver call failed for one email.
    #[error("resolving {email}: {reason}")]
    Resolution { email: String, reason: String },

    /// The batched listing call failed for one whole batch.
    #[error("listing messages for [{}]: {reason}", emails.join(", "))]
    Listing { emails: Vec<String>, reason: String },

    /// The classifier call failed for one message.
    #[error("classifying message {id}: {reason}")]
    Classification { id: MessageId, reason: String },
}

impl StageFailure {
    /// Short label for logging.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "resolve",
            Self::Listing { .. } => "list",
            Self::Classification { .. } => "classify",
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
