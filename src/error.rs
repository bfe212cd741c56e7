//! Error types for chatkv
//!
//! Infrastructure failures (the store is unreachable, a reply could not be
//! decoded, configuration is invalid) are raised as [`ChatKvError`] through
//! the crate-wide [`Result`] alias. Domain refusals such as "user not found"
//! are ordinary control flow and travel as [`Refusal`] values inside
//! [`crate::repository::ActionResult`] instead.

use serde::Serialize;
use thiserror::Error;

/// Main error type for chatkv operations
#[derive(Error, Debug)]
pub enum ChatKvError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backing store could not be reached or returned a non-success status
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store answered, but the reply did not have the expected shape
    #[error("Malformed store response: {0}")]
    MalformedResponse(String),

    /// A stored field-map could not be decoded into an entity
    #[error("Decode error: {0}")]
    Decode(String),

    /// A command name or argument list outside the supported set
    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    /// Caller input rejected before touching the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for chatkv operations
///
/// Uses `anyhow::Error` so call sites can attach context; the underlying
/// [`ChatKvError`] stays reachable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

/// Why a repository operation declined to act.
///
/// These are expected outcomes that callers branch on and surface to an end
/// user, so they are returned inside a successful [`Result`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Refusal {
    /// The entity does not exist
    #[error("not found")]
    NotFound,

    /// Approval requested for a user that is already approved
    #[error("already approved")]
    AlreadyApproved,

    /// The entity is in a state that does not allow the operation
    #[error("invalid state")]
    InvalidState,

    /// The entity is protected (admin accounts)
    #[error("forbidden")]
    Forbidden,

    /// Registration with a username that is already indexed
    #[error("username taken")]
    UsernameTaken,

    /// Too many registrations are waiting for approval
    #[error("registration closed")]
    RegistrationClosed,

    /// Registration input failed validation
    #[error("invalid input")]
    InvalidInput,
}
