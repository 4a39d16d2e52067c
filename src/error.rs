//! Error types for depflow

use crate::validation::ValidationError;
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by depflow
#[derive(Debug, Error)]
pub enum Error {
    /// Generic git/PR provider failure
    #[error("platform error: {0}")]
    Platform(String),

    /// GitHub API failure
    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    /// GitLab API failure
    #[error("GitLab API error: {0}")]
    GitLabApi(String),

    /// Low-level octocrab failure
    #[error("GitHub client error: {0}")]
    Octocrab(#[from] octocrab::Error),

    /// Low-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No provider handles this repository URL
    #[error("unsupported repository: {0}")]
    UnsupportedRepository(String),

    /// Authentication could not be resolved
    #[error("authentication error: {0}")]
    Auth(String),

    /// Input could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// Settings or catalog are invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Subscription does not exist
    #[error("subscription '{0}' was not found")]
    SubscriptionNotFound(Uuid),

    /// Build does not exist
    #[error("build {0} was not found")]
    BuildNotFound(u64),

    /// Subscription create/update request was rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Persisted actor state could not be read or written
    #[error("state store error: {0}")]
    Store(String),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization failure
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invariant violated inside depflow itself
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout depflow
pub type Result<T> = std::result::Result<T, Error>;
