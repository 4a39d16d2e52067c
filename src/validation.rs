//! Subscription conflict validation
//!
//! Every create/update request is checked here before it is persisted. The
//! checks are pure: they look only at the candidate subscription and the
//! subscriptions that already exist.

use crate::types::Subscription;
use thiserror::Error;
use uuid::Uuid;

/// How a rejected request should be reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// The request itself breaks a subscription rule
    BadRequest,
    /// The request collides with an existing subscription
    Conflict,
}

/// A subscription create/update request that was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Code flow subscriptions cannot share a PR
    #[error("The request is invalid. Batched codeflow subscriptions are not supported.")]
    BatchedCodeFlow,

    /// Code flow subscription without a directory
    #[error(
        "The request is invalid. Source-enabled subscriptions require the source or target directory to be set"
    )]
    MissingDirectory,

    /// Both directories were set
    #[error("The request is invalid. Only one of source or target directory can be set")]
    BothDirectories,

    /// Source directory on a dependency-flow subscription
    #[error("The request is invalid. Source directory can be set only for source-enabled subscriptions")]
    SourceDirectoryWithoutCodeFlow,

    /// An update tried to flip `source_enabled`
    #[error(
        "The request is invalid. Subscriptions are not allowed to change their sourceEnabled setting."
    )]
    SourceEnabledChanged,

    /// Another subscription already performs the same update
    #[error("The subscription '{0}' already performs the same update.")]
    Equivalent(Uuid),

    /// Another backflow subscription targets the same repository and branch
    #[error(
        "A backflow subscription '{0}' already exists for the same target repository and branch. Only one backflow subscription is allowed per target repository and branch combination."
    )]
    BackflowConflict(Uuid),

    /// Another forward flow subscription targets the same repository, branch and directory
    #[error(
        "A forward flow subscription '{0}' already exists for the same VMR repository, branch, and target directory. Only one forward flow subscription is allowed per VMR repository, branch, and target directory combination."
    )]
    ForwardFlowConflict(Uuid),
}

impl ValidationError {
    /// User-visible category of this error
    pub const fn kind(&self) -> ValidationErrorKind {
        match self {
            Self::BatchedCodeFlow
            | Self::MissingDirectory
            | Self::BothDirectories
            | Self::SourceDirectoryWithoutCodeFlow
            | Self::SourceEnabledChanged => ValidationErrorKind::BadRequest,
            Self::Equivalent(_) | Self::BackflowConflict(_) | Self::ForwardFlowConflict(_) => {
                ValidationErrorKind::Conflict
            }
        }
    }
}

/// Validate a subscription that is about to be created
pub fn validate_new_subscription(
    candidate: &Subscription,
    existing: &[Subscription],
) -> Result<(), ValidationError> {
    check_rules(candidate)?;
    check_conflicts(candidate, existing)
}

/// Validate an edit of `current` into `updated`
///
/// `existing` may contain `current` itself; it is never reported as a
/// conflict because matches with the same id are ignored.
pub fn validate_subscription_update(
    current: &Subscription,
    updated: &Subscription,
    existing: &[Subscription],
) -> Result<(), ValidationError> {
    if current.source_enabled != updated.source_enabled {
        return Err(ValidationError::SourceEnabledChanged);
    }
    check_rules(updated)?;
    check_conflicts(updated, existing)
}

/// Validate every subscription of a catalog against all the others
pub fn validate_all(subscriptions: &[Subscription]) -> Result<(), ValidationError> {
    for (index, candidate) in subscriptions.iter().enumerate() {
        check_rules(candidate)?;
        // Only compare against the ones before, so each pair is reported once
        // and the later entry is the one rejected.
        check_conflicts(candidate, &subscriptions[..index])?;
    }
    Ok(())
}

fn check_rules(sub: &Subscription) -> Result<(), ValidationError> {
    if sub.source_enabled && sub.policy.batchable {
        return Err(ValidationError::BatchedCodeFlow);
    }

    let source_dir = sub.source_directory();
    let target_dir = sub.target_directory();

    if sub.source_enabled && source_dir.is_none() && target_dir.is_none() {
        return Err(ValidationError::MissingDirectory);
    }
    if source_dir.is_some() && target_dir.is_some() {
        return Err(ValidationError::BothDirectories);
    }
    if !sub.source_enabled && source_dir.is_some() {
        return Err(ValidationError::SourceDirectoryWithoutCodeFlow);
    }

    Ok(())
}

fn check_conflicts(sub: &Subscription, existing: &[Subscription]) -> Result<(), ValidationError> {
    let others = || existing.iter().filter(|other| other.id != sub.id);

    if let Some(other) = others().find(|other| is_equivalent(sub, other)) {
        return Err(ValidationError::Equivalent(other.id));
    }

    if sub.is_backflow() {
        if let Some(other) = others().find(|other| {
            other.is_backflow()
                && other.target_repository == sub.target_repository
                && other.target_branch == sub.target_branch
        }) {
            return Err(ValidationError::BackflowConflict(other.id));
        }
    }

    if sub.is_forward_flow() {
        if let Some(other) = others().find(|other| {
            other.is_forward_flow()
                && other.target_repository == sub.target_repository
                && other.target_branch == sub.target_branch
                && other.target_directory() == sub.target_directory()
        }) {
            return Err(ValidationError::ForwardFlowConflict(other.id));
        }
    }

    Ok(())
}

fn is_equivalent(a: &Subscription, b: &Subscription) -> bool {
    a.source_repository == b.source_repository
        && a.channel_id == b.channel_id
        && a.target_repository == b.target_repository
        && a.target_branch == b.target_branch
        && a.source_enabled == b.source_enabled
        && a.source_directory() == b.source_directory()
        && a.target_directory() == b.target_directory()
}
