//! Actor addressing

use crate::error::{Error, Result};
use crate::types::Subscription;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of one pull request actor
///
/// Non-batchable subscriptions own their PR; batchable subscriptions share
/// one PR per target repository and branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ActorKey {
    /// PR owned by a single subscription
    Subscription(Uuid),
    /// PR shared by all batchable subscriptions of a target
    Batch {
        /// Target repository
        repository: String,
        /// Target branch
        branch: String,
    },
}

impl ActorKey {
    /// Key of the actor that handles `subscription`
    pub fn for_subscription(subscription: &Subscription) -> Self {
        if subscription.policy.batchable {
            Self::Batch {
                repository: subscription.target_repository.clone(),
                branch: subscription.target_branch.clone(),
            }
        } else {
            Self::Subscription(subscription.id)
        }
    }

    /// Whether this actor serves several subscriptions
    pub const fn is_batch(&self) -> bool {
        matches!(self, Self::Batch { .. })
    }
}

impl fmt::Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscription(id) => write!(f, "subscription:{id}"),
            Self::Batch { repository, branch } => {
                write!(f, "batch:{}@{repository}", urlencoding::encode(branch))
            }
        }
    }
}

impl FromStr for ActorKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Parse(format!("invalid actor key: {s}"));

        if let Some(id) = s.strip_prefix("subscription:") {
            return Uuid::parse_str(id)
                .map(Self::Subscription)
                .map_err(|_| invalid());
        }

        // The branch is percent-encoded, so the first '@' ends it
        let rest = s.strip_prefix("batch:").ok_or_else(invalid)?;
        let (branch, repository) = rest.split_once('@').ok_or_else(invalid)?;
        if branch.is_empty() || repository.is_empty() {
            return Err(invalid());
        }
        let branch = urlencoding::decode(branch).map_err(|_| invalid())?;
        Ok(Self::Batch {
            repository: repository.to_string(),
            branch: branch.into_owned(),
        })
    }
}

impl From<ActorKey> for String {
    fn from(key: ActorKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for ActorKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}
