//! Core types for depflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// How often a subscription wants to receive updates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateFrequency {
    /// Only manual triggers
    #[default]
    None,
    /// Every build published to the channel
    EveryBuild,
    /// Once a day
    EveryDay,
    /// Twice a day
    TwiceDaily,
    /// Once a week
    EveryWeek,
}

/// A named merge policy with optional properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePolicyDefinition {
    /// Policy name (e.g. `Standard`, `AllChecksSuccessful`)
    pub name: String,
    /// Policy-specific properties
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl MergePolicyDefinition {
    /// Policy with no properties
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }
}

/// Subscription policy settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPolicy {
    /// Whether this subscription shares its PR with other batchable subscriptions
    #[serde(default)]
    pub batchable: bool,
    /// Update cadence
    #[serde(default)]
    pub update_frequency: UpdateFrequency,
    /// Policies that gate automatic merge
    #[serde(default)]
    pub merge_policies: Vec<MergePolicyDefinition>,
}

/// Rule describing how a target repo/branch is updated from a source repo/channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Subscription id
    pub id: Uuid,
    /// Channel the source builds are published to
    pub channel_id: u64,
    /// Repository producing the builds
    pub source_repository: String,
    /// Repository receiving the updates
    pub target_repository: String,
    /// Branch receiving the updates
    pub target_branch: String,
    /// Whether the subscription is active
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Batching, cadence and merge policies
    #[serde(default)]
    pub policy: SubscriptionPolicy,
    /// Asset name filters (`*` wildcards) never updated by this subscription
    #[serde(default)]
    pub excluded_assets: Vec<String>,
    /// Contacts tagged when the PR fails its policies
    #[serde(default)]
    pub pull_request_failure_notification_tags: Option<String>,
    /// Code flow (full source sync) instead of dependency flow
    #[serde(default)]
    pub source_enabled: bool,
    /// Mono-repo directory flowing back into the target (backflow)
    #[serde(default)]
    pub source_directory: Option<String>,
    /// Mono-repo directory receiving the source (forward flow)
    #[serde(default)]
    pub target_directory: Option<String>,
    /// Last build applied by a merged PR
    #[serde(default)]
    pub last_applied_build_id: Option<u64>,
}

const fn default_true() -> bool {
    true
}

impl Subscription {
    /// Source directory, treating an empty string as unset
    pub fn source_directory(&self) -> Option<&str> {
        non_empty(self.source_directory.as_deref())
    }

    /// Target directory, treating an empty string as unset
    pub fn target_directory(&self) -> Option<&str> {
        non_empty(self.target_directory.as_deref())
    }

    /// Code flow from the mono-repo into a component repo
    pub fn is_backflow(&self) -> bool {
        self.source_enabled && self.source_directory().is_some()
    }

    /// Code flow from a component repo into the mono-repo
    pub fn is_forward_flow(&self) -> bool {
        self.source_enabled && self.target_directory().is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Named bucket that builds are published to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Channel id
    pub id: u64,
    /// Channel name
    pub name: String,
}

/// An asset produced by a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Asset name (package id)
    pub name: String,
    /// Asset version
    pub version: String,
    /// Whether the asset is shipped
    #[serde(default)]
    pub non_shipping: bool,
    /// Feeds or storage locations
    #[serde(default)]
    pub locations: Vec<String>,
}

/// A registered build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    /// Build id
    pub id: u64,
    /// Repository that was built
    pub repository: String,
    /// Commit that was built
    pub commit: String,
    /// Branch that was built
    #[serde(default)]
    pub branch: Option<String>,
    /// CI build number
    #[serde(default)]
    pub build_number: String,
    /// When the build finished
    pub date_produced: DateTime<Utc>,
    /// Produced assets
    #[serde(default)]
    pub assets: Vec<Asset>,
    /// Channels the build was published to
    #[serde(default)]
    pub channels: Vec<u64>,
}

/// Kind of dependency in a manifest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DependencyType {
    /// Product dependency
    #[default]
    Product,
    /// Toolset dependency
    Toolset,
}

/// One line of a target repo's dependency manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyDetail {
    /// Dependency name
    pub name: String,
    /// Current version
    pub version: String,
    /// Repository producing the dependency
    pub repo_uri: String,
    /// Commit that produced the version
    pub commit: String,
    /// Pinned dependencies are never updated
    #[serde(default)]
    pub pinned: bool,
    /// Dependency whose repo+commit decides this one's version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coherent_parent_dependency_name: Option<String>,
    /// Product or toolset
    #[serde(default, rename = "type")]
    pub dependency_type: DependencyType,
    /// Where the asset can be fetched from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
}

impl DependencyDetail {
    /// Coherent parent name, treating an empty string as unset
    pub fn coherent_parent(&self) -> Option<&str> {
        non_empty(self.coherent_parent_dependency_name.as_deref())
    }
}

/// A required version change for one dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyUpdate {
    /// Current manifest entry
    pub from: DependencyDetail,
    /// Entry after the update
    pub to: DependencyDetail,
}

/// A coherent dependency that could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoherencyError {
    /// Dependency that failed to resolve
    pub dependency: DependencyDetail,
    /// What went wrong
    pub message: String,
    /// Suggested fixes
    pub potential_solutions: Vec<String>,
}

/// A pull request as seen by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Web URL of the PR
    pub url: String,
    /// PR title
    pub title: String,
    /// PR body
    pub description: String,
    /// Branch the PR merges into
    pub base_branch: String,
    /// Branch carrying the changes
    pub head_branch: String,
}

/// Provider view of a tracked PR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrStatus {
    /// The PR no longer exists
    NotFound,
    /// Closed without merging
    Closed,
    /// Merged
    Merged,
    /// Open but must not be pushed to right now
    CannotUpdate,
    /// Open and safe to push to
    CanUpdate,
}

/// State of a CI check on a PR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckState {
    /// Still running or queued
    Pending,
    /// Finished successfully (or skipped/neutral)
    Success,
    /// Finished unsuccessfully
    Failure,
}

/// A CI check on a PR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    /// Check name
    pub name: String,
    /// Current state
    pub state: CheckState,
}

/// State of a PR review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewState {
    /// Approved
    Approved,
    /// Changes requested
    ChangesRequested,
    /// Comment only
    Commented,
    /// Review was dismissed or rejected
    Rejected,
}

/// Detected platform type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    /// GitHub or GitHub Enterprise
    GitHub,
    /// GitLab or self-hosted GitLab
    GitLab,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitHub => write!(f, "GitHub"),
            Self::GitLab => write!(f, "GitLab"),
        }
    }
}

/// Repository coordinates on a platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Platform type
    pub platform: Platform,
    /// Repository owner (user, organization or group path)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Custom host (None for github.com/gitlab.com)
    pub host: Option<String>,
}
