//! Persisted actor state
//!
//! [`ActorRecord`] is what the store keeps per actor. [`ActorState`] is the
//! state machine view the actor acts on; it is derived from the record plus
//! what the provider currently reports.

use crate::orchestrator::key::ActorKey;
use crate::orchestrator::merge_policy::MergePolicyStatus;
use crate::orchestrator::reminders::Reminders;
use crate::types::{Asset, CoherencyError, DependencyUpdate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An update waiting to be applied to the actor's PR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    /// Subscription the build arrived through
    pub subscription_id: Uuid,
    /// Build to apply
    pub build_id: u64,
    /// Repository the build was produced from
    pub source_repo: String,
    /// Commit the build was produced from
    pub source_sha: String,
    /// Assets produced by the build
    #[serde(default)]
    pub assets: Vec<Asset>,
    /// Only coherency has to be re-evaluated
    #[serde(default)]
    pub is_coherency_update: bool,
    /// The update is a source code flow
    #[serde(default)]
    pub is_code_flow: bool,
}

/// A subscription whose build a PR carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPullRequestUpdate {
    /// Subscription
    pub subscription_id: Uuid,
    /// Build applied
    pub build_id: u64,
    /// Source repository of the build
    pub source_repo: String,
    /// Source commit of the build
    pub source_sha: String,
}

/// One dependency change carried by a PR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyUpdateSummary {
    /// Dependency name
    pub dependency_name: String,
    /// Version before the PR
    pub from_version: String,
    /// Version after the PR
    pub to_version: String,
    /// Commit before the PR
    pub from_commit_sha: String,
    /// Commit after the PR
    pub to_commit_sha: String,
}

impl From<&DependencyUpdate> for DependencyUpdateSummary {
    fn from(update: &DependencyUpdate) -> Self {
        Self {
            dependency_name: update.to.name.clone(),
            from_version: update.from.version.clone(),
            to_version: update.to.version.clone(),
            from_commit_sha: update.from.commit.clone(),
            to_commit_sha: update.to.commit.clone(),
        }
    }
}

/// The PR an actor currently tracks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InProgressPullRequest {
    /// PR URL
    pub url: String,
    /// PR head branch
    pub head_branch: String,
    /// Subscriptions and builds the PR carries
    #[serde(default)]
    pub contained_subscriptions: Vec<SubscriptionPullRequestUpdate>,
    /// Dependency changes the PR carries
    #[serde(default)]
    pub required_updates: Vec<DependencyUpdateSummary>,
    /// Whether the last coherency pass resolved everything
    #[serde(default = "default_true")]
    pub coherency_check_successful: bool,
    /// Errors of the last coherency pass
    #[serde(default)]
    pub coherency_errors: Vec<CoherencyError>,
    /// Source repository contacts were told about failing policies
    #[serde(default)]
    pub source_repo_notified: bool,
    /// Result of the last merge policy evaluation
    #[serde(default)]
    pub merge_policy_result: Option<MergePolicyStatus>,
}

const fn default_true() -> bool {
    true
}

impl InProgressPullRequest {
    /// Freshly opened PR with nothing recorded yet
    pub fn new(url: impl Into<String>, head_branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            head_branch: head_branch.into(),
            contained_subscriptions: Vec::new(),
            required_updates: Vec::new(),
            coherency_check_successful: true,
            coherency_errors: Vec::new(),
            source_repo_notified: false,
            merge_policy_result: None,
        }
    }

    /// Record `update`, replacing an earlier build of the same subscription
    ///
    /// Returns the entry it replaced.
    pub fn contain(
        &mut self,
        update: SubscriptionPullRequestUpdate,
    ) -> Option<SubscriptionPullRequestUpdate> {
        match self
            .contained_subscriptions
            .iter_mut()
            .find(|s| s.subscription_id == update.subscription_id)
        {
            Some(existing) => Some(std::mem::replace(existing, update)),
            None => {
                self.contained_subscriptions.push(update);
                None
            }
        }
    }

    /// Merge `summaries` into the required updates, replacing by dependency name
    pub fn merge_required_updates(&mut self, summaries: impl IntoIterator<Item = DependencyUpdateSummary>) {
        for summary in summaries {
            match self
                .required_updates
                .iter_mut()
                .find(|s| s.dependency_name.eq_ignore_ascii_case(&summary.dependency_name))
            {
                // Keep the version the PR started from
                Some(existing) => {
                    existing.dependency_name = summary.dependency_name;
                    existing.to_version = summary.to_version;
                    existing.to_commit_sha = summary.to_commit_sha;
                }
                None => self.required_updates.push(summary),
            }
        }
    }
}

/// Written by the code flow synchronization step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFlowStatus {
    /// Source commit the branch was synchronized to
    pub last_synced_sha: String,
    /// Branch carrying the synchronized sources
    pub pr_branch: String,
}

/// Everything persisted for one actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRecord {
    /// Actor identity
    pub key: ActorKey,
    /// Updates not yet applied, in arrival order
    #[serde(default)]
    pub pending_updates: Vec<PendingUpdate>,
    /// Tracked PR
    #[serde(default)]
    pub pull_request: Option<InProgressPullRequest>,
    /// Code flow branch status
    #[serde(default)]
    pub code_flow: Option<CodeFlowStatus>,
    /// Armed reminders
    #[serde(default)]
    pub reminders: Reminders,
}

impl ActorRecord {
    /// Record with nothing persisted
    pub fn new(key: ActorKey) -> Self {
        Self {
            key,
            pending_updates: Vec::new(),
            pull_request: None,
            code_flow: None,
            reminders: Reminders::default(),
        }
    }

    /// Whether there is nothing worth persisting
    pub fn is_empty(&self) -> bool {
        self.pending_updates.is_empty()
            && self.pull_request.is_none()
            && self.code_flow.is_none()
            && self.reminders.is_empty()
    }

    /// Queue `update`; a re-delivery of a queued subscription/build pair is ignored
    ///
    /// Returns whether the update was queued.
    pub fn enqueue(&mut self, update: PendingUpdate) -> bool {
        if self
            .pending_updates
            .iter()
            .any(|p| p.subscription_id == update.subscription_id && p.build_id == update.build_id)
        {
            return false;
        }
        self.pending_updates.push(update);
        true
    }

    /// Forget the PR, code flow status, pending updates and reminders
    pub fn clear(&mut self) {
        self.pending_updates.clear();
        self.pull_request = None;
        self.code_flow = None;
        self.reminders.clear_all();
    }
}

/// State of an actor's PR as seen by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorState {
    /// No PR is tracked
    NoPullRequest,
    /// Code flow actor whose synchronized branch is not visible yet
    AwaitingCodeFlowBranch {
        /// Branch being waited for, `None` until the synchronization step ran
        branch: Option<String>,
    },
    /// PR is open but must not be pushed to
    PullRequestCannotUpdate(InProgressPullRequest),
    /// PR is open and safe to push to
    PullRequestCanUpdate(InProgressPullRequest),
    /// PR was merged
    Merged(InProgressPullRequest),
    /// PR was closed without merging, or deleted
    Closed(InProgressPullRequest),
}

impl ActorState {
    /// Short state name for logs and status output
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NoPullRequest => "NoPullRequest",
            Self::AwaitingCodeFlowBranch { .. } => "AwaitingCodeFlowBranch",
            Self::PullRequestCannotUpdate(_) => "PullRequestCannotUpdate",
            Self::PullRequestCanUpdate(_) => "PullRequestCanUpdate",
            Self::Merged(_) => "Merged",
            Self::Closed(_) => "Closed",
        }
    }

    /// Whether the PR is resolved
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged(_) | Self::Closed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(subscription_id: Uuid, build_id: u64) -> PendingUpdate {
        PendingUpdate {
            subscription_id,
            build_id,
            source_repo: "https://github.com/o/src".to_string(),
            source_sha: "abc".to_string(),
            assets: vec![],
            is_coherency_update: false,
            is_code_flow: false,
        }
    }

    fn summary(name: &str, from: &str, to: &str) -> DependencyUpdateSummary {
        DependencyUpdateSummary {
            dependency_name: name.to_string(),
            from_version: from.to_string(),
            to_version: to.to_string(),
            from_commit_sha: format!("{from}-sha"),
            to_commit_sha: format!("{to}-sha"),
        }
    }

    #[test]
    fn test_enqueue_ignores_redelivery() {
        let id = Uuid::new_v4();
        let mut record = ActorRecord::new(ActorKey::Subscription(id));

        assert!(record.enqueue(pending(id, 1)));
        assert!(!record.enqueue(pending(id, 1)));
        assert!(record.enqueue(pending(id, 2)));
        assert_eq!(record.pending_updates.len(), 2);
    }

    #[test]
    fn test_contain_replaces_same_subscription() {
        let id = Uuid::new_v4();
        let mut pr = InProgressPullRequest::new("u", "b");
        let entry = |build_id| SubscriptionPullRequestUpdate {
            subscription_id: id,
            build_id,
            source_repo: "r".to_string(),
            source_sha: "s".to_string(),
        };

        assert!(pr.contain(entry(1)).is_none());
        let replaced = pr.contain(entry(2)).unwrap();
        assert_eq!(replaced.build_id, 1);
        assert_eq!(pr.contained_subscriptions.len(), 1);
        assert_eq!(pr.contained_subscriptions[0].build_id, 2);
    }

    #[test]
    fn test_merge_required_updates_keeps_original_from() {
        let mut pr = InProgressPullRequest::new("u", "b");
        pr.merge_required_updates([summary("Foo", "1.0", "1.1")]);
        pr.merge_required_updates([summary("foo", "1.1", "1.2"), summary("Bar", "2.0", "2.1")]);

        assert_eq!(pr.required_updates.len(), 2);
        assert_eq!(pr.required_updates[0].from_version, "1.0");
        assert_eq!(pr.required_updates[0].to_version, "1.2");
    }

    #[test]
    fn test_clear_empties_record() {
        let id = Uuid::new_v4();
        let mut record = ActorRecord::new(ActorKey::Subscription(id));
        record.enqueue(pending(id, 1));
        record.pull_request = Some(InProgressPullRequest::new("u", "b"));
        assert!(!record.is_empty());

        record.clear();
        assert!(record.is_empty());
    }

    #[test]
    fn test_record_json_shape() {
        let id = Uuid::nil();
        let mut record = ActorRecord::new(ActorKey::Subscription(id));
        record.enqueue(pending(id, 7));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(
            json["key"],
            "subscription:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(json["pendingUpdates"][0]["buildId"], 7);
        let back: ActorRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
