//! Collaborators the orchestrator reads from or reports to
//!
//! Subscriptions and builds are owned elsewhere; the orchestrator only
//! queries them and reports merged builds back.

use crate::config::Catalog;
use crate::error::Result;
use crate::orchestrator::merge_policy::{MergePolicyEvaluation, PolicyOutcome};
use crate::types::{Build, MergePolicyDefinition, Subscription};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Read-only access to subscription and build records
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Subscription by id
    async fn subscription(&self, id: Uuid) -> Result<Option<Subscription>>;

    /// All subscriptions
    async fn subscriptions(&self) -> Result<Vec<Subscription>>;

    /// Build by id
    async fn build(&self, id: u64) -> Result<Option<Build>>;

    /// Builds of `repository` produced from `commit`, newest first
    async fn builds_at(&self, repository: &str, commit: &str) -> Result<Vec<Build>>;

    /// Newest build of `repository` published to `channel_id`
    async fn latest_build(&self, repository: &str, channel_id: u64) -> Result<Option<Build>>;

    /// Merge policies configured for a target repository and branch
    async fn repository_merge_policies(
        &self,
        repository: &str,
        branch: &str,
    ) -> Result<Option<Vec<MergePolicyDefinition>>>;
}

/// Repository backed by a loaded [`Catalog`]
pub struct CatalogRepository {
    catalog: Catalog,
}

impl CatalogRepository {
    /// Wrap `catalog`
    pub const fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    fn newest_first<'a>(builds: impl Iterator<Item = &'a Build>) -> Vec<Build> {
        let mut builds: Vec<Build> = builds.cloned().collect();
        builds.sort_by(|a, b| {
            b.date_produced
                .cmp(&a.date_produced)
                .then_with(|| b.id.cmp(&a.id))
        });
        builds
    }
}

#[async_trait]
impl SubscriptionRepository for CatalogRepository {
    async fn subscription(&self, id: Uuid) -> Result<Option<Subscription>> {
        Ok(self
            .catalog
            .subscriptions
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.catalog.subscriptions.clone())
    }

    async fn build(&self, id: u64) -> Result<Option<Build>> {
        Ok(self.catalog.builds.iter().find(|b| b.id == id).cloned())
    }

    async fn builds_at(&self, repository: &str, commit: &str) -> Result<Vec<Build>> {
        Ok(Self::newest_first(self.catalog.builds.iter().filter(|b| {
            b.repository.eq_ignore_ascii_case(repository) && b.commit == commit
        })))
    }

    async fn latest_build(&self, repository: &str, channel_id: u64) -> Result<Option<Build>> {
        Ok(Self::newest_first(self.catalog.builds.iter().filter(|b| {
            b.repository.eq_ignore_ascii_case(repository) && b.channels.contains(&channel_id)
        }))
        .into_iter()
        .next())
    }

    async fn repository_merge_policies(
        &self,
        repository: &str,
        branch: &str,
    ) -> Result<Option<Vec<MergePolicyDefinition>>> {
        Ok(self
            .catalog
            .repository_policies
            .iter()
            .find(|p| p.repository.eq_ignore_ascii_case(repository) && p.branch == branch)
            .map(|p| p.merge_policies.clone()))
    }
}

/// Told when a subscription's build has landed in its target
#[async_trait]
pub trait MergedBuildNotifier: Send + Sync {
    /// `subscription_id` is now up to date with `build_id`
    async fn subscription_updated(&self, subscription_id: Uuid, build_id: u64) -> Result<()>;
}

/// Keeps the last applied build per subscription in memory
#[derive(Default)]
pub struct InMemoryMergedBuildNotifier {
    applied: RwLock<HashMap<Uuid, u64>>,
}

impl InMemoryMergedBuildNotifier {
    /// Nothing applied yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Last build applied for `subscription_id`
    pub async fn last_applied(&self, subscription_id: Uuid) -> Option<u64> {
        self.applied.read().await.get(&subscription_id).copied()
    }
}

#[async_trait]
impl MergedBuildNotifier for InMemoryMergedBuildNotifier {
    async fn subscription_updated(&self, subscription_id: Uuid, build_id: u64) -> Result<()> {
        info!(subscription_id = %subscription_id, build_id, "Subscription is up to date");
        self.applied.write().await.insert(subscription_id, build_id);
        Ok(())
    }
}

/// Told when a PR fails its merge policies
#[async_trait]
pub trait PolicyFailureNotifier: Send + Sync {
    /// Notify the contacts of `subscriptions` that `pr_url` is blocked
    async fn notify(
        &self,
        pr_url: &str,
        subscriptions: &[Subscription],
        evaluation: &MergePolicyEvaluation,
    ) -> Result<()>;
}

/// Writes policy failures to the log, naming the subscriptions' notification tags
pub struct TracingPolicyFailureNotifier;

#[async_trait]
impl PolicyFailureNotifier for TracingPolicyFailureNotifier {
    async fn notify(
        &self,
        pr_url: &str,
        subscriptions: &[Subscription],
        evaluation: &MergePolicyEvaluation,
    ) -> Result<()> {
        let tags: Vec<&str> = subscriptions
            .iter()
            .filter_map(|s| s.pull_request_failure_notification_tags.as_deref())
            .filter(|t| !t.trim().is_empty())
            .collect();
        let failed: Vec<&str> = evaluation
            .results
            .iter()
            .filter(|r| r.outcome == PolicyOutcome::Failure)
            .map(|r| r.name.as_str())
            .collect();

        warn!(
            pr = pr_url,
            tags = %tags.join(" "),
            policies = %failed.join(", "),
            "Pull request failed merge policies"
        );
        Ok(())
    }
}
