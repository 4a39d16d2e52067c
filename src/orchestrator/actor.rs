//! The pull request actor
//!
//! One actor owns one PR slot: a non-batchable subscription, or a target
//! repository branch shared by batchable subscriptions. Callers must hold
//! the actor's lock (see [`crate::orchestrator::KeyedLocks`]); every method
//! loads the persisted record, acts, and saves it back.
//!
//! Updates are queued first and applied when the PR can take them. Nothing
//! waits in place: a cycle that cannot finish re-arms a reminder and returns.

use crate::config::Settings;
use crate::description::{
    CodeFlowBlock, DescriptionBuilder, FAILED_COHERENCY_COMMIT_MESSAGE, build_commit_message,
    code_flow_title, coherency_commit_message, pull_request_title,
};
use crate::error::{Error, Result};
use crate::manifest::SourceManifest;
use crate::orchestrator::collaborators::{
    InMemoryMergedBuildNotifier, MergedBuildNotifier, PolicyFailureNotifier,
    SubscriptionRepository, TracingPolicyFailureNotifier,
};
use crate::orchestrator::events::{
    DependencyFlowEvent, DependencyFlowEventSink, FlowEventReason, FlowEventType,
    TracingEventSink,
};
use crate::orchestrator::key::ActorKey;
use crate::orchestrator::merge_policy::{
    BuiltinMergePolicyEvaluator, MergePolicyEvaluator, MergePolicyStatus,
};
use crate::orchestrator::reminders::ReminderKind;
use crate::orchestrator::state::{
    ActorRecord, ActorState, CodeFlowStatus, DependencyUpdateSummary, InProgressPullRequest,
    PendingUpdate, SubscriptionPullRequestUpdate,
};
use crate::orchestrator::store::StateStore;
use crate::platform::{GitProvider, PullRequestSpec};
use crate::resolver::{
    AssetFilter, CoherencyOutcome, CoherencySource, apply_updates, required_coherency_updates,
    required_non_coherency_updates,
};
use crate::types::{
    Build, DependencyDetail, DependencyUpdate, MergePolicyDefinition, PrStatus, Subscription,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tunables of every actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorOptions {
    /// Delay before queued updates are retried
    pub pending_update_delay: Duration,
    /// Delay between merge policy checks
    pub pull_request_check_delay: Duration,
    /// Prefix of generated head branches
    pub branch_prefix: String,
    /// Path of the source manifest in the VMR
    pub source_manifest_path: String,
}

impl Default for ActorOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ActorOptions {
    /// Options taken from `settings`
    pub fn from_settings(settings: &Settings) -> Self {
        let delay = |d: std::time::Duration| {
            Duration::from_std(d).unwrap_or_else(|_| Duration::days(1))
        };
        Self {
            pending_update_delay: delay(settings.pending_update_delay()),
            pull_request_check_delay: delay(settings.pull_request_check_delay()),
            branch_prefix: settings.branch_prefix.clone(),
            source_manifest_path: settings.source_manifest_path.clone(),
        }
    }
}

/// Collaborators shared by all actors
pub struct ActorContext {
    /// Git and PR operations
    pub provider: Arc<dyn GitProvider>,
    /// Persisted actor records
    pub store: Arc<dyn StateStore>,
    /// Subscription and build records
    pub repository: Arc<dyn SubscriptionRepository>,
    /// Merge policy evaluation
    pub merge_policies: Arc<dyn MergePolicyEvaluator>,
    /// Dependency flow events
    pub events: Arc<dyn DependencyFlowEventSink>,
    /// Reports builds that reached their target
    pub merged_builds: Arc<dyn MergedBuildNotifier>,
    /// Reports PRs blocked by policies
    pub policy_failures: Arc<dyn PolicyFailureNotifier>,
    /// Tunables
    pub options: ActorOptions,
}

impl ActorContext {
    /// Context with the built-in evaluator and logging sinks
    pub fn new(
        provider: Arc<dyn GitProvider>,
        store: Arc<dyn StateStore>,
        repository: Arc<dyn SubscriptionRepository>,
    ) -> Self {
        Self {
            merge_policies: Arc::new(BuiltinMergePolicyEvaluator::new(Arc::clone(&provider))),
            provider,
            store,
            repository,
            events: Arc::new(TracingEventSink),
            merged_builds: Arc::new(InMemoryMergedBuildNotifier::new()),
            policy_failures: Arc::new(TracingPolicyFailureNotifier),
            options: ActorOptions::default(),
        }
    }

    /// Replace the tunables
    #[must_use]
    pub fn with_options(mut self, options: ActorOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the merge policy evaluator
    #[must_use]
    pub fn with_merge_policies(mut self, evaluator: Arc<dyn MergePolicyEvaluator>) -> Self {
        self.merge_policies = evaluator;
        self
    }

    /// Replace the event sink
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn DependencyFlowEventSink>) -> Self {
        self.events = events;
        self
    }

    /// Replace the merged build notifier
    #[must_use]
    pub fn with_merged_build_notifier(mut self, notifier: Arc<dyn MergedBuildNotifier>) -> Self {
        self.merged_builds = notifier;
        self
    }

    /// Replace the policy failure notifier
    #[must_use]
    pub fn with_policy_failure_notifier(
        mut self,
        notifier: Arc<dyn PolicyFailureNotifier>,
    ) -> Self {
        self.policy_failures = notifier;
        self
    }
}

/// What one actor cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// No updates were queued
    NoPendingUpdates,
    /// No PR is tracked
    NoPullRequest,
    /// Updates stay queued until the PR can be pushed to
    WaitingForPullRequest(String),
    /// Updates stay queued until the code flow branch exists
    WaitingForCodeFlowBranch(Option<String>),
    /// The queued builds required no change
    NothingToDo,
    /// A PR was opened
    PullRequestCreated(String),
    /// The tracked PR was updated
    PullRequestUpdated(String),
    /// The tracked PR was resolved and the actor's state cleared
    PullRequestCompleted {
        /// PR URL
        url: String,
        /// Merged rather than closed
        merged: bool,
    },
    /// Merge policies were evaluated on the tracked PR
    PoliciesEvaluated {
        /// PR URL
        url: String,
        /// Aggregate policy result
        status: MergePolicyStatus,
    },
}

/// Where the actor's PR goes
struct Target {
    repository: String,
    branch: String,
    /// Set for actors owned by a single subscription
    subscription: Option<Subscription>,
}

impl Target {
    fn code_flow(&self) -> Option<&Subscription> {
        self.subscription.as_ref().filter(|s| s.source_enabled)
    }
}

/// A queued build together with what it changes
struct AppliedBuild {
    update: PendingUpdate,
    build: Build,
    updates: Vec<DependencyUpdate>,
}

/// Coherency lookups through the provider and the build records
struct ProviderCoherencySource<'a> {
    provider: &'a dyn GitProvider,
    repository: &'a dyn SubscriptionRepository,
}

#[async_trait]
impl<'a> CoherencySource for ProviderCoherencySource<'a> {
    async fn dependencies_at(&self, repo: &str, commit: &str) -> Result<Vec<DependencyDetail>> {
        self.provider.get_dependencies(repo, commit).await
    }

    async fn builds_at(&self, repo: &str, commit: &str) -> Result<Vec<Build>> {
        self.repository.builds_at(repo, commit).await
    }
}

/// One actor bound to its key
pub struct PullRequestActor<'a> {
    key: ActorKey,
    ctx: &'a ActorContext,
}

impl<'a> PullRequestActor<'a> {
    /// Actor for `key`
    pub const fn new(key: ActorKey, ctx: &'a ActorContext) -> Self {
        Self { key, ctx }
    }

    /// Actor key
    pub const fn key(&self) -> &ActorKey {
        &self.key
    }

    /// Queue a build and apply it right away if the PR allows
    pub async fn update_assets(&self, update: PendingUpdate) -> Result<ProcessOutcome> {
        let mut record = self.ctx.store.load(&self.key).await?;

        if record.enqueue(update.clone()) {
            info!(
                actor = %self.key,
                subscription_id = %update.subscription_id,
                build_id = update.build_id,
                "Queued update"
            );
        } else {
            debug!(actor = %self.key, build_id = update.build_id, "Update already queued");
        }
        record.reminders.arm(
            ReminderKind::PendingUpdate,
            Utc::now(),
            self.ctx.options.pending_update_delay,
        );
        self.ctx.store.save(&record).await?;

        self.process_pending_updates().await
    }

    /// Record that the code flow branch was synchronized
    pub async fn set_code_flow_status(&self, status: CodeFlowStatus) -> Result<()> {
        let mut record = self.ctx.store.load(&self.key).await?;
        info!(actor = %self.key, branch = %status.pr_branch, sha = %status.last_synced_sha, "Code flow status recorded");
        record.code_flow = Some(status);
        self.ctx.store.save(&record).await
    }

    /// Apply all queued updates if the PR can take them
    pub async fn process_pending_updates(&self) -> Result<ProcessOutcome> {
        let mut record = self.ctx.store.load(&self.key).await?;

        if record.pending_updates.is_empty() {
            if record.reminders.is_armed(ReminderKind::PendingUpdate) {
                record.reminders.clear(ReminderKind::PendingUpdate);
                self.ctx.store.save(&record).await?;
            }
            debug!(actor = %self.key, "No pending updates");
            return Ok(ProcessOutcome::NoPendingUpdates);
        }

        let target = self.target().await?;
        let state = self.resolve_state(&record, &target).await?;
        debug!(actor = %self.key, state = state.name(), pending = record.pending_updates.len(), "Processing pending updates");

        match state {
            ActorState::Merged(pr) => self.complete(record, &target, pr, true).await,
            ActorState::Closed(pr) => self.complete(record, &target, pr, false).await,
            ActorState::PullRequestCannotUpdate(pr) => {
                info!(actor = %self.key, pr = %pr.url, "Pull request cannot be updated, retrying later");
                self.retry_later(&mut record).await?;
                Ok(ProcessOutcome::WaitingForPullRequest(pr.url))
            }
            ActorState::AwaitingCodeFlowBranch { branch } => {
                info!(actor = %self.key, branch = ?branch, "Code flow branch not available yet");
                self.retry_later(&mut record).await?;
                Ok(ProcessOutcome::WaitingForCodeFlowBranch(branch))
            }
            ActorState::NoPullRequest => self.apply_pending(record, &target, None).await,
            ActorState::PullRequestCanUpdate(pr) => {
                self.apply_pending(record, &target, Some(pr)).await
            }
        }
    }

    /// Evaluate merge policies of the tracked PR and merge it when they pass
    pub async fn process_pull_request_check(&self) -> Result<ProcessOutcome> {
        let mut record = self.ctx.store.load(&self.key).await?;

        let Some(mut pr) = record.pull_request.clone() else {
            record.reminders.clear(ReminderKind::PullRequestCheck);
            self.ctx.store.save(&record).await?;
            return Ok(ProcessOutcome::NoPullRequest);
        };

        let target = self.target().await?;
        match self.ctx.provider.synchronize(&pr.url).await? {
            PrStatus::Merged => return self.complete(record, &target, pr, true).await,
            PrStatus::Closed | PrStatus::NotFound => {
                return self.complete(record, &target, pr, false).await;
            }
            PrStatus::CanUpdate | PrStatus::CannotUpdate => {}
        }

        let policies = self.merge_policies(&target, &pr).await?;
        let evaluation = self.ctx.merge_policies.evaluate(&pr, &policies).await?;
        let status = evaluation.status();
        pr.merge_policy_result = Some(status);
        info!(actor = %self.key, pr = %pr.url, status = ?status, "Merge policies evaluated");

        let mut delay = self.ctx.options.pull_request_check_delay;
        match status {
            MergePolicyStatus::Succeeded => {
                let details = self.ctx.provider.get_pull_request(&pr.url).await?;
                self.ctx
                    .provider
                    .merge_pull_request(&pr.url, &details.title)
                    .await?;
                info!(actor = %self.key, pr = %pr.url, "Merged pull request");
                // The next check sees the merge and completes the PR
                delay = Duration::zero();
            }
            MergePolicyStatus::Failed if !pr.source_repo_notified => {
                let subscriptions = self.contained_subscriptions(&pr).await?;
                self.ctx
                    .policy_failures
                    .notify(&pr.url, &subscriptions, &evaluation)
                    .await?;
                pr.source_repo_notified = true;
            }
            MergePolicyStatus::Failed | MergePolicyStatus::Pending | MergePolicyStatus::NoPolicies => {}
        }

        let url = pr.url.clone();
        record.pull_request = Some(pr);
        record
            .reminders
            .arm(ReminderKind::PullRequestCheck, Utc::now(), delay);
        self.ctx.store.save(&record).await?;

        Ok(ProcessOutcome::PoliciesEvaluated { url, status })
    }

    /// Current state of the actor, asking the provider about the tracked PR
    pub async fn state(&self) -> Result<ActorState> {
        let record = self.ctx.store.load(&self.key).await?;
        let target = self.target().await?;
        self.resolve_state(&record, &target).await
    }

    async fn target(&self) -> Result<Target> {
        match &self.key {
            ActorKey::Subscription(id) => {
                let subscription = self
                    .ctx
                    .repository
                    .subscription(*id)
                    .await?
                    .ok_or(Error::SubscriptionNotFound(*id))?;
                Ok(Target {
                    repository: subscription.target_repository.clone(),
                    branch: subscription.target_branch.clone(),
                    subscription: Some(subscription),
                })
            }
            ActorKey::Batch { repository, branch } => Ok(Target {
                repository: repository.clone(),
                branch: branch.clone(),
                subscription: None,
            }),
        }
    }

    async fn resolve_state(&self, record: &ActorRecord, target: &Target) -> Result<ActorState> {
        if let Some(pr) = &record.pull_request {
            let status = self.ctx.provider.synchronize(&pr.url).await?;
            debug!(actor = %self.key, pr = %pr.url, status = ?status, "Synchronized pull request");
            return Ok(match status {
                PrStatus::Merged => ActorState::Merged(pr.clone()),
                PrStatus::Closed | PrStatus::NotFound => ActorState::Closed(pr.clone()),
                PrStatus::CannotUpdate => ActorState::PullRequestCannotUpdate(pr.clone()),
                // Running checks must finish before new commits are pushed
                PrStatus::CanUpdate
                    if pr.merge_policy_result == Some(MergePolicyStatus::Pending) =>
                {
                    ActorState::PullRequestCannotUpdate(pr.clone())
                }
                PrStatus::CanUpdate => ActorState::PullRequestCanUpdate(pr.clone()),
            });
        }

        if target.code_flow().is_some() {
            let Some(status) = &record.code_flow else {
                return Ok(ActorState::AwaitingCodeFlowBranch { branch: None });
            };
            let exists = self
                .ctx
                .provider
                .branch_exists(&target.repository, &status.pr_branch)
                .await?;
            if !exists {
                return Ok(ActorState::AwaitingCodeFlowBranch {
                    branch: Some(status.pr_branch.clone()),
                });
            }
        }

        Ok(ActorState::NoPullRequest)
    }

    async fn retry_later(&self, record: &mut ActorRecord) -> Result<()> {
        record.reminders.arm(
            ReminderKind::PendingUpdate,
            Utc::now(),
            self.ctx.options.pending_update_delay,
        );
        self.ctx.store.save(record).await
    }

    async fn complete(
        &self,
        mut record: ActorRecord,
        target: &Target,
        pr: InProgressPullRequest,
        merged: bool,
    ) -> Result<ProcessOutcome> {
        let reason = match (merged, pr.merge_policy_result) {
            (true, Some(MergePolicyStatus::Succeeded)) => FlowEventReason::AutomaticallyMerged,
            (true, _) => FlowEventReason::ManuallyMerged,
            (false, _) => FlowEventReason::ManuallyClosed,
        };

        if merged {
            for contained in &pr.contained_subscriptions {
                self.ctx
                    .merged_builds
                    .subscription_updated(contained.subscription_id, contained.build_id)
                    .await?;
            }
        }
        for contained in &pr.contained_subscriptions {
            self.emit(
                contained.subscription_id,
                contained.build_id,
                FlowEventType::Completed,
                reason,
                Some(&pr),
            )
            .await;
        }

        info!(actor = %self.key, pr = %pr.url, merged, "Pull request resolved, clearing state");
        record.clear();
        self.ctx.store.save(&record).await?;

        if let Err(e) = self
            .ctx
            .provider
            .delete_branch(&target.repository, &pr.head_branch)
            .await
        {
            warn!(actor = %self.key, branch = %pr.head_branch, "Failed to delete pull request branch: {e}");
        }

        Ok(ProcessOutcome::PullRequestCompleted {
            url: pr.url,
            merged,
        })
    }

    async fn apply_pending(
        &self,
        record: ActorRecord,
        target: &Target,
        pr: Option<InProgressPullRequest>,
    ) -> Result<ProcessOutcome> {
        if let Some(subscription) = target.code_flow() {
            return self.apply_code_flow(record, target, subscription, pr).await;
        }
        self.apply_dependency_updates(record, target, pr).await
    }

    fn new_head_branch(&self, target: &Target, pending: &[PendingUpdate]) -> String {
        let seed = format!(
            "{}/{}",
            self.key,
            pending.first().map_or(0, |p| p.build_id)
        );
        let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes());
        format!("{}-{}-{id}", self.ctx.options.branch_prefix, target.branch)
    }

    /// URL and body of the PR on `head_branch`, if one exists
    async fn existing_pull_request(
        &self,
        target: &Target,
        pr: Option<&InProgressPullRequest>,
        head_branch: &str,
    ) -> Result<Option<(String, String)>> {
        let url = match pr {
            Some(pr) => Some(pr.url.clone()),
            None => {
                self.ctx
                    .provider
                    .find_pull_request(&target.repository, head_branch)
                    .await?
            }
        };
        let Some(url) = url else {
            return Ok(None);
        };
        let details = self.ctx.provider.get_pull_request(&url).await?;
        Ok(Some((url, details.description)))
    }

    async fn publish(
        &self,
        target: &Target,
        existing_url: Option<String>,
        spec: &PullRequestSpec,
    ) -> Result<(String, bool)> {
        if let Some(url) = existing_url {
            self.ctx.provider.update_pull_request(&url, spec).await?;
            info!(actor = %self.key, pr = %url, "Updated pull request");
            return Ok((url, false));
        }
        let url = self
            .ctx
            .provider
            .create_pull_request(&target.repository, spec)
            .await?;
        info!(actor = %self.key, pr = %url, "Created pull request");
        Ok((url, true))
    }

    async fn apply_dependency_updates(
        &self,
        mut record: ActorRecord,
        target: &Target,
        pr: Option<InProgressPullRequest>,
    ) -> Result<ProcessOutcome> {
        let pending = record.pending_updates.clone();
        let head_branch = pr
            .as_ref()
            .map_or_else(|| self.new_head_branch(target, &pending), |p| p.head_branch.clone());
        let current_ref = if pr.is_some() {
            head_branch.as_str()
        } else {
            target.branch.as_str()
        };

        let original = self
            .ctx
            .provider
            .get_dependencies(&target.repository, current_ref)
            .await?;
        let mut working = original.clone();
        let mut applied: Vec<AppliedBuild> = Vec::new();
        let mut unchanged: Vec<&PendingUpdate> = Vec::new();

        for update in &pending {
            if update.is_coherency_update {
                continue;
            }
            let Some(subscription) = self
                .ctx
                .repository
                .subscription(update.subscription_id)
                .await?
            else {
                warn!(actor = %self.key, subscription_id = %update.subscription_id, "Dropping update of deleted subscription");
                continue;
            };
            let build = self
                .ctx
                .repository
                .build(update.build_id)
                .await?
                .ok_or(Error::BuildNotFound(update.build_id))?;

            let filter = AssetFilter::new(&subscription.excluded_assets)?;
            let assets = filter.retain(&update.assets);
            let updates = required_non_coherency_updates(
                &update.source_repo,
                &update.source_sha,
                &assets,
                &working,
            );
            debug!(actor = %self.key, build_id = update.build_id, updates = updates.len(), "Computed required updates");

            if updates.is_empty() {
                unchanged.push(update);
                continue;
            }
            working = apply_updates(&working, &updates);
            applied.push(AppliedBuild {
                update: update.clone(),
                build,
                updates,
            });
        }

        let source = ProviderCoherencySource {
            provider: self.ctx.provider.as_ref(),
            repository: self.ctx.repository.as_ref(),
        };
        let coherency = required_coherency_updates(&working, &source).await?;
        if !coherency.is_successful() {
            warn!(actor = %self.key, errors = coherency.errors.len(), "Coherency check failed");
        }
        working = apply_updates(&working, &coherency.updates);

        for update in &unchanged {
            let in_pr = pr.as_ref().is_some_and(|p| {
                p.contained_subscriptions
                    .iter()
                    .any(|s| s.subscription_id == update.subscription_id)
            });
            if !in_pr {
                self.ctx
                    .merged_builds
                    .subscription_updated(update.subscription_id, update.build_id)
                    .await?;
                self.emit(
                    update.subscription_id,
                    update.build_id,
                    FlowEventType::Completed,
                    FlowEventReason::NothingToDo,
                    None,
                )
                .await;
            }
        }

        let only_coherency_failure = applied.is_empty()
            && coherency.updates.is_empty()
            && pr
                .as_ref()
                .is_some_and(|p| !coherency.errors.is_empty() && p.coherency_errors != coherency.errors);

        if applied.is_empty() && coherency.updates.is_empty() && !only_coherency_failure {
            info!(actor = %self.key, "Queued builds require no changes");
            record.pending_updates.clear();
            record.reminders.clear(ReminderKind::PendingUpdate);
            self.ctx.store.save(&record).await?;
            return Ok(ProcessOutcome::NothingToDo);
        }

        let existing = self
            .existing_pull_request(target, pr.as_ref(), &head_branch)
            .await?;
        if existing.is_none()
            && !self
                .ctx
                .provider
                .branch_exists(&target.repository, &head_branch)
                .await?
        {
            self.ctx
                .provider
                .create_branch(&target.repository, &target.branch, &head_branch)
                .await?;
        }

        let changed: Vec<DependencyDetail> = working
            .iter()
            .zip(&original)
            .filter(|(now, before)| now != before)
            .map(|(now, _)| now.clone())
            .collect();
        let message = if changed.is_empty() {
            FAILED_COHERENCY_COMMIT_MESSAGE.to_string()
        } else {
            commit_message(&applied, &coherency)
        };
        self.ctx
            .provider
            .commit_updates(&target.repository, &head_branch, &changed, &message)
            .await?;

        let (existing_url, existing_body) = existing.unzip();
        let mut builder = DescriptionBuilder::new(existing_body.as_deref());
        for build in &applied {
            builder.append_build(
                build.update.subscription_id,
                &build.update.source_repo,
                &build.build,
                &build.updates,
            );
        }
        builder.append_coherency_updates(&coherency.updates);
        builder.set_coherency_errors(&coherency.errors);

        let mut in_progress = pr.unwrap_or_else(|| InProgressPullRequest::new("", &head_branch));
        let mut superseded = Vec::new();
        for build in &applied {
            if let Some(old) = in_progress.contain(SubscriptionPullRequestUpdate {
                subscription_id: build.update.subscription_id,
                build_id: build.update.build_id,
                source_repo: build.update.source_repo.clone(),
                source_sha: build.update.source_sha.clone(),
            }) {
                superseded.push(old);
            }
        }
        in_progress.merge_required_updates(
            applied
                .iter()
                .flat_map(|b| b.updates.iter())
                .chain(coherency.updates.iter())
                .map(DependencyUpdateSummary::from),
        );
        in_progress.coherency_check_successful = coherency.is_successful();
        in_progress.coherency_errors = coherency.errors.clone();
        in_progress.merge_policy_result = None;

        let source_repos: Vec<&str> = in_progress
            .contained_subscriptions
            .iter()
            .map(|s| s.source_repo.as_str())
            .collect();
        let spec = PullRequestSpec {
            title: pull_request_title(&target.branch, &source_repos),
            description: builder.build(),
            base_branch: target.branch.clone(),
            head_branch: head_branch.clone(),
        };
        let (url, created) = self.publish(target, existing_url, &spec).await?;
        in_progress.url.clone_from(&url);

        for old in &superseded {
            if !applied.iter().any(|b| b.update.build_id == old.build_id) {
                self.emit(
                    old.subscription_id,
                    old.build_id,
                    FlowEventType::Updated,
                    FlowEventReason::FailedUpdate,
                    Some(&in_progress),
                )
                .await;
            }
        }
        for build in &applied {
            self.emit(
                build.update.subscription_id,
                build.update.build_id,
                FlowEventType::Created,
                FlowEventReason::New,
                Some(&in_progress),
            )
            .await;
        }

        self.finish_update(&mut record, in_progress).await?;
        Ok(if created {
            ProcessOutcome::PullRequestCreated(url)
        } else {
            ProcessOutcome::PullRequestUpdated(url)
        })
    }

    async fn apply_code_flow(
        &self,
        mut record: ActorRecord,
        target: &Target,
        subscription: &Subscription,
        pr: Option<InProgressPullRequest>,
    ) -> Result<ProcessOutcome> {
        let latest = record
            .pending_updates
            .last()
            .cloned()
            .ok_or_else(|| Error::Internal("code flow without pending updates".to_string()))?;
        let build = self
            .ctx
            .repository
            .build(latest.build_id)
            .await?
            .ok_or(Error::BuildNotFound(latest.build_id))?;

        let head_branch = match (&pr, &record.code_flow) {
            (Some(pr), _) => pr.head_branch.clone(),
            (None, Some(status)) => status.pr_branch.clone(),
            (None, None) => {
                return Err(Error::Internal(format!(
                    "code flow for {} has no branch",
                    self.key
                )));
            }
        };

        let existing = self
            .existing_pull_request(target, pr.as_ref(), &head_branch)
            .await?;
        let (existing_url, existing_body) = existing.unzip();

        let manifest_commit = match subscription.target_directory() {
            Some(directory) if subscription.is_forward_flow() => self
                .ctx
                .provider
                .get_file_contents(
                    &target.repository,
                    &head_branch,
                    &self.ctx.options.source_manifest_path,
                )
                .await?
                .map(|text| SourceManifest::from_json(&text))
                .transpose()?
                .and_then(|manifest| {
                    manifest
                        .repository(directory)
                        .map(|r| (directory.to_string(), r.commit_sha.clone()))
                }),
            _ => None,
        };

        let previous_sha = pr.as_ref().and_then(|p| {
            p.contained_subscriptions
                .iter()
                .find(|s| s.subscription_id == subscription.id)
                .map(|s| s.source_sha.clone())
        });

        let mut builder = DescriptionBuilder::for_code_flow(
            existing_body.as_deref(),
            &subscription.source_repository,
            subscription.is_forward_flow(),
        );
        builder.append_code_flow(&CodeFlowBlock {
            subscription_id: subscription.id,
            source_repo: &subscription.source_repository,
            build: &build,
            previous_source_sha: previous_sha.as_deref(),
            manifest_commit: manifest_commit
                .as_ref()
                .map(|(dir, sha)| (dir.as_str(), sha.as_str())),
        });

        let spec = PullRequestSpec {
            title: code_flow_title(&target.branch, &subscription.source_repository),
            description: builder.build(),
            base_branch: target.branch.clone(),
            head_branch: head_branch.clone(),
        };
        let (url, created) = self.publish(target, existing_url, &spec).await?;

        let mut in_progress = pr.unwrap_or_else(|| InProgressPullRequest::new(url.as_str(), &head_branch));
        in_progress.url.clone_from(&url);
        let superseded = in_progress.contain(SubscriptionPullRequestUpdate {
            subscription_id: subscription.id,
            build_id: latest.build_id,
            source_repo: latest.source_repo.clone(),
            source_sha: latest.source_sha.clone(),
        });
        in_progress.merge_policy_result = None;

        if let Some(old) = superseded.filter(|old| old.build_id != latest.build_id) {
            self.emit(
                old.subscription_id,
                old.build_id,
                FlowEventType::Updated,
                FlowEventReason::FailedUpdate,
                Some(&in_progress),
            )
            .await;
        }
        self.emit(
            subscription.id,
            latest.build_id,
            FlowEventType::Created,
            FlowEventReason::New,
            Some(&in_progress),
        )
        .await;

        self.finish_update(&mut record, in_progress).await?;
        Ok(if created {
            ProcessOutcome::PullRequestCreated(url)
        } else {
            ProcessOutcome::PullRequestUpdated(url)
        })
    }

    async fn finish_update(
        &self,
        record: &mut ActorRecord,
        pr: InProgressPullRequest,
    ) -> Result<()> {
        record.pull_request = Some(pr);
        record.pending_updates.clear();
        record.reminders.clear(ReminderKind::PendingUpdate);
        record.reminders.arm(
            ReminderKind::PullRequestCheck,
            Utc::now(),
            self.ctx.options.pull_request_check_delay,
        );
        self.ctx.store.save(record).await
    }

    async fn contained_subscriptions(
        &self,
        pr: &InProgressPullRequest,
    ) -> Result<Vec<Subscription>> {
        let mut subscriptions = Vec::new();
        for contained in &pr.contained_subscriptions {
            if let Some(s) = self
                .ctx
                .repository
                .subscription(contained.subscription_id)
                .await?
            {
                subscriptions.push(s);
            }
        }
        Ok(subscriptions)
    }

    /// Policies gating the actor's PR
    ///
    /// A single subscription brings its own set. A batch uses the branch-wide
    /// policies when configured, otherwise the union of its subscriptions'.
    async fn merge_policies(
        &self,
        target: &Target,
        pr: &InProgressPullRequest,
    ) -> Result<Vec<MergePolicyDefinition>> {
        if let Some(subscription) = &target.subscription {
            return Ok(subscription.policy.merge_policies.clone());
        }

        if let Some(policies) = self
            .ctx
            .repository
            .repository_merge_policies(&target.repository, &target.branch)
            .await?
        {
            return Ok(policies);
        }

        let subscriptions = self.contained_subscriptions(pr).await?;
        let mut union: Vec<MergePolicyDefinition> = Vec::new();
        for subscription in &subscriptions {
            for policy in &subscription.policy.merge_policies {
                if !union.iter().any(|p| p.name == policy.name) {
                    union.push(policy.clone());
                }
            }
        }

        let differ = subscriptions
            .windows(2)
            .any(|w| w[0].policy.merge_policies != w[1].policy.merge_policies);
        if differ {
            warn!(
                actor = %self.key,
                "Batched subscriptions carry different merge policies, evaluating their union"
            );
        }
        Ok(union)
    }

    async fn emit(
        &self,
        subscription_id: Uuid,
        build_id: u64,
        event_type: FlowEventType,
        reason: FlowEventReason,
        pr: Option<&InProgressPullRequest>,
    ) {
        self.ctx
            .events
            .record(DependencyFlowEvent {
                build_id,
                subscription_id,
                event_type,
                reason,
                merge_policy_result: pr.and_then(|p| p.merge_policy_result),
                actor: self.key.to_string(),
                pull_request_url: pr.map(|p| p.url.clone()),
            })
            .await;
    }
}

fn commit_message(applied: &[AppliedBuild], coherency: &CoherencyOutcome) -> String {
    let mut parts: Vec<String> = applied
        .iter()
        .map(|b| build_commit_message(&b.update.source_repo, &b.build.build_number, &b.updates))
        .collect();
    if !coherency.updates.is_empty() {
        parts.push(coherency_commit_message(&coherency.updates));
    }
    parts.join("\n")
}
