//! Routing of triggers and reminders to actors
//!
//! [`Orchestrator`] maps subscriptions to actor keys and makes sure only one
//! task at a time works on any key.

use crate::error::{Error, Result};
use crate::orchestrator::actor::{ActorContext, ProcessOutcome, PullRequestActor};
use crate::orchestrator::key::ActorKey;
use crate::orchestrator::locks::KeyedLocks;
use crate::orchestrator::reminders::ReminderKind;
use crate::orchestrator::state::{ActorRecord, ActorState, CodeFlowStatus, PendingUpdate};
use crate::types::{Asset, Subscription, UpdateFrequency};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Entry point for triggers and the reminder loop
pub struct Orchestrator {
    ctx: ActorContext,
    locks: KeyedLocks,
}

/// A reminder that fired and what it led to
#[derive(Debug)]
pub struct FiredReminder {
    /// Actor the reminder belonged to
    pub key: ActorKey,
    /// Reminder kind
    pub kind: ReminderKind,
    /// Outcome of the cycle it started
    pub outcome: Result<ProcessOutcome>,
}

impl Orchestrator {
    /// Orchestrator over `ctx`
    pub fn new(ctx: ActorContext) -> Self {
        Self {
            ctx,
            locks: KeyedLocks::new(),
        }
    }

    /// Shared collaborators
    pub const fn context(&self) -> &ActorContext {
        &self.ctx
    }

    async fn subscription(&self, id: Uuid) -> Result<Subscription> {
        self.ctx
            .repository
            .subscription(id)
            .await?
            .ok_or(Error::SubscriptionNotFound(id))
    }

    /// Queue a build for a subscription and process it if its PR allows
    pub async fn update_assets(
        &self,
        subscription_id: Uuid,
        build_id: u64,
        source_repo: &str,
        source_sha: &str,
        assets: Vec<Asset>,
        source_enabled: bool,
    ) -> Result<ProcessOutcome> {
        let subscription = self.subscription(subscription_id).await?;
        let key = ActorKey::for_subscription(&subscription);
        let _guard = self.locks.lock(&key).await;

        PullRequestActor::new(key, &self.ctx)
            .update_assets(PendingUpdate {
                subscription_id,
                build_id,
                source_repo: source_repo.to_string(),
                source_sha: source_sha.to_string(),
                assets,
                is_coherency_update: false,
                is_code_flow: source_enabled,
            })
            .await
    }

    /// Trigger every subscription that follows a newly published build
    ///
    /// Only enabled subscriptions updated on every build, whose channel the
    /// build is in, are triggered. A failing subscription does not stop the
    /// others; its update stays queued for the next reminder.
    pub async fn on_new_build(&self, build_id: u64) -> Result<Vec<(Uuid, Result<ProcessOutcome>)>> {
        let build = self
            .ctx
            .repository
            .build(build_id)
            .await?
            .ok_or(Error::BuildNotFound(build_id))?;

        let subscriptions: Vec<Subscription> = self
            .ctx
            .repository
            .subscriptions()
            .await?
            .into_iter()
            .filter(|s| {
                s.enabled
                    && s.policy.update_frequency == UpdateFrequency::EveryBuild
                    && build.channels.contains(&s.channel_id)
                    && s.source_repository.eq_ignore_ascii_case(&build.repository)
            })
            .collect();
        info!(build_id, subscriptions = subscriptions.len(), "New build");

        let mut results = Vec::new();
        for subscription in subscriptions {
            let outcome = self
                .update_assets(
                    subscription.id,
                    build.id,
                    &build.repository,
                    &build.commit,
                    build.assets.clone(),
                    subscription.source_enabled,
                )
                .await;
            if let Err(e) = &outcome {
                error!(subscription_id = %subscription.id, build_id, "Failed to apply build: {e}");
            }
            results.push((subscription.id, outcome));
        }
        Ok(results)
    }

    /// Manually trigger a subscription with `build_id`, or its newest build
    ///
    /// Update frequency and the enabled flag are not consulted.
    pub async fn trigger_subscription(
        &self,
        subscription_id: Uuid,
        build_id: Option<u64>,
    ) -> Result<ProcessOutcome> {
        let subscription = self.subscription(subscription_id).await?;

        let build = match build_id {
            Some(id) => self
                .ctx
                .repository
                .build(id)
                .await?
                .ok_or(Error::BuildNotFound(id))?,
            None => self
                .ctx
                .repository
                .latest_build(&subscription.source_repository, subscription.channel_id)
                .await?
                .ok_or_else(|| {
                    Error::Config(format!(
                        "no build of {} on channel {}",
                        subscription.source_repository, subscription.channel_id
                    ))
                })?,
        };
        info!(subscription_id = %subscription_id, build_id = build.id, "Manual trigger");

        self.update_assets(
            subscription.id,
            build.id,
            &build.repository,
            &build.commit,
            build.assets,
            subscription.source_enabled,
        )
        .await
    }

    /// Record a synchronized code flow branch and process queued updates
    pub async fn record_code_flow_status(
        &self,
        subscription_id: Uuid,
        status: CodeFlowStatus,
    ) -> Result<ProcessOutcome> {
        let subscription = self.subscription(subscription_id).await?;
        if !subscription.source_enabled {
            return Err(Error::Config(format!(
                "subscription '{subscription_id}' is not a code flow subscription"
            )));
        }

        let key = ActorKey::for_subscription(&subscription);
        let _guard = self.locks.lock(&key).await;
        let actor = PullRequestActor::new(key, &self.ctx);
        actor.set_code_flow_status(status).await?;
        actor.process_pending_updates().await
    }

    /// Run the pending-update cycle of `key`
    pub async fn process_pending_updates(&self, key: &ActorKey) -> Result<ProcessOutcome> {
        let _guard = self.locks.lock(key).await;
        PullRequestActor::new(key.clone(), &self.ctx)
            .process_pending_updates()
            .await
    }

    /// Run the PR-check cycle of `key`
    pub async fn process_pull_request_check(&self, key: &ActorKey) -> Result<ProcessOutcome> {
        let _guard = self.locks.lock(key).await;
        PullRequestActor::new(key.clone(), &self.ctx)
            .process_pull_request_check()
            .await
    }

    /// Run every reminder due at `now`
    pub async fn fire_due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<FiredReminder>> {
        let mut fired = Vec::new();

        for key in self.ctx.store.keys().await? {
            let record = match self.ctx.store.load(&key).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(actor = %key, "Skipping unreadable record: {e}");
                    continue;
                }
            };
            for kind in record.reminders.due(now) {
                debug!(actor = %key, kind = ?kind, "Reminder due");
                let outcome = match kind {
                    ReminderKind::PendingUpdate => self.process_pending_updates(&key).await,
                    ReminderKind::PullRequestCheck => self.process_pull_request_check(&key).await,
                };
                if let Err(e) = &outcome {
                    error!(actor = %key, kind = ?kind, "Reminder failed: {e}");
                }
                fired.push(FiredReminder {
                    key: key.clone(),
                    kind,
                    outcome,
                });
            }
        }

        Ok(fired)
    }

    /// Fire due reminders every `poll_interval` until `shutdown` completes
    pub async fn run(
        &self,
        poll_interval: Duration,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval = ?poll_interval, "Reminder loop started");
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Reminder loop stopped");
                    return Ok(());
                }
                _ = interval.tick() => {
                    match self.fire_due_reminders(Utc::now()).await {
                        Ok(fired) if !fired.is_empty() => {
                            debug!(count = fired.len(), "Fired reminders");
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Reminder sweep failed, retrying next tick: {e}"),
                    }
                }
            }
        }
    }

    /// Persisted records of all actors
    pub async fn records(&self) -> Result<Vec<ActorRecord>> {
        let mut records = Vec::new();
        for key in self.ctx.store.keys().await? {
            records.push(self.ctx.store.load(&key).await?);
        }
        Ok(records)
    }

    /// State of `key` as the provider currently reports it
    pub async fn actor_state(&self, key: &ActorKey) -> Result<ActorState> {
        let _guard = self.locks.lock(key).await;
        PullRequestActor::new(key.clone(), &self.ctx).state().await
    }
}
