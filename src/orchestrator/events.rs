//! Dependency flow events
//!
//! Events record when a subscription's build entered a PR and how that PR
//! ended. Recording is fire-and-forget: a sink cannot fail the actor.

use crate::orchestrator::merge_policy::MergePolicyStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Lifecycle stage of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEventType {
    /// A PR started carrying the build
    Created,
    /// A PR carrying the build was updated
    Updated,
    /// Flow of the build finished
    Completed,
}

/// Why the event happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEventReason {
    /// Build added to a PR
    New,
    /// Build superseded by a newer one before its PR merged
    FailedUpdate,
    /// Merged by the orchestrator after policies passed
    AutomaticallyMerged,
    /// Merged by someone else
    ManuallyMerged,
    /// Closed without merging
    ManuallyClosed,
    /// The build required no changes
    NothingToDo,
}

/// One dependency flow event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyFlowEvent {
    /// Build the event is about
    pub build_id: u64,
    /// Subscription the build flowed through
    pub subscription_id: Uuid,
    /// Lifecycle stage
    pub event_type: FlowEventType,
    /// Reason
    pub reason: FlowEventReason,
    /// Last merge policy result of the PR, if evaluated
    pub merge_policy_result: Option<MergePolicyStatus>,
    /// Actor that emitted the event
    pub actor: String,
    /// PR the build is in, if any
    pub pull_request_url: Option<String>,
}

/// Receives dependency flow events
#[async_trait]
pub trait DependencyFlowEventSink: Send + Sync {
    /// Record `event`
    async fn record(&self, event: DependencyFlowEvent);
}

/// Sink that drops every event
pub struct NoopEventSink;

#[async_trait]
impl DependencyFlowEventSink for NoopEventSink {
    async fn record(&self, _event: DependencyFlowEvent) {}
}

/// Sink that writes events to the log
pub struct TracingEventSink;

#[async_trait]
impl DependencyFlowEventSink for TracingEventSink {
    async fn record(&self, event: DependencyFlowEvent) {
        info!(
            build_id = event.build_id,
            subscription_id = %event.subscription_id,
            event_type = ?event.event_type,
            reason = ?event.reason,
            merge_policy = ?event.merge_policy_result,
            actor = %event.actor,
            pr = event.pull_request_url.as_deref().unwrap_or("-"),
            "Dependency flow event"
        );
    }
}
