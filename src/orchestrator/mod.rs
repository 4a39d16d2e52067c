//! Pull request orchestration
//!
//! Each actor owns the PR of one subscription, or of all batchable
//! subscriptions targeting the same repository branch. Actor state lives in a
//! [`StateStore`]; a [`KeyedLocks`] entry serializes work on each key, and
//! reminders bring an actor back later instead of blocking.

mod actor;
mod collaborators;
mod dispatcher;
mod events;
mod key;
mod locks;
mod merge_policy;
mod reminders;
mod state;
mod store;

pub use actor::{ActorContext, ActorOptions, ProcessOutcome, PullRequestActor};
pub use collaborators::{
    CatalogRepository, InMemoryMergedBuildNotifier, MergedBuildNotifier, PolicyFailureNotifier,
    SubscriptionRepository, TracingPolicyFailureNotifier,
};
pub use dispatcher::{FiredReminder, Orchestrator};
pub use events::{
    DependencyFlowEvent, DependencyFlowEventSink, FlowEventReason, FlowEventType, NoopEventSink,
    TracingEventSink,
};
pub use key::ActorKey;
pub use locks::KeyedLocks;
pub use merge_policy::{
    BuiltinMergePolicyEvaluator, MergePolicyEvaluation, MergePolicyEvaluator, MergePolicyResult,
    MergePolicyStatus, PolicyOutcome, compare_versions,
};
pub use reminders::{ReminderKind, Reminders};
pub use state::{
    ActorRecord, ActorState, CodeFlowStatus, DependencyUpdateSummary, InProgressPullRequest,
    PendingUpdate, SubscriptionPullRequestUpdate,
};
pub use store::{FileStateStore, InMemoryStateStore, StateStore};
