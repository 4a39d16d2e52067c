//! Test data factories for depflow types
//!
//! These are test utilities - not all may be used in current tests but are
//! available for future test development.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use depflow::config::Catalog;
use depflow::types::{
    Asset, Build, Channel, DependencyDetail, DependencyType, MergePolicyDefinition, Subscription,
    SubscriptionPolicy, UpdateFrequency,
};
use uuid::Uuid;

pub const CHANNEL_ID: u64 = 1;
pub const TARGET_REPO: &str = "https://github.com/dotnet/runtime";
pub const TARGET_BRANCH: &str = "main";
pub const FOO_REPO: &str = "https://github.com/dotnet/foo";
pub const BAR_REPO: &str = "https://github.com/dotnet/bar";

/// Create an enabled subscription updated on every build
pub fn make_subscription(source: &str, target: &str, branch: &str) -> Subscription {
    Subscription {
        id: Uuid::new_v4(),
        channel_id: CHANNEL_ID,
        source_repository: source.to_string(),
        target_repository: target.to_string(),
        target_branch: branch.to_string(),
        enabled: true,
        policy: SubscriptionPolicy {
            batchable: false,
            update_frequency: UpdateFrequency::EveryBuild,
            merge_policies: vec![],
        },
        excluded_assets: vec![],
        pull_request_failure_notification_tags: None,
        source_enabled: false,
        source_directory: None,
        target_directory: None,
        last_applied_build_id: None,
    }
}

/// Create a batchable subscription into the default target
pub fn make_batchable_subscription(source: &str) -> Subscription {
    let mut subscription = make_subscription(source, TARGET_REPO, TARGET_BRANCH);
    subscription.policy.batchable = true;
    subscription
}

/// Create a subscription gated by the named merge policies
pub fn make_subscription_with_policies(source: &str, policies: &[&str]) -> Subscription {
    let mut subscription = make_subscription(source, TARGET_REPO, TARGET_BRANCH);
    subscription.policy.merge_policies = policies
        .iter()
        .map(|name| MergePolicyDefinition::named(*name))
        .collect();
    subscription
}

/// Create a backflow subscription from `source_directory` of the VMR
pub fn make_backflow_subscription(vmr: &str, source_directory: &str) -> Subscription {
    let mut subscription = make_subscription(vmr, TARGET_REPO, TARGET_BRANCH);
    subscription.source_enabled = true;
    subscription.source_directory = Some(source_directory.to_string());
    subscription
}

/// Create an asset with no locations
pub fn make_asset(name: &str, version: &str) -> Asset {
    Asset {
        name: name.to_string(),
        version: version.to_string(),
        non_shipping: false,
        locations: vec![],
    }
}

/// Create a build of `repo` at `commit` published to the default channel
pub fn make_build(id: u64, repo: &str, commit: &str, assets: Vec<Asset>) -> Build {
    Build {
        id,
        repository: repo.to_string(),
        commit: commit.to_string(),
        branch: Some("main".to_string()),
        build_number: format!("20240101.{id}"),
        date_produced: Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
            + chrono::Duration::minutes(i64::try_from(id).unwrap_or_default()),
        assets,
        channels: vec![CHANNEL_ID],
    }
}

/// Create a product dependency
pub fn make_dependency(name: &str, version: &str, repo: &str, commit: &str) -> DependencyDetail {
    DependencyDetail {
        name: name.to_string(),
        version: version.to_string(),
        repo_uri: repo.to_string(),
        commit: commit.to_string(),
        pinned: false,
        coherent_parent_dependency_name: None,
        dependency_type: DependencyType::Product,
        locations: vec![],
    }
}

/// Create a dependency that follows `parent`
pub fn make_coherent_dependency(
    name: &str,
    version: &str,
    repo: &str,
    commit: &str,
    parent: &str,
) -> DependencyDetail {
    DependencyDetail {
        coherent_parent_dependency_name: Some(parent.to_string()),
        ..make_dependency(name, version, repo, commit)
    }
}

/// Create a catalog with the default channel
pub fn make_catalog(subscriptions: Vec<Subscription>, builds: Vec<Build>) -> Catalog {
    Catalog {
        channels: vec![Channel {
            id: CHANNEL_ID,
            name: ".NET 9".to_string(),
        }],
        subscriptions,
        builds,
        repository_policies: vec![],
    }
}
