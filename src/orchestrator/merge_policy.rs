//! Merge policy evaluation
//!
//! Policies gate automatic merging of dependency PRs. The built-in
//! evaluator understands:
//!
//! - `Standard`: `AllChecksSuccessful` plus `NoRequestedChanges`
//! - `AllChecksSuccessful`: every check passed; property `ignoreChecks` lists
//!   check names to skip
//! - `NoRequestedChanges`: no review asks for changes
//! - `DontAutomergeDowngrades`: no dependency moves to a lower version

use crate::error::Result;
use crate::orchestrator::state::InProgressPullRequest;
use crate::platform::GitProvider;
use crate::types::{Check, CheckState, MergePolicyDefinition, ReviewState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyOutcome {
    /// Waiting on checks or reviews
    Pending,
    /// Satisfied
    Success,
    /// Violated
    Failure,
}

/// Result of evaluating one policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePolicyResult {
    /// Policy name
    pub name: String,
    /// Outcome
    pub outcome: PolicyOutcome,
    /// Human-readable detail
    pub message: String,
}

/// Aggregate state of all policies on a PR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergePolicyStatus {
    /// Some policy is still pending and none failed
    Pending,
    /// Every policy succeeded
    Succeeded,
    /// At least one policy failed
    Failed,
    /// The PR has no policies; it is never merged automatically
    NoPolicies,
}

/// Results of evaluating a policy set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePolicyEvaluation {
    /// One entry per evaluated policy
    pub results: Vec<MergePolicyResult>,
}

impl MergePolicyEvaluation {
    /// Aggregate status
    pub fn status(&self) -> MergePolicyStatus {
        if self.results.is_empty() {
            MergePolicyStatus::NoPolicies
        } else if self
            .results
            .iter()
            .any(|r| r.outcome == PolicyOutcome::Failure)
        {
            MergePolicyStatus::Failed
        } else if self
            .results
            .iter()
            .any(|r| r.outcome == PolicyOutcome::Pending)
        {
            MergePolicyStatus::Pending
        } else {
            MergePolicyStatus::Succeeded
        }
    }

    /// Whether the PR may be merged
    pub fn passed(&self) -> bool {
        self.status() == MergePolicyStatus::Succeeded
    }
}

/// Evaluates merge policies against a PR
#[async_trait]
pub trait MergePolicyEvaluator: Send + Sync {
    /// Evaluate `policies` against `pr`
    async fn evaluate(
        &self,
        pr: &InProgressPullRequest,
        policies: &[MergePolicyDefinition],
    ) -> Result<MergePolicyEvaluation>;
}

/// Evaluator for the built-in policies, backed by provider checks and reviews
pub struct BuiltinMergePolicyEvaluator {
    provider: Arc<dyn GitProvider>,
}

impl BuiltinMergePolicyEvaluator {
    /// Create an evaluator that queries `provider`
    pub fn new(provider: Arc<dyn GitProvider>) -> Self {
        Self { provider }
    }
}

const STANDARD: &str = "Standard";
const ALL_CHECKS_SUCCESSFUL: &str = "AllChecksSuccessful";
const NO_REQUESTED_CHANGES: &str = "NoRequestedChanges";
const DONT_AUTOMERGE_DOWNGRADES: &str = "DontAutomergeDowngrades";

#[async_trait]
impl MergePolicyEvaluator for BuiltinMergePolicyEvaluator {
    async fn evaluate(
        &self,
        pr: &InProgressPullRequest,
        policies: &[MergePolicyDefinition],
    ) -> Result<MergePolicyEvaluation> {
        if policies.is_empty() {
            return Ok(MergePolicyEvaluation::default());
        }

        let checks = self.provider.get_checks(&pr.url).await?;
        let reviews = self.provider.get_reviews(&pr.url).await?;
        debug!(pr = %pr.url, checks = checks.len(), reviews = reviews.len(), "Evaluating merge policies");

        let mut results = Vec::new();
        for policy in policies {
            match policy.name.as_str() {
                STANDARD => {
                    results.push(all_checks_successful(&checks, &[]));
                    results.push(no_requested_changes(&reviews));
                }
                ALL_CHECKS_SUCCESSFUL => {
                    results.push(all_checks_successful(&checks, &ignored_checks(policy)));
                }
                NO_REQUESTED_CHANGES => results.push(no_requested_changes(&reviews)),
                DONT_AUTOMERGE_DOWNGRADES => results.push(no_downgrades(pr)),
                other => {
                    warn!(policy = other, "Unknown merge policy");
                    results.push(MergePolicyResult {
                        name: other.to_string(),
                        outcome: PolicyOutcome::Failure,
                        message: format!("Unknown merge policy '{other}'"),
                    });
                }
            }
        }

        Ok(MergePolicyEvaluation { results })
    }
}

fn ignored_checks(policy: &MergePolicyDefinition) -> Vec<String> {
    policy
        .properties
        .get("ignoreChecks")
        .and_then(|v| v.as_array())
        .map(|names| {
            names
                .iter()
                .filter_map(|n| n.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn all_checks_successful(checks: &[Check], ignore: &[String]) -> MergePolicyResult {
    let relevant: Vec<&Check> = checks
        .iter()
        .filter(|c| !ignore.iter().any(|i| i.eq_ignore_ascii_case(&c.name)))
        .collect();

    let failed: Vec<&str> = relevant
        .iter()
        .filter(|c| c.state == CheckState::Failure)
        .map(|c| c.name.as_str())
        .collect();
    let pending = relevant
        .iter()
        .filter(|c| c.state == CheckState::Pending)
        .count();

    let (outcome, message) = if relevant.is_empty() {
        (PolicyOutcome::Pending, "Waiting for checks.".to_string())
    } else if !failed.is_empty() {
        (
            PolicyOutcome::Failure,
            format!("Unsuccessful checks: {}", failed.join(", ")),
        )
    } else if pending > 0 {
        (
            PolicyOutcome::Pending,
            format!("{pending} check(s) still running"),
        )
    } else {
        (PolicyOutcome::Success, "All checks successful.".to_string())
    };

    MergePolicyResult {
        name: ALL_CHECKS_SUCCESSFUL.to_string(),
        outcome,
        message,
    }
}

fn no_requested_changes(reviews: &[ReviewState]) -> MergePolicyResult {
    let blocked = reviews
        .iter()
        .any(|r| matches!(r, ReviewState::ChangesRequested | ReviewState::Rejected));

    MergePolicyResult {
        name: NO_REQUESTED_CHANGES.to_string(),
        outcome: if blocked {
            PolicyOutcome::Failure
        } else {
            PolicyOutcome::Success
        },
        message: if blocked {
            "There are reviews that have requested changes.".to_string()
        } else {
            "No reviews have requested changes.".to_string()
        },
    }
}

fn no_downgrades(pr: &InProgressPullRequest) -> MergePolicyResult {
    let downgrades: Vec<String> = pr
        .required_updates
        .iter()
        .filter(|u| compare_versions(&u.to_version, &u.from_version) == Ordering::Less)
        .map(|u| format!("{} ({} -> {})", u.dependency_name, u.from_version, u.to_version))
        .collect();

    if downgrades.is_empty() {
        MergePolicyResult {
            name: DONT_AUTOMERGE_DOWNGRADES.to_string(),
            outcome: PolicyOutcome::Success,
            message: "No version downgrade detected".to_string(),
        }
    } else {
        MergePolicyResult {
            name: DONT_AUTOMERGE_DOWNGRADES.to_string(),
            outcome: PolicyOutcome::Failure,
            message: format!("Version downgrade detected: {}", downgrades.join(", ")),
        }
    }
}

fn compare_identifier(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()),
    }
}

/// Semantic-version ordering; build metadata is ignored and a prerelease
/// sorts before its release
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let strip = |v: &str| v.split('+').next().unwrap_or_default().to_string();
    let (a, b) = (strip(a), strip(b));
    let (a_release, a_pre) = a.split_once('-').unwrap_or((a.as_str(), ""));
    let (b_release, b_pre) = b.split_once('-').unwrap_or((b.as_str(), ""));

    let a_parts: Vec<&str> = a_release.split('.').collect();
    let b_parts: Vec<&str> = b_release.split('.').collect();
    for i in 0..a_parts.len().max(b_parts.len()) {
        let x = a_parts.get(i).copied().unwrap_or("0");
        let y = b_parts.get(i).copied().unwrap_or("0");
        let ord = compare_identifier(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }

    match (a_pre.is_empty(), b_pre.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let mut x = a_pre.split('.');
            let mut y = b_pre.split('.');
            loop {
                match (x.next(), y.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some(p), Some(q)) => {
                        let ord = compare_identifier(p, q);
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                }
            }
        }
    }
}
