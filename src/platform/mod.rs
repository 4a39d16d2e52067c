//! Git/PR providers for GitHub and GitLab
//!
//! Every operation takes a repository or PR URL, so one provider instance
//! serves any number of repositories. [`ProviderRouter`] dispatches to the
//! right platform by URL.

mod detection;
mod factory;
mod github;
mod gitlab;

pub use detection::{
    HostOverrides, PullRequestRef, detect_platform, parse_pull_request_url, parse_repo_info,
};
pub use factory::{ProviderRouter, create_provider};
pub use github::GitHubService;
pub use gitlab::GitLabService;

use crate::error::Result;
use crate::types::{Check, DependencyDetail, PrStatus, PullRequest, ReviewState};
use async_trait::async_trait;

/// Fields of a PR that depflow creates or rewrites
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestSpec {
    /// PR title
    pub title: String,
    /// PR body
    pub description: String,
    /// Branch to merge into
    pub base_branch: String,
    /// Branch carrying the updates
    pub head_branch: String,
}

/// Git and pull request operations needed by the orchestrator
///
/// Mutating operations must be safe to repeat: callers re-run them after a
/// crash without knowing how far the previous attempt got.
#[async_trait]
pub trait GitProvider: Send + Sync {
    /// Whether `branch` exists in `repo`
    async fn branch_exists(&self, repo: &str, branch: &str) -> Result<bool>;

    /// Create `new_branch` in `repo` at the head of `base`
    async fn create_branch(&self, repo: &str, base: &str, new_branch: &str) -> Result<()>;

    /// Write `updated` into the dependency manifest on `branch` and commit
    ///
    /// An empty `updated` list makes an empty commit carrying `message`.
    /// Returns the SHAs of the new commits.
    async fn commit_updates(
        &self,
        repo: &str,
        branch: &str,
        updated: &[DependencyDetail],
        message: &str,
    ) -> Result<Vec<String>>;

    /// Open a PR and return its URL
    async fn create_pull_request(&self, repo: &str, spec: &PullRequestSpec) -> Result<String>;

    /// Rewrite title, body and branches of an existing PR
    async fn update_pull_request(&self, url: &str, spec: &PullRequestSpec) -> Result<()>;

    /// Current state of a PR
    async fn get_pull_request(&self, url: &str) -> Result<PullRequest>;

    /// URL of the open PR whose head is `head_branch`, if any
    async fn find_pull_request(&self, repo: &str, head_branch: &str) -> Result<Option<String>>;

    /// Whether the PR is still open, and if so whether it may be pushed to
    async fn synchronize(&self, url: &str) -> Result<PrStatus>;

    /// Dependency manifest of `repo` at `git_ref` (branch or commit)
    async fn get_dependencies(&self, repo: &str, git_ref: &str) -> Result<Vec<DependencyDetail>>;

    /// Merge an open PR
    async fn merge_pull_request(&self, url: &str, commit_message: &str) -> Result<()>;

    /// Delete `branch` from `repo`
    async fn delete_branch(&self, repo: &str, branch: &str) -> Result<()>;

    /// CI checks reported on the PR's head commit
    async fn get_checks(&self, url: &str) -> Result<Vec<Check>>;

    /// Review states left on the PR
    async fn get_reviews(&self, url: &str) -> Result<Vec<ReviewState>>;

    /// Content of `path` in `repo` at `git_ref`, `None` when the file does not exist
    async fn get_file_contents(&self, repo: &str, git_ref: &str, path: &str)
    -> Result<Option<String>>;
}
