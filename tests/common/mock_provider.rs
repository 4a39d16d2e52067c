//! Mock git provider for testing
//!
//! These are test utilities - not all may be used in current tests but are
//! available for future test development.

#![allow(dead_code)]

use async_trait::async_trait;
use depflow::error::{Error, Result};
use depflow::platform::{GitProvider, PullRequestSpec};
use depflow::types::{Check, DependencyDetail, PrStatus, PullRequest, ReviewState};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Call record for `commit_updates`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitCall {
    pub repo: String,
    pub branch: String,
    pub updated: Vec<DependencyDetail>,
    pub message: String,
}

/// Call record for `create_pull_request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePrCall {
    pub repo: String,
    pub spec: PullRequestSpec,
}

/// Call record for `update_pull_request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePrCall {
    pub url: String,
    pub spec: PullRequestSpec,
}

#[derive(Debug, Clone)]
struct StoredPr {
    repo: String,
    spec: PullRequestSpec,
    status: PrStatus,
}

/// In-memory provider for testing
///
/// Keeps one dependency manifest per `(repo, ref)`. Creating a branch copies
/// the manifest of its base, and commits write into the branch manifest, so
/// a sequence of orchestrator calls sees its own earlier writes.
///
/// Features:
/// - Auto-incrementing PR numbers
/// - Scripted PR statuses, checks and reviews
/// - Call tracking for verification
/// - Error injection for failure path testing
pub struct MockGitProvider {
    next_pr_number: AtomicU64,
    manifests: Mutex<HashMap<(String, String), Vec<DependencyDetail>>>,
    branches: Mutex<HashSet<(String, String)>>,
    files: Mutex<HashMap<(String, String, String), String>>,
    prs: Mutex<HashMap<String, StoredPr>>,
    checks: Mutex<Vec<Check>>,
    reviews: Mutex<Vec<ReviewState>>,
    // Call tracking
    synchronize_calls: Mutex<Vec<String>>,
    create_branch_calls: Mutex<Vec<(String, String)>>,
    commit_calls: Mutex<Vec<CommitCall>>,
    create_pr_calls: Mutex<Vec<CreatePrCall>>,
    update_pr_calls: Mutex<Vec<UpdatePrCall>>,
    merge_calls: Mutex<Vec<String>>,
    delete_branch_calls: Mutex<Vec<(String, String)>>,
    // Error injection
    error_on_create_pr: Mutex<Option<String>>,
    error_on_commit: Mutex<Option<String>>,
    error_on_delete_branch: Mutex<Option<String>>,
}

impl Default for MockGitProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGitProvider {
    /// Empty provider
    pub fn new() -> Self {
        Self {
            next_pr_number: AtomicU64::new(1),
            manifests: Mutex::new(HashMap::new()),
            branches: Mutex::new(HashSet::new()),
            files: Mutex::new(HashMap::new()),
            prs: Mutex::new(HashMap::new()),
            checks: Mutex::new(Vec::new()),
            reviews: Mutex::new(Vec::new()),
            synchronize_calls: Mutex::new(Vec::new()),
            create_branch_calls: Mutex::new(Vec::new()),
            commit_calls: Mutex::new(Vec::new()),
            create_pr_calls: Mutex::new(Vec::new()),
            update_pr_calls: Mutex::new(Vec::new()),
            merge_calls: Mutex::new(Vec::new()),
            delete_branch_calls: Mutex::new(Vec::new()),
            error_on_create_pr: Mutex::new(None),
            error_on_commit: Mutex::new(None),
            error_on_delete_branch: Mutex::new(None),
        }
    }

    // === Setup methods ===

    /// Set the manifest of `repo` at `git_ref` and mark the ref as a branch
    pub fn set_dependencies(&self, repo: &str, git_ref: &str, deps: Vec<DependencyDetail>) {
        self.manifests
            .lock()
            .unwrap()
            .insert((repo.to_string(), git_ref.to_string()), deps);
        self.add_branch(repo, git_ref);
    }

    /// Make `branch` exist in `repo`
    pub fn add_branch(&self, repo: &str, branch: &str) {
        self.branches
            .lock()
            .unwrap()
            .insert((repo.to_string(), branch.to_string()));
    }

    /// Set the content of a file
    pub fn set_file(&self, repo: &str, git_ref: &str, path: &str, content: &str) {
        self.files.lock().unwrap().insert(
            (repo.to_string(), git_ref.to_string(), path.to_string()),
            content.to_string(),
        );
    }

    /// Set what `synchronize` reports for `url`
    pub fn set_status(&self, url: &str, status: PrStatus) {
        if let Some(pr) = self.prs.lock().unwrap().get_mut(url) {
            pr.status = status;
        }
    }

    /// Set the checks reported on every PR
    pub fn set_checks(&self, checks: Vec<Check>) {
        *self.checks.lock().unwrap() = checks;
    }

    /// Set the reviews reported on every PR
    pub fn set_reviews(&self, reviews: Vec<ReviewState>) {
        *self.reviews.lock().unwrap() = reviews;
    }

    // === Error injection methods ===

    /// Make `create_pull_request` return an error
    pub fn fail_create_pr(&self, msg: &str) {
        *self.error_on_create_pr.lock().unwrap() = Some(msg.to_string());
    }

    /// Stop injecting errors
    pub fn clear_failures(&self) {
        *self.error_on_create_pr.lock().unwrap() = None;
        *self.error_on_commit.lock().unwrap() = None;
        *self.error_on_delete_branch.lock().unwrap() = None;
    }

    /// Make `commit_updates` return an error
    pub fn fail_commit(&self, msg: &str) {
        *self.error_on_commit.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `delete_branch` return an error
    pub fn fail_delete_branch(&self, msg: &str) {
        *self.error_on_delete_branch.lock().unwrap() = Some(msg.to_string());
    }

    // === Call verification methods ===

    /// Current manifest of `repo` at `git_ref`
    pub fn dependencies(&self, repo: &str, git_ref: &str) -> Vec<DependencyDetail> {
        self.manifests
            .lock()
            .unwrap()
            .get(&(repo.to_string(), git_ref.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Current title and body of the PR at `url`
    pub fn pull_request(&self, url: &str) -> Option<PullRequestSpec> {
        self.prs.lock().unwrap().get(url).map(|pr| pr.spec.clone())
    }

    /// URLs of every PR that was actually opened
    pub fn pull_request_urls(&self) -> Vec<String> {
        self.prs.lock().unwrap().keys().cloned().collect()
    }

    pub fn get_synchronize_calls(&self) -> Vec<String> {
        self.synchronize_calls.lock().unwrap().clone()
    }

    pub fn get_create_branch_calls(&self) -> Vec<(String, String)> {
        self.create_branch_calls.lock().unwrap().clone()
    }

    pub fn get_commit_calls(&self) -> Vec<CommitCall> {
        self.commit_calls.lock().unwrap().clone()
    }

    pub fn get_create_pr_calls(&self) -> Vec<CreatePrCall> {
        self.create_pr_calls.lock().unwrap().clone()
    }

    pub fn get_update_pr_calls(&self) -> Vec<UpdatePrCall> {
        self.update_pr_calls.lock().unwrap().clone()
    }

    pub fn get_merge_calls(&self) -> Vec<String> {
        self.merge_calls.lock().unwrap().clone()
    }

    pub fn get_delete_branch_calls(&self) -> Vec<(String, String)> {
        self.delete_branch_calls.lock().unwrap().clone()
    }

    /// Number of calls that changed a repository or PR
    pub fn mutation_count(&self) -> usize {
        self.get_create_branch_calls().len()
            + self.get_commit_calls().len()
            + self.get_create_pr_calls().len()
            + self.get_update_pr_calls().len()
            + self.get_merge_calls().len()
            + self.get_delete_branch_calls().len()
    }

    /// Assert that exactly one PR was opened, and return its URL
    pub fn assert_single_pr_created(&self) -> String {
        let calls = self.get_create_pr_calls();
        assert_eq!(calls.len(), 1, "Expected one create_pull_request but got: {calls:?}");
        let prs = self.prs.lock().unwrap();
        let url = prs
            .iter()
            .find(|(_, pr)| pr.spec == calls[0].spec)
            .map(|(url, _)| url.clone());
        url.expect("created PR is stored")
    }

    /// Assert that `branch` of `repo` was deleted
    pub fn assert_branch_deleted(&self, repo: &str, branch: &str) {
        let calls = self.get_delete_branch_calls();
        assert!(
            calls.iter().any(|(r, b)| r == repo && b == branch),
            "Expected delete_branch({repo}, {branch}) but got: {calls:?}"
        );
    }

    fn stored(&self, url: &str) -> Result<StoredPr> {
        self.prs
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Platform(format!("unknown pull request: {url}")))
    }
}

#[async_trait]
impl GitProvider for MockGitProvider {
    async fn branch_exists(&self, repo: &str, branch: &str) -> Result<bool> {
        Ok(self
            .branches
            .lock()
            .unwrap()
            .contains(&(repo.to_string(), branch.to_string())))
    }

    async fn create_branch(&self, repo: &str, base: &str, new_branch: &str) -> Result<()> {
        self.create_branch_calls
            .lock()
            .unwrap()
            .push((repo.to_string(), new_branch.to_string()));
        let base_deps = self.dependencies(repo, base);
        self.set_dependencies(repo, new_branch, base_deps);
        Ok(())
    }

    async fn commit_updates(
        &self,
        repo: &str,
        branch: &str,
        updated: &[DependencyDetail],
        message: &str,
    ) -> Result<Vec<String>> {
        self.commit_calls.lock().unwrap().push(CommitCall {
            repo: repo.to_string(),
            branch: branch.to_string(),
            updated: updated.to_vec(),
            message: message.to_string(),
        });

        if let Some(msg) = self.error_on_commit.lock().unwrap().as_ref() {
            return Err(Error::Platform(msg.clone()));
        }

        let mut manifests = self.manifests.lock().unwrap();
        let deps = manifests
            .entry((repo.to_string(), branch.to_string()))
            .or_default();
        for update in updated {
            if let Some(dep) = deps
                .iter_mut()
                .find(|d| d.name.eq_ignore_ascii_case(&update.name))
            {
                *dep = update.clone();
            }
        }
        let count = self.commit_calls.lock().unwrap().len();
        Ok(vec![format!("commit{count}")])
    }

    async fn create_pull_request(&self, repo: &str, spec: &PullRequestSpec) -> Result<String> {
        self.create_pr_calls.lock().unwrap().push(CreatePrCall {
            repo: repo.to_string(),
            spec: spec.clone(),
        });

        if let Some(msg) = self.error_on_create_pr.lock().unwrap().as_ref() {
            return Err(Error::Platform(msg.clone()));
        }

        let number = self.next_pr_number.fetch_add(1, Ordering::SeqCst);
        let url = format!("{repo}/pull/{number}");
        self.prs.lock().unwrap().insert(
            url.clone(),
            StoredPr {
                repo: repo.to_string(),
                spec: spec.clone(),
                status: PrStatus::CanUpdate,
            },
        );
        Ok(url)
    }

    async fn update_pull_request(&self, url: &str, spec: &PullRequestSpec) -> Result<()> {
        self.update_pr_calls.lock().unwrap().push(UpdatePrCall {
            url: url.to_string(),
            spec: spec.clone(),
        });
        let mut prs = self.prs.lock().unwrap();
        let pr = prs
            .get_mut(url)
            .ok_or_else(|| Error::Platform(format!("unknown pull request: {url}")))?;
        pr.spec = spec.clone();
        Ok(())
    }

    async fn get_pull_request(&self, url: &str) -> Result<PullRequest> {
        let pr = self.stored(url)?;
        Ok(PullRequest {
            url: url.to_string(),
            title: pr.spec.title,
            description: pr.spec.description,
            base_branch: pr.spec.base_branch,
            head_branch: pr.spec.head_branch,
        })
    }

    async fn find_pull_request(&self, repo: &str, head_branch: &str) -> Result<Option<String>> {
        Ok(self
            .prs
            .lock()
            .unwrap()
            .iter()
            .find(|(_, pr)| {
                pr.repo == repo
                    && pr.spec.head_branch == head_branch
                    && matches!(pr.status, PrStatus::CanUpdate | PrStatus::CannotUpdate)
            })
            .map(|(url, _)| url.clone()))
    }

    async fn synchronize(&self, url: &str) -> Result<PrStatus> {
        self.synchronize_calls.lock().unwrap().push(url.to_string());
        Ok(self
            .prs
            .lock()
            .unwrap()
            .get(url)
            .map_or(PrStatus::NotFound, |pr| pr.status))
    }

    async fn get_dependencies(&self, repo: &str, git_ref: &str) -> Result<Vec<DependencyDetail>> {
        Ok(self.dependencies(repo, git_ref))
    }

    async fn merge_pull_request(&self, url: &str, _commit_message: &str) -> Result<()> {
        self.merge_calls.lock().unwrap().push(url.to_string());
        self.set_status(url, PrStatus::Merged);
        Ok(())
    }

    async fn delete_branch(&self, repo: &str, branch: &str) -> Result<()> {
        self.delete_branch_calls
            .lock()
            .unwrap()
            .push((repo.to_string(), branch.to_string()));

        if let Some(msg) = self.error_on_delete_branch.lock().unwrap().as_ref() {
            return Err(Error::Platform(msg.clone()));
        }

        self.branches
            .lock()
            .unwrap()
            .remove(&(repo.to_string(), branch.to_string()));
        Ok(())
    }

    async fn get_checks(&self, _url: &str) -> Result<Vec<Check>> {
        Ok(self.checks.lock().unwrap().clone())
    }

    async fn get_reviews(&self, _url: &str) -> Result<Vec<ReviewState>> {
        Ok(self.reviews.lock().unwrap().clone())
    }

    async fn get_file_contents(
        &self,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(&(repo.to_string(), git_ref.to_string(), path.to_string()))
            .cloned())
    }
}
