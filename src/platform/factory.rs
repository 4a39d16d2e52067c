//! Provider construction and per-platform routing
//!
//! The orchestrator works against a single [`GitProvider`]; subscriptions
//! may point at GitHub and GitLab repositories alike, so the router picks
//! the platform service from each URL.

use crate::auth::resolve_auth;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::platform::detection::{HostOverrides, detect_platform, parse_pull_request_url};
use crate::platform::{GitHubService, GitLabService, GitProvider, PullRequestSpec};
use crate::types::{Check, DependencyDetail, Platform, PrStatus, PullRequest, ReviewState};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// A [`GitProvider`] that dispatches to GitHub or GitLab by URL
#[derive(Clone, Default)]
pub struct ProviderRouter {
    github: Option<Arc<dyn GitProvider>>,
    gitlab: Option<Arc<dyn GitProvider>>,
    hosts: HostOverrides,
}

impl ProviderRouter {
    /// Empty router; URLs are matched against `hosts` plus the public hosts
    pub fn new(hosts: HostOverrides) -> Self {
        Self {
            github: None,
            gitlab: None,
            hosts,
        }
    }

    /// Register the provider used for `platform`
    #[must_use]
    pub fn with(mut self, platform: Platform, provider: Arc<dyn GitProvider>) -> Self {
        match platform {
            Platform::GitHub => self.github = Some(provider),
            Platform::GitLab => self.gitlab = Some(provider),
        }
        self
    }

    /// Platforms that have a provider registered
    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms = Vec::new();
        if self.github.is_some() {
            platforms.push(Platform::GitHub);
        }
        if self.gitlab.is_some() {
            platforms.push(Platform::GitLab);
        }
        platforms
    }

    fn for_platform(&self, platform: Platform, url: &str) -> Result<&dyn GitProvider> {
        let provider = match platform {
            Platform::GitHub => self.github.as_deref(),
            Platform::GitLab => self.gitlab.as_deref(),
        };
        provider.ok_or_else(|| {
            Error::Platform(format!("no {platform} credentials configured for {url}"))
        })
    }

    fn repo(&self, url: &str) -> Result<&dyn GitProvider> {
        let platform = detect_platform(url, &self.hosts)
            .ok_or_else(|| Error::UnsupportedRepository(url.to_string()))?;
        self.for_platform(platform, url)
    }

    fn pull(&self, url: &str) -> Result<&dyn GitProvider> {
        let pr = parse_pull_request_url(url, &self.hosts)?;
        self.for_platform(pr.repo.platform, url)
    }
}

#[async_trait]
impl GitProvider for ProviderRouter {
    async fn branch_exists(&self, repo: &str, branch: &str) -> Result<bool> {
        self.repo(repo)?.branch_exists(repo, branch).await
    }

    async fn create_branch(&self, repo: &str, base: &str, new_branch: &str) -> Result<()> {
        self.repo(repo)?.create_branch(repo, base, new_branch).await
    }

    async fn commit_updates(
        &self,
        repo: &str,
        branch: &str,
        updated: &[DependencyDetail],
        message: &str,
    ) -> Result<Vec<String>> {
        self.repo(repo)?
            .commit_updates(repo, branch, updated, message)
            .await
    }

    async fn create_pull_request(&self, repo: &str, spec: &PullRequestSpec) -> Result<String> {
        self.repo(repo)?.create_pull_request(repo, spec).await
    }

    async fn update_pull_request(&self, url: &str, spec: &PullRequestSpec) -> Result<()> {
        self.pull(url)?.update_pull_request(url, spec).await
    }

    async fn get_pull_request(&self, url: &str) -> Result<PullRequest> {
        self.pull(url)?.get_pull_request(url).await
    }

    async fn find_pull_request(&self, repo: &str, head_branch: &str) -> Result<Option<String>> {
        self.repo(repo)?.find_pull_request(repo, head_branch).await
    }

    async fn synchronize(&self, url: &str) -> Result<PrStatus> {
        self.pull(url)?.synchronize(url).await
    }

    async fn get_dependencies(&self, repo: &str, git_ref: &str) -> Result<Vec<DependencyDetail>> {
        self.repo(repo)?.get_dependencies(repo, git_ref).await
    }

    async fn merge_pull_request(&self, url: &str, commit_message: &str) -> Result<()> {
        self.pull(url)?.merge_pull_request(url, commit_message).await
    }

    async fn delete_branch(&self, repo: &str, branch: &str) -> Result<()> {
        self.repo(repo)?.delete_branch(repo, branch).await
    }

    async fn get_checks(&self, url: &str) -> Result<Vec<Check>> {
        self.pull(url)?.get_checks(url).await
    }

    async fn get_reviews(&self, url: &str) -> Result<Vec<ReviewState>> {
        self.pull(url)?.get_reviews(url).await
    }

    async fn get_file_contents(
        &self,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<String>> {
        self.repo(repo)?.get_file_contents(repo, git_ref, path).await
    }
}

/// Build a router for every platform whose credentials resolve
///
/// Fails only when neither GitHub nor GitLab authentication is available.
pub async fn create_provider(settings: &Settings) -> Result<ProviderRouter> {
    let hosts = HostOverrides {
        github: settings.github_host.clone(),
        gitlab: settings.gitlab_host.clone(),
    }
    .or(HostOverrides::from_env());

    let mut router = ProviderRouter::new(hosts.clone());
    let mut failures = Vec::new();

    match resolve_auth(
        Platform::GitHub,
        settings.github_token.as_deref(),
        hosts.github.as_deref(),
    )
    .await
    {
        Ok(auth) => {
            debug!(host = %auth.host, source = ?auth.source, "GitHub credentials resolved");
            let service = GitHubService::new(
                &auth.token,
                hosts.github.clone(),
                settings.dependency_manifest_path.clone(),
            )?;
            router = router.with(Platform::GitHub, Arc::new(service));
        }
        Err(e) => failures.push(e.to_string()),
    }

    match resolve_auth(
        Platform::GitLab,
        settings.gitlab_token.as_deref(),
        hosts.gitlab.as_deref(),
    )
    .await
    {
        Ok(auth) => {
            debug!(host = %auth.host, source = ?auth.source, "GitLab credentials resolved");
            let service = GitLabService::new(
                auth.token,
                hosts.gitlab.clone(),
                settings.dependency_manifest_path.clone(),
            );
            router = router.with(Platform::GitLab, Arc::new(service));
        }
        Err(e) => failures.push(e.to_string()),
    }

    if router.platforms().is_empty() {
        return Err(Error::Auth(failures.join("; ")));
    }
    for failure in &failures {
        warn!("{failure}");
    }
    Ok(router)
}
