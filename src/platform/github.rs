//! GitHub provider implementation

use crate::error::{Error, Result};
use crate::manifest::DependencyManifest;
use crate::platform::detection::{HostOverrides, parse_pull_request_url, parse_repo_info};
use crate::platform::{GitProvider, PullRequestSpec};
use crate::types::{
    Check, CheckState, DependencyDetail, PlatformConfig, PrStatus, PullRequest, ReviewState,
};
use async_trait::async_trait;
use octocrab::Octocrab;
use octocrab::models::IssueState;
use octocrab::models::repos::Object;
use octocrab::params::pulls::MergeMethod;
use octocrab::params::repos::Reference;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// GitHub provider using octocrab
pub struct GitHubService {
    client: Octocrab,
    hosts: HostOverrides,
    manifest_path: String,
}

#[derive(Deserialize)]
struct GitCommit {
    tree: GitTree,
}

#[derive(Deserialize)]
struct GitTree {
    sha: String,
}

#[derive(Deserialize)]
struct CreatedCommit {
    sha: String,
}

#[derive(Serialize)]
struct CreateCommitPayload<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Serialize)]
struct UpdateRefPayload<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Deserialize)]
struct CheckRuns {
    check_runs: Vec<CheckRun>,
}

#[derive(Deserialize)]
struct CheckRun {
    name: String,
    status: String,
    conclusion: Option<String>,
}

#[derive(Deserialize)]
struct CombinedStatus {
    statuses: Vec<CommitStatus>,
}

#[derive(Deserialize)]
struct CommitStatus {
    context: String,
    state: String,
}

#[derive(Deserialize)]
struct Review {
    state: String,
}

fn is_not_found(err: &octocrab::Error) -> bool {
    matches!(err, octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404)
}

impl GitHubService {
    /// Create a new GitHub provider
    ///
    /// `host` is the GitHub Enterprise host; `None` means github.com.
    pub fn new(token: &str, host: Option<String>, manifest_path: impl Into<String>) -> Result<Self> {
        let mut builder = Octocrab::builder().personal_token(token.to_string());

        if let Some(ref h) = host {
            let base_url = format!("https://{h}/api/v3");
            builder = builder
                .base_uri(&base_url)
                .map_err(|e| Error::GitHubApi(e.to_string()))?;
        }

        let client = builder.build().map_err(|e| Error::GitHubApi(e.to_string()))?;

        Ok(Self {
            client,
            hosts: HostOverrides {
                github: host,
                gitlab: None,
            }
            .or(HostOverrides::from_env()),
            manifest_path: manifest_path.into(),
        })
    }

    fn repo(&self, url: &str) -> Result<PlatformConfig> {
        parse_repo_info(url, &self.hosts)
    }

    async fn branch_sha(&self, repo: &PlatformConfig, branch: &str) -> Result<Option<String>> {
        let reference = self
            .client
            .repos(&repo.owner, &repo.repo)
            .get_ref(&Reference::Branch(branch.to_string()))
            .await;

        match reference {
            Ok(r) => match r.object {
                Object::Commit { sha, .. } | Object::Tag { sha, .. } => Ok(Some(sha)),
                #[allow(unreachable_patterns)]
                _ => Err(Error::GitHubApi(format!(
                    "unexpected ref object for branch {branch}"
                ))),
            },
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn empty_commit(&self, repo: &PlatformConfig, branch: &str, message: &str) -> Result<String> {
        let head = self
            .branch_sha(repo, branch)
            .await?
            .ok_or_else(|| Error::GitHubApi(format!("branch {branch} does not exist")))?;

        let parent: GitCommit = self
            .client
            .get(
                format!("/repos/{}/{}/git/commits/{head}", repo.owner, repo.repo),
                None::<&()>,
            )
            .await?;

        let created: CreatedCommit = self
            .client
            .post(
                format!("/repos/{}/{}/git/commits", repo.owner, repo.repo),
                Some(&CreateCommitPayload {
                    message,
                    tree: &parent.tree.sha,
                    parents: vec![&head],
                }),
            )
            .await?;

        let _: serde_json::Value = self
            .client
            .patch(
                format!("/repos/{}/{}/git/refs/heads/{branch}", repo.owner, repo.repo),
                Some(&UpdateRefPayload {
                    sha: &created.sha,
                    force: false,
                }),
            )
            .await?;

        Ok(created.sha)
    }

    async fn pull(&self, url: &str) -> Result<(PlatformConfig, octocrab::models::pulls::PullRequest)> {
        let pr_ref = parse_pull_request_url(url, &self.hosts)?;
        let pr = self
            .client
            .pulls(&pr_ref.repo.owner, &pr_ref.repo.repo)
            .get(pr_ref.number)
            .await?;
        Ok((pr_ref.repo, pr))
    }
}

fn pr_url(pr: &octocrab::models::pulls::PullRequest) -> String {
    pr.html_url
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default()
}

fn check_run_state(run: &CheckRun) -> CheckState {
    if run.status != "completed" {
        return CheckState::Pending;
    }
    match run.conclusion.as_deref() {
        Some("success" | "neutral" | "skipped") => CheckState::Success,
        _ => CheckState::Failure,
    }
}

fn status_state(state: &str) -> CheckState {
    match state {
        "success" => CheckState::Success,
        "pending" => CheckState::Pending,
        _ => CheckState::Failure,
    }
}

#[async_trait]
impl GitProvider for GitHubService {
    async fn branch_exists(&self, repo: &str, branch: &str) -> Result<bool> {
        let repo = self.repo(repo)?;
        Ok(self.branch_sha(&repo, branch).await?.is_some())
    }

    async fn create_branch(&self, repo: &str, base: &str, new_branch: &str) -> Result<()> {
        let repo = self.repo(repo)?;
        if self.branch_sha(&repo, new_branch).await?.is_some() {
            debug!(branch = new_branch, "Branch already exists");
            return Ok(());
        }

        let sha = self
            .branch_sha(&repo, base)
            .await?
            .ok_or_else(|| Error::GitHubApi(format!("base branch {base} does not exist")))?;

        self.client
            .repos(&repo.owner, &repo.repo)
            .create_ref(&Reference::Branch(new_branch.to_string()), sha)
            .await?;
        Ok(())
    }

    async fn commit_updates(
        &self,
        repo: &str,
        branch: &str,
        updated: &[DependencyDetail],
        message: &str,
    ) -> Result<Vec<String>> {
        let config = self.repo(repo)?;

        if updated.is_empty() {
            return Ok(vec![self.empty_commit(&config, branch, message).await?]);
        }

        let content = self
            .client
            .repos(&config.owner, &config.repo)
            .get_content()
            .path(&self.manifest_path)
            .r#ref(branch)
            .send()
            .await?;
        let file = content.items.into_iter().next().ok_or_else(|| {
            Error::GitHubApi(format!("{} not found in {repo}", self.manifest_path))
        })?;
        let text = file.decoded_content().unwrap_or_default();

        let mut manifest = DependencyManifest::from_json(&text)?;
        if manifest.apply(updated) == 0 {
            return Ok(vec![self.empty_commit(&config, branch, message).await?]);
        }

        self.client
            .repos(&config.owner, &config.repo)
            .update_file(&self.manifest_path, message, manifest.to_json()?, file.sha)
            .branch(branch)
            .send()
            .await?;

        let head = self.branch_sha(&config, branch).await?;
        Ok(head.into_iter().collect())
    }

    async fn create_pull_request(&self, repo: &str, spec: &PullRequestSpec) -> Result<String> {
        let repo = self.repo(repo)?;
        let pr = self
            .client
            .pulls(&repo.owner, &repo.repo)
            .create(&spec.title, &spec.head_branch, &spec.base_branch)
            .body(&spec.description)
            .send()
            .await?;
        Ok(pr_url(&pr))
    }

    async fn update_pull_request(&self, url: &str, spec: &PullRequestSpec) -> Result<()> {
        let pr_ref = parse_pull_request_url(url, &self.hosts)?;
        self.client
            .pulls(&pr_ref.repo.owner, &pr_ref.repo.repo)
            .update(pr_ref.number)
            .title(&spec.title)
            .body(&spec.description)
            .base(&spec.base_branch)
            .send()
            .await?;
        Ok(())
    }

    async fn get_pull_request(&self, url: &str) -> Result<PullRequest> {
        let (_, pr) = self.pull(url).await?;
        Ok(PullRequest {
            url: pr_url(&pr),
            title: pr.title.clone().unwrap_or_default(),
            description: pr.body.clone().unwrap_or_default(),
            base_branch: pr.base.ref_field.clone(),
            head_branch: pr.head.ref_field.clone(),
        })
    }

    async fn find_pull_request(&self, repo: &str, head_branch: &str) -> Result<Option<String>> {
        let repo = self.repo(repo)?;
        let head = format!("{}:{}", &repo.owner, head_branch);

        let prs = self
            .client
            .pulls(&repo.owner, &repo.repo)
            .list()
            .head(head)
            .state(octocrab::params::State::Open)
            .send()
            .await?;

        Ok(prs.items.first().map(pr_url))
    }

    async fn synchronize(&self, url: &str) -> Result<PrStatus> {
        let pr = match self.pull(url).await {
            Ok((_, pr)) => pr,
            Err(Error::Octocrab(e)) if is_not_found(&e) => return Ok(PrStatus::NotFound),
            Err(e) => return Err(e),
        };

        if pr.merged_at.is_some() {
            return Ok(PrStatus::Merged);
        }
        Ok(match pr.state {
            Some(IssueState::Closed) => PrStatus::Closed,
            _ => PrStatus::CanUpdate,
        })
    }

    async fn get_dependencies(&self, repo: &str, git_ref: &str) -> Result<Vec<DependencyDetail>> {
        let path = self.manifest_path.clone();
        match self.get_file_contents(repo, git_ref, &path).await? {
            Some(text) => Ok(DependencyManifest::from_json(&text)?.dependencies),
            None => Ok(Vec::new()),
        }
    }

    async fn merge_pull_request(&self, url: &str, commit_message: &str) -> Result<()> {
        let pr_ref = parse_pull_request_url(url, &self.hosts)?;
        self.client
            .pulls(&pr_ref.repo.owner, &pr_ref.repo.repo)
            .merge(pr_ref.number)
            .title(commit_message)
            .method(MergeMethod::Squash)
            .send()
            .await?;
        Ok(())
    }

    async fn delete_branch(&self, repo: &str, branch: &str) -> Result<()> {
        let repo = self.repo(repo)?;
        match self
            .client
            .repos(&repo.owner, &repo.repo)
            .delete_ref(&Reference::Branch(branch.to_string()))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_checks(&self, url: &str) -> Result<Vec<Check>> {
        let (repo, pr) = self.pull(url).await?;
        let sha = &pr.head.sha;

        let runs: CheckRuns = self
            .client
            .get(
                format!("/repos/{}/{}/commits/{sha}/check-runs", repo.owner, repo.repo),
                None::<&()>,
            )
            .await?;
        let statuses: CombinedStatus = self
            .client
            .get(
                format!("/repos/{}/{}/commits/{sha}/status", repo.owner, repo.repo),
                None::<&()>,
            )
            .await?;

        let checks = runs
            .check_runs
            .iter()
            .map(|run| Check {
                name: run.name.clone(),
                state: check_run_state(run),
            })
            .chain(statuses.statuses.iter().map(|s| Check {
                name: s.context.clone(),
                state: status_state(&s.state),
            }))
            .collect();
        Ok(checks)
    }

    async fn get_reviews(&self, url: &str) -> Result<Vec<ReviewState>> {
        let pr_ref = parse_pull_request_url(url, &self.hosts)?;
        let reviews: Vec<Review> = self
            .client
            .get(
                format!(
                    "/repos/{}/{}/pulls/{}/reviews",
                    pr_ref.repo.owner, pr_ref.repo.repo, pr_ref.number
                ),
                None::<&()>,
            )
            .await?;

        Ok(reviews
            .iter()
            .filter_map(|r| match r.state.as_str() {
                "APPROVED" => Some(ReviewState::Approved),
                "CHANGES_REQUESTED" => Some(ReviewState::ChangesRequested),
                "COMMENTED" => Some(ReviewState::Commented),
                "DISMISSED" => Some(ReviewState::Rejected),
                _ => None,
            })
            .collect())
    }

    async fn get_file_contents(
        &self,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<String>> {
        let repo = self.repo(repo)?;
        let content = self
            .client
            .repos(&repo.owner, &repo.repo)
            .get_content()
            .path(path)
            .r#ref(git_ref)
            .send()
            .await;

        match content {
            Ok(items) => Ok(items
                .items
                .into_iter()
                .next()
                .and_then(|c| c.decoded_content())),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_run_state() {
        let run = |status: &str, conclusion: Option<&str>| CheckRun {
            name: "build".to_string(),
            status: status.to_string(),
            conclusion: conclusion.map(ToString::to_string),
        };
        assert_eq!(check_run_state(&run("in_progress", None)), CheckState::Pending);
        assert_eq!(check_run_state(&run("completed", Some("success"))), CheckState::Success);
        assert_eq!(check_run_state(&run("completed", Some("skipped"))), CheckState::Success);
        assert_eq!(check_run_state(&run("completed", Some("failure"))), CheckState::Failure);
        assert_eq!(check_run_state(&run("completed", None)), CheckState::Failure);
    }

    #[test]
    fn test_status_state() {
        assert_eq!(status_state("success"), CheckState::Success);
        assert_eq!(status_state("pending"), CheckState::Pending);
        assert_eq!(status_state("error"), CheckState::Failure);
    }
}
