//! GitLab provider implementation

use crate::error::{Error, Result};
use crate::manifest::DependencyManifest;
use crate::platform::detection::{HostOverrides, parse_pull_request_url, parse_repo_info};
use crate::platform::{GitProvider, PullRequestSpec};
use crate::types::{
    Check, CheckState, DependencyDetail, PlatformConfig, PrStatus, PullRequest, ReviewState,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// GitLab provider using reqwest
pub struct GitLabService {
    client: Client,
    token: String,
    api_base: String,
    hosts: HostOverrides,
    manifest_path: String,
}

#[derive(Deserialize)]
struct MergeRequest {
    web_url: String,
    source_branch: String,
    target_branch: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    state: String,
}

#[derive(Deserialize)]
struct RepositoryFile {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct CreatedCommit {
    id: String,
}

#[derive(Deserialize)]
struct Pipeline {
    id: u64,
    status: String,
}

#[derive(Deserialize)]
struct Approvals {
    #[serde(default)]
    approved_by: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct MergeRequestPayload<'a> {
    source_branch: &'a str,
    target_branch: &'a str,
    title: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
struct CommitAction<'a> {
    action: &'a str,
    file_path: &'a str,
    content: String,
}

#[derive(Serialize)]
struct CommitPayload<'a> {
    branch: &'a str,
    commit_message: &'a str,
    actions: Vec<CommitAction<'a>>,
}

#[derive(Serialize)]
struct MergePayload<'a> {
    squash: bool,
    squash_commit_message: &'a str,
}

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

impl GitLabService {
    /// Create a new GitLab provider
    ///
    /// `host` is the self-hosted GitLab host; `None` means gitlab.com.
    pub fn new(token: String, host: Option<String>, manifest_path: impl Into<String>) -> Self {
        let api_base = format!("https://{}", host.as_deref().unwrap_or("gitlab.com"));

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            token,
            api_base,
            hosts: HostOverrides {
                github: None,
                gitlab: host,
            }
            .or(HostOverrides::from_env()),
            manifest_path: manifest_path.into(),
        }
    }

    /// Send API requests to `api_base` instead of the host itself
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v4{}", self.api_base, path)
    }

    fn project(&self, repo_url: &str) -> Result<PlatformConfig> {
        parse_repo_info(repo_url, &self.hosts)
    }

    fn project_url(&self, project: &PlatformConfig, path: &str) -> String {
        let id = format!("{}/{}", project.owner, project.repo);
        self.api_url(&format!("/projects/{}{path}", urlencoding::encode(&id)))
    }

    fn merge_request_url(&self, url: &str, suffix: &str) -> Result<String> {
        let pr = parse_pull_request_url(url, &self.hosts)?;
        Ok(self.project_url(&pr.repo, &format!("/merge_requests/{}{suffix}", pr.number)))
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("PRIVATE-TOKEN", &self.token)
    }

    async fn checked(response: Response) -> Result<Response> {
        response
            .error_for_status()
            .map_err(|e| Error::GitLabApi(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        let response = self.authed(self.client.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::checked(response).await?.json().await?))
    }

    async fn merge_request(&self, url: &str) -> Result<Option<MergeRequest>> {
        self.get_json(&self.merge_request_url(url, "")?).await
    }
}

fn pipeline_state(status: &str) -> CheckState {
    match status {
        "success" | "skipped" | "manual" => CheckState::Success,
        "failed" | "canceled" => CheckState::Failure,
        _ => CheckState::Pending,
    }
}

#[async_trait]
impl GitProvider for GitLabService {
    async fn branch_exists(&self, repo: &str, branch: &str) -> Result<bool> {
        let project = self.project(repo)?;
        let url = self.project_url(
            &project,
            &format!("/repository/branches/{}", urlencoding::encode(branch)),
        );
        let found: Option<serde_json::Value> = self.get_json(&url).await?;
        Ok(found.is_some())
    }

    async fn create_branch(&self, repo: &str, base: &str, new_branch: &str) -> Result<()> {
        if self.branch_exists(repo, new_branch).await? {
            debug!(branch = new_branch, "Branch already exists");
            return Ok(());
        }

        let project = self.project(repo)?;
        let url = self.project_url(&project, "/repository/branches");
        let response = self
            .authed(self.client.post(&url))
            .query(&[("branch", new_branch), ("ref", base)])
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }

    async fn commit_updates(
        &self,
        repo: &str,
        branch: &str,
        updated: &[DependencyDetail],
        message: &str,
    ) -> Result<Vec<String>> {
        let mut actions = Vec::new();

        if !updated.is_empty() {
            let text = self
                .get_file_contents(repo, branch, &self.manifest_path)
                .await?
                .ok_or_else(|| {
                    Error::GitLabApi(format!("{} not found in {repo}", self.manifest_path))
                })?;
            let mut manifest = DependencyManifest::from_json(&text)?;
            if manifest.apply(updated) > 0 {
                actions.push(CommitAction {
                    action: "update",
                    file_path: &self.manifest_path,
                    content: manifest.to_json()?,
                });
            }
        }

        let project = self.project(repo)?;
        let url = self.project_url(&project, "/repository/commits");
        let payload = CommitPayload {
            branch,
            commit_message: message,
            actions,
        };

        let response = self.authed(self.client.post(&url)).json(&payload).send().await?;
        let commit: CreatedCommit = Self::checked(response).await?.json().await?;
        Ok(vec![commit.id])
    }

    async fn create_pull_request(&self, repo: &str, spec: &PullRequestSpec) -> Result<String> {
        let project = self.project(repo)?;
        let url = self.project_url(&project, "/merge_requests");
        let payload = MergeRequestPayload {
            source_branch: &spec.head_branch,
            target_branch: &spec.base_branch,
            title: &spec.title,
            description: &spec.description,
        };

        let response = self.authed(self.client.post(&url)).json(&payload).send().await?;
        let mr: MergeRequest = Self::checked(response).await?.json().await?;
        Ok(mr.web_url)
    }

    async fn update_pull_request(&self, url: &str, spec: &PullRequestSpec) -> Result<()> {
        let api = self.merge_request_url(url, "")?;
        let payload = serde_json::json!({
            "title": spec.title,
            "description": spec.description,
            "target_branch": spec.base_branch,
        });

        let response = self.authed(self.client.put(&api)).json(&payload).send().await?;
        Self::checked(response).await?;
        Ok(())
    }

    async fn get_pull_request(&self, url: &str) -> Result<PullRequest> {
        let mr = self
            .merge_request(url)
            .await?
            .ok_or_else(|| Error::GitLabApi(format!("merge request not found: {url}")))?;

        Ok(PullRequest {
            url: mr.web_url,
            title: mr.title,
            description: mr.description.unwrap_or_default(),
            base_branch: mr.target_branch,
            head_branch: mr.source_branch,
        })
    }

    async fn find_pull_request(&self, repo: &str, head_branch: &str) -> Result<Option<String>> {
        let project = self.project(repo)?;
        let url = self.project_url(&project, "/merge_requests");

        let response = self
            .authed(self.client.get(&url))
            .query(&[("source_branch", head_branch), ("state", "opened")])
            .send()
            .await?;
        let mrs: Vec<MergeRequest> = Self::checked(response).await?.json().await?;

        Ok(mrs.into_iter().next().map(|mr| mr.web_url))
    }

    async fn synchronize(&self, url: &str) -> Result<PrStatus> {
        let Some(mr) = self.merge_request(url).await? else {
            return Ok(PrStatus::NotFound);
        };

        Ok(match mr.state.as_str() {
            "merged" => PrStatus::Merged,
            "closed" => PrStatus::Closed,
            "locked" => PrStatus::CannotUpdate,
            _ => PrStatus::CanUpdate,
        })
    }

    async fn get_dependencies(&self, repo: &str, git_ref: &str) -> Result<Vec<DependencyDetail>> {
        match self.get_file_contents(repo, git_ref, &self.manifest_path).await? {
            Some(text) => Ok(DependencyManifest::from_json(&text)?.dependencies),
            None => Ok(Vec::new()),
        }
    }

    async fn merge_pull_request(&self, url: &str, commit_message: &str) -> Result<()> {
        let api = self.merge_request_url(url, "/merge")?;
        let payload = MergePayload {
            squash: true,
            squash_commit_message: commit_message,
        };

        let response = self.authed(self.client.put(&api)).json(&payload).send().await?;
        Self::checked(response).await?;
        Ok(())
    }

    async fn delete_branch(&self, repo: &str, branch: &str) -> Result<()> {
        let project = self.project(repo)?;
        let url = self.project_url(
            &project,
            &format!("/repository/branches/{}", urlencoding::encode(branch)),
        );

        let response = self.authed(self.client.delete(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::checked(response).await?;
        Ok(())
    }

    async fn get_checks(&self, url: &str) -> Result<Vec<Check>> {
        let api = self.merge_request_url(url, "/pipelines")?;
        let pipelines: Vec<Pipeline> = self.get_json(&api).await?.unwrap_or_default();

        // Newest pipeline first; only it reflects the current head.
        Ok(pipelines
            .into_iter()
            .max_by_key(|p| p.id)
            .map(|p| Check {
                name: format!("pipeline #{}", p.id),
                state: pipeline_state(&p.status),
            })
            .into_iter()
            .collect())
    }

    async fn get_reviews(&self, url: &str) -> Result<Vec<ReviewState>> {
        let api = self.merge_request_url(url, "/approvals")?;
        let approvals: Option<Approvals> = self.get_json(&api).await?;

        Ok(approvals
            .map(|a| vec![ReviewState::Approved; a.approved_by.len()])
            .unwrap_or_default())
    }

    async fn get_file_contents(
        &self,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<String>> {
        let project = self.project(repo)?;
        let url = self.project_url(
            &project,
            &format!("/repository/files/{}", urlencoding::encode(path)),
        );

        let response = self
            .authed(self.client.get(&url))
            .query(&[("ref", git_ref)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let file: RepositoryFile = Self::checked(response).await?.json().await?;

        if file.encoding.as_deref() == Some("base64") {
            let bytes = BASE64
                .decode(file.content.replace('\n', ""))
                .map_err(|e| Error::Parse(format!("invalid base64 in {path}: {e}")))?;
            let text = String::from_utf8(bytes)
                .map_err(|e| Error::Parse(format!("{path} is not UTF-8: {e}")))?;
            return Ok(Some(text));
        }
        Ok(Some(file.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_state() {
        assert_eq!(pipeline_state("success"), CheckState::Success);
        assert_eq!(pipeline_state("failed"), CheckState::Failure);
        assert_eq!(pipeline_state("running"), CheckState::Pending);
        assert_eq!(pipeline_state("created"), CheckState::Pending);
    }

    #[test]
    fn test_project_url_encodes_nested_groups() {
        let service = GitLabService::new("t".to_string(), None, "eng/Version.Details.json")
            .with_api_base("http://localhost:1234/");
        let project = service.project("https://gitlab.com/group/sub/repo").unwrap();
        assert_eq!(
            service.project_url(&project, "/merge_requests"),
            "http://localhost:1234/api/v4/projects/group%2Fsub%2Frepo/merge_requests"
        );
    }
}
