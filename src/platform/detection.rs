//! Platform detection and URL parsing

use crate::error::{Error, Result};
use crate::types::{Platform, PlatformConfig};
use std::env;

/// Custom hosts that identify self-hosted instances
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOverrides {
    /// GitHub Enterprise host
    pub github: Option<String>,
    /// Self-hosted GitLab host
    pub gitlab: Option<String>,
}

impl HostOverrides {
    /// Hosts from `GH_HOST` / `GITLAB_HOST`
    pub fn from_env() -> Self {
        Self {
            github: env::var("GH_HOST").ok(),
            gitlab: env::var("GITLAB_HOST").ok(),
        }
    }

    /// Fill unset hosts from `other`
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self {
            github: self.github.or(other.github),
            gitlab: self.gitlab.or(other.gitlab),
        }
    }
}

/// Detect platform (GitHub or GitLab) from a repository or PR URL
pub fn detect_platform(url: &str, hosts: &HostOverrides) -> Option<Platform> {
    let hostname = extract_hostname(url)?;

    if hostname == "github.com"
        || hostname.ends_with(".github.com")
        || hosts.github.as_ref().is_some_and(|h| hostname == *h)
    {
        return Some(Platform::GitHub);
    }

    if hostname == "gitlab.com"
        || hostname.ends_with(".gitlab.com")
        || hosts.gitlab.as_ref().is_some_and(|h| hostname == *h)
    {
        return Some(Platform::GitLab);
    }

    None
}

/// Parse repository coordinates from a repository URL
pub fn parse_repo_info(url: &str, hosts: &HostOverrides) -> Result<PlatformConfig> {
    let platform = detect_platform(url, hosts)
        .ok_or_else(|| Error::UnsupportedRepository(url.to_string()))?;
    let path = repo_path(url)?;
    split_repo_path(platform, url, path)
}

/// A pull request URL split into its repository and number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    /// Repository the PR belongs to
    pub repo: PlatformConfig,
    /// PR (or MR iid) number
    pub number: u64,
}

/// Parse a PR/MR web URL
///
/// Accepts `https://github.com/o/r/pull/1`, the API form
/// `https://api.github.com/repos/o/r/pulls/1`, and
/// `https://gitlab.com/group/sub/r/-/merge_requests/1`.
pub fn parse_pull_request_url(url: &str, hosts: &HostOverrides) -> Result<PullRequestRef> {
    let invalid = || Error::Parse(format!("invalid pull request URL: {url}"));

    let platform = detect_platform(url, hosts)
        .or_else(|| {
            extract_hostname(url)
                .filter(|h| h == "api.github.com")
                .map(|_| Platform::GitHub)
        })
        .ok_or_else(|| Error::UnsupportedRepository(url.to_string()))?;

    let path = repo_path(url)?;
    let (repo_path, number) = match platform {
        Platform::GitHub => {
            let path = path.strip_prefix("repos/").unwrap_or(path);
            path.rsplit_once("/pull/")
                .or_else(|| path.rsplit_once("/pulls/"))
                .ok_or_else(invalid)?
        }
        Platform::GitLab => path.rsplit_once("/-/merge_requests/").ok_or_else(invalid)?,
    };

    let number = number
        .trim_end_matches('/')
        .parse::<u64>()
        .map_err(|_| invalid())?;

    Ok(PullRequestRef {
        repo: split_repo_path(platform, url, repo_path)?,
        number,
    })
}

fn repo_path(url: &str) -> Result<&str> {
    let path = if let Some(rest) = url.strip_prefix("git@") {
        rest.split_once(':').map(|(_, p)| p)
    } else {
        url.split_once("://")
            .and_then(|(_, rest)| rest.split_once('/'))
            .map(|(_, p)| p)
    };

    path.map(|p| p.trim_end_matches('/').trim_end_matches(".git"))
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::Parse(format!("cannot parse repository URL: {url}")))
}

fn split_repo_path(platform: Platform, url: &str, path: &str) -> Result<PlatformConfig> {
    // GitLab supports nested groups: everything before the last segment is the owner
    let Some((owner, repo)) = path.rsplit_once('/') else {
        return Err(Error::Parse(format!("invalid repo path: {path}")));
    };
    if owner.is_empty() || repo.is_empty() {
        return Err(Error::Parse(format!("invalid repo path: {path}")));
    }

    let hostname = extract_hostname(url);
    let default_host = match platform {
        Platform::GitHub => "github.com",
        Platform::GitLab => "gitlab.com",
    };
    let host = hostname.filter(|h| h != default_host && h != "api.github.com");

    Ok(PlatformConfig {
        platform,
        owner: owner.to_string(),
        repo: repo.to_string(),
        host,
    })
}

fn extract_hostname(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("git@") {
        return rest.split(':').next().map(ToString::to_string);
    }

    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
}
