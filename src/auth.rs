//! Token resolution for GitHub and GitLab
//!
//! Priority:
//! 1. token from the settings file
//! 2. environment (`GITHUB_TOKEN`/`GH_TOKEN`, `GITLAB_TOKEN`/`GL_TOKEN`)
//! 3. the platform CLI (`gh auth token`, `glab auth token`)

use crate::error::{Error, Result};
use crate::types::Platform;
use reqwest::Client;
use serde::Deserialize;
use std::env;
use tokio::process::Command;

/// Where a token was obtained from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// Settings file
    Config,
    /// Environment variable
    EnvVar,
    /// CLI tool (gh or glab)
    Cli,
}

/// A resolved token for one platform host
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Platform the token is for
    pub platform: Platform,
    /// Authentication token
    pub token: String,
    /// Where the token was obtained from
    pub source: AuthSource,
    /// Host the token is for (e.g. "github.com")
    pub host: String,
}

const fn env_vars(platform: Platform) -> [&'static str; 2] {
    match platform {
        Platform::GitHub => ["GITHUB_TOKEN", "GH_TOKEN"],
        Platform::GitLab => ["GITLAB_TOKEN", "GL_TOKEN"],
    }
}

/// Default public host for a platform
pub const fn default_host(platform: Platform) -> &'static str {
    match platform {
        Platform::GitHub => "github.com",
        Platform::GitLab => "gitlab.com",
    }
}

/// Resolve a token for `platform`
pub async fn resolve_auth(
    platform: Platform,
    configured: Option<&str>,
    host: Option<&str>,
) -> Result<AuthConfig> {
    let host = host.unwrap_or_else(|| default_host(platform)).to_string();

    if let Some(token) = configured.filter(|t| !t.trim().is_empty()) {
        return Ok(AuthConfig {
            platform,
            token: token.trim().to_string(),
            source: AuthSource::Config,
            host,
        });
    }

    for var in env_vars(platform) {
        if let Ok(token) = env::var(var) {
            if !token.trim().is_empty() {
                return Ok(AuthConfig {
                    platform,
                    token,
                    source: AuthSource::EnvVar,
                    host,
                });
            }
        }
    }

    if let Some(token) = cli_token(platform, &host).await {
        return Ok(AuthConfig {
            platform,
            token,
            source: AuthSource::Cli,
            host,
        });
    }

    let hint = match platform {
        Platform::GitHub => "Run `gh auth login` or set GITHUB_TOKEN",
        Platform::GitLab => "Run `glab auth login` or set GITLAB_TOKEN",
    };
    Err(Error::Auth(format!(
        "No {platform} authentication found for {host}. {hint}"
    )))
}

async fn cli_token(platform: Platform, host: &str) -> Option<String> {
    let (program, args): (&str, Vec<&str>) = match platform {
        Platform::GitHub => ("gh", vec!["auth", "token", "--hostname", host]),
        Platform::GitLab => ("glab", vec!["auth", "token", "--hostname", host]),
    };

    let output = Command::new(program).args(&args).output().await.ok()?;
    if !output.status.success() {
        return None;
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() { None } else { Some(token) }
}

#[derive(Deserialize)]
struct GitLabUser {
    username: String,
}

/// Check a token against the platform and return the user it belongs to
pub async fn test_auth(config: &AuthConfig) -> Result<String> {
    match config.platform {
        Platform::GitHub => {
            let mut builder = octocrab::Octocrab::builder().personal_token(config.token.clone());
            if config.host != default_host(Platform::GitHub) {
                builder = builder
                    .base_uri(format!("https://{}/api/v3", config.host))
                    .map_err(|e| Error::GitHubApi(e.to_string()))?;
            }
            let client = builder.build().map_err(|e| Error::GitHubApi(e.to_string()))?;

            let user = client
                .current()
                .user()
                .await
                .map_err(|e| Error::Auth(format!("Invalid token: {e}")))?;
            Ok(user.login)
        }
        Platform::GitLab => {
            let url = format!("https://{}/api/v4/user", config.host);
            let user: GitLabUser = Client::new()
                .get(&url)
                .header("PRIVATE-TOKEN", &config.token)
                .send()
                .await?
                .error_for_status()
                .map_err(|e| Error::Auth(format!("Invalid token: {e}")))?
                .json()
                .await?;
            Ok(user.username)
        }
    }
}
