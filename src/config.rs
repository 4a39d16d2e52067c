//! Settings and subscription catalog
//!
//! Both are YAML documents. Every settings field has a default, so an
//! absent or empty settings file is valid.

use crate::error::{Error, Result};
use crate::types::{Build, Channel, MergePolicyDefinition, Subscription};
use crate::validation::validate_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "depflow";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Runtime settings for the `depflow` binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding persisted actor state
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Delay before a queued update is retried
    #[serde(default = "default_reminder_delay")]
    pub pending_update_delay_secs: u64,
    /// Delay between merge-policy checks of an open PR
    #[serde(default = "default_reminder_delay")]
    pub pull_request_check_delay_secs: u64,
    /// How often `depflow run` looks for due reminders
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// GitHub Enterprise host (github.com when unset)
    #[serde(default)]
    pub github_host: Option<String>,
    /// Self-hosted GitLab host (gitlab.com when unset)
    #[serde(default)]
    pub gitlab_host: Option<String>,
    /// GitHub token, otherwise taken from the environment or `gh`
    #[serde(default)]
    pub github_token: Option<String>,
    /// GitLab token, otherwise taken from the environment or `glab`
    #[serde(default)]
    pub gitlab_token: Option<String>,
    /// Prefix of generated PR branches
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    /// Path of the dependency manifest inside target repositories
    #[serde(default = "default_dependency_manifest_path")]
    pub dependency_manifest_path: String,
    /// Path of the source manifest inside the VMR
    #[serde(default = "default_source_manifest_path")]
    pub source_manifest_path: String,
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("state")
}

const fn default_reminder_delay() -> u64 {
    300
}

const fn default_poll_interval() -> u64 {
    30
}

fn default_branch_prefix() -> String {
    "darc".to_string()
}

fn default_dependency_manifest_path() -> String {
    "eng/Version.Details.json".to_string()
}

fn default_source_manifest_path() -> String {
    "src/source-manifest.json".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            pending_update_delay_secs: default_reminder_delay(),
            pull_request_check_delay_secs: default_reminder_delay(),
            poll_interval_secs: default_poll_interval(),
            github_host: None,
            gitlab_host: None,
            github_token: None,
            gitlab_token: None,
            branch_prefix: default_branch_prefix(),
            dependency_manifest_path: default_dependency_manifest_path(),
            source_manifest_path: default_source_manifest_path(),
        }
    }
}

impl Settings {
    /// Default settings file location (`<config_dir>/depflow/config.yaml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
    }

    /// Load settings from `path`, or from the default location when `None`
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// file that was asked for explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if explicit {
                return Err(Error::Config(format!(
                    "settings file not found: {}",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)?;
        Self::parse(&text)
    }

    /// Parse settings from YAML text
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(text)?;
        if settings.poll_interval_secs == 0 {
            return Err(Error::Config(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(settings)
    }

    /// Pending-update reminder delay
    pub const fn pending_update_delay(&self) -> Duration {
        Duration::from_secs(self.pending_update_delay_secs)
    }

    /// PR-check reminder delay
    pub const fn pull_request_check_delay(&self) -> Duration {
        Duration::from_secs(self.pull_request_check_delay_secs)
    }

    /// Reminder polling interval
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Merge policies configured for a whole repository branch
///
/// Batched PRs are gated by these when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryPolicy {
    /// Target repository
    pub repository: String,
    /// Target branch
    pub branch: String,
    /// Policies applied to batched PRs for this branch
    #[serde(default)]
    pub merge_policies: Vec<MergePolicyDefinition>,
}

/// Read-only records of channels, subscriptions and builds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    /// Known channels
    #[serde(default)]
    pub channels: Vec<Channel>,
    /// Subscriptions
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    /// Registered builds
    #[serde(default)]
    pub builds: Vec<Build>,
    /// Branch-wide merge policies
    #[serde(default)]
    pub repository_policies: Vec<RepositoryPolicy>,
}

impl Catalog {
    /// Load and validate a catalog file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read catalog {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Parse and validate catalog YAML
    pub fn parse(text: &str) -> Result<Self> {
        let catalog: Self = serde_yaml::from_str(text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check subscription rules and that subscriptions reference known channels
    pub fn validate(&self) -> Result<()> {
        validate_all(&self.subscriptions)?;

        for sub in &self.subscriptions {
            if !self.channels.iter().any(|c| c.id == sub.channel_id) {
                return Err(Error::Config(format!(
                    "subscription '{}' references unknown channel {}",
                    sub.id, sub.channel_id
                )));
            }
        }

        Ok(())
    }
}
