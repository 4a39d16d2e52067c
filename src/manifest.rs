//! Manifest files read from repositories
//!
//! - the dependency manifest of a target repo (`eng/Version.Details.json`)
//! - the VMR source manifest (`src/source-manifest.json`), read-only

use crate::error::Result;
use crate::types::DependencyDetail;
use serde::{Deserialize, Serialize};

/// Dependency manifest of a repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyManifest {
    /// Manifest entries in file order
    #[serde(default)]
    pub dependencies: Vec<DependencyDetail>,
}

impl DependencyManifest {
    /// Parse manifest JSON
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize as indented JSON with a trailing newline
    pub fn to_json(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    /// Replace entries with the same name (case-insensitive) by `updated`
    ///
    /// Returns how many entries changed. Entries not present in the manifest
    /// are ignored.
    pub fn apply(&mut self, updated: &[DependencyDetail]) -> usize {
        let mut changed = 0;
        for dep in &mut self.dependencies {
            if let Some(new) = updated
                .iter()
                .find(|u| u.name.eq_ignore_ascii_case(&dep.name))
            {
                if dep != new {
                    *dep = new.clone();
                    changed += 1;
                }
            }
        }
        changed
    }
}

/// A repository recorded in the VMR source manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    /// Directory under `src/`
    pub path: String,
    /// Remote the sources came from
    pub remote_uri: String,
    /// Commit that was synchronized
    pub commit_sha: String,
    /// Build id the commit came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bar_id: Option<u64>,
}

/// A submodule recorded in the VMR source manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmoduleRecord {
    /// Path of the submodule
    pub path: String,
    /// Remote of the submodule
    pub remote_uri: String,
    /// Commit of the submodule
    pub commit_sha: String,
}

/// VMR source manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceManifest {
    /// Synchronized repositories
    #[serde(default)]
    pub repositories: Vec<RepositoryRecord>,
    /// Synchronized submodules
    #[serde(default)]
    pub submodules: Vec<SubmoduleRecord>,
}

impl SourceManifest {
    /// Parse manifest JSON
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Record for the repository synchronized into `path`
    pub fn repository(&self, path: &str) -> Option<&RepositoryRecord> {
        let path = path.trim_matches('/');
        self.repositories
            .iter()
            .find(|r| r.path.trim_matches('/').eq_ignore_ascii_case(path))
    }
}
