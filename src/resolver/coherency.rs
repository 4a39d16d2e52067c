//! Strict coherency resolution
//!
//! A dependency with a coherent parent must be at the version that the
//! parent's repository (at the parent's commit) itself depends on. Chains are
//! resolved from the top: the root of every chain is updated first so that
//! children are looked up against their parent's new commit.

use crate::error::Result;
use crate::types::{Build, CoherencyError, DependencyDetail, DependencyUpdate};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Where coherency resolution looks up other repositories' state
#[async_trait]
pub trait CoherencySource: Send + Sync {
    /// Dependency manifest of `repo` at `commit`
    async fn dependencies_at(&self, repo: &str, commit: &str) -> Result<Vec<DependencyDetail>>;

    /// Builds of `repo` at `commit`, used to find asset locations
    async fn builds_at(&self, _repo: &str, _commit: &str) -> Result<Vec<Build>> {
        Ok(Vec::new())
    }
}

/// Result of a coherency pass
///
/// Failures are data: the updates that could be resolved are still returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoherencyOutcome {
    /// Resolved updates, parents before children
    pub updates: Vec<DependencyUpdate>,
    /// Dependencies that could not be resolved
    pub errors: Vec<CoherencyError>,
}

impl CoherencyOutcome {
    /// Whether every coherent dependency was resolved
    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Dependencies with a coherent parent that no non-pinned dependency points at
fn leaves(dependencies: &[DependencyDetail]) -> impl Iterator<Item = &DependencyDetail> {
    dependencies
        .iter()
        .filter(|d| d.coherent_parent().is_some())
        .filter(|leaf| {
            !dependencies.iter().any(|other| {
                !other.pinned
                    && other
                        .coherent_parent()
                        .is_some_and(|p| p.eq_ignore_ascii_case(&leaf.name))
            })
        })
}

fn find<'a>(dependencies: &'a [DependencyDetail], name: &str) -> Option<&'a DependencyDetail> {
    dependencies.iter().find(|d| d.name.eq_ignore_ascii_case(name))
}

fn missing_dependency_error(parent: &DependencyDetail, dep: &DependencyDetail) -> CoherencyError {
    CoherencyError {
        dependency: dep.clone(),
        message: format!(
            "{} @ {} does not contain dependency {}",
            parent.repo_uri, parent.commit, dep.name
        ),
        potential_solutions: vec![
            format!("Add the dependency to {}.", parent.repo_uri),
            "Pin the dependency.".to_string(),
            "Remove the CoherentParentDependency attribute.".to_string(),
        ],
    }
}

fn broken_chain_error(dep: &DependencyDetail, parent_name: &str, cycle: bool) -> CoherencyError {
    let message = if cycle {
        format!("Dependency {} is part of a coherent parent cycle", dep.name)
    } else {
        format!(
            "Dependency {} has non-existent parent dependency {parent_name}",
            dep.name
        )
    };
    CoherencyError {
        dependency: dep.clone(),
        message,
        potential_solutions: vec![
            format!("Add {parent_name} to the dependency manifest."),
            "Pin the dependency.".to_string(),
            "Remove the CoherentParentDependency attribute.".to_string(),
        ],
    }
}

/// Resolve strict coherency updates for `dependencies`
///
/// `dependencies` should already contain the non-coherency updates of the
/// batch. Lookups of the same `repo@commit` are made once per call.
pub async fn required_coherency_updates(
    dependencies: &[DependencyDetail],
    source: &dyn CoherencySource,
) -> Result<CoherencyOutcome> {
    let mut outcome = CoherencyOutcome::default();
    let mut error_keys: HashSet<String> = HashSet::new();
    let mut manifests: HashMap<String, Vec<DependencyDetail>> = HashMap::new();

    let mut push_error = |outcome: &mut CoherencyOutcome, key: String, error: CoherencyError| {
        if error_keys.insert(key) {
            outcome.errors.push(error);
        }
    };

    'leaves: for leaf in leaves(dependencies) {
        // Walk up to the first pinned dependency or the root of the chain.
        let mut stack: Vec<&DependencyDetail> = Vec::new();
        let mut current = leaf;
        while let Some(parent_name) = current.coherent_parent() {
            if current.pinned {
                break;
            }
            if stack.len() > dependencies.len() {
                let error = broken_chain_error(leaf, parent_name, true);
                push_error(&mut outcome, format!("cycle:{}", leaf.name), error);
                continue 'leaves;
            }
            stack.push(current);
            match find(dependencies, parent_name) {
                Some(parent) => current = parent,
                None => {
                    let error = broken_chain_error(current, parent_name, false);
                    push_error(&mut outcome, format!("missing:{}", current.name), error);
                    continue 'leaves;
                }
            }
        }

        while let Some(dep) = stack.pop() {
            let Some(parent_name) = dep.coherent_parent() else {
                continue;
            };

            let parent = outcome
                .updates
                .iter()
                .map(|u| &u.to)
                .find(|to| to.name.eq_ignore_ascii_case(parent_name))
                .or_else(|| find(dependencies, parent_name))
                .cloned();
            let Some(parent) = parent else {
                continue;
            };

            let cache_key = format!("{}@{}", parent.repo_uri, parent.commit);
            if !manifests.contains_key(&cache_key) {
                debug!(repo = %parent.repo_uri, commit = %parent.commit, "Fetching coherent parent manifest");
                let fetched = source.dependencies_at(&parent.repo_uri, &parent.commit).await?;
                manifests.insert(cache_key.clone(), fetched);
            }
            let parent_manifest = manifests.get(&cache_key).map_or(&[][..], Vec::as_slice);

            let Some(coherent) = find(parent_manifest, &dep.name).cloned() else {
                let key = format!("{}{}{}", parent.repo_uri, parent.commit, dep.name);
                push_error(&mut outcome, key, missing_dependency_error(&parent, dep));
                // Children of an unresolved dependency cannot be resolved either.
                stack.clear();
                continue;
            };

            if dep.name == coherent.name
                && dep.version == coherent.version
                && dep.commit == coherent.commit
                && dep.repo_uri == coherent.repo_uri
            {
                continue;
            }

            info!(
                dependency = %dep.name,
                version = %coherent.version,
                repo = %coherent.repo_uri,
                commit = %coherent.commit,
                "Coherent dependency will be updated"
            );

            let locations =
                asset_locations(source, &coherent.repo_uri, &coherent.commit, &coherent).await?;

            outcome.updates.push(DependencyUpdate {
                from: dep.clone(),
                to: DependencyDetail {
                    name: coherent.name,
                    version: coherent.version,
                    repo_uri: coherent.repo_uri,
                    commit: coherent.commit,
                    locations,
                    ..dep.clone()
                },
            });
        }
    }

    Ok(outcome)
}

/// Locations of the newest build asset matching `dep` by name and version
async fn asset_locations(
    source: &dyn CoherencySource,
    repo: &str,
    commit: &str,
    dep: &DependencyDetail,
) -> Result<Vec<String>> {
    let mut builds = source.builds_at(repo, commit).await?;
    builds.sort_by(|a, b| b.id.cmp(&a.id));

    Ok(builds
        .iter()
        .flat_map(|b| b.assets.iter())
        .find(|a| a.name.eq_ignore_ascii_case(&dep.name) && a.version == dep.version)
        .map(|a| a.locations.clone())
        .unwrap_or_default())
}
