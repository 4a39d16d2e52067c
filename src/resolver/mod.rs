//! Update resolution
//!
//! Computes which dependency manifest entries a build changes:
//! [`required_non_coherency_updates`] for the build's own assets, then
//! [`required_coherency_updates`] for dependencies pinned to a coherent parent.

mod coherency;
mod filters;
mod non_coherency;

pub use coherency::{CoherencyOutcome, CoherencySource, required_coherency_updates};
pub use filters::AssetFilter;
pub use non_coherency::required_non_coherency_updates;

use crate::types::{DependencyDetail, DependencyUpdate};

/// `dependencies` with `updates` applied, matched by case-insensitive name of `from`
pub fn apply_updates(
    dependencies: &[DependencyDetail],
    updates: &[DependencyUpdate],
) -> Vec<DependencyDetail> {
    dependencies
        .iter()
        .map(|dep| {
            updates
                .iter()
                .rev()
                .find(|u| u.from.name.eq_ignore_ascii_case(&dep.name))
                .map_or_else(|| dep.clone(), |u| u.to.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DependencyType;

    fn dep(name: &str, version: &str) -> DependencyDetail {
        DependencyDetail {
            name: name.to_string(),
            version: version.to_string(),
            repo_uri: "repo".to_string(),
            commit: "sha".to_string(),
            pinned: false,
            coherent_parent_dependency_name: None,
            dependency_type: DependencyType::Product,
            locations: vec![],
        }
    }

    #[test]
    fn test_apply_updates_keeps_order_and_untouched_entries() {
        let deps = vec![dep("Foo", "1.0"), dep("Bar", "2.0")];
        let updates = vec![DependencyUpdate {
            from: dep("bar", "2.0"),
            to: dep("Bar", "2.1"),
        }];

        let applied = apply_updates(&deps, &updates);
        assert_eq!(applied[0].version, "1.0");
        assert_eq!(applied[1].version, "2.1");
    }
}
