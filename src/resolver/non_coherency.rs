//! Direct updates from a build's assets

use crate::types::{Asset, DependencyDetail, DependencyUpdate};

/// Manifest changes required to consume `assets` built from `source_repo` at `source_commit`
///
/// A dependency matches an asset by case-insensitive name. Pinned
/// dependencies and dependencies that follow a coherent parent are never
/// updated here. Each dependency is updated at most once even if the build
/// lists the same asset twice, and nothing is emitted for a dependency that
/// already points at the same name, version, commit and repository.
pub fn required_non_coherency_updates(
    source_repo: &str,
    source_commit: &str,
    assets: &[&Asset],
    dependencies: &[DependencyDetail],
) -> Vec<DependencyUpdate> {
    let mut updated = vec![false; dependencies.len()];
    let mut updates = Vec::new();

    for asset in assets {
        let Some(index) = dependencies.iter().position(|d| {
            d.name.eq_ignore_ascii_case(&asset.name) && d.coherent_parent().is_none()
        }) else {
            continue;
        };
        let current = &dependencies[index];

        if current.pinned || updated[index] {
            continue;
        }

        if current.name == asset.name
            && current.version == asset.version
            && current.commit == source_commit
            && current.repo_uri == source_repo
        {
            continue;
        }

        let to = DependencyDetail {
            name: asset.name.clone(),
            version: asset.version.clone(),
            repo_uri: source_repo.to_string(),
            commit: source_commit.to_string(),
            locations: asset.locations.clone(),
            ..current.clone()
        };

        updated[index] = true;
        updates.push(DependencyUpdate {
            from: current.clone(),
            to,
        });
    }

    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DependencyType;

    const REPO: &str = "https://github.com/dotnet/arcade";
    const SHA: &str = "0123456789abcdef";

    fn dep(name: &str, version: &str) -> DependencyDetail {
        DependencyDetail {
            name: name.to_string(),
            version: version.to_string(),
            repo_uri: REPO.to_string(),
            commit: "old".to_string(),
            pinned: false,
            coherent_parent_dependency_name: None,
            dependency_type: DependencyType::Product,
            locations: vec![],
        }
    }

    fn asset(name: &str, version: &str) -> Asset {
        Asset {
            name: name.to_string(),
            version: version.to_string(),
            non_shipping: false,
            locations: vec!["https://feed/index.json".to_string()],
        }
    }

    #[test]
    fn test_matching_assets_update() {
        let deps = vec![dep("Foo", "1.0.0"), dep("Bar", "2.0.0"), dep("Baz", "3.0.0")];
        let assets = [asset("foo", "1.1.0"), asset("Bar", "2.1.0")];
        let refs: Vec<&Asset> = assets.iter().collect();

        let updates = required_non_coherency_updates(REPO, SHA, &refs, &deps);

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].from.name, "Foo");
        assert_eq!(updates[0].to.name, "foo");
        assert_eq!(updates[0].to.version, "1.1.0");
        assert_eq!(updates[0].to.commit, SHA);
        assert_eq!(updates[0].to.locations, vec!["https://feed/index.json"]);
        assert_eq!(updates[1].to.version, "2.1.0");
    }

    #[test]
    fn test_pinned_and_coherent_children_skipped() {
        let mut pinned = dep("Foo", "1.0.0");
        pinned.pinned = true;
        let mut child = dep("Bar", "2.0.0");
        child.coherent_parent_dependency_name = Some("Foo".to_string());

        let assets = [asset("Foo", "1.1.0"), asset("Bar", "2.1.0")];
        let refs: Vec<&Asset> = assets.iter().collect();

        assert!(required_non_coherency_updates(REPO, SHA, &refs, &[pinned, child]).is_empty());
    }

    #[test]
    fn test_duplicate_asset_updates_once() {
        let deps = vec![dep("Foo", "1.0.0")];
        let assets = [asset("Foo", "1.1.0"), asset("Foo", "1.2.0")];
        let refs: Vec<&Asset> = assets.iter().collect();

        let updates = required_non_coherency_updates(REPO, SHA, &refs, &deps);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].to.version, "1.1.0");
    }

    #[test]
    fn test_unchanged_dependency_emits_nothing() {
        let mut current = dep("Foo", "1.1.0");
        current.commit = SHA.to_string();
        let assets = [asset("Foo", "1.1.0")];
        let refs: Vec<&Asset> = assets.iter().collect();

        assert!(required_non_coherency_updates(REPO, SHA, &refs, &[current]).is_empty());
    }
}
