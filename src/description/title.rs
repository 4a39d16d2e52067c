//! PR titles and commit messages

use crate::description::links::short_repo_name;
use crate::types::DependencyUpdate;
use std::fmt::Write as _;

/// Longest title that still lists repository names
pub const TITLE_LENGTH_LIMIT: usize = 150;

/// Message of the empty commit made when only coherency failed
pub const FAILED_COHERENCY_COMMIT_MESSAGE: &str =
    "Failed to perform coherency update for one or more dependencies.";

fn title_from(base: &str, repos: &[&str]) -> String {
    let mut names: Vec<String> = repos.iter().map(|r| short_repo_name(r)).collect();
    names.sort();
    names.dedup();

    let total = base.len() + names.iter().map(String::len).sum::<usize>() + 2 * (names.len() - 1);
    if total > TITLE_LENGTH_LIMIT {
        format!("{base} {} repositories", names.len())
    } else {
        format!("{base} {}", names.join(", "))
    }
}

/// Title of a dependency update PR fed by `source_repos`
///
/// A PR that only carries coherency updates has no source repository.
pub fn pull_request_title(target_branch: &str, source_repos: &[&str]) -> String {
    if source_repos.is_empty() {
        return format!("[{target_branch}] Update dependencies to ensure coherency");
    }
    title_from(&format!("[{target_branch}] Update dependencies from"), source_repos)
}

/// Title of a code flow PR
pub fn code_flow_title(target_branch: &str, source_repo: &str) -> String {
    title_from(
        &format!("[{target_branch}] Source code updates from"),
        &[source_repo],
    )
}

/// Group `updates` as `Name1 , Name2 <suffix>` lines, keeping first-seen order
fn grouped_lines(updates: &[DependencyUpdate], separator: &str, coherency: bool) -> Vec<String> {
    let mut groups: Vec<(String, Vec<&str>)> = Vec::new();
    for update in updates {
        let mut key = format!(
            "From Version {} -> To Version {}",
            update.from.version, update.to.version
        );
        if coherency {
            let _ = write!(key, " (parent: {})", update.to.coherent_parent().unwrap_or_default());
        }
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, names)) => names.push(&update.to.name),
            None => groups.push((key, vec![&update.to.name])),
        }
    }
    groups
        .into_iter()
        .map(|(key, names)| format!("{} {key}", names.join(separator)))
        .collect()
}

/// Commit message for the updates taken from one build
pub fn build_commit_message(
    source_repo: &str,
    build_number: &str,
    updates: &[DependencyUpdate],
) -> String {
    let mut message = format!("Update dependencies from {source_repo} build {build_number}\n\n");
    for line in grouped_lines(updates, " , ", false) {
        message.push_str(&line);
        message.push('\n');
    }
    message
}

/// Commit message for coherency updates
pub fn coherency_commit_message(updates: &[DependencyUpdate]) -> String {
    let mut message = String::from("Dependency coherency updates\n\n");
    for line in grouped_lines(updates, ",", true) {
        message.push_str(&line);
        message.push('\n');
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DependencyDetail, DependencyType};

    fn detail(name: &str, version: &str) -> DependencyDetail {
        DependencyDetail {
            name: name.to_string(),
            version: version.to_string(),
            repo_uri: "r".to_string(),
            commit: "c".to_string(),
            pinned: false,
            coherent_parent_dependency_name: None,
            dependency_type: DependencyType::Product,
            locations: vec![],
        }
    }

    fn update(name: &str, from: &str, to: &str) -> DependencyUpdate {
        DependencyUpdate {
            from: detail(name, from),
            to: detail(name, to),
        }
    }

    #[test]
    fn test_title_lists_sorted_short_names() {
        assert_eq!(
            pull_request_title(
                "main",
                &["https://github.com/dotnet/runtime", "https://github.com/dotnet/arcade"]
            ),
            "[main] Update dependencies from dotnet/arcade, dotnet/runtime"
        );
    }

    #[test]
    fn test_long_title_counts_repositories() {
        let repos: Vec<String> = (0..10)
            .map(|i| format!("https://github.com/dotnet/some-long-repository-name-{i}"))
            .collect();
        let refs: Vec<&str> = repos.iter().map(String::as_str).collect();
        assert_eq!(
            pull_request_title("main", &refs),
            "[main] Update dependencies from 10 repositories"
        );
    }

    #[test]
    fn test_coherency_only_title() {
        assert_eq!(
            pull_request_title("release/9.0", &[]),
            "[release/9.0] Update dependencies to ensure coherency"
        );
    }

    #[test]
    fn test_code_flow_title() {
        assert_eq!(
            code_flow_title("main", "https://github.com/dotnet/dotnet"),
            "[main] Source code updates from dotnet/dotnet"
        );
    }

    #[test]
    fn test_build_commit_message_groups_by_version_change() {
        let message = build_commit_message(
            "https://github.com/dotnet/foo",
            "20240101.1",
            &[
                update("Foo", "1.0", "1.1"),
                update("Foo.Ref", "1.0", "1.1"),
                update("Bar", "2.0", "2.1"),
            ],
        );
        assert_eq!(
            message,
            "Update dependencies from https://github.com/dotnet/foo build 20240101.1\n\nFoo , Foo.Ref From Version 1.0 -> To Version 1.1\nBar From Version 2.0 -> To Version 2.1\n"
        );
    }

    #[test]
    fn test_coherency_commit_message_mentions_parent() {
        let mut child = update("Bar", "2.0", "2.5");
        child.to.coherent_parent_dependency_name = Some("Foo".to_string());
        let message = coherency_commit_message(&[child]);
        assert!(message.starts_with("Dependency coherency updates\n\n"));
        assert!(message.contains("Bar From Version 2.0 -> To Version 2.5 (parent: Foo)"));
    }
}
