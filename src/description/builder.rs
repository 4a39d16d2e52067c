//! Incremental PR description rendering

use crate::description::links::changes_uri;
use crate::description::model::Description;
use crate::types::{Build, CoherencyError, DependencyUpdate};
use std::fmt::Write as _;
use uuid::Uuid;

/// First line of every dependency update PR
pub const DEFAULT_HEADER: &str = "This pull request updates the following dependencies\n\n";

/// Block key of coherency updates
pub const COHERENCY_UPDATES_KEY: &str = "Coherency Updates";

/// Block key of coherency errors
pub const COHERENCY_ERRORS_KEY: &str = "Coherency Errors";

const DEPENDENCY_UPDATE_BEGIN: &str = "[DependencyUpdate]: <> (Begin)";
const DEPENDENCY_UPDATE_END: &str = "[DependencyUpdate]: <> (End)";
const DEPENDENCY_DESCRIPTION_FORMAT_URI: &str = "https://github.com/dotnet/arcade/blob/master/Documentation/DependencyDescriptionFormat.md#dependency-description-overview";
const CODE_FLOW_NOT_AVAILABLE: &str = "Not available";

/// Details of one code flow block
#[derive(Debug, Clone)]
pub struct CodeFlowBlock<'a> {
    /// Code flow subscription
    pub subscription_id: Uuid,
    /// Repository the sources came from
    pub source_repo: &'a str,
    /// Build whose commit was synchronized
    pub build: &'a Build,
    /// Source commit synchronized by the previous flow, if known
    pub previous_source_sha: Option<&'a str>,
    /// Directory and commit recorded in the VMR source manifest (forward flow)
    pub manifest_commit: Option<(&'a str, &'a str)>,
}

/// Accumulates update blocks into a PR description
///
/// Footnote numbering continues after the largest footnote already present
/// when the builder was created, across every block appended afterwards.
#[derive(Debug, Clone)]
pub struct DescriptionBuilder {
    description: Description,
    next_reference: usize,
}

impl DescriptionBuilder {
    /// Start from an existing description, or a fresh one when empty
    pub fn new(existing: Option<&str>) -> Self {
        Self::with_header(existing, DEFAULT_HEADER)
    }

    /// Start a code flow description
    pub fn for_code_flow(existing: Option<&str>, source_repo: &str, forward_flow: bool) -> Self {
        let origin = if forward_flow { "the source repo" } else { "the VMR" };
        let header = format!(
            "> [!NOTE]\n> This is a codeflow update. It may contain both source code changes from\n> [{origin}]({source_repo}) as well as dependency updates.\n\nThis pull request brings the following source code changes\n\n"
        );
        Self::with_header(existing, &header)
    }

    fn with_header(existing: Option<&str>, header: &str) -> Self {
        let description = match existing {
            Some(text) if !text.trim().is_empty() => Description::parse(text),
            _ => Description::from_text(header),
        };
        let next_reference = description.max_footnote().map_or(1, |max| max + 1);
        Self {
            description,
            next_reference,
        }
    }

    /// Footnote index the next link will get
    pub const fn next_reference(&self) -> usize {
        self.next_reference
    }

    /// Add (or replace) the block of `subscription_id` for `build`
    ///
    /// Every dependency line gets its own footnote.
    pub fn append_build(
        &mut self,
        subscription_id: Uuid,
        source_repo: &str,
        build: &Build,
        updates: &[DependencyUpdate],
    ) {
        let mut body = String::new();
        let _ = writeln!(body, "## From {source_repo}");
        write_build_details(&mut body, subscription_id, build);
        body.push('\n');
        let _ = writeln!(body, "{DEPENDENCY_UPDATE_BEGIN}");
        body.push('\n');
        body.push_str("- **Updates**:\n");

        let mut links: Vec<String> = Vec::with_capacity(updates.len());
        for update in updates {
            let id = self.next_reference + links.len();
            links.push(changes_uri(
                &update.to.repo_uri,
                &update.from.commit,
                &update.to.commit,
            ));
            let _ = writeln!(
                body,
                "  - **{}**: [from {} to {}][{id}]",
                update.to.name, update.from.version, update.to.version
            );
        }

        body.push('\n');
        for (offset, link) in links.iter().enumerate() {
            let _ = writeln!(body, "[{}]: {link}", self.next_reference + offset);
        }
        body.push('\n');
        let _ = writeln!(body, "{DEPENDENCY_UPDATE_END}");
        body.push('\n');

        self.next_reference += links.len();
        self.description
            .upsert_block(&subscription_id.to_string(), body);
    }

    /// Add (or replace) the coherency update block
    ///
    /// Does nothing when `updates` is empty.
    pub fn append_coherency_updates(&mut self, updates: &[DependencyUpdate]) {
        if updates.is_empty() {
            return;
        }

        let mut body = String::new();
        body.push_str("## Coherency Updates\n\n");
        body.push_str(
            "The following updates ensure that dependencies with a *CoherentParentDependency*\n",
        );
        body.push_str(
            "attribute were produced in a build used as input to the parent dependency's build.\n",
        );
        let _ = writeln!(
            body,
            "See [Dependency Description Format]({DEPENDENCY_DESCRIPTION_FORMAT_URI})"
        );
        body.push('\n');
        let _ = writeln!(body, "{DEPENDENCY_UPDATE_BEGIN}");
        body.push('\n');
        body.push_str("- **Coherency Updates**:\n");
        for update in updates {
            let _ = writeln!(
                body,
                "  - **{}**: from {} to {} (parent: {})",
                update.to.name,
                update.from.version,
                update.to.version,
                update.to.coherent_parent().unwrap_or_default()
            );
        }
        body.push('\n');
        let _ = writeln!(body, "{DEPENDENCY_UPDATE_END}");
        body.push('\n');

        self.description.upsert_block(COHERENCY_UPDATES_KEY, body);
    }

    /// Show `errors` in the coherency error block, or remove the block when empty
    pub fn set_coherency_errors(&mut self, errors: &[CoherencyError]) {
        if errors.is_empty() {
            self.description.remove_block(COHERENCY_ERRORS_KEY);
            return;
        }

        let mut body = String::new();
        body.push_str("## Coherency Errors\n\n");
        body.push_str(
            "The following dependencies could not be updated to match their coherent parent:\n\n",
        );
        for error in errors {
            let _ = writeln!(body, "- **{}**: {}", error.dependency.name, error.message);
            for solution in &error.potential_solutions {
                let _ = writeln!(body, "  - {solution}");
            }
        }
        body.push('\n');

        self.description.upsert_block(COHERENCY_ERRORS_KEY, body);
    }

    /// Add (or replace) the block of a code flow subscription
    pub fn append_code_flow(&mut self, block: &CodeFlowBlock<'_>) {
        let mut body = String::new();
        let _ = writeln!(body, "## From {}", block.source_repo);
        write_build_details(&mut body, block.subscription_id, block.build);

        let diff = block.previous_source_sha.map_or_else(
            || CODE_FLOW_NOT_AVAILABLE.to_string(),
            |from| changes_uri(block.source_repo, from, &block.build.commit),
        );
        let _ = writeln!(body, "- **Commit Diff**: {diff}");

        if let Some((directory, sha)) = block.manifest_commit {
            let _ = writeln!(body, "- **Synchronized Commit**: `{sha}` in `src/{directory}`");
        }
        body.push('\n');

        self.description
            .upsert_block(&block.subscription_id.to_string(), body);
    }

    /// Current description
    pub fn description(&self) -> &Description {
        &self.description
    }

    /// Render the description
    pub fn build(&self) -> String {
        self.description.render()
    }
}

fn write_build_details(body: &mut String, subscription_id: Uuid, build: &Build) {
    let _ = writeln!(body, "- **Subscription**: {subscription_id}");
    let _ = writeln!(body, "- **Build**: {}", build.build_number);
    let _ = writeln!(
        body,
        "- **Date Produced**: {}",
        build.date_produced.format("%B %-d, %Y %-I:%M:%S %p UTC")
    );
    let _ = writeln!(body, "- **Commit**: {}", build.commit);
    if let Some(branch) = build.branch.as_deref().filter(|b| !b.is_empty()) {
        let _ = writeln!(body, "- **Branch**: {branch}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DependencyDetail, DependencyType};
    use chrono::{TimeZone, Utc};

    const FOO_REPO: &str = "https://github.com/dotnet/foo";

    fn detail(name: &str, version: &str, commit: &str) -> DependencyDetail {
        DependencyDetail {
            name: name.to_string(),
            version: version.to_string(),
            repo_uri: FOO_REPO.to_string(),
            commit: commit.to_string(),
            pinned: false,
            coherent_parent_dependency_name: None,
            dependency_type: DependencyType::Product,
            locations: vec![],
        }
    }

    fn update(name: &str, from: (&str, &str), to: (&str, &str)) -> DependencyUpdate {
        DependencyUpdate {
            from: detail(name, from.0, from.1),
            to: detail(name, to.0, to.1),
        }
    }

    fn build() -> Build {
        Build {
            id: 42,
            repository: FOO_REPO.to_string(),
            commit: "2222222222222222".to_string(),
            branch: Some("main".to_string()),
            build_number: "20240101.1".to_string(),
            date_produced: Utc.with_ymd_and_hms(2024, 1, 5, 14, 3, 9).unwrap(),
            assets: vec![],
            channels: vec![1],
        }
    }

    fn footnotes(text: &str) -> Vec<usize> {
        text.lines()
            .filter_map(crate::description::model::footnote_index)
            .collect()
    }

    #[test]
    fn test_fresh_description_has_header_and_footnotes() {
        let id = Uuid::from_u128(1);
        let mut builder = DescriptionBuilder::new(None);
        builder.append_build(
            id,
            FOO_REPO,
            &build(),
            &[
                update("Foo", ("1.0.0", "aaaa"), ("1.1.0", "bbbb")),
                update("Bar", ("2.0.0", "cccc"), ("2.1.0", "dddd")),
            ],
        );
        let text = builder.build();

        assert!(text.starts_with(DEFAULT_HEADER));
        assert!(text.contains("[marker]: <> (Begin:00000000-0000-0000-0000-000000000001)"));
        assert!(text.contains("- **Date Produced**: January 5, 2024 2:03:09 PM UTC"));
        assert!(text.contains("- **Branch**: main"));
        assert!(text.contains("  - **Foo**: [from 1.0.0 to 1.1.0][1]"));
        assert!(text.contains("  - **Bar**: [from 2.0.0 to 2.1.0][2]"));
        assert!(text.contains("[1]: https://github.com/dotnet/foo/compare/aaaa...bbbb"));
        assert!(text.contains("[2]: https://github.com/dotnet/foo/compare/cccc...dddd"));
        assert_eq!(builder.next_reference(), 3);
    }

    #[test]
    fn test_same_commit_range_gets_separate_footnotes() {
        let mut builder = DescriptionBuilder::new(None);
        builder.append_build(
            Uuid::from_u128(1),
            FOO_REPO,
            &build(),
            &[
                update("Foo", ("1.0.0", "aaaa"), ("1.1.0", "bbbb")),
                update("Foo.Ref", ("1.0.0", "aaaa"), ("1.1.0", "bbbb")),
            ],
        );
        let text = builder.build();

        assert!(text.contains("  - **Foo**: [from 1.0.0 to 1.1.0][1]"));
        assert!(text.contains("  - **Foo.Ref**: [from 1.0.0 to 1.1.0][2]"));
        assert_eq!(footnotes(&text), vec![1, 2]);
    }

    #[test]
    fn test_reappending_replaces_block_and_continues_numbering() {
        let id = Uuid::from_u128(7);
        let mut first = DescriptionBuilder::new(None);
        first.append_build(
            id,
            FOO_REPO,
            &build(),
            &[update("Foo", ("1.0.0", "aaaa"), ("1.1.0", "bbbb"))],
        );
        let existing = first.build();

        let mut second = DescriptionBuilder::new(Some(&existing));
        assert_eq!(second.next_reference(), 2);
        second.append_build(
            id,
            FOO_REPO,
            &build(),
            &[
                update("Foo", ("1.0.0", "aaaa"), ("1.2.0", "cccc")),
                update("Bar", ("2.0.0", "dddd"), ("2.2.0", "eeee")),
            ],
        );
        let text = second.build();

        assert_eq!(text.matches("(Begin:00000000-0000-0000-0000-000000000007)").count(), 1);
        assert!(!text.contains("1.1.0"));
        assert_eq!(footnotes(&text), vec![2, 3]);
        assert!(text.contains("  - **Foo**: [from 1.0.0 to 1.2.0][2]"));
    }

    #[test]
    fn test_other_subscription_blocks_untouched() {
        let mut builder = DescriptionBuilder::new(None);
        builder.append_build(
            Uuid::from_u128(1),
            FOO_REPO,
            &build(),
            &[update("Foo", ("1", "a"), ("2", "b"))],
        );
        builder.append_build(
            Uuid::from_u128(2),
            "https://github.com/dotnet/bar",
            &build(),
            &[update("Bar", ("1", "c"), ("2", "d"))],
        );
        let keys: Vec<String> = builder
            .description()
            .block_keys()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(footnotes(&builder.build()), vec![1, 2]);
    }

    #[test]
    fn test_coherency_block_has_no_footnotes() {
        let mut child = update("Bar", ("2.0", "c"), ("2.5", "d"));
        child.to.coherent_parent_dependency_name = Some("Foo".to_string());

        let mut builder = DescriptionBuilder::new(None);
        builder.append_coherency_updates(&[child]);
        let text = builder.build();

        assert!(text.contains("[marker]: <> (Begin:Coherency Updates)"));
        assert!(text.contains("  - **Bar**: from 2.0 to 2.5 (parent: Foo)"));
        assert!(footnotes(&text).is_empty());
        assert_eq!(builder.next_reference(), 1);
    }

    #[test]
    fn test_coherency_errors_block_removed_when_resolved() {
        let error = CoherencyError {
            dependency: detail("Bar", "2.0", "c"),
            message: "repoA @ a2 does not contain dependency Bar".to_string(),
            potential_solutions: vec!["Pin the dependency.".to_string()],
        };
        let mut builder = DescriptionBuilder::new(None);
        builder.set_coherency_errors(&[error]);
        let text = builder.build();
        assert!(text.contains("- **Bar**: repoA @ a2 does not contain dependency Bar"));
        assert!(text.contains("  - Pin the dependency."));

        let mut builder = DescriptionBuilder::new(Some(&text));
        builder.set_coherency_errors(&[]);
        assert!(!builder.build().contains("Coherency Errors"));
    }

    #[test]
    fn test_code_flow_block() {
        let build = build();
        let mut builder =
            DescriptionBuilder::for_code_flow(None, "https://github.com/dotnet/foo", true);
        builder.append_code_flow(&CodeFlowBlock {
            subscription_id: Uuid::from_u128(3),
            source_repo: "https://github.com/dotnet/foo",
            build: &build,
            previous_source_sha: Some("1111111111111111"),
            manifest_commit: Some(("foo", "2222222222222222")),
        });
        let text = builder.build();

        assert!(text.contains("This is a codeflow update"));
        assert!(text.contains(
            "- **Commit Diff**: https://github.com/dotnet/foo/compare/1111111111...2222222222"
        ));
        assert!(text.contains("- **Synchronized Commit**: `2222222222222222` in `src/foo`"));
    }
}
