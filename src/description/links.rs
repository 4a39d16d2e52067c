//! Links and names derived from repository URLs

/// SHA prefix length used in GitHub compare links
pub const GITHUB_COMPARISON_SHA_LENGTH: usize = 10;

fn short_sha(sha: &str) -> &str {
    sha.get(..GITHUB_COMPARISON_SHA_LENGTH).unwrap_or(sha)
}

/// Link showing the changes between two commits of `repo`
///
/// GitHub compare links accept short SHAs; Azure DevOps needs full ones.
pub fn changes_uri(repo: &str, from_sha: &str, to_sha: &str) -> String {
    let repo = repo.trim_end_matches('/');
    if repo.contains("github.com") {
        format!(
            "{repo}/compare/{}...{}",
            short_sha(from_sha),
            short_sha(to_sha)
        )
    } else {
        format!("{repo}/branches?baseVersion=GC{from_sha}&targetVersion=GC{to_sha}&_a=files")
    }
}

/// Repository URL without the host prefix, as shown in PR titles
pub fn short_repo_name(repo: &str) -> String {
    repo.replace("https://github.com/", "")
        .replace("https://dev.azure.com/", "")
        .replace("_git/", "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_compare_uses_short_shas() {
        assert_eq!(
            changes_uri(
                "https://github.com/dotnet/runtime",
                "0123456789abcdef",
                "fedcba9876543210"
            ),
            "https://github.com/dotnet/runtime/compare/0123456789...fedcba9876"
        );
    }

    #[test]
    fn test_github_compare_keeps_short_input() {
        assert_eq!(
            changes_uri("https://github.com/a/b/", "abc", "def"),
            "https://github.com/a/b/compare/abc...def"
        );
    }

    #[test]
    fn test_azure_devops_uses_full_shas() {
        assert_eq!(
            changes_uri(
                "https://dev.azure.com/dnceng/internal/_git/dotnet-runtime",
                "0123456789abcdef",
                "fedcba9876543210"
            ),
            "https://dev.azure.com/dnceng/internal/_git/dotnet-runtime/branches?baseVersion=GC0123456789abcdef&targetVersion=GCfedcba9876543210&_a=files"
        );
    }

    #[test]
    fn test_short_repo_name() {
        assert_eq!(short_repo_name("https://github.com/dotnet/runtime"), "dotnet/runtime");
        assert_eq!(
            short_repo_name("https://dev.azure.com/dnceng/internal/_git/dotnet-runtime"),
            "dnceng/internal/dotnet-runtime"
        );
    }
}
