//! Auth command - test and explain authentication

use anstream::println;
use crate::cli::style::{Stylize, check};
use depflow::auth::{resolve_auth, test_auth};
use depflow::config::Settings;
use depflow::error::Result;
use depflow::types::Platform;

/// Run the auth test command
pub async fn run_auth_test(settings: &Settings, platform: Platform) -> Result<()> {
    let (token, host) = match platform {
        Platform::GitHub => (settings.github_token.as_deref(), settings.github_host.as_deref()),
        Platform::GitLab => (settings.gitlab_token.as_deref(), settings.gitlab_host.as_deref()),
    };

    println!("Testing {platform} authentication...");
    let config = resolve_auth(platform, token, host).await?;
    let username = test_auth(&config).await?;
    println!("{} Authenticated as: {}", check(), username.accent());
    println!("  Token source: {}", format!("{:?}", config.source).muted());
    println!("  Host: {}", config.host.muted());
    Ok(())
}

/// Run the auth setup command (show instructions)
pub fn run_auth_setup(platform: Platform) {
    match platform {
        Platform::GitHub => {
            println!("{}", "GitHub Authentication Setup".emphasis());
            println!();
            println!("Option 1: GitHub CLI (recommended)");
            println!("  Install: https://cli.github.com/");
            println!("  Run: {}", "gh auth login".accent());
            println!();
            println!("Option 2: Environment variable");
            println!("  Set GITHUB_TOKEN or GH_TOKEN");
            println!();
            println!("Option 3: Settings file");
            println!("  Set github_token in the depflow config.yaml");
            println!();
            println!("For GitHub Enterprise:");
            println!("  Set github_host in config.yaml, or GH_HOST");
        }
        Platform::GitLab => {
            println!("{}", "GitLab Authentication Setup".emphasis());
            println!();
            println!("Option 1: GitLab CLI (glab)");
            println!("  Install: https://gitlab.com/gitlab-org/cli");
            println!("  Run: {}", "glab auth login".accent());
            println!();
            println!("Option 2: Environment variable");
            println!("  Set GITLAB_TOKEN or GL_TOKEN");
            println!();
            println!("Option 3: Settings file");
            println!("  Set gitlab_token in the depflow config.yaml");
            println!();
            println!("For self-hosted GitLab:");
            println!("  Set gitlab_host in config.yaml, or GITLAB_HOST");
        }
    }
}
