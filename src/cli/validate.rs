//! Validate command - check a catalog's subscriptions

use anstream::println;
use crate::cli::style::{Stylize, bullet, check};
use depflow::config::Catalog;
use depflow::error::Result;
use std::path::Path;

/// Load `path` and report its subscriptions
///
/// Loading runs every subscription rule, so an invalid catalog surfaces
/// as the returned error.
pub fn run_validate(path: &Path) -> Result<()> {
    let catalog = Catalog::load(path)?;

    println!(
        "{} {} is valid: {} subscription(s), {} channel(s), {} build(s)",
        check(),
        path.display().to_string().accent(),
        catalog.subscriptions.len(),
        catalog.channels.len(),
        catalog.builds.len()
    );

    for sub in &catalog.subscriptions {
        let mut flags = Vec::new();
        if sub.policy.batchable {
            flags.push("batchable".to_string());
        }
        if sub.is_backflow() {
            flags.push(format!("backflow from {}", sub.source_directory().unwrap_or_default()));
        }
        if sub.is_forward_flow() {
            flags.push(format!("forward flow to {}", sub.target_directory().unwrap_or_default()));
        }
        if !sub.enabled {
            flags.push("disabled".to_string());
        }

        println!(
            "  {} {} {} {}@{}",
            bullet(),
            sub.id.to_string().muted(),
            sub.source_repository,
            sub.target_branch.accent(),
            sub.target_repository
        );
        if !flags.is_empty() {
            println!("      {}", flags.join(", ").muted());
        }
    }
    Ok(())
}
