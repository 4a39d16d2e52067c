//! Orchestrator commands - trigger, code-flow-status, run, status

use anstream::{eprintln, println};
use crate::cli::style::{Stream, Stylize, arrow, bullet, check, cross, hyperlink_url};
use chrono::Utc;
use depflow::config::{Catalog, Settings};
use depflow::error::Result;
use depflow::orchestrator::{
    ActorContext, ActorOptions, CatalogRepository, CodeFlowStatus, FileStateStore, Orchestrator,
    ProcessOutcome, StateStore,
};
use depflow::platform::create_provider;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Wire an orchestrator from settings and a loaded catalog
pub async fn build_orchestrator(settings: &Settings, catalog: Catalog) -> Result<Orchestrator> {
    let provider = create_provider(settings).await?;
    debug!(platforms = ?provider.platforms(), "Providers ready");

    let ctx = ActorContext::new(
        Arc::new(provider),
        Arc::new(FileStateStore::new(&settings.state_dir)),
        Arc::new(CatalogRepository::new(catalog)),
    )
    .with_options(ActorOptions::from_settings(settings));

    Ok(Orchestrator::new(ctx))
}

fn print_outcome(label: &str, outcome: &ProcessOutcome) {
    match outcome {
        ProcessOutcome::PullRequestCreated(url) => println!(
            "{} {label}: created {}",
            check(),
            hyperlink_url(Stream::Stdout, url).accent()
        ),
        ProcessOutcome::PullRequestUpdated(url) => println!(
            "{} {label}: updated {}",
            check(),
            hyperlink_url(Stream::Stdout, url).accent()
        ),
        ProcessOutcome::PullRequestCompleted { url, merged } => println!(
            "{} {label}: {} {}",
            check(),
            if *merged { "merged".success() } else { "closed".muted() },
            hyperlink_url(Stream::Stdout, url)
        ),
        ProcessOutcome::WaitingForPullRequest(url) => eprintln!(
            "{} {label}: {} cannot be updated yet, updates queued",
            "!".warn(),
            hyperlink_url(Stream::Stderr, url)
        ),
        ProcessOutcome::WaitingForCodeFlowBranch(branch) => eprintln!(
            "{} {label}: waiting for code flow branch {}",
            "!".warn(),
            branch.as_deref().unwrap_or("(not yet reported)")
        ),
        ProcessOutcome::PoliciesEvaluated { url, status } => println!(
            "{} {label}: {} policies {}",
            arrow(),
            hyperlink_url(Stream::Stdout, url),
            format!("{status:?}").accent()
        ),
        ProcessOutcome::NothingToDo => println!("{} {label}: nothing to do", bullet()),
        ProcessOutcome::NoPendingUpdates => println!("{} {label}: no pending updates", bullet()),
        ProcessOutcome::NoPullRequest => println!("{} {label}: no pull request", bullet()),
    }
}

/// Trigger one subscription by hand, or every subscription following a build
pub async fn run_trigger(
    settings: &Settings,
    catalog: Catalog,
    subscription: Option<Uuid>,
    build: Option<u64>,
) -> Result<()> {
    let orchestrator = build_orchestrator(settings, catalog).await?;

    match (subscription, build) {
        (Some(id), build) => {
            let outcome = orchestrator.trigger_subscription(id, build).await?;
            print_outcome(&id.to_string(), &outcome);
        }
        (None, Some(build)) => {
            let results = orchestrator.on_new_build(build).await?;
            if results.is_empty() {
                println!("No subscription follows build {}", build.to_string().accent());
            }
            for (id, outcome) in results {
                match outcome {
                    Ok(outcome) => print_outcome(&id.to_string(), &outcome),
                    Err(e) => eprintln!("{} {id}: {}", cross(), e.to_string().error()),
                }
            }
        }
        (None, None) => {
            return Err(depflow::Error::Config(
                "either --subscription or --build is required".to_string(),
            ));
        }
    }
    Ok(())
}

/// Record the code flow branch of a subscription
pub async fn run_code_flow_status(
    settings: &Settings,
    catalog: Catalog,
    subscription: Uuid,
    sha: String,
    branch: String,
) -> Result<()> {
    let orchestrator = build_orchestrator(settings, catalog).await?;
    let outcome = orchestrator
        .record_code_flow_status(
            subscription,
            CodeFlowStatus {
                last_synced_sha: sha,
                pr_branch: branch,
            },
        )
        .await?;
    print_outcome(&subscription.to_string(), &outcome);
    Ok(())
}

/// Fire due reminders, once or until interrupted
pub async fn run_loop(settings: &Settings, catalog: Catalog, once: bool) -> Result<()> {
    let orchestrator = build_orchestrator(settings, catalog).await?;

    if once {
        let fired = orchestrator.fire_due_reminders(Utc::now()).await?;
        if fired.is_empty() {
            println!("No reminders due");
        }
        for reminder in fired {
            let label = format!("{} ({:?})", reminder.key, reminder.kind);
            match reminder.outcome {
                Ok(outcome) => print_outcome(&label, &outcome),
                Err(e) => eprintln!("{} {label}: {}", cross(), e.to_string().error()),
            }
        }
        return Ok(());
    }

    println!(
        "{} Watching reminders in {}",
        arrow(),
        settings.state_dir.display().to_string().accent()
    );
    orchestrator
        .run(settings.poll_interval(), async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

/// Print every persisted actor
///
/// Reads the state directory only; no provider credentials are needed.
pub async fn run_status(settings: &Settings) -> Result<()> {
    let store = FileStateStore::new(&settings.state_dir);
    let mut records = Vec::new();
    for key in store.keys().await? {
        records.push(store.load(&key).await?);
    }

    if records.is_empty() {
        println!("No active actors");
        return Ok(());
    }

    for record in records {
        println!("{}", record.key.to_string().emphasis());
        if let Some(pr) = &record.pull_request {
            println!(
                "  {} {} ({} subscription(s), {} update(s))",
                arrow(),
                hyperlink_url(Stream::Stdout, &pr.url).accent(),
                pr.contained_subscriptions.len(),
                pr.required_updates.len()
            );
            if !pr.coherency_check_successful {
                println!(
                    "    {}",
                    format!("{} coherency error(s)", pr.coherency_errors.len()).warn()
                );
            }
            if let Some(status) = pr.merge_policy_result {
                println!("    merge policies: {}", format!("{status:?}").muted());
            }
        }
        if let Some(code_flow) = &record.code_flow {
            println!(
                "  {} code flow {} at {}",
                bullet(),
                code_flow.pr_branch.accent(),
                code_flow.last_synced_sha.muted()
            );
        }
        for update in &record.pending_updates {
            println!(
                "  {} pending build {} for {}",
                bullet(),
                update.build_id.to_string().accent(),
                update.subscription_id.to_string().muted()
            );
        }
        for (kind, at) in record.reminders.iter() {
            println!(
                "  {} {:?} due {}",
                bullet(),
                kind,
                at.to_rfc3339().muted()
            );
        }
    }
    Ok(())
}
