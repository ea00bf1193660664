//! Tag release command implementation.
//!
//! Wires the GitHub and Quay adapters into the reconciler and reports the outcome.

use crate::EnvConfig;
use crate::cli::{Args, RuntimeConfig, github_token, quay_token};
use crate::error::Result;
use crate::git::GitHubReferences;
use crate::reconcile::{ReleaseReconciler, short_sha};
use crate::registry::QuayRegistry;
use tokio_util::sync::CancellationToken;

/// Execute the tag release run
pub(super) async fn execute_tag_release(
    args: &Args,
    env: &EnvConfig,
    config: &RuntimeConfig,
) -> Result<()> {
    let output = config.output();
    let repo = args.repo_info()?;
    let options = args.to_options();

    let github = GitHubReferences::with_base_url(github_token(env)?, &args.github_api_url)?;
    let quay_auth = quay_token(env);
    if quay_auth.is_none() && !options.registry_repositories.is_empty() {
        output.warn("No QUAY_TOKEN set; tag updates will be rejected by the registry");
    }
    let quay = QuayRegistry::with_base_url(quay_auth, &args.quay_api_url)?;

    output.section(&format!("Release {}", options.release_version));
    output.info(&format!("Repository: {} (branch {})", repo, options.branch));
    if options.registry_repositories.is_empty() {
        output.info("Registry: none configured, git tag only");
    } else {
        output.info(&format!(
            "Registry: {} (candidate tag '{}')",
            options.registry_repositories.join(", "),
            options.build_tag()
        ));
    }
    output.verbose(&format!("Commit label: {}", options.commit_label));

    let wait_config = args.wait_config(env);
    if options.wait {
        output.verbose(&format!(
            "Waiting up to {}s for promoted tags",
            wait_config.timeout.as_secs()
        ));
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping after the current request");
            interrupt.cancel();
        }
    });

    let reconciler =
        ReleaseReconciler::new(&github, &quay, &quay).with_wait_config(wait_config);
    let result = reconciler.reconcile(&repo, &options, &cancel).await;
    signal_task.abort();

    let report = result?;

    output.verbose(&format!(
        "Verified commit {}",
        short_sha(&report.reference_commit)
    ));
    let skipped = report.skipped();
    if !skipped.is_empty() {
        output.warn(&format!(
            "No '{}' image in {}",
            options.build_tag(),
            skipped.join(", ")
        ));
    }

    output.success(&format!("Release {} complete", report.release_version));
    for line in report.format_result().lines() {
        output.indent(line);
    }

    Ok(())
}
