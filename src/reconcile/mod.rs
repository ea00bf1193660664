//! Verification-then-promotion of a release across git and the registry.
//!
//! The reconciler first pins the release version to the branch head as an
//! immutable git tag, then promotes the matching build in each configured
//! registry repository. Registry repositories are visited in order and the
//! first failure stops the run; promotions already made are left in place.

mod options;
mod report;
mod wait;

pub use options::{DEFAULT_BRANCH, DEFAULT_COMMIT_LABEL, TagReleaseOptions, parse_repository_list};
pub use report::{GitTagOutcome, ReconcileReport, RepositoryOutcome, RepositoryReport, short_sha};
pub use wait::{WaitConfig, wait_until_visible};

use crate::error::{GitError, MismatchError, ReleaseError, Result};
use crate::git::{GitHubRepoInfo, GitReference, ReferenceSource, branch_ref, tag_ref};
use crate::registry::{ManifestLabelReader, TagStore, find_label, find_tag};
use std::future::Future;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Run `operation` unless `cancel` fires first.
pub(crate) async fn cancellable<F, T>(
    cancel: &CancellationToken,
    phase: &str,
    operation: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReleaseError::Cancelled {
            phase: phase.to_string(),
        }),
        result = operation => result,
    }
}

/// Reconciles a release version against a branch and built images
pub struct ReleaseReconciler<'a, G, T, L> {
    git: &'a G,
    tags: &'a T,
    labels: &'a L,
    wait_config: WaitConfig,
}

impl<'a, G, T, L> ReleaseReconciler<'a, G, T, L>
where
    G: ReferenceSource,
    T: TagStore,
    L: ManifestLabelReader,
{
    /// Create a reconciler over the given collaborators
    pub fn new(git: &'a G, tags: &'a T, labels: &'a L) -> Self {
        Self {
            git,
            tags,
            labels,
            wait_config: WaitConfig::default(),
        }
    }

    /// Use a custom visibility poll schedule
    pub fn with_wait_config(mut self, wait_config: WaitConfig) -> Self {
        self.wait_config = wait_config;
        self
    }

    /// Tag the release in git, then promote verified images.
    ///
    /// Returns the first fatal error encountered. Git tag mismatches stop
    /// the run before any registry call is made.
    pub async fn reconcile(
        &self,
        repo: &GitHubRepoInfo,
        options: &TagReleaseOptions,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport> {
        options.validate()?;
        if options.wait {
            self.wait_config.validate()?;
        }

        let started_at = chrono::Utc::now();
        let start = Instant::now();

        let (reference_commit, git_tag) = self.reconcile_git(repo, options, cancel).await?;

        let mut report = ReconcileReport {
            release_version: options.release_version.clone(),
            branch: options.branch.clone(),
            reference_commit,
            git_tag,
            repositories: options
                .registry_repositories
                .iter()
                .map(RepositoryReport::pending)
                .collect(),
            started_at,
            duration: start.elapsed(),
        };

        if report.repositories.is_empty() {
            log::info!("No registry repositories configured, skipping image promotion");
        }

        for entry in report.repositories.iter_mut() {
            let outcome = match self
                .promote(&entry.repository, options, &report.reference_commit, cancel)
                .await
            {
                Ok(outcome) => outcome,
                Err(error) => {
                    log::error!("Promotion failed for {}: {}", entry.repository, error);
                    RepositoryOutcome::Failed(error)
                }
            };
            let failed = outcome.is_failed();
            entry.outcome = outcome;
            if failed {
                break;
            }
        }

        report.duration = start.elapsed();

        if report.has_failure() {
            let promoted = report.promoted();
            if !promoted.is_empty() {
                log::warn!(
                    "Release {} stays promoted in {} despite the failure",
                    options.release_version,
                    promoted.join(", ")
                );
            }
        }

        report.into_result()
    }

    /// Establish the commit the version tag points at, creating the tag if needed
    async fn reconcile_git(
        &self,
        repo: &GitHubRepoInfo,
        options: &TagReleaseOptions,
        cancel: &CancellationToken,
    ) -> Result<(String, GitTagOutcome)> {
        let branch_name = branch_ref(&options.branch);
        let branch = cancellable(
            cancel,
            "branch lookup",
            self.git
                .resolve_reference(&repo.owner, &repo.repo, &branch_name),
        )
        .await?
        .ok_or_else(|| GitError::BranchNotFound {
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            branch: options.branch.clone(),
        })?;
        log::info!("{} of {} is at {}", branch_name, repo, branch.commit_sha);

        let tag_name = tag_ref(&options.release_version);
        let existing = cancellable(
            cancel,
            "tag lookup",
            self.git.resolve_reference(&repo.owner, &repo.repo, &tag_name),
        )
        .await?;

        if let Some(tag) = existing {
            let sha = check_existing_tag(tag, &branch, options)?;
            return Ok((sha, GitTagOutcome::AlreadyPresent));
        }

        let created = cancellable(
            cancel,
            "tag creation",
            self.git
                .create_reference(&repo.owner, &repo.repo, &tag_name, &branch.commit_sha),
        )
        .await;

        match created {
            Ok(tag) => {
                log::info!("Created {} at {}", tag.name, tag.commit_sha);
                Ok((tag.commit_sha, GitTagOutcome::Created))
            }
            Err(ReleaseError::Git(GitError::ReferenceExists { .. })) => {
                log::warn!("{} was created concurrently, re-checking its target", tag_name);
                let tag = cancellable(
                    cancel,
                    "tag lookup",
                    self.git.resolve_reference(&repo.owner, &repo.repo, &tag_name),
                )
                .await?
                .ok_or_else(|| GitError::RemoteOperationFailed {
                    operation: format!("resolve {}", tag_name),
                    reason: "reference reported as existing but could not be resolved"
                        .to_string(),
                })?;
                let sha = check_existing_tag(tag, &branch, options)?;
                Ok((sha, GitTagOutcome::AlreadyPresent))
            }
            Err(error) => Err(error),
        }
    }

    /// Verify and promote the candidate build in one repository
    async fn promote(
        &self,
        repository: &str,
        options: &TagReleaseOptions,
        reference_commit: &str,
        cancel: &CancellationToken,
    ) -> Result<RepositoryOutcome> {
        let build_tag = options.build_tag();
        let tags = cancellable(
            cancel,
            &format!("tag listing of {}", repository),
            self.tags.list_tags(repository),
        )
        .await?;

        let Some(candidate) = find_tag(&tags, build_tag) else {
            log::info!("{}: no '{}' tag, nothing to promote", repository, build_tag);
            return Ok(RepositoryOutcome::Skipped {
                build_tag: build_tag.to_string(),
            });
        };
        let digest = candidate.manifest_digest.clone();

        let labels = cancellable(
            cancel,
            &format!("label lookup in {}", repository),
            self.labels
                .list_manifest_labels(repository, &digest, Some(options.commit_label.as_str())),
        )
        .await?;

        match find_label(&labels, &options.commit_label) {
            None => {
                return Err(MismatchError::MissingCommitLabel {
                    repository: repository.to_string(),
                    build_tag: build_tag.to_string(),
                    digest,
                    label: options.commit_label.clone(),
                    expected: reference_commit.to_string(),
                }
                .into());
            }
            Some(found) if found != reference_commit => {
                return Err(MismatchError::ImageCommit {
                    repository: repository.to_string(),
                    build_tag: build_tag.to_string(),
                    digest,
                    expected: reference_commit.to_string(),
                    found: found.to_string(),
                }
                .into());
            }
            Some(_) => {}
        }

        let release_tag = options.release_version.as_str();
        let already_current =
            find_tag(&tags, release_tag).is_some_and(|t| t.manifest_digest == digest);

        if already_current {
            log::info!("{}:{} already points at {}", repository, release_tag, digest);
        } else {
            cancellable(
                cancel,
                &format!("tag update in {}", repository),
                self.tags.create_or_move_tag(repository, release_tag, &digest),
            )
            .await?;
            log::info!("{}:{} now points at {}", repository, release_tag, digest);
        }

        let wait_attempts = if options.wait {
            Some(
                wait_until_visible(
                    self.tags,
                    repository,
                    release_tag,
                    &digest,
                    &self.wait_config,
                    cancel,
                )
                .await?,
            )
        } else {
            None
        };

        Ok(RepositoryOutcome::Promoted {
            manifest_digest: digest,
            already_current,
            wait_attempts,
        })
    }
}

/// Accept an existing version tag only if it is at the branch head
fn check_existing_tag(
    tag: GitReference,
    branch: &GitReference,
    options: &TagReleaseOptions,
) -> Result<String> {
    if tag.commit_sha != branch.commit_sha {
        return Err(MismatchError::TagCommit {
            tag: options.release_version.clone(),
            tag_sha: tag.commit_sha,
            branch: options.branch.clone(),
            branch_sha: branch.commit_sha.clone(),
        }
        .into());
    }

    log::info!("{} already exists at {}", tag.name, tag.commit_sha);
    Ok(tag.commit_sha)
}
