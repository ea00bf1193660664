//! Result types for a tag release run.

use crate::error::{ReleaseError, Result};
use std::time::Duration;

/// What happened to the git version tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitTagOutcome {
    /// Tag was created at the branch head
    Created,
    /// Tag already existed at the branch head
    AlreadyPresent,
}

/// Per-repository promotion state
#[derive(Debug)]
pub enum RepositoryOutcome {
    /// Not visited yet (or not visited because an earlier repository failed)
    Pending,
    /// No candidate build tag present; nothing to promote
    Skipped {
        /// Build tag that was looked for
        build_tag: String,
    },
    /// Release tag points at the verified image
    Promoted {
        /// Digest the release tag now points at
        manifest_digest: String,
        /// True when the tag already pointed there and no mutation was issued
        already_current: bool,
        /// Number of visibility polls, when waiting was requested
        wait_attempts: Option<u32>,
    },
    /// Verification or promotion failed
    Failed(ReleaseError),
}

impl RepositoryOutcome {
    /// Whether this outcome is a failure
    pub fn is_failed(&self) -> bool {
        matches!(self, RepositoryOutcome::Failed(_))
    }

    /// Move the error out of a failed outcome, leaving it pending
    fn take_failure(&mut self) -> Option<ReleaseError> {
        if !self.is_failed() {
            return None;
        }
        match std::mem::replace(self, RepositoryOutcome::Pending) {
            RepositoryOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Outcome for one registry repository
#[derive(Debug)]
pub struct RepositoryReport {
    /// Registry repository name
    pub repository: String,
    /// Promotion state
    pub outcome: RepositoryOutcome,
}

impl RepositoryReport {
    /// Create a pending entry for `repository`
    pub fn pending(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            outcome: RepositoryOutcome::Pending,
        }
    }

    /// Whether this repository failed
    pub fn is_failed(&self) -> bool {
        self.outcome.is_failed()
    }
}

/// Result of a complete tag release run
#[derive(Debug)]
pub struct ReconcileReport {
    /// Version that was tagged
    pub release_version: String,
    /// Branch the release was taken from
    pub branch: String,
    /// Commit the git tag points at; every image was checked against it
    pub reference_commit: String,
    /// What happened to the git tag
    pub git_tag: GitTagOutcome,
    /// Registry outcomes in configured order
    pub repositories: Vec<RepositoryReport>,
    /// When the run started
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Duration of the run
    pub duration: Duration,
}

impl ReconcileReport {
    /// Repositories whose release tag now points at the verified image
    pub fn promoted(&self) -> Vec<&str> {
        self.repositories
            .iter()
            .filter(|r| matches!(r.outcome, RepositoryOutcome::Promoted { .. }))
            .map(|r| r.repository.as_str())
            .collect()
    }

    /// Repositories that had nothing to promote
    pub fn skipped(&self) -> Vec<&str> {
        self.repositories
            .iter()
            .filter(|r| matches!(r.outcome, RepositoryOutcome::Skipped { .. }))
            .map(|r| r.repository.as_str())
            .collect()
    }

    /// Whether any repository failed
    pub fn has_failure(&self) -> bool {
        self.repositories.iter().any(RepositoryReport::is_failed)
    }

    /// Reduce the report to its first failure, if any
    pub fn into_result(mut self) -> Result<Self> {
        let failure = self
            .repositories
            .iter_mut()
            .find_map(|r| r.outcome.take_failure());
        match failure {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }

    /// Format result for display
    pub fn format_result(&self) -> String {
        let short = short_sha(&self.reference_commit);
        let mut result = format!("🎉 Release {} tagged successfully!\n", self.release_version);
        match self.git_tag {
            GitTagOutcome::Created => result.push_str(&format!(
                "🏷️  Git tag: {} created at {} (branch {})\n",
                self.release_version, short, self.branch
            )),
            GitTagOutcome::AlreadyPresent => result.push_str(&format!(
                "🏷️  Git tag: {} already at {} (branch {})\n",
                self.release_version, short, self.branch
            )),
        }

        if self.repositories.is_empty() {
            result.push_str("📦 No registry repositories configured\n");
        }

        for report in &self.repositories {
            let line = match &report.outcome {
                RepositoryOutcome::Promoted {
                    manifest_digest,
                    already_current: true,
                    ..
                } => format!(
                    "📦 {}:{} already at {}",
                    report.repository, self.release_version, manifest_digest
                ),
                RepositoryOutcome::Promoted {
                    manifest_digest, ..
                } => format!(
                    "📦 {}:{} -> {}",
                    report.repository, self.release_version, manifest_digest
                ),
                RepositoryOutcome::Skipped { build_tag } => format!(
                    "⏭️  {}: no '{}' image, skipped",
                    report.repository, build_tag
                ),
                RepositoryOutcome::Pending => format!("⋯ {}: not visited", report.repository),
                RepositoryOutcome::Failed(error) => {
                    format!("✗ {}: {}", report.repository, error)
                }
            };
            result.push_str(&line);
            result.push('\n');
        }

        result.push_str(&format!(
            "⏱️  Duration: {:.2}s (started {})\n",
            self.duration.as_secs_f64(),
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        result
    }
}

/// Abbreviate a commit SHA for display
pub fn short_sha(sha: &str) -> &str {
    sha.get(..12).unwrap_or(sha)
}
