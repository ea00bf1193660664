//! Comprehensive error types for release tagging operations.
//!
//! This module defines all error types with actionable error messages and recovery suggestions.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for release tagging operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all release tagging operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Git hosting errors
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// Container registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A commit recorded somewhere disagrees with the commit being released
    #[error("Commit mismatch: {0}")]
    Mismatch(#[from] MismatchError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// The caller cancelled the run
    #[error("Operation cancelled during {phase}")]
    Cancelled {
        /// Phase that was interrupted
        phase: String,
    },

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors from anyhow, shown with their context chain
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),
}

/// Git hosting errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Branch to release from does not exist
    #[error("Branch '{branch}' not found in {owner}/{repo}")]
    BranchNotFound {
        /// Repository owner
        owner: String,
        /// Repository name
        repo: String,
        /// Branch name
        branch: String,
    },

    /// Reference already exists and cannot be overwritten
    #[error("Git reference '{reference}' already exists")]
    ReferenceExists {
        /// Full reference name
        reference: String,
    },

    /// Git authentication failed
    #[error("Git authentication failed: {reason}")]
    AuthenticationFailed {
        /// Reason for the error
        reason: String,
    },

    /// Remote operation failed
    #[error("Git remote operation failed: {operation} - {reason}")]
    RemoteOperationFailed {
        /// Operation that failed
        operation: String,
        /// Reason for the error
        reason: String,
    },
}

/// Container registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Registry authentication failed
    #[error("Registry authentication failed for '{repository}': {reason}")]
    AuthenticationFailed {
        /// Registry repository
        repository: String,
        /// Reason for the error
        reason: String,
    },

    /// Registry request failed
    #[error("Registry request failed for '{repository}': {operation} - {reason}")]
    RequestFailed {
        /// Registry repository
        repository: String,
        /// Operation that failed
        operation: String,
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Reason for the error
        reason: String,
    },

    /// Promoted tag did not become visible in time
    #[error(
        "Timed out after {:.0}s waiting for tag '{tag}' in '{repository}' to point at {digest}",
        waited.as_secs_f64()
    )]
    TimeoutWaiting {
        /// Registry repository
        repository: String,
        /// Tag being waited on
        tag: String,
        /// Expected manifest digest
        digest: String,
        /// Time spent waiting
        waited: Duration,
    },
}

/// Commit disagreement between git and a registry image
#[derive(Error, Debug)]
pub enum MismatchError {
    /// Version tag already exists at another commit
    #[error(
        "Git tag '{tag}' already points at {tag_sha}, but branch '{branch}' is at {branch_sha}"
    )]
    TagCommit {
        /// Tag name
        tag: String,
        /// Commit the tag points at
        tag_sha: String,
        /// Branch name
        branch: String,
        /// Commit at the branch head
        branch_sha: String,
    },

    /// Image was built from another commit
    #[error(
        "Image '{repository}:{build_tag}' ({digest}) was built from {found}, expected {expected}"
    )]
    ImageCommit {
        /// Registry repository
        repository: String,
        /// Candidate build tag
        build_tag: String,
        /// Candidate manifest digest
        digest: String,
        /// Commit being released
        expected: String,
        /// Commit recorded on the image
        found: String,
    },

    /// Image carries no commit label
    #[error(
        "Image '{repository}:{build_tag}' ({digest}) has no '{label}' label, expected {expected}"
    )]
    MissingCommitLabel {
        /// Registry repository
        repository: String,
        /// Candidate build tag
        build_tag: String,
        /// Candidate manifest digest
        digest: String,
        /// Label key that was looked up
        label: String,
        /// Commit being released
        expected: String,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Missing required argument
    #[error("Missing required argument: {argument}")]
    MissingArgument {
        /// Argument name
        argument: String,
    },
}

impl ReleaseError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ReleaseError::Git(GitError::BranchNotFound { branch, .. }) => vec![
                format!("Check that branch '{}' exists on the remote", branch),
                "Pass the release branch explicitly with --branch".to_string(),
            ],
            ReleaseError::Git(GitError::AuthenticationFailed { .. }) => vec![
                "Set GH_TOKEN or GITHUB_TOKEN to a token with contents:write".to_string(),
                "Verify the token has access to the repository".to_string(),
            ],
            ReleaseError::Registry(RegistryError::AuthenticationFailed { repository, .. }) => {
                vec![
                    "Set QUAY_TOKEN to an OAuth token with repo:write scope".to_string(),
                    format!("Verify the token can administer '{}'", repository),
                ]
            }
            ReleaseError::Registry(RegistryError::TimeoutWaiting { .. }) => vec![
                "Re-run the command: promotion is idempotent".to_string(),
                "Increase --wait-timeout if the registry is slow to converge".to_string(),
            ],
            ReleaseError::Mismatch(MismatchError::TagCommit { tag, .. }) => vec![
                format!("Tag '{}' is immutable; choose a new release version", tag),
                "Or reset the branch to the tagged commit before re-running".to_string(),
            ],
            ReleaseError::Mismatch(
                MismatchError::ImageCommit { repository, .. }
                | MismatchError::MissingCommitLabel { repository, .. },
            ) => vec![
                format!("Rebuild '{}' from the release commit", repository),
                "Wait for the build pipeline to finish, then re-run".to_string(),
            ],
            ReleaseError::Cancelled { .. } => vec![
                "Re-run the command: completed steps are detected and skipped".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Check if this error is recoverable by re-running the whole reconciliation
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ReleaseError::Mismatch(_)
                | ReleaseError::Cli(_)
                | ReleaseError::Git(GitError::BranchNotFound { .. })
                | ReleaseError::Git(GitError::AuthenticationFailed { .. })
                | ReleaseError::Registry(RegistryError::AuthenticationFailed { .. })
        )
    }

    /// Check if this error reports a commit disagreement
    pub fn is_mismatch(&self) -> bool {
        matches!(self, ReleaseError::Mismatch(_))
    }
}
