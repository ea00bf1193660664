//! Git reference contract and types for release tagging.
//!
//! This module defines the ReferenceSource trait listing the only reference
//! operations the reconciler needs. The GitHub implementation lives in the
//! github_adapter module; tests substitute in-memory fakes.

use crate::error::{CliError, Result};
use std::fmt;
use std::future::Future;
use std::str::FromStr;

/// Prefix of branch head references
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Prefix of tag references
pub const TAG_REF_PREFIX: &str = "refs/tags/";

/// Read and create references in a single hosted repository
pub trait ReferenceSource {
    /// Resolve a fully-qualified reference to the commit it points at.
    ///
    /// Returns `Ok(None)` when the reference does not exist. Annotated tags
    /// are peeled so `commit_sha` is always a commit.
    fn resolve_reference(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
    ) -> impl Future<Output = Result<Option<GitReference>>>;

    /// Create a new reference pointing at `commit_sha`.
    ///
    /// Fails with `GitError::ReferenceExists` if the reference is already present.
    fn create_reference(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        commit_sha: &str,
    ) -> impl Future<Output = Result<GitReference>>;
}

/// A named reference and the commit it resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitReference {
    /// Fully-qualified reference name (e.g. `refs/tags/1.2.0`)
    pub name: String,
    /// Commit SHA the reference resolves to
    pub commit_sha: String,
}

impl GitReference {
    /// Create a reference value
    pub fn new(name: impl Into<String>, commit_sha: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commit_sha: commit_sha.into(),
        }
    }
}

/// Build the full reference name of a branch head
pub fn branch_ref(branch: &str) -> String {
    format!("{BRANCH_REF_PREFIX}{}", branch.trim_start_matches(BRANCH_REF_PREFIX))
}

/// Build the full reference name of a tag; `tag` is a short name
pub fn tag_ref(tag: &str) -> String {
    format!("{TAG_REF_PREFIX}{tag}")
}

/// Owner and name of a hosted git repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepoInfo {
    /// Repository owner (user or organisation)
    pub owner: String,
    /// Repository name
    pub repo: String,
}

impl GitHubRepoInfo {
    /// Create repository info from owner and name
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl FromStr for GitHubRepoInfo {
    type Err = CliError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(".git");
        let trimmed = trimmed
            .strip_prefix("https://github.com/")
            .unwrap_or(trimmed);

        match trimmed.split_once('/') {
            Some((owner, repo))
                if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
            {
                Ok(Self::new(owner, repo))
            }
            _ => Err(CliError::InvalidArguments {
                reason: format!("expected GitHub repository as 'owner/repo', got '{}'", s),
            }),
        }
    }
}

impl fmt::Display for GitHubRepoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_ref() {
        assert_eq!(branch_ref("master"), "refs/heads/master");
        assert_eq!(branch_ref("refs/heads/release-2.0"), "refs/heads/release-2.0");
    }

    #[test]
    fn test_tag_ref() {
        assert_eq!(tag_ref("2.0.0-rc1"), "refs/tags/2.0.0-rc1");
    }

    #[test]
    fn test_parse_repo_info() {
        let info: GitHubRepoInfo = "integr8ly/operator".parse().unwrap();
        assert_eq!(info, GitHubRepoInfo::new("integr8ly", "operator"));
        assert_eq!(info.to_string(), "integr8ly/operator");
    }

    #[test]
    fn test_parse_repo_info_from_url() {
        let info: GitHubRepoInfo = "https://github.com/integr8ly/operator.git".parse().unwrap();
        assert_eq!(info, GitHubRepoInfo::new("integr8ly", "operator"));
    }

    #[test]
    fn test_parse_repo_info_invalid() {
        assert!("operator".parse::<GitHubRepoInfo>().is_err());
        assert!("/operator".parse::<GitHubRepoInfo>().is_err());
        assert!("a/b/c".parse::<GitHubRepoInfo>().is_err());
    }
}
