//! Command line argument parsing and validation.
//!
//! Every flag has an environment fallback so the tool drops into CI
//! pipelines without a wrapper script.

use crate::EnvConfig;
use crate::error::{CliError, Result};
use crate::git::{GITHUB_API_URL, GitHubRepoInfo};
use crate::reconcile::{DEFAULT_BRANCH, DEFAULT_COMMIT_LABEL, TagReleaseOptions, WaitConfig};
use crate::registry::QUAY_API_URL;
use clap::Parser;
use std::time::Duration;

/// Tag a release in git and promote its verified images in the registry
#[derive(Parser, Debug, Clone)]
#[command(
    name = "kodegen_release_tagger",
    version,
    about = "Tag a release in git and promote its verified images in the registry",
    long_about = "Verify that the images built for a branch carry the branch head commit,
then tag that commit with the release version and retag the images.

Usage:
  kodegen_release_tagger --release-version 2.0.0 --github-repo org/operator
  kodegen_release_tagger --release-version 2.0.0 --github-repo org/operator \\
      --quay-repos org/operator,org/operator-test --wait"
)]
pub struct Args {
    /// Release version, used as both the git tag and the image tag
    #[arg(long, env = "RELEASE_VERSION", value_name = "VERSION")]
    pub release_version: String,

    /// Branch whose head commit is released
    #[arg(long, env = "RELEASE_BRANCH", default_value = DEFAULT_BRANCH)]
    pub branch: String,

    /// GitHub repository to tag, as owner/repo
    #[arg(long, env = "GITHUB_REPO", value_name = "OWNER/REPO")]
    pub github_repo: String,

    /// Comma-separated registry repositories to promote (empty: git only)
    #[arg(long, env = "QUAY_REPOS", default_value = "", value_name = "REPOS")]
    pub quay_repos: String,

    /// Candidate build tag to promote [default: the branch name]
    #[arg(long, env = "BUILD_TAG")]
    pub build_tag: Option<String>,

    /// Manifest label holding the image's source commit
    #[arg(long, default_value = DEFAULT_COMMIT_LABEL)]
    pub commit_label: String,

    /// Wait until promoted tags are visible in the registry
    #[arg(long)]
    pub wait: bool,

    /// Maximum seconds to wait for promoted tags
    #[arg(long, value_name = "SECS")]
    pub wait_timeout: Option<u64>,

    /// GitHub API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = GITHUB_API_URL)]
    pub github_api_url: String,

    /// Quay API base URL
    #[arg(long, env = "QUAY_API_URL", default_value = QUAY_API_URL)]
    pub quay_api_url: String,

    /// Show step-by-step details
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.release_version.trim().is_empty() {
            return Err("Release version is required".to_string());
        }
        if self.github_repo.parse::<GitHubRepoInfo>().is_err() {
            return Err(format!(
                "GitHub repository must be owner/repo, got '{}'",
                self.github_repo
            ));
        }
        if self.wait_timeout == Some(0) {
            return Err("--wait-timeout must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Parsed git repository identity
    pub fn repo_info(&self) -> Result<GitHubRepoInfo> {
        Ok(self.github_repo.parse::<GitHubRepoInfo>()?)
    }

    /// Options for the reconciler
    pub fn to_options(&self) -> TagReleaseOptions {
        let mut options = TagReleaseOptions::new(self.release_version.trim(), self.branch.trim())
            .with_registry_repositories(&self.quay_repos)
            .with_wait(self.wait)
            .with_commit_label(self.commit_label.trim());
        if let Some(build_tag) = self.build_tag.as_deref().map(str::trim)
            && !build_tag.is_empty()
        {
            options = options.with_build_tag(build_tag);
        }
        options
    }

    /// Wait schedule from the environment, with the CLI timeout taking precedence
    pub fn wait_config(&self, env: &EnvConfig) -> WaitConfig {
        let mut config = WaitConfig::from_env(env);
        if let Some(secs) = self.wait_timeout {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }
}

/// Resolve the GitHub token from the environment
pub fn github_token(env: &EnvConfig) -> Result<String> {
    env.first_of(&["GH_TOKEN", "GITHUB_TOKEN"]).ok_or_else(|| {
        CliError::MissingArgument {
            argument: "GitHub token (set GH_TOKEN or GITHUB_TOKEN)".to_string(),
        }
        .into()
    })
}

/// Resolve the registry token; reads of public repositories work without one
pub fn quay_token(env: &EnvConfig) -> Option<String> {
    env.first_of(&["QUAY_TOKEN", "QUAY_OAUTH_TOKEN"])
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    output: super::OutputManager,
}

impl RuntimeConfig {
    /// Create runtime configuration
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            output: super::OutputManager::new(verbose, quiet),
        }
    }

    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Check if quiet output is requested
    pub fn is_quiet(&self) -> bool {
        self.output.is_quiet()
    }
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self::new(args.verbose, args.quiet)
    }
}
