//! # Release Tagger
//!
//! Verify-then-promote release tagging across source control and a container registry.
//!
//! Before anything is mutated, this crate checks that the commit at the head of the
//! release branch is the commit the built images were produced from. Only then does it
//! pin the release version as an immutable git tag and move the matching image tags.
//!
//! ## Features
//!
//! - **Immutable Git Tags**: An existing version tag at another commit is a hard failure
//! - **Image Verification**: Each image's commit label must match the tagged commit
//! - **Fail Fast**: The first mismatch stops the run before later repositories are touched
//! - **Idempotent Re-runs**: Correct existing tags are detected and left alone
//! - **Visibility Wait**: Optionally poll the registry until promoted tags are served
//!
//! ## Usage
//!
//! ```bash
//! kodegen_release_tagger --release-version 2.0.0-rc1 --github-repo org/operator \
//!     --quay-repos org/operator,org/operator-test --wait
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Core modules
pub mod cli;
pub mod error;
pub mod git;
pub mod http;
pub mod reconcile;
pub mod registry;

// Re-export main types for public API
pub use cli::Args;
pub use error::{CliError, GitError, MismatchError, RegistryError, ReleaseError, Result};
pub use git::{GitHubReferences, GitHubRepoInfo, GitReference, ReferenceSource};
pub use reconcile::{
    GitTagOutcome, ReconcileReport, ReleaseReconciler, RepositoryOutcome, TagReleaseOptions,
    WaitConfig,
};
pub use registry::{ManifestLabel, ManifestLabelReader, QuayRegistry, RegistryTag, TagStore};

use std::collections::HashMap;

/// Snapshot of environment variables used for tokens and tuning
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    vars: HashMap<String, String>,
}

impl EnvConfig {
    /// Capture the current process environment
    pub fn from_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build from explicit key/value pairs
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a variable; empty values count as unset
    pub fn get(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }

    /// First set variable among `keys`
    pub fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_config_treats_empty_as_unset() {
        let env = EnvConfig::from_vars([("GH_TOKEN", ""), ("GITHUB_TOKEN", "ghp_abc")]);
        assert_eq!(env.get("GH_TOKEN"), None);
        assert_eq!(
            env.first_of(&["GH_TOKEN", "GITHUB_TOKEN"]),
            Some("ghp_abc".to_string())
        );
    }
}
