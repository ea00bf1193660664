//! Options for a tag release run.

use crate::error::{CliError, Result};

/// Manifest label carrying the commit an image was built from
pub const DEFAULT_COMMIT_LABEL: &str = "io.openshift.build.commit.id";

/// Branch released when none is given
pub const DEFAULT_BRANCH: &str = "master";

/// What to release and where to promote it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagReleaseOptions {
    /// Version used as both the git tag and the registry tag
    pub release_version: String,
    /// Branch whose head commit is being released
    pub branch: String,
    /// Poll the registry until promoted tags are visible
    pub wait: bool,
    /// Registry repositories to promote, in order
    pub registry_repositories: Vec<String>,
    /// Candidate build tag; defaults to the branch name
    pub build_tag: Option<String>,
    /// Label key holding the image's source commit
    pub commit_label: String,
}

impl TagReleaseOptions {
    /// Create options for releasing `release_version` from `branch`
    pub fn new(release_version: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            release_version: release_version.into(),
            branch: branch.into(),
            wait: false,
            registry_repositories: Vec::new(),
            build_tag: None,
            commit_label: DEFAULT_COMMIT_LABEL.to_string(),
        }
    }

    /// Set registry repositories from a comma-separated list
    pub fn with_registry_repositories(mut self, list: &str) -> Self {
        self.registry_repositories = parse_repository_list(list);
        self
    }

    /// Enable or disable waiting for promoted tags
    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Override the candidate build tag
    pub fn with_build_tag(mut self, build_tag: impl Into<String>) -> Self {
        self.build_tag = Some(build_tag.into());
        self
    }

    /// Override the commit label key
    pub fn with_commit_label(mut self, label: impl Into<String>) -> Self {
        self.commit_label = label.into();
        self
    }

    /// Tag naming the build to promote in each repository
    pub fn build_tag(&self) -> &str {
        self.build_tag.as_deref().unwrap_or(&self.branch)
    }

    /// Validate options before any external call is made
    pub fn validate(&self) -> Result<()> {
        if self.release_version.trim().is_empty() {
            return Err(CliError::MissingArgument {
                argument: "release version".to_string(),
            }
            .into());
        }
        if self.release_version.starts_with("refs/") {
            return Err(invalid(format!(
                "release version '{}' must be a short tag name, not a full reference",
                self.release_version
            )));
        }
        if !is_valid_ref_name(&self.release_version) {
            return Err(invalid(format!(
                "'{}' is not a valid git tag name",
                self.release_version
            )));
        }
        if !self.registry_repositories.is_empty() && !is_valid_image_tag(&self.release_version) {
            return Err(invalid(format!(
                "'{}' is not a valid image tag name",
                self.release_version
            )));
        }
        if self.branch.trim().is_empty() {
            return Err(CliError::MissingArgument {
                argument: "branch".to_string(),
            }
            .into());
        }
        if self.build_tag().trim().is_empty() {
            return Err(invalid("build tag must not be empty".to_string()));
        }
        if self.commit_label.trim().is_empty() {
            return Err(invalid("commit label must not be empty".to_string()));
        }

        if semver::Version::parse(self.release_version.trim_start_matches('v')).is_err() {
            log::warn!(
                "Release version '{}' is not a semantic version",
                self.release_version
            );
        }

        Ok(())
    }
}

fn invalid(reason: String) -> crate::error::ReleaseError {
    CliError::InvalidArguments { reason }.into()
}

/// Split a comma-separated repository list, dropping blanks
pub fn parse_repository_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Check a name against git's reference naming rules
fn is_valid_ref_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(['.', '/', '-'])
        && !name.ends_with(['.', '/'])
        && !name.ends_with(".lock")
        && !name.contains("..")
        && !name.contains("@{")
        && !name.contains("//")
        && name != "@"
        && !name
            .chars()
            .any(|c| c.is_ascii_control() || c.is_whitespace() || "~^:?*[\\".contains(c))
}

/// Check a name against the OCI tag grammar `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`
fn is_valid_image_tag(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 128
        && (first.is_ascii_alphanumeric() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repository_list() {
        assert_eq!(
            parse_repository_list(" org/operator, ,org/operator-test ,"),
            vec!["org/operator".to_string(), "org/operator-test".to_string()]
        );
        assert!(parse_repository_list("").is_empty());
    }

    #[test]
    fn test_build_tag_defaults_to_branch() {
        let options = TagReleaseOptions::new("2.0.0-rc1", "master");
        assert_eq!(options.build_tag(), "master");
        assert_eq!(options.with_build_tag("nightly").build_tag(), "nightly");
    }

    #[test]
    fn test_validate_rejects_empty_version() {
        assert!(TagReleaseOptions::new("", "master").validate().is_err());
        assert!(TagReleaseOptions::new("  ", "master").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_ref_names() {
        for version in ["1.0 rc", "1..0", "v1.lock", "-v1", "1.0~1", "rel/"] {
            assert!(
                TagReleaseOptions::new(version, "master").validate().is_err(),
                "{version} should be rejected"
            );
        }
    }

    #[test]
    fn test_image_tag_rules_only_apply_with_repositories() {
        let git_only = TagReleaseOptions::new("release/2.0", "master");
        assert!(git_only.validate().is_ok());

        let with_registry = git_only.with_registry_repositories("org/operator");
        assert!(with_registry.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_full_reference_version() {
        for version in ["refs/tags/2.0.0", "refs/heads/master"] {
            assert!(
                TagReleaseOptions::new(version, "master").validate().is_err(),
                "{version} should be rejected"
            );
        }
    }

    #[test]
    fn test_non_semver_version_is_accepted() {
        assert!(TagReleaseOptions::new("release-42", "main").validate().is_ok());
        assert!(TagReleaseOptions::new("v2.0.0-rc1", "main").validate().is_ok());
    }
}
