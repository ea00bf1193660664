//! Container registry contracts and types for image promotion.
//!
//! Tag listing/moving and manifest label reads are separate traits so each
//! can be faked on its own. The Quay implementation provides both.

use crate::error::Result;
use std::future::Future;

/// Read and move tags in registry repositories
pub trait TagStore {
    /// List every active tag in `repository`.
    ///
    /// Order is unspecified; callers look tags up by name.
    fn list_tags(&self, repository: &str) -> impl Future<Output = Result<Vec<RegistryTag>>>;

    /// Point `tag` at `manifest_digest`, creating it if absent and
    /// overwriting its target if present.
    fn create_or_move_tag(
        &self,
        repository: &str,
        tag: &str,
        manifest_digest: &str,
    ) -> impl Future<Output = Result<()>>;
}

/// Read labels attached to image manifests
pub trait ManifestLabelReader {
    /// List labels on a manifest, restricted to `key_filter` when given.
    fn list_manifest_labels(
        &self,
        repository: &str,
        manifest_digest: &str,
        key_filter: Option<&str>,
    ) -> impl Future<Output = Result<Vec<ManifestLabel>>>;
}

/// A mutable registry tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryTag {
    /// Tag name
    pub name: String,
    /// Digest of the manifest the tag points at
    pub manifest_digest: String,
}

impl RegistryTag {
    /// Create a tag value
    pub fn new(name: impl Into<String>, manifest_digest: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manifest_digest: manifest_digest.into(),
        }
    }
}

/// A key/value label on an image manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLabel {
    /// Label key
    pub key: String,
    /// Label value
    pub value: String,
}

impl ManifestLabel {
    /// Create a label value
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Find a tag by name
pub fn find_tag<'a>(tags: &'a [RegistryTag], name: &str) -> Option<&'a RegistryTag> {
    tags.iter().find(|tag| tag.name == name)
}

/// Find the value of a label by key
pub fn find_label<'a>(labels: &'a [ManifestLabel], key: &str) -> Option<&'a str> {
    labels
        .iter()
        .find(|label| label.key == key)
        .map(|label| label.value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_tag_anywhere_in_list() {
        let tags = vec![
            RegistryTag::new("1.0.0", "sha256:old"),
            RegistryTag::new("latest", "sha256:new"),
            RegistryTag::new("master", "sha256:new"),
        ];
        assert_eq!(
            find_tag(&tags, "master").map(|t| t.manifest_digest.as_str()),
            Some("sha256:new")
        );
        assert!(find_tag(&tags, "2.0.0").is_none());
    }

    #[test]
    fn test_find_label_ignores_other_keys() {
        let labels = vec![
            ManifestLabel::new("vendor", "integr8ly"),
            ManifestLabel::new("io.openshift.build.commit.id", "testsha"),
        ];
        assert_eq!(
            find_label(&labels, "io.openshift.build.commit.id"),
            Some("testsha")
        );
        assert_eq!(find_label(&labels, "missing"), None);
    }
}
