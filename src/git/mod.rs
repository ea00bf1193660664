//! Git reference lookup and creation for release tagging.
//!
//! This module exposes the narrow ReferenceSource contract used by the
//! reconciler together with its GitHub REST implementation.

mod github_adapter;
mod operations;

pub use github_adapter::{GITHUB_API_URL, GitHubReferences};
pub use operations::{
    BRANCH_REF_PREFIX, GitHubRepoInfo, GitReference, ReferenceSource, TAG_REF_PREFIX, branch_ref,
    tag_ref,
};
