use kodegen_release_tagger::{
    GitError, GitHubRepoInfo, GitReference, GitTagOutcome, ManifestLabel, ManifestLabelReader,
    MismatchError, ReferenceSource, RegistryError, RegistryTag, ReleaseError, ReleaseReconciler,
    RepositoryOutcome, Result, TagReleaseOptions, TagStore, WaitConfig,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const HEAD: &str = "testsha";
const DIGEST: &str = "sha256:testdigest";

/// In-memory git host for a single repository
#[derive(Default)]
struct FakeGit {
    refs: RefCell<HashMap<String, String>>,
    created: RefCell<Vec<(String, String)>>,
    /// When set, the first create reports a conflict after another writer
    /// placed the tag at this commit
    racing_writer: RefCell<Option<String>>,
}

impl FakeGit {
    fn with_branch(branch: &str, sha: &str) -> Self {
        let git = Self::default();
        git.refs
            .borrow_mut()
            .insert(format!("refs/heads/{}", branch), sha.to_string());
        git
    }

    fn with_tag(self, tag: &str, sha: &str) -> Self {
        self.refs
            .borrow_mut()
            .insert(format!("refs/tags/{}", tag), sha.to_string());
        self
    }
}

impl ReferenceSource for FakeGit {
    async fn resolve_reference(
        &self,
        _owner: &str,
        _repo: &str,
        ref_name: &str,
    ) -> Result<Option<GitReference>> {
        Ok(self
            .refs
            .borrow()
            .get(ref_name)
            .map(|sha| GitReference::new(ref_name, sha.as_str())))
    }

    async fn create_reference(
        &self,
        _owner: &str,
        _repo: &str,
        ref_name: &str,
        commit_sha: &str,
    ) -> Result<GitReference> {
        if let Some(winner) = self.racing_writer.borrow_mut().take() {
            self.refs.borrow_mut().insert(ref_name.to_string(), winner);
        }
        if self.refs.borrow().contains_key(ref_name) {
            return Err(GitError::ReferenceExists {
                reference: ref_name.to_string(),
            }
            .into());
        }
        self.refs
            .borrow_mut()
            .insert(ref_name.to_string(), commit_sha.to_string());
        self.created
            .borrow_mut()
            .push((ref_name.to_string(), commit_sha.to_string()));
        Ok(GitReference::new(ref_name, commit_sha))
    }
}

/// In-memory registry keyed by repository
#[derive(Default)]
struct FakeRegistry {
    tags: RefCell<HashMap<String, Vec<RegistryTag>>>,
    labels: HashMap<String, Vec<ManifestLabel>>,
    listed: RefCell<Vec<String>>,
    moves: RefCell<Vec<(String, String, String)>>,
    label_filters: RefCell<Vec<Option<String>>>,
    /// Listings that still show the pre-move state after a tag move
    stale_listings: Cell<u32>,
    /// Moves are accepted but never become visible
    never_visible: bool,
    pending: RefCell<Vec<(String, String, String)>>,
}

impl FakeRegistry {
    fn with_image(mut self, repository: &str, tag: &str, digest: &str, commit: &str) -> Self {
        self.tags
            .borrow_mut()
            .entry(repository.to_string())
            .or_default()
            .push(RegistryTag::new(tag, digest));
        self.labels.insert(
            digest.to_string(),
            vec![
                ManifestLabel::new("vendor", "Example"),
                ManifestLabel::new("io.openshift.build.commit.id", commit),
            ],
        );
        self
    }

    fn with_tag(self, repository: &str, tag: &str, digest: &str) -> Self {
        self.tags
            .borrow_mut()
            .entry(repository.to_string())
            .or_default()
            .push(RegistryTag::new(tag, digest));
        self
    }

    fn apply(&self, repository: &str, tag: &str, digest: &str) {
        let mut tags = self.tags.borrow_mut();
        let entries = tags.entry(repository.to_string()).or_default();
        entries.retain(|t| t.name != tag);
        entries.push(RegistryTag::new(tag, digest));
    }

    fn moved(&self) -> Vec<(String, String, String)> {
        self.moves.borrow().clone()
    }
}

impl TagStore for FakeRegistry {
    async fn list_tags(&self, repository: &str) -> Result<Vec<RegistryTag>> {
        self.listed.borrow_mut().push(repository.to_string());
        if !self.never_visible {
            if self.stale_listings.get() > 0 && !self.pending.borrow().is_empty() {
                self.stale_listings.set(self.stale_listings.get() - 1);
            } else {
                for (repo, tag, digest) in self.pending.borrow_mut().drain(..) {
                    self.apply(&repo, &tag, &digest);
                }
            }
        }
        Ok(self
            .tags
            .borrow()
            .get(repository)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_or_move_tag(
        &self,
        repository: &str,
        tag: &str,
        manifest_digest: &str,
    ) -> Result<()> {
        let entry = (
            repository.to_string(),
            tag.to_string(),
            manifest_digest.to_string(),
        );
        self.moves.borrow_mut().push(entry.clone());
        self.pending.borrow_mut().push(entry);
        Ok(())
    }
}

impl ManifestLabelReader for FakeRegistry {
    async fn list_manifest_labels(
        &self,
        _repository: &str,
        manifest_digest: &str,
        key_filter: Option<&str>,
    ) -> Result<Vec<ManifestLabel>> {
        self.label_filters
            .borrow_mut()
            .push(key_filter.map(str::to_string));
        Ok(self
            .labels
            .get(manifest_digest)
            .into_iter()
            .flatten()
            .filter(|l| key_filter.is_none_or(|k| l.key == k))
            .cloned()
            .collect())
    }
}

/// Registry that must never be reached
struct UnreachableRegistry;

impl TagStore for UnreachableRegistry {
    async fn list_tags(&self, repository: &str) -> Result<Vec<RegistryTag>> {
        panic!("registry listed {repository} after git verification failed");
    }

    async fn create_or_move_tag(&self, repository: &str, tag: &str, _: &str) -> Result<()> {
        panic!("registry moved {repository}:{tag} after git verification failed");
    }
}

impl ManifestLabelReader for UnreachableRegistry {
    async fn list_manifest_labels(
        &self,
        repository: &str,
        _: &str,
        _: Option<&str>,
    ) -> Result<Vec<ManifestLabel>> {
        panic!("registry labels read in {repository} after git verification failed");
    }
}

fn repo() -> GitHubRepoInfo {
    GitHubRepoInfo::new("org", "operator")
}

fn options(repositories: &str) -> TagReleaseOptions {
    TagReleaseOptions::new("2.0.0-rc1", "master").with_registry_repositories(repositories)
}

fn quick_wait(timeout_ms: u64) -> WaitConfig {
    WaitConfig {
        timeout: Duration::from_millis(timeout_ms),
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn test_verified_release_is_tagged_and_promoted() {
    let git = FakeGit::with_branch("master", HEAD);
    let registry = FakeRegistry::default().with_image("org/operator", "master", DIGEST, HEAD);
    let reconciler = ReleaseReconciler::new(&git, &registry, &registry);

    let report = reconciler
        .reconcile(&repo(), &options("org/operator"), &CancellationToken::new())
        .await
        .expect("release should succeed");

    assert_eq!(report.reference_commit, HEAD);
    assert_eq!(report.git_tag, GitTagOutcome::Created);
    assert_eq!(
        git.created.borrow().as_slice(),
        &[("refs/tags/2.0.0-rc1".to_string(), HEAD.to_string())]
    );
    assert_eq!(
        registry.moved(),
        vec![(
            "org/operator".to_string(),
            "2.0.0-rc1".to_string(),
            DIGEST.to_string()
        )]
    );
    assert_eq!(
        registry.label_filters.borrow().as_slice(),
        &[Some("io.openshift.build.commit.id".to_string())]
    );
    assert_eq!(report.promoted(), vec!["org/operator"]);
}

#[tokio::test]
async fn test_image_from_other_commit_is_not_promoted() {
    let git = FakeGit::with_branch("master", HEAD);
    let registry = FakeRegistry::default().with_image("org/operator", "master", DIGEST, "anothersha");
    let reconciler = ReleaseReconciler::new(&git, &registry, &registry);

    let err = reconciler
        .reconcile(&repo(), &options("org/operator"), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ReleaseError::Mismatch(MismatchError::ImageCommit {
            expected, found, ..
        }) => {
            assert_eq!(expected, HEAD);
            assert_eq!(found, "anothersha");
        }
        other => panic!("expected image commit mismatch, got {other:?}"),
    }
    // Git is tagged before images are checked
    assert_eq!(git.created.borrow().len(), 1);
    assert!(registry.moved().is_empty());
}

#[tokio::test]
async fn test_image_without_commit_label_is_not_promoted() {
    let git = FakeGit::with_branch("master", HEAD);
    let registry = FakeRegistry::default().with_tag("org/operator", "master", "sha256:unlabeled");
    let reconciler = ReleaseReconciler::new(&git, &registry, &registry);

    let err = reconciler
        .reconcile(&repo(), &options("org/operator"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReleaseError::Mismatch(MismatchError::MissingCommitLabel { .. })
    ));
    assert!(registry.moved().is_empty());
}

#[tokio::test]
async fn test_existing_tag_on_other_commit_stops_before_registry() {
    let git = FakeGit::with_branch("master", HEAD).with_tag("2.0.0-rc1", "oldsha");
    let reconciler = ReleaseReconciler::new(&git, &UnreachableRegistry, &UnreachableRegistry);

    let err = reconciler
        .reconcile(&repo(), &options("org/operator"), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ReleaseError::Mismatch(MismatchError::TagCommit {
            tag_sha, branch_sha, ..
        }) => {
            assert_eq!(tag_sha, "oldsha");
            assert_eq!(branch_sha, HEAD);
        }
        other => panic!("expected tag commit mismatch, got {other:?}"),
    }
    assert!(git.created.borrow().is_empty());
}

#[tokio::test]
async fn test_missing_branch_is_reported() {
    let git = FakeGit::default();
    let reconciler = ReleaseReconciler::new(&git, &UnreachableRegistry, &UnreachableRegistry);

    let err = reconciler
        .reconcile(&repo(), &options("org/operator"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReleaseError::Git(GitError::BranchNotFound { ref branch, .. }) if branch == "master"
    ));
}

#[tokio::test]
async fn test_no_repositories_only_tags_git() {
    let git = FakeGit::with_branch("master", HEAD);
    let reconciler = ReleaseReconciler::new(&git, &UnreachableRegistry, &UnreachableRegistry);

    let report = reconciler
        .reconcile(&repo(), &options(""), &CancellationToken::new())
        .await
        .expect("git-only release should succeed");

    assert!(report.repositories.is_empty());
    assert_eq!(git.created.borrow().len(), 1);
}

#[tokio::test]
async fn test_repository_without_build_is_skipped() {
    let git = FakeGit::with_branch("master", HEAD);
    let registry = FakeRegistry::default()
        .with_tag("org/operator-test", "latest", "sha256:other")
        .with_image("org/operator", "master", DIGEST, HEAD);
    let reconciler = ReleaseReconciler::new(&git, &registry, &registry);

    let report = reconciler
        .reconcile(
            &repo(),
            &options("org/operator-test,org/operator"),
            &CancellationToken::new(),
        )
        .await
        .expect("release should succeed");

    assert_eq!(report.skipped(), vec!["org/operator-test"]);
    assert_eq!(report.promoted(), vec!["org/operator"]);
    assert_eq!(registry.moved().len(), 1);
}

#[tokio::test]
async fn test_first_failure_stops_later_repositories() {
    let git = FakeGit::with_branch("master", HEAD);
    let registry = FakeRegistry::default()
        .with_image("org/operator", "master", DIGEST, HEAD)
        .with_image("org/operator-test", "master", "sha256:stale", "anothersha")
        .with_image("org/operator-bundle", "master", "sha256:bundle", HEAD);
    let reconciler = ReleaseReconciler::new(&git, &registry, &registry);

    let err = reconciler
        .reconcile(
            &repo(),
            &options("org/operator,org/operator-test,org/operator-bundle"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(err.is_mismatch());
    assert_eq!(
        registry.listed.borrow().as_slice(),
        &["org/operator".to_string(), "org/operator-test".to_string()]
    );
    // Earlier promotions are left in place
    assert_eq!(registry.moved().len(), 1);
    assert_eq!(registry.moved()[0].0, "org/operator");
}

#[tokio::test]
async fn test_rerun_after_success_changes_nothing() {
    let git = FakeGit::with_branch("master", HEAD).with_tag("2.0.0-rc1", HEAD);
    let registry = FakeRegistry::default()
        .with_image("org/operator", "master", DIGEST, HEAD)
        .with_tag("org/operator", "2.0.0-rc1", DIGEST);
    let reconciler = ReleaseReconciler::new(&git, &registry, &registry);

    let report = reconciler
        .reconcile(&repo(), &options("org/operator"), &CancellationToken::new())
        .await
        .expect("rerun should succeed");

    assert_eq!(report.git_tag, GitTagOutcome::AlreadyPresent);
    assert!(git.created.borrow().is_empty());
    assert!(registry.moved().is_empty());
    assert!(matches!(
        report.repositories[0].outcome,
        RepositoryOutcome::Promoted {
            already_current: true,
            ..
        }
    ));
}

#[tokio::test]
async fn test_stale_release_tag_is_moved() {
    let git = FakeGit::with_branch("master", HEAD);
    let registry = FakeRegistry::default()
        .with_image("org/operator", "master", DIGEST, HEAD)
        .with_tag("org/operator", "2.0.0-rc1", "sha256:previous");
    let reconciler = ReleaseReconciler::new(&git, &registry, &registry);

    reconciler
        .reconcile(&repo(), &options("org/operator"), &CancellationToken::new())
        .await
        .expect("release should succeed");

    assert_eq!(registry.moved()[0].2, DIGEST);
}

#[tokio::test]
async fn test_concurrent_tag_creation_at_same_commit_is_accepted() {
    let git = FakeGit::with_branch("master", HEAD);
    *git.racing_writer.borrow_mut() = Some(HEAD.to_string());
    let registry = FakeRegistry::default();
    let reconciler = ReleaseReconciler::new(&git, &registry, &registry);

    let report = reconciler
        .reconcile(&repo(), &options(""), &CancellationToken::new())
        .await
        .expect("race at the same commit should succeed");

    assert_eq!(report.git_tag, GitTagOutcome::AlreadyPresent);
    assert_eq!(report.reference_commit, HEAD);
}

#[tokio::test]
async fn test_concurrent_tag_creation_at_other_commit_fails() {
    let git = FakeGit::with_branch("master", HEAD);
    *git.racing_writer.borrow_mut() = Some("racersha".to_string());
    let reconciler = ReleaseReconciler::new(&git, &UnreachableRegistry, &UnreachableRegistry);

    let err = reconciler
        .reconcile(&repo(), &options("org/operator"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReleaseError::Mismatch(MismatchError::TagCommit { .. })
    ));
}

#[tokio::test]
async fn test_wait_polls_until_tag_is_visible() {
    let git = FakeGit::with_branch("master", HEAD);
    let registry = FakeRegistry::default().with_image("org/operator", "master", DIGEST, HEAD);
    registry.stale_listings.set(2);
    let reconciler =
        ReleaseReconciler::new(&git, &registry, &registry).with_wait_config(quick_wait(5_000));

    let report = reconciler
        .reconcile(
            &repo(),
            &options("org/operator").with_wait(true),
            &CancellationToken::new(),
        )
        .await
        .expect("release should become visible");

    assert!(matches!(
        report.repositories[0].outcome,
        RepositoryOutcome::Promoted {
            wait_attempts: Some(3),
            ..
        }
    ));
}

#[tokio::test]
async fn test_wait_times_out_when_tag_never_appears() {
    let git = FakeGit::with_branch("master", HEAD);
    let registry = FakeRegistry {
        never_visible: true,
        ..FakeRegistry::default()
    }
    .with_image("org/operator", "master", DIGEST, HEAD);
    let reconciler =
        ReleaseReconciler::new(&git, &registry, &registry).with_wait_config(quick_wait(50));

    let err = reconciler
        .reconcile(
            &repo(),
            &options("org/operator").with_wait(true),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReleaseError::Registry(RegistryError::TimeoutWaiting { .. })
    ));
    assert!(err.is_recoverable());
    assert_eq!(registry.moved().len(), 1);
}

#[tokio::test]
async fn test_cancelled_run_makes_no_changes() {
    let git = FakeGit::with_branch("master", HEAD);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let reconciler = ReleaseReconciler::new(&git, &UnreachableRegistry, &UnreachableRegistry);

    let err = reconciler
        .reconcile(&repo(), &options("org/operator"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ReleaseError::Cancelled { .. }));
    assert!(git.created.borrow().is_empty());
}

#[tokio::test]
async fn test_invalid_version_is_rejected_before_any_call() {
    let git = FakeGit::default();
    let reconciler = ReleaseReconciler::new(&git, &UnreachableRegistry, &UnreachableRegistry);
    let options = TagReleaseOptions::new("bad version", "master");

    let err = reconciler
        .reconcile(&repo(), &options, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReleaseError::Cli(_)));
}

#[tokio::test]
async fn test_cancel_during_wait_stops_polling() {
    let git = FakeGit::with_branch("master", HEAD);
    let registry = FakeRegistry {
        never_visible: true,
        ..FakeRegistry::default()
    }
    .with_image("org/operator", "master", DIGEST, HEAD);
    let reconciler =
        ReleaseReconciler::new(&git, &registry, &registry).with_wait_config(quick_wait(10_000));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        trigger.cancel();
    });

    let err = reconciler
        .reconcile(&repo(), &options("org/operator").with_wait(true), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ReleaseError::Cancelled { .. }));
    // The tag move itself completed before the interrupt
    assert_eq!(registry.moved().len(), 1);
}
