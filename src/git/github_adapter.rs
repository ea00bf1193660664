//! Adapter between the ReferenceSource trait and the GitHub git-data REST API.
//!
//! Only three endpoints are used: exact reference lookup, annotated tag
//! lookup (for peeling) and reference creation.

use crate::error::{GitError, ReleaseError, Result};
use crate::git::{GitReference, ReferenceSource};
use crate::http::{self, REQUEST_TIMEOUT, USER_AGENT};
use anyhow::Context;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

/// Public GitHub API endpoint
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Maximum number of annotated tag objects followed while peeling
const MAX_PEEL_DEPTH: usize = 5;

/// Reference operations backed by the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubReferences {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    #[serde(rename = "ref")]
    name: String,
    object: GitObject,
}

/// Older API versions answer a non-exact lookup with every prefix match
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RefPayload {
    One(RefResponse),
    Many(Vec<RefResponse>),
}

#[derive(Debug, Deserialize)]
struct TagObjectResponse {
    object: GitObject,
}

#[derive(Debug, Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    name: &'a str,
    sha: &'a str,
}

impl GitHubReferences {
    /// Create a client for api.github.com
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, GITHUB_API_URL)
    }

    /// Create a client for a GitHub Enterprise or test endpoint
    pub fn with_base_url(token: impl Into<String>, base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build GitHub API client")?;

        Ok(Self {
            client,
            base_url: http::parse_base_url(base_url)?,
            token: token.into(),
        })
    }

    fn repo_url<'a>(&self, owner: &'a str, repo: &'a str, rest: &[&'a str]) -> Url {
        let mut segments = vec!["repos", owner, repo, "git"];
        segments.extend_from_slice(rest);
        http::join_segments(&self.base_url, segments)
    }

    async fn failure(operation: String, response: reqwest::Response) -> ReleaseError {
        let status = response.status();
        let reason = http::error_body(response).await;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            GitError::AuthenticationFailed { reason }.into()
        } else {
            GitError::RemoteOperationFailed { operation, reason }.into()
        }
    }

    /// Follow annotated tag objects until a commit is reached
    async fn peel(&self, owner: &str, repo: &str, mut object: GitObject) -> Result<String> {
        for _ in 0..MAX_PEEL_DEPTH {
            if object.kind != "tag" {
                return Ok(object.sha);
            }

            log::debug!("Peeling annotated tag object {}", object.sha);
            let url = self.repo_url(owner, repo, &["tags", &object.sha]);
            let response = self
                .client
                .get(url)
                .header(AUTHORIZATION, format!("Bearer {}", self.token))
                .send()
                .await?;

            if !response.status().is_success() {
                let operation = format!("read tag object {}", object.sha);
                return Err(Self::failure(operation, response).await);
            }

            object = response.json::<TagObjectResponse>().await?.object;
        }

        Err(GitError::RemoteOperationFailed {
            operation: "peel tag".to_string(),
            reason: format!("tag chain deeper than {} objects", MAX_PEEL_DEPTH),
        }
        .into())
    }
}

impl ReferenceSource for GitHubReferences {
    async fn resolve_reference(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
    ) -> Result<Option<GitReference>> {
        let short = ref_name.trim_start_matches("refs/");
        let mut path = vec!["ref"];
        path.extend(short.split('/'));
        let url = self.repo_url(owner, repo, &path);

        log::debug!("Resolving {} in {}/{}", ref_name, owner, repo);
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            log::debug!("{} not found in {}/{}", ref_name, owner, repo);
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::failure(format!("resolve {}", ref_name), response).await);
        }

        let found = match response.json::<RefPayload>().await? {
            RefPayload::One(reference) => Some(reference),
            RefPayload::Many(references) => {
                references.into_iter().find(|r| r.name == ref_name)
            }
        };

        match found {
            Some(reference) if reference.name == ref_name => {
                let commit_sha = self.peel(owner, repo, reference.object).await?;
                Ok(Some(GitReference::new(reference.name, commit_sha)))
            }
            _ => Ok(None),
        }
    }

    async fn create_reference(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        commit_sha: &str,
    ) -> Result<GitReference> {
        let url = self.repo_url(owner, repo, &["refs"]);

        log::debug!("Creating {} at {} in {}/{}", ref_name, commit_sha, owner, repo);
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(&CreateRefRequest {
                name: ref_name,
                sha: commit_sha,
            })
            .send()
            .await?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body = http::error_body(response).await;
            if body.contains("already exists") {
                return Err(GitError::ReferenceExists {
                    reference: ref_name.to_string(),
                }
                .into());
            }
            return Err(GitError::RemoteOperationFailed {
                operation: format!("create {}", ref_name),
                reason: body,
            }
            .into());
        }
        if !response.status().is_success() {
            return Err(Self::failure(format!("create {}", ref_name), response).await);
        }

        let created = response.json::<RefResponse>().await?;
        Ok(GitReference::new(created.name, created.object.sha))
    }
}
