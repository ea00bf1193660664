//! Adapter between the registry traits and the Quay REST API.

use crate::error::{RegistryError, ReleaseError, Result};
use crate::http::{self, REQUEST_TIMEOUT, USER_AGENT};
use anyhow::Context;
use crate::registry::{ManifestLabel, ManifestLabelReader, RegistryTag, TagStore};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

/// Public Quay API endpoint
pub const QUAY_API_URL: &str = "https://quay.io/api/v1";

/// Tags requested per page when listing
const TAGS_PAGE_SIZE: u32 = 100;

/// Default upper bound on pages followed while listing tags
const MAX_TAG_PAGES: u32 = 500;

/// Tag and label operations backed by the Quay API
#[derive(Debug, Clone)]
pub struct QuayRegistry {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    max_tag_pages: u32,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
    #[serde(default)]
    manifest_digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagPage {
    #[serde(default)]
    tags: Vec<TagEntry>,
    #[serde(default)]
    has_additional: bool,
}

#[derive(Debug, Deserialize)]
struct LabelEntry {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<LabelEntry>,
}

#[derive(Debug, Serialize)]
struct ChangeTagRequest<'a> {
    manifest_digest: &'a str,
}

impl QuayRegistry {
    /// Create a client for quay.io; `token` may be omitted for public reads
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_base_url(token, QUAY_API_URL)
    }

    /// Create a client for a self-hosted Quay or test endpoint
    pub fn with_base_url(token: Option<String>, base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build Quay API client")?;

        Ok(Self {
            client,
            base_url: http::parse_base_url(base_url)?,
            token,
            max_tag_pages: MAX_TAG_PAGES,
        })
    }

    /// Limit how many tag pages a single listing may follow
    pub fn with_max_tag_pages(mut self, pages: u32) -> Self {
        self.max_tag_pages = pages.max(1);
        self
    }

    fn repository_url(&self, repository: &str, rest: &[&str]) -> Url {
        let segments = std::iter::once("repository")
            .chain(repository.split('/').filter(|s| !s.is_empty()))
            .chain(rest.iter().copied());
        http::join_segments(&self.base_url, segments)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn failure(
        repository: &str,
        operation: &str,
        response: reqwest::Response,
    ) -> ReleaseError {
        let status = response.status();
        let reason = http::error_body(response).await;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            RegistryError::AuthenticationFailed {
                repository: repository.to_string(),
                reason,
            }
            .into()
        } else {
            RegistryError::RequestFailed {
                repository: repository.to_string(),
                operation: operation.to_string(),
                status: Some(status.as_u16()),
                reason,
            }
            .into()
        }
    }
}

impl TagStore for QuayRegistry {
    async fn list_tags(&self, repository: &str) -> Result<Vec<RegistryTag>> {
        let mut tags = Vec::new();

        for page in 1..=self.max_tag_pages {
            let mut url = self.repository_url(repository, &["tag", ""]);
            url.query_pairs_mut()
                .append_pair("onlyActiveTags", "true")
                .append_pair("limit", &TAGS_PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());

            log::debug!("Listing tags of {} (page {})", repository, page);
            let response = self.authorize(self.client.get(url)).send().await?;
            if !response.status().is_success() {
                return Err(Self::failure(repository, "list tags", response).await);
            }

            let body = response.json::<TagPage>().await?;
            tags.extend(body.tags.into_iter().filter_map(|entry| {
                entry
                    .manifest_digest
                    .map(|digest| RegistryTag::new(entry.name, digest))
            }));

            if !body.has_additional {
                return Ok(tags);
            }
        }

        // Partial listings are never returned
        Err(RegistryError::RequestFailed {
            repository: repository.to_string(),
            operation: "list tags".to_string(),
            status: None,
            reason: format!(
                "listing still incomplete after {} pages ({} tags)",
                self.max_tag_pages,
                tags.len()
            ),
        }
        .into())
    }

    async fn create_or_move_tag(
        &self,
        repository: &str,
        tag: &str,
        manifest_digest: &str,
    ) -> Result<()> {
        let url = self.repository_url(repository, &["tag", tag]);

        log::debug!("Pointing {}:{} at {}", repository, tag, manifest_digest);
        let response = self
            .authorize(self.client.put(url))
            .json(&ChangeTagRequest { manifest_digest })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(repository, "change tag", response).await);
        }
        Ok(())
    }
}

impl ManifestLabelReader for QuayRegistry {
    async fn list_manifest_labels(
        &self,
        repository: &str,
        manifest_digest: &str,
        key_filter: Option<&str>,
    ) -> Result<Vec<ManifestLabel>> {
        let mut url = self.repository_url(repository, &["manifest", manifest_digest, "labels"]);
        if let Some(filter) = key_filter {
            url.query_pairs_mut().append_pair("filter", filter);
        }

        let response = self.authorize(self.client.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(Self::failure(repository, "list manifest labels", response).await);
        }

        let labels = response
            .json::<LabelList>()
            .await?
            .labels
            .into_iter()
            .filter(|label| key_filter.is_none_or(|key| label.key == key))
            .map(|label| ManifestLabel::new(label.key, label.value))
            .collect();
        Ok(labels)
    }
}
