//! HTTP utilities shared by the GitHub and registry adapters.

use crate::error::{CliError, ReleaseError, Result};
use reqwest::Response;
use std::time::Duration;
use url::Url;

/// Per-request timeout applied to every API client
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent with every API request
pub const USER_AGENT: &str = concat!("kodegen_release_tagger/", env!("CARGO_PKG_VERSION"));

/// Parse an API base URL, rejecting URLs that cannot carry a path.
pub fn parse_base_url(base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url).map_err(|e| {
        ReleaseError::Cli(CliError::InvalidArguments {
            reason: format!("invalid API URL '{}': {}", base_url, e),
        })
    })?;

    if url.cannot_be_a_base() {
        return Err(ReleaseError::Cli(CliError::InvalidArguments {
            reason: format!("API URL '{}' cannot be used as a base", base_url),
        }));
    }

    Ok(url)
}

/// Append path segments to a base URL.
///
/// Each segment is percent-encoded on its own, so `/` inside a segment
/// value is never treated as a separator.
pub fn join_segments<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Read a failed response body for error reporting.
pub async fn error_body(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if body.is_empty() {
        status.to_string()
    } else {
        format!("{status} - {body}")
    }
}
