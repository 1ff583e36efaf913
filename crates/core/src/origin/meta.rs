//! Fetches the webhook provider's published hook ranges.
//!
//! GitHub lists the addresses it delivers webhooks from in the `hooks` field
//! of `GET /meta`.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::OriginRanges;
use crate::errors::OriginError;

/// The subset of the `/meta` response we read.
#[derive(Debug, Deserialize)]
pub struct MetaResponse {
    #[serde(default)]
    pub hooks: Vec<String>,
}

/// Build the HTTP client used for meta lookups.
pub fn meta_client() -> Result<reqwest::Client, OriginError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("discussmail/", env!("CARGO_PKG_VERSION"))),
    );
    headers.insert(
        "X-GitHub-Api-Version",
        HeaderValue::from_static("2022-11-28"),
    );
    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .build()?)
}

/// Query `{api_url}/meta` and return the hook ranges it lists.
#[instrument(skip(client))]
pub async fn fetch_hook_ranges(
    client: &reqwest::Client,
    api_url: &str,
) -> Result<OriginRanges, OriginError> {
    let url = format!("{}/meta", api_url.trim_end_matches('/'));
    let resp = client.get(&url).send().await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(OriginError::ApiError {
            status: status.as_u16(),
            body,
        });
    }

    let meta: MetaResponse = resp.json().await?;
    let ranges = ranges_from_meta(meta)?;
    info!(count = ranges.len(), "fetched webhook origin ranges");
    Ok(ranges)
}

/// Turn a meta response into a range set, failing when nothing usable is
/// listed so a bad response never clears the current set.
pub fn ranges_from_meta(meta: MetaResponse) -> Result<OriginRanges, OriginError> {
    debug!(listed = meta.hooks.len(), "parsing hook ranges");
    let ranges = OriginRanges::from_cidrs(&meta.hooks);
    if ranges.is_empty() {
        return Err(OriginError::NoRanges);
    }
    Ok(ranges)
}
