use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::error::MonitorError;
use crate::extract::{self, ExtractedPage};

/// Vendor CDNs often reject reqwest's default agent.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const FALLBACK_PREFIX: &str = "datasheet_";

/// Everything one run observes for a target. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSnapshot {
    pub download_url: String,
    pub spec_html: String,
    pub file_bytes: Vec<u8>,
    /// Empty when no artifact was downloaded.
    pub suggested_filename: String,
}

/// A downloaded artifact held fully in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// Produces a snapshot for a target page URL.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self, page_url: &str) -> Result<FetchedSnapshot, MonitorError>;
}

/// Assemble a snapshot from extracted page data and its artifact.
pub fn snapshot_from(page: ExtractedPage, artifact: Artifact) -> FetchedSnapshot {
    FetchedSnapshot {
        download_url: page.download_url,
        spec_html: page.spec_html,
        file_bytes: artifact.bytes,
        suggested_filename: artifact.filename,
    }
}

pub struct HttpFetcher {
    /// Plain client for product pages.
    pages: Client,
    /// Browser-flavoured client for artifact downloads.
    downloads: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> reqwest::Result<Self> {
        let pages = Client::builder().timeout(timeout).build()?;
        let downloads = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { pages, downloads })
    }

    /// GET the product page and extract link + specs fragment.
    pub async fn fetch_page(&self, page_url: &str) -> Result<ExtractedPage, MonitorError> {
        let parsed = Url::parse(page_url).map_err(|e| MonitorError::Parse {
            url: page_url.to_string(),
            reason: format!("invalid page url: {}", e),
        })?;

        let fetch_err = |source| MonitorError::Fetch {
            url: page_url.to_string(),
            source,
        };
        let response = self.pages.get(parsed.clone()).send().await.map_err(fetch_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::Status {
                url: page_url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(fetch_err)?;
        debug!(url = page_url, bytes = body.len(), "fetched page");

        extract::extract_page(&parsed, &body)
    }

    /// Download an artifact; an empty URL means there is nothing to fetch.
    pub async fn fetch_artifact(&self, url: &str) -> Result<Artifact, MonitorError> {
        if url.is_empty() {
            return Ok(Artifact::default());
        }
        let fetch_err = |source| MonitorError::Fetch {
            url: url.to_string(),
            source,
        };

        let response = self.downloads.get(url).send().await.map_err(fetch_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let filename = suggested_filename(disposition.as_deref(), url);
        let bytes = response.bytes().await.map_err(fetch_err)?.to_vec();
        debug!(url, bytes = bytes.len(), filename = %filename, "downloaded artifact");

        Ok(Artifact { bytes, filename })
    }
}

#[async_trait]
impl SnapshotSource for HttpFetcher {
    async fn fetch_snapshot(&self, page_url: &str) -> Result<FetchedSnapshot, MonitorError> {
        let page = self.fetch_page(page_url).await?;
        let artifact = self.fetch_artifact(&page.download_url).await?;
        Ok(snapshot_from(page, artifact))
    }
}

/// Filename from Content-Disposition when usable, else derived from the URL.
pub fn suggested_filename(content_disposition: Option<&str>, url: &str) -> String {
    if let Some(name) = content_disposition.and_then(disposition_filename) {
        return name;
    }
    let fallback = fallback_filename(url);
    warn!(url, filename = %fallback, "no usable Content-Disposition filename");
    fallback
}

fn disposition_filename(header: &str) -> Option<String> {
    let re = Regex::new(r#"(?i)(?:^|;)\s*filename(\*)?\s*=\s*(?:"([^"]*)"|([^;\s]+))"#).unwrap();

    let mut plain = None;
    let mut extended = None;
    for caps in re.captures_iter(header) {
        let value = caps.get(2).or_else(|| caps.get(3))?.as_str();
        if caps.get(1).is_some() {
            extended = decode_ext_value(value);
        } else {
            plain = Some(value.to_string());
        }
    }

    extended
        .or(plain)
        .map(|name| base_name(&name).to_string())
        .filter(|name| !name.is_empty())
}

/// RFC 5987 `charset'lang'pct-encoded` value.
fn decode_ext_value(value: &str) -> Option<String> {
    let mut parts = value.splitn(3, '\'');
    let charset = parts.next()?;
    let _lang = parts.next()?;
    let encoded = parts.next()?;
    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }

    percent_decode_str(encoded)
        .decode_utf8()
        .ok()
        .map(|name| name.into_owned())
}

fn fallback_filename(url: &str) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|segs| segs.last().map(str::to_string)))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "download".to_string());
    format!("{}{}", FALLBACK_PREFIX, segment)
}

fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name).trim()
}
