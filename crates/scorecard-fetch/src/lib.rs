//! Paginated retrieval of institution records with fixed-interval retry.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
pub use reqwest::Url;
use scorecard_core::RawInstitutionRecord;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "scorecard-fetch";

pub const DEFAULT_BASE_URL: &str = "https://api.data.gov/ed/collegescorecard/v1/schools";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid base url: {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("response body has no `results` array")]
    MissingResults,
}

/// Per-page retry and rate-limit pacing. Backoff is fixed, not exponential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub max_retries: usize,
    pub retry_delay: Duration,
    pub page_delay: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_secs(10),
            page_delay: Duration::from_secs(15),
        }
    }
}

impl FetchPolicy {
    pub fn attempts(&self) -> usize {
        self.max_retries.max(1)
    }
}

/// What to ask the source API for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub base_url: String,
    pub total_pages: u32,
    pub per_page: u32,
    pub api_key: Option<String>,
    pub sort: Option<String>,
}

impl PageRequest {
    pub fn new(base_url: impl Into<String>, total_pages: u32, per_page: u32) -> Self {
        Self {
            base_url: base_url.into(),
            total_pages,
            per_page,
            api_key: None,
            sort: None,
        }
    }

    /// URL for one 0-based page. Stale `page`/`per_page` parameters on the base are replaced.
    pub fn page_url(&self, page: u32) -> Result<Url, FetchError> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(FetchError::InvalidUrl("empty".to_string()));
        }
        let mut url = Url::parse(base).map_err(|e| FetchError::InvalidUrl(format!("{base}: {e}")))?;

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "page" && k != "per_page")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let has = |key: &str| kept.iter().any(|(k, _)| k == key);

        let mut extra = Vec::new();
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            if !has("api_key") {
                extra.push(("api_key".to_string(), key.to_string()));
            }
        }
        if let Some(sort) = self.sort.as_deref().filter(|s| !s.is_empty()) {
            if !has("sort") {
                extra.push(("sort".to_string(), sort.to_string()));
            }
        }

        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().chain(extra.iter()))
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &self.per_page.to_string());
        Ok(url)
    }
}

/// One page worth of records from somewhere.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &Url) -> Result<Vec<RawInstitutionRecord>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, url: &Url) -> Result<Vec<RawInstitutionRecord>, FetchError> {
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }
        let body = resp.bytes().await?;
        parse_results(&body)
    }
}

/// Extracts the `results` array of a search response.
pub fn parse_results(body: &[u8]) -> Result<Vec<RawInstitutionRecord>, FetchError> {
    let value: JsonValue = serde_json::from_slice(body)?;
    match value {
        JsonValue::Object(mut map) => match map.remove("results") {
            Some(JsonValue::Array(items)) => {
                Ok(items.into_iter().map(RawInstitutionRecord::new).collect())
            }
            _ => Err(FetchError::MissingResults),
        },
        _ => Err(FetchError::MissingResults),
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// Page-order concatenation; duplicates across pages are kept.
    pub records: Vec<RawInstitutionRecord>,
    pub failed_pages: Vec<u32>,
}

/// Fetches pages `0..total_pages` one after another.
///
/// A page that still fails after `policy.max_retries` attempts is logged and skipped;
/// the run continues with the next page. Only an unusable base URL is an error.
pub async fn fetch_all<S>(
    source: &S,
    request: &PageRequest,
    policy: &FetchPolicy,
) -> Result<FetchReport, FetchError>
where
    S: PageSource + ?Sized,
{
    let urls = (0..request.total_pages)
        .map(|page| request.page_url(page))
        .collect::<Result<Vec<_>, _>>()?;

    let attempts = policy.attempts();
    let mut report = FetchReport::default();

    for (page, url) in (0u32..).zip(urls.iter()) {
        let span = info_span!("fetch_page", page);
        let fetched = fetch_page_with_retry(source, page, url, attempts, policy.retry_delay)
            .instrument(span)
            .await;

        match fetched {
            Some(records) => {
                report.records.extend(records);
                info!(page, total = report.records.len(), "accumulated records");
            }
            None => {
                error!(page, attempts, "page failed after all attempts; skipping");
                report.failed_pages.push(page);
            }
        }

        if page + 1 < request.total_pages {
            tokio::time::sleep(policy.page_delay).await;
        }
    }

    info!(
        records = report.records.len(),
        pages = request.total_pages,
        failed = report.failed_pages.len(),
        "fetch complete"
    );
    Ok(report)
}

async fn fetch_page_with_retry<S>(
    source: &S,
    page: u32,
    url: &Url,
    attempts: usize,
    retry_delay: Duration,
) -> Option<Vec<RawInstitutionRecord>>
where
    S: PageSource + ?Sized,
{
    for attempt in 1..=attempts {
        match source.fetch_page(url).await {
            Ok(records) => {
                info!(page, count = records.len(), "fetched page");
                return Some(records);
            }
            Err(err) => {
                warn!(page, attempt, max = attempts, error = %err, "page request failed");
                if attempt < attempts {
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct ScriptedSource {
        failing: HashSet<u32>,
        per_page: usize,
        calls: Mutex<Vec<u32>>,
    }

    impl ScriptedSource {
        fn new(failing: &[u32], per_page: usize) -> Self {
            Self {
                failing: failing.iter().copied().collect(),
                per_page,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls_for(&self, page: u32) -> usize {
            self.calls.lock().unwrap().iter().filter(|p| **p == page).count()
        }
    }

    fn page_of(url: &Url) -> u32 {
        url.query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse().ok())
            .expect("page param")
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch_page(&self, url: &Url) -> Result<Vec<RawInstitutionRecord>, FetchError> {
            let page = page_of(url);
            self.calls.lock().unwrap().push(page);
            if self.failing.contains(&page) {
                return Err(FetchError::HttpStatus {
                    status: 503,
                    url: url.to_string(),
                });
            }
            Ok((0..self.per_page)
                .map(|i| RawInstitutionRecord::new(json!({ "id": format!("{page}-{i}") })))
                .collect())
        }
    }

    fn ids(report: &FetchReport) -> Vec<String> {
        report
            .records
            .iter()
            .map(|r| r.id().and_then(|v| v.as_str()).unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn failed_page_is_skipped_and_order_is_kept() {
        let source = ScriptedSource::new(&[1], 2);
        let request = PageRequest::new("https://example.test/schools?api_key=k", 3, 100);
        let started = tokio::time::Instant::now();

        let report = fetch_all(&source, &request, &FetchPolicy::default())
            .await
            .expect("fetch");

        assert_eq!(ids(&report), vec!["0-0", "0-1", "2-0", "2-1"]);
        assert_eq!(report.failed_pages, vec![1]);
        assert_eq!(source.calls_for(0), 1);
        assert_eq!(source.calls_for(1), 5);
        assert_eq!(source.calls_for(2), 1);
        // four fixed 10s retry waits on page 1, two 15s waits between pages
        assert_eq!(started.elapsed(), Duration::from_secs(70));
    }

    #[tokio::test]
    async fn empty_base_url_is_rejected() {
        let source = ScriptedSource::new(&[], 1);
        let request = PageRequest::new("  ", 2, 100);
        let err = fetch_all(&source, &request, &FetchPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn page_url_replaces_stale_paging_params() {
        let mut request = PageRequest::new(
            "https://example.test/v1/schools?api_key=abc&page=1&per_page=100&page=64&sort=latest.student.size:desc",
            64,
            100,
        );
        request.api_key = Some("other".into());
        request.sort = Some("ignored".into());

        let url = request.page_url(7).expect("url");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("api_key".to_string(), "abc".to_string()),
                ("sort".to_string(), "latest.student.size:desc".to_string()),
                ("page".to_string(), "7".to_string()),
                ("per_page".to_string(), "100".to_string()),
            ]
        );
    }

    #[test]
    fn page_url_adds_key_and_sort_when_missing() {
        let mut request = PageRequest::new(DEFAULT_BASE_URL, 1, 50);
        request.api_key = Some("k1".into());
        request.sort = Some("latest.student.size:desc".into());
        let url = request.page_url(0).expect("url");
        assert_eq!(url.path(), "/ed/collegescorecard/v1/schools");
        let query = url.query().unwrap_or_default();
        assert!(query.starts_with("api_key=k1&sort=latest.student.size%3Adesc"));
        assert!(query.ends_with("page=0&per_page=50"));
    }

    #[test]
    fn results_array_is_required() {
        let ok = parse_results(br#"{"metadata":{},"results":[{"id":1},{"id":2}]}"#).unwrap();
        assert_eq!(ok.len(), 2);
        assert!(matches!(
            parse_results(br#"{"errors":[]}"#),
            Err(FetchError::MissingResults)
        ));
        assert!(matches!(parse_results(b"not json"), Err(FetchError::Decode(_))));
    }

    #[test]
    fn default_policy_matches_rate_limits() {
        let policy = FetchPolicy::default();
        assert_eq!(policy.attempts(), 5);
        assert_eq!(policy.retry_delay, Duration::from_secs(10));
        assert_eq!(policy.page_delay, Duration::from_secs(15));
        let zero = FetchPolicy {
            max_retries: 0,
            ..policy
        };
        assert_eq!(zero.attempts(), 1);
    }
}
