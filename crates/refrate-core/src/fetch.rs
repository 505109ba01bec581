//! Resilient acquisition of the rate document.
//!
//! Tiers, in order:
//!
//! 1. the primary URL, directly;
//! 2. the fallback URL, directly;
//! 3. the primary URL through a freshly drawn proxy, up to `proxy_attempts` times.
//!
//! Every attempt runs under [`execute_with_retry`], and a response only
//! counts when its payload sniffs as a PDF. A `200 OK` carrying an HTML error
//! page is a failed attempt.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::http_client::{execute_with_retry, HttpClient, HttpRequest};
use crate::retry::RetryConfig;
use crate::sniff::DocumentKind;
use crate::IngestError;

/// Browser-like agent; the publisher rejects obvious bot agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Acquisition endpoints, timeouts and retry budgets.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    pub primary_url: String,
    pub fallback_url: Option<String>,
    pub user_agent: String,
    pub direct_timeout_ms: u64,
    pub proxy_timeout_ms: u64,
    pub proxy_attempts: u32,
    pub proxies: Vec<String>,
    pub retry: RetryConfig,
}

impl FetchConfig {
    /// Drops blank and repeated proxy entries, keeping first-seen order.
    pub fn dedup_proxies(&mut self) {
        let mut seen = Vec::with_capacity(self.proxies.len());
        for proxy in self.proxies.drain(..) {
            let proxy = proxy.trim().to_owned();
            if !proxy.is_empty() && !seen.contains(&proxy) {
                seen.push(proxy);
            }
        }
        self.proxies = seen;
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            primary_url: String::from("https://sbi.co.in/documents/16012/1400784/FOREX_CARD_RATES.pdf"),
            fallback_url: Some(String::from(
                "https://bank.sbi/documents/16012/1400784/FOREX_CARD_RATES.pdf",
            )),
            user_agent: String::from(DEFAULT_USER_AGENT),
            direct_timeout_ms: 5_000,
            proxy_timeout_ms: 3_000,
            proxy_attempts: 5,
            proxies: Vec::new(),
            retry: RetryConfig::default(),
        }
    }
}

/// Which tier produced the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "tier", content = "proxy")]
pub enum FetchTier {
    Primary,
    Fallback,
    Proxy(String),
}

impl Display for FetchTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
            Self::Proxy(proxy) => write!(f, "proxy {proxy}"),
        }
    }
}

/// A validated document payload.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub bytes: Vec<u8>,
    pub url: String,
    pub tier: FetchTier,
}

/// Downloads the rate document through direct and proxied tiers.
pub struct SourceFetcher {
    client: Arc<dyn HttpClient>,
    config: FetchConfig,
}

impl SourceFetcher {
    pub fn new(client: Arc<dyn HttpClient>, mut config: FetchConfig) -> Self {
        config.dedup_proxies();
        Self { client, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetches from the configured primary and fallback URLs.
    pub async fn fetch(&self) -> Result<FetchedDocument, IngestError> {
        self.fetch_from(&self.config.primary_url, self.config.fallback_url.as_deref())
            .await
    }

    pub async fn fetch_from(
        &self,
        primary_url: &str,
        fallback_url: Option<&str>,
    ) -> Result<FetchedDocument, IngestError> {
        let mut failures = Vec::new();

        let direct = std::iter::once((primary_url, FetchTier::Primary))
            .chain(fallback_url.map(|url| (url, FetchTier::Fallback)));
        for (url, tier) in direct {
            match self.attempt(url, None, self.config.direct_timeout_ms).await {
                Ok(bytes) => return Ok(self.accept(bytes, url, tier)),
                Err(reason) => {
                    warn!(%url, %tier, %reason, "direct fetch rejected");
                    failures.push(format!("{tier}: {reason}"));
                }
            }
        }

        let mut previous = None;
        for attempt in 0..self.config.proxy_attempts {
            let Some(index) = self.pick_proxy(previous) else {
                break;
            };
            previous = Some(index);
            let proxy = self.config.proxies[index].as_str();
            match self
                .attempt(primary_url, Some(proxy), self.config.proxy_timeout_ms)
                .await
            {
                Ok(bytes) => {
                    return Ok(self.accept(bytes, primary_url, FetchTier::Proxy(proxy.to_owned())))
                }
                Err(reason) => {
                    warn!(%proxy, attempt, %reason, "proxied fetch rejected");
                    failures.push(format!("proxy {proxy}: {reason}"));
                }
            }
        }

        Err(IngestError::Acquisition(format!(
            "no valid document from {} attempt(s): {}",
            failures.len(),
            failures.join("; ")
        )))
    }

    fn accept(&self, bytes: Vec<u8>, url: &str, tier: FetchTier) -> FetchedDocument {
        info!(%url, %tier, bytes = bytes.len(), "document acquired");
        FetchedDocument {
            bytes,
            url: url.to_owned(),
            tier,
        }
    }

    /// Draws a proxy index at random, never the previous one when another exists.
    fn pick_proxy(&self, previous: Option<usize>) -> Option<usize> {
        match (self.config.proxies.len(), previous) {
            (0, _) => None,
            (1, _) | (_, None) => Some(fastrand::usize(..self.config.proxies.len())),
            (len, Some(previous)) => {
                let index = fastrand::usize(..len - 1);
                Some(if index >= previous { index + 1 } else { index })
            }
        }
    }

    async fn attempt(
        &self,
        url: &str,
        proxy: Option<&str>,
        timeout_ms: u64,
    ) -> Result<Vec<u8>, String> {
        let mut request = HttpRequest::get(url)
            .with_header("user-agent", self.config.user_agent.as_str())
            .with_header("accept", "application/pdf")
            .with_timeout_ms(timeout_ms);
        if let Some(proxy) = proxy {
            request = request.with_proxy(proxy);
        }

        let response = execute_with_retry(self.client.as_ref(), &request, &self.config.retry)
            .await
            .map_err(|error| error.to_string())?;
        if !response.is_success() {
            return Err(format!("HTTP {}", response.status));
        }
        match DocumentKind::sniff(&response.body) {
            Some(DocumentKind::Pdf) => Ok(response.body),
            Some(other) => Err(format!("expected a PDF, got {}", other.mime_type())),
            None => Err(format!(
                "payload of {} byte(s) is not a PDF",
                response.body.len()
            )),
        }
    }
}
