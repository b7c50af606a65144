use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::http_client::http_client;

/// Status the feed host answers with when it throttles a client. Not a standard HTTP code.
pub const RATE_LIMIT_STATUS: u16 = 443;

pub const VERSION_PARAM: &str = "version";

static FEED_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"src="(/jsData/matchResult.*?version=([^"]+))""#).expect("feed locator pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One blocking GET. Non-2xx statuses come back as a response; only transport failures
/// (timeout, connection, body decoding) are errors.
pub trait Transport {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<TransportResponse>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransport;

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<TransportResponse> {
        let resp = http_client()?
            .get(url)
            .query(query)
            .send()
            .with_context(|| format!("request failed for {url}"))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .with_context(|| format!("failed reading body from {url}"))?;
        Ok(TransportResponse { status, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never below 1.
    pub max_attempts: u32,
    pub delay_min_secs: f64,
    pub delay_max_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 5.0, 10.0)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_min_secs: f64, delay_max_secs: f64) -> Self {
        let lo = delay_min_secs.max(0.0);
        let hi = delay_max_secs.max(0.0);
        Self {
            max_attempts: max_attempts.max(1),
            delay_min_secs: lo.min(hi),
            delay_max_secs: lo.max(hi),
        }
    }

    pub fn from_config(cfg: &CrawlConfig) -> Self {
        Self::new(
            cfg.max_attempts,
            cfg.retry_delay_min_secs,
            cfg.retry_delay_max_secs,
        )
    }

    fn pick_delay(&self) -> Duration {
        let secs = if self.delay_max_secs > self.delay_min_secs {
            rand::thread_rng().gen_range(self.delay_min_secs..=self.delay_max_secs)
        } else {
            self.delay_min_secs
        };
        Duration::from_secs_f64(secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedLocation {
    pub feed_url: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFeed {
    pub page_url: String,
    pub feed_url: String,
    pub version: String,
    pub body: String,
}

pub struct SourceFetcher<T: Transport> {
    transport: T,
    policy: RetryPolicy,
    pause: Box<dyn Fn(Duration)>,
}

impl SourceFetcher<ReqwestTransport> {
    pub fn http(policy: RetryPolicy) -> Self {
        Self::new(ReqwestTransport, policy)
    }
}

impl<T: Transport> SourceFetcher<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            pause: Box::new(thread::sleep),
        }
    }

    /// Replaces the blocking sleep used between rate-limited attempts.
    pub fn with_pause(mut self, pause: impl Fn(Duration) + 'static) -> Self {
        self.pause = Box::new(pause);
        self
    }

    /// Blocks for `delay` through the configured pause.
    pub fn pause(&self, delay: Duration) {
        (self.pause)(delay);
    }

    pub fn fetch_page(&self, url: &str) -> Result<String, CrawlError> {
        self.fetch_text(url, &[])
    }

    /// Single GET without retries; any non-2xx status is a network error.
    pub fn fetch_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, CrawlError> {
        let resp = self
            .transport
            .get(url, query)
            .map_err(|err| CrawlError::network(url, format!("{err:#}")))?;
        if !resp.is_success() {
            return Err(CrawlError::network(url, format!("HTTP {}", resp.status)));
        }
        debug!(url, bytes = resp.body.len(), "fetched text");
        Ok(resp.body)
    }

    /// Retries only on [`RATE_LIMIT_STATUS`]; every other failure returns at once.
    pub fn fetch_feed(&self, feed_url: &str, version: &str) -> Result<String, CrawlError> {
        let query = [(VERSION_PARAM, version)];
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let resp = self
                .transport
                .get(feed_url, &query)
                .map_err(|err| CrawlError::network(feed_url, format!("{err:#}")))?;
            if resp.is_success() {
                debug!(url = feed_url, attempt, bytes = resp.body.len(), "fetched feed");
                return Ok(resp.body);
            }
            if resp.status != RATE_LIMIT_STATUS {
                return Err(CrawlError::network(feed_url, format!("HTTP {}", resp.status)));
            }
            if attempt < max_attempts {
                let delay = self.policy.pick_delay();
                warn!(
                    url = feed_url,
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    "feed rate limited, retrying"
                );
                self.pause(delay);
            }
        }

        warn!(url = feed_url, attempts = max_attempts, "feed still rate limited");
        Err(CrawlError::RateLimited {
            url: feed_url.to_string(),
            attempts: max_attempts,
        })
    }

    /// Page, then the feed it references.
    pub fn fetch_source(&self, page_url: &str) -> Result<FetchedFeed, CrawlError> {
        let html = self.fetch_page(page_url)?;
        let FeedLocation { feed_url, version } = locate_feed(&html, page_url)?;
        let body = self.fetch_feed(&feed_url, &version)?;
        info!(page = page_url, feed = %feed_url, bytes = body.len(), "fetched source");
        Ok(FetchedFeed {
            page_url: page_url.to_string(),
            feed_url,
            version,
            body,
        })
    }
}

/// Finds the embedded `matchResult` script reference. The feed URL is its path without the
/// query, resolved against `page_url`.
pub fn locate_feed(html: &str, page_url: &str) -> Result<FeedLocation, CrawlError> {
    let not_found = || CrawlError::LocatorNotFound {
        url: page_url.to_string(),
    };
    let caps = FEED_REF.captures(html).ok_or_else(not_found)?;
    let path = caps[1].split('?').next().unwrap_or_default();
    let version = caps[2].to_string();

    let base = Url::parse(page_url).map_err(|_| not_found())?;
    let feed_url = base.join(path).map_err(|_| not_found())?;
    Ok(FeedLocation {
        feed_url: feed_url.to_string(),
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_strips_query_and_resolves() {
        let html = r#"<script src="/jsData/matchResult/2024-2025/s36.js?version=2025081512"></script>"#;
        let loc = locate_feed(html, "http://zq.example.com/cn/League/36.html").unwrap();
        assert_eq!(loc.feed_url, "http://zq.example.com/jsData/matchResult/2024-2025/s36.js");
        assert_eq!(loc.version, "2025081512");
    }

    #[test]
    fn locator_missing() {
        let err = locate_feed("<html></html>", "http://zq.example.com/").unwrap_err();
        assert_eq!(err.kind(), "locator_not_found");
    }

    #[test]
    fn policy_orders_delay_bounds() {
        let policy = RetryPolicy::new(0, 9.0, 2.0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_min_secs, 2.0);
        assert_eq!(policy.delay_max_secs, 9.0);
        let delay = policy.pick_delay().as_secs_f64();
        assert!((2.0..=9.0).contains(&delay));
    }
}
