//! Page fetching with per-host throttling and linear-backoff retries.
//!
//! # Architecture
//!
//! The module uses a trait-based design so decorators can be stacked:
//! - [`Fetch`]: core trait, fetch a URL and return its body
//! - [`HttpFetcher`]: `reqwest` implementation
//! - [`Throttled`]: enforces a minimum interval between requests to one host
//! - [`RetryFetch`]: retries timeouts and 5xx responses with linear backoff
//!
//! The CLI composes them as `RetryFetch<Throttled<HttpFetcher>>`, so every
//! retry attempt also waits its turn for the host.
//!
//! # Retry Strategy
//!
//! - Retries only [`FetchError::is_transient`] failures (timeouts, 5xx)
//! - Delay before attempt `n` is `base_delay * n` plus 0-100ms of jitter
//! - 4xx and transport errors fail immediately

use crate::errors::FetchError;
use crate::utils::{host_key, truncate_for_log};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use rand::{rng, Rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Trait for fetching a page body.
pub trait Fetch {
    /// Fetch `url` and return the response body as text.
    async fn fetch(&self, url: &Url) -> Result<String, FetchError>;
}

impl<T: Fetch> Fetch for &T {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        (**self).fetch(url).await
    }
}

/// Plain HTTP GET via a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Non-success status");
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        let body = response.text().await?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            preview = %truncate_for_log(&body, 120),
            "Fetched page"
        );
        Ok(body)
    }
}

type HostLimiter = DefaultKeyedRateLimiter<String>;

/// Enforces a minimum delay between successive requests to the same host.
pub struct Throttled<T> {
    inner: T,
    interval: Duration,
    limiter: Option<HostLimiter>,
}

impl<T> Throttled<T> {
    /// A zero `interval` disables throttling.
    pub fn new(inner: T, interval: Duration) -> Self {
        let limiter = Quota::with_period(interval).map(RateLimiter::keyed);
        Self {
            inner,
            interval,
            limiter,
        }
    }
}

impl<T> fmt::Debug for Throttled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttled")
            .field("interval", &self.interval)
            .finish()
    }
}

impl<T: Fetch> Fetch for Throttled<T> {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        if let Some(limiter) = &self.limiter {
            let host = host_key(url);
            let t0 = Instant::now();
            limiter.until_key_ready(&host).await;
            let waited = t0.elapsed();
            if !waited.is_zero() {
                debug!(%host, waited_ms = waited.as_millis() as u64, "Throttled request");
            }
        }
        self.inner.fetch(url).await
    }
}

/// Wrapper that retries transient failures of any [`Fetch`] implementation.
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
}

impl<T: Fetch> RetryFetch<T> {
    /// Create a new retry wrapper.
    ///
    /// # Arguments
    ///
    /// * `inner` - The fetcher to wrap, usually a [`Throttled`] [`HttpFetcher`]
    /// * `max_retries` - Extra attempts after the first (0 = try once)
    /// * `base_delay` - Backoff unit; attempt `n` waits `n * base_delay` plus jitter
    ///
    /// # Returns
    ///
    /// A fetcher that retries `Timeout` and 5xx failures and returns every
    /// other error immediately.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let fetcher = RetryFetch::new(
    ///     Throttled::new(HttpFetcher::new(timeout, "rival_watch")?, Duration::from_secs(2)),
    ///     3,
    ///     Duration::from_millis(300),
    /// );
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

impl<T: Fetch> Fetch for RetryFetch<T> {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(url).await {
                Ok(body) => {
                    if attempt > 0 {
                        info!(attempt, "fetch succeeded after retry");
                    }
                    return Ok(body);
                }
                Err(e) if !e.is_transient() => {
                    warn!(error = %e, "fetch failed; not retrying");
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let jitter_ms: u64 = rng().random_range(0..=100);
                    let delay = self.base_delay.saturating_mul(attempt as u32)
                        + Duration::from_millis(jitter_ms);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Replays scripted responses and counts calls.
    struct Scripted {
        responses: RefCell<VecDeque<Result<String, FetchError>>>,
        calls: Cell<usize>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<String, FetchError>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                calls: Cell::new(0),
            }
        }
    }

    impl Fetch for Scripted {
        async fn fetch(&self, _url: &Url) -> Result<String, FetchError> {
            self.calls.set(self.calls.get() + 1);
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok("<html></html>".to_string()))
        }
    }

    fn url() -> Url {
        Url::parse("https://openai.com/blog").unwrap()
    }

    #[tokio::test]
    async fn test_retries_timeouts_then_succeeds() {
        let inner = Scripted::new(vec![
            Err(FetchError::Timeout),
            Err(FetchError::HttpStatus(503)),
            Ok("body".to_string()),
        ]);
        let fetcher = RetryFetch::new(&inner, 3, Duration::from_millis(1));
        assert_eq!(fetcher.fetch(&url()).await.unwrap(), "body");
        assert_eq!(inner.calls.get(), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let inner = Scripted::new(vec![Err(FetchError::HttpStatus(404))]);
        let fetcher = RetryFetch::new(&inner, 3, Duration::from_millis(1));
        assert_eq!(
            fetcher.fetch(&url()).await,
            Err(FetchError::HttpStatus(404))
        );
        assert_eq!(inner.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let inner = Scripted::new(vec![Err(FetchError::Timeout); 5]);
        let fetcher = RetryFetch::new(&inner, 2, Duration::from_millis(1));
        assert_eq!(fetcher.fetch(&url()).await, Err(FetchError::Timeout));
        assert_eq!(inner.calls.get(), 3);
    }

    #[tokio::test]
    async fn test_throttle_spaces_requests_to_same_host() {
        let inner = Scripted::new(vec![]);
        let fetcher = Throttled::new(&inner, Duration::from_millis(150));
        let t0 = Instant::now();
        fetcher.fetch(&url()).await.unwrap();
        fetcher.fetch(&url()).await.unwrap();
        assert!(t0.elapsed() >= Duration::from_millis(140));
        assert_eq!(inner.calls.get(), 2);
    }

    #[tokio::test]
    async fn test_throttle_does_not_delay_other_hosts() {
        let inner = Scripted::new(vec![]);
        let fetcher = Throttled::new(&inner, Duration::from_secs(5));
        let t0 = Instant::now();
        fetcher.fetch(&url()).await.unwrap();
        fetcher
            .fetch(&Url::parse("https://www.anthropic.com/news").unwrap())
            .await
            .unwrap();
        assert!(t0.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_interval_disables_throttle() {
        let inner = Scripted::new(vec![]);
        let fetcher = Throttled::new(&inner, Duration::ZERO);
        let t0 = Instant::now();
        for _ in 0..3 {
            fetcher.fetch(&url()).await.unwrap();
        }
        assert!(t0.elapsed() < Duration::from_secs(1));
    }
}
