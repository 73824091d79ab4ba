use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheStore, ContentCache};
use crate::config::HarvestConfig;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS,
            backoff_ms: crate::config::DEFAULT_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            max_attempts: config.max_attempts(),
            backoff_ms: config.backoff_ms(),
        }
    }

    /// Delay before retrying after the given zero-based attempt.
    pub fn backoff_for(&self, attempt: usize) -> Duration {
        if self.backoff_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .backoff_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        Duration::from_millis(base.saturating_add(jitter))
    }
}

/// Result of one structured API query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Success(Value),
    /// The endpoint answered with an explicit `error` object.
    RemoteError { code: String, info: String },
    Exhausted { attempts: usize, last_error: String },
}

impl QueryOutcome {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Success(value) => Some(value),
            Self::RemoteError { .. } | Self::Exhausted { .. } => None,
        }
    }
}

/// Owns the transport and cache for one run; every outbound call goes through here.
pub struct SourceClient<T, S> {
    transport: T,
    cache: ContentCache<S>,
    retry: RetryPolicy,
}

impl<T: Transport, S: CacheStore> SourceClient<T, S> {
    pub fn new(transport: T, cache: ContentCache<S>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            cache,
            retry,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cache(&self) -> &ContentCache<S> {
        &self.cache
    }

    pub fn request_count(&self) -> usize {
        self.transport.request_count()
    }

    /// Fetch a document through the cache.
    pub fn fetch_document(&mut self, cache_key: &str, url: &str) -> Result<String> {
        let transport = &mut self.transport;
        self.cache
            .get_or_fetch(cache_key, || transport.fetch_text(url))
    }

    /// Issue an API query, retrying malformed or failed responses and
    /// returning remote errors immediately.
    pub fn query(&mut self, params: &[(&str, String)], cache_key: Option<&str>) -> QueryOutcome {
        if let Some(key) = cache_key
            && let Some(cached) = self.cache.read_json(key)
        {
            return QueryOutcome::Success(cached);
        }

        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::from("no attempt made");
        for attempt in 0..attempts {
            let body = match self.transport.query_text(params) {
                Ok(body) => body,
                Err(error) => {
                    last_error = format!("{error:#}");
                    debug!(attempt, error = %last_error, "API request failed");
                    self.wait_before_retry(attempt, attempts);
                    continue;
                }
            };
            let payload = match serde_json::from_str::<Value>(&body) {
                Ok(payload) => payload,
                Err(error) => {
                    last_error = format!("failed to decode API JSON response: {error}");
                    debug!(attempt, error = %last_error, "malformed API response");
                    self.wait_before_retry(attempt, attempts);
                    continue;
                }
            };
            if let Some(error) = payload.get("error") {
                let code = error
                    .get("code")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown_error")
                    .to_string();
                let info = error
                    .get("info")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown info")
                    .to_string();
                warn!(code = %code, page = page_param(params), "API error: {info}");
                return QueryOutcome::RemoteError { code, info };
            }
            if let Some(key) = cache_key
                && let Err(error) = self.cache.write_json(key, &payload)
            {
                warn!(key, error = %error, "failed to cache API response");
            }
            return QueryOutcome::Success(payload);
        }

        warn!(
            attempts,
            page = page_param(params),
            error = %last_error,
            "API query exhausted retry budget"
        );
        QueryOutcome::Exhausted {
            attempts,
            last_error,
        }
    }

    fn wait_before_retry(&self, attempt: usize, attempts: usize) {
        if attempt + 1 < attempts {
            let delay = self.retry.backoff_for(attempt);
            if !delay.is_zero() {
                sleep(delay);
            }
        }
    }
}

fn page_param<'a>(params: &'a [(&str, String)]) -> &'a str {
    params
        .iter()
        .find(|(key, _)| *key == "page")
        .map(|(_, value)| value.as_str())
        .unwrap_or("")
}
