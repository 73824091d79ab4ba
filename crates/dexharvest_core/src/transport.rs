use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::Client;
use tracing::debug;

use crate::config::HarvestConfig;

/// Raw network access consumed by the extraction core.
///
/// `query_text` returns the undecoded API body so callers can tell a
/// malformed payload apart from a transport failure.
pub trait Transport {
    fn fetch_text(&mut self, url: &str) -> Result<String>;
    fn query_text(&mut self, params: &[(&str, String)]) -> Result<String>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub politeness_ms: u64,
}

impl HttpTransportConfig {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            api_url: config.sources().primary_api_url,
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
            politeness_ms: config.politeness_ms(),
        }
    }
}

/// Blocking HTTP transport with a politeness delay before every request.
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    pub fn from_config(config: &HarvestConfig) -> Result<Self> {
        Self::new(HttpTransportConfig::from_config(config))
    }

    fn apply_politeness(&mut self) {
        let delay = Duration::from_millis(self.config.politeness_ms);
        match self.last_request_at {
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed < delay {
                    sleep(delay - elapsed);
                }
            }
            None => sleep(delay),
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }
}

impl Transport for HttpTransport {
    fn fetch_text(&mut self, url: &str) -> Result<String> {
        self.apply_politeness();
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .header("User-Agent", self.config.user_agent.clone())
            .send()
            .with_context(|| format!("failed to fetch {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} while fetching {}", status.as_u16(), url);
        }
        response.text().context("failed to read response body")
    }

    fn query_text(&mut self, params: &[(&str, String)]) -> Result<String> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid API URL: {}", self.config.api_url))?;

        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        self.apply_politeness();
        debug!(api = %base_url, "API query");
        let response = self
            .client
            .get(base_url)
            .header("User-Agent", self.config.user_agent.clone())
            .query(&pairs)
            .send()
            .context("failed to call API")?;
        let status = response.status();
        if !status.is_success() {
            bail!("API request failed with HTTP {status}");
        }
        response.text().context("failed to read API response body")
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}
