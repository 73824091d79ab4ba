use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PRIMARY_BASE_URL: &str = "https://bulbapedia.bulbagarden.net";
pub const DEFAULT_PRIMARY_API_URL: &str = "https://bulbapedia.bulbagarden.net/w/api.php";
pub const DEFAULT_MASTER_LIST_URL: &str =
    "https://bulbapedia.bulbagarden.net/wiki/List_of_Japanese_Pok%C3%A9mon_names";
pub const DEFAULT_SECONDARY_PAGE_BASE: &str = "https://wiki.xn--rckteqa2e.com/wiki/";
pub const DEFAULT_TYPE_PAGE_URL: &str = "https://bulbapedia.bulbagarden.net/wiki/Type";
pub const DEFAULT_TCG_TYPE_PAGE_URL: &str = "https://bulbapedia.bulbagarden.net/wiki/Type_(TCG)";
pub const DEFAULT_USER_AGENT: &str = "PokemonFlashcardsBot/0.3 (contact@example.com)";
pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_POLITENESS_MS: u64 = 300;
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_BACKOFF_MS: u64 = 5_000;
pub const DEFAULT_CACHE_DIR: &str = "cache";
pub const DEFAULT_OUTPUT_DIR: &str = ".";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HarvestConfig {
    #[serde(default)]
    pub sources: SourcesSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SourcesSection {
    pub primary_base_url: Option<String>,
    pub primary_api_url: Option<String>,
    pub master_list_url: Option<String>,
    pub secondary_page_base: Option<String>,
    pub type_page_url: Option<String>,
    pub tcg_type_page_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub politeness_ms: Option<u64>,
    pub max_attempts: Option<usize>,
    pub backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct CacheSection {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct OutputSection {
    pub dir: Option<PathBuf>,
}

/// Source locations after defaults have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrls {
    pub primary_base_url: String,
    pub primary_api_url: String,
    pub master_list_url: String,
    pub secondary_page_base: String,
    pub type_page_url: String,
    pub tcg_type_page_url: String,
}

impl HarvestConfig {
    pub fn sources(&self) -> SourceUrls {
        let section = &self.sources;
        let primary_base_url = section
            .primary_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_PRIMARY_BASE_URL.to_string());
        SourceUrls {
            primary_api_url: section
                .primary_api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_PRIMARY_API_URL.to_string()),
            master_list_url: section
                .master_list_url
                .clone()
                .unwrap_or_else(|| DEFAULT_MASTER_LIST_URL.to_string()),
            secondary_page_base: section
                .secondary_page_base
                .clone()
                .unwrap_or_else(|| DEFAULT_SECONDARY_PAGE_BASE.to_string()),
            type_page_url: section
                .type_page_url
                .clone()
                .unwrap_or_else(|| DEFAULT_TYPE_PAGE_URL.to_string()),
            tcg_type_page_url: section
                .tcg_type_page_url
                .clone()
                .unwrap_or_else(|| DEFAULT_TCG_TYPE_PAGE_URL.to_string()),
            primary_base_url: primary_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve user agent: env DEX_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        if let Some(value) = env_string("DEX_USER_AGENT") {
            return value;
        }
        self.http
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn timeout_ms(&self) -> u64 {
        env_parsed("DEX_HTTP_TIMEOUT_MS")
            .or(self.http.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn politeness_ms(&self) -> u64 {
        env_parsed("DEX_POLITENESS_MS")
            .or(self.http.politeness_ms)
            .unwrap_or(DEFAULT_POLITENESS_MS)
    }

    pub fn max_attempts(&self) -> usize {
        env_parsed("DEX_HTTP_ATTEMPTS")
            .or(self.http.max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS)
            .max(1)
    }

    pub fn backoff_ms(&self) -> u64 {
        env_parsed("DEX_BACKOFF_MS")
            .or(self.http.backoff_ms)
            .unwrap_or(DEFAULT_BACKOFF_MS)
    }

    /// Resolve cache directory: env DEX_CACHE_DIR > config > DEFAULT_CACHE_DIR.
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(value) = env_string("DEX_CACHE_DIR") {
            return PathBuf::from(value);
        }
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR))
    }

    pub fn output_dir(&self) -> PathBuf {
        if let Some(value) = env_string("DEX_OUTPUT_DIR") {
            return PathBuf::from(value);
        }
        self.output
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }
}

/// Load and parse a HarvestConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<HarvestConfig> {
    if !config_path.exists() {
        return Ok(HarvestConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: HarvestConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn env_string(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|value| value.parse::<T>().ok())
}
