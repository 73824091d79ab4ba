use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

const MAX_FILE_NAME_BYTES: usize = 120;
const TRUNCATED_PREFIX_BYTES: usize = 80;

/// Key-value text store backing the content cache.
pub trait CacheStore {
    fn has(&self, key: &str) -> bool;
    fn read(&self, key: &str) -> Result<String>;
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Cache entries stored as one file per key under a directory.
#[derive(Debug, Clone)]
pub struct FsCacheStore {
    dir: PathBuf,
}

impl FsCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(cache_file_name(key))
    }
}

impl CacheStore for FsCacheStore {
    fn has(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    fn read(&self, key: &str) -> Result<String> {
        let path = self.path_for(key);
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path_for(key);
        let staging = path.with_extension("partial");
        fs::write(&staging, value)
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &path).with_context(|| {
            format!(
                "failed to move {} into {}",
                staging.display(),
                path.display()
            )
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    entries: HashMap<String, String>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn read(&self, key: &str) -> Result<String> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("cache entry missing: {key}"))
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

/// Write-once, read-many document cache over a [`CacheStore`].
#[derive(Debug)]
pub struct ContentCache<S> {
    store: S,
    stats: CacheStats,
}

impl<S: CacheStore> ContentCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            stats: CacheStats::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Return the entry for `key`, calling `fetch` and persisting its result on a miss.
    ///
    /// An entry that exists but cannot be read counts as a miss. A failing
    /// `fetch` leaves no entry behind.
    pub fn get_or_fetch<F>(&mut self, key: &str, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Result<String>,
    {
        if self.store.has(key) {
            match self.store.read(key) {
                Ok(content) => {
                    self.stats.hits += 1;
                    debug!(key, "cache hit");
                    return Ok(content);
                }
                Err(error) => {
                    warn!(
                        key,
                        error = %format!("{error:#}"),
                        "refetching unreadable cache entry"
                    );
                }
            }
        }
        self.stats.misses += 1;
        debug!(key, "cache miss");
        let content = fetch()?;
        self.store.write(key, &content)?;
        Ok(content)
    }

    /// Cached JSON document for `key`, if present and decodable.
    pub fn read_json(&mut self, key: &str) -> Option<Value> {
        if !self.store.has(key) {
            self.stats.misses += 1;
            return None;
        }
        let parsed = self
            .store
            .read(key)
            .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(anyhow::Error::from));
        match parsed {
            Ok(value) => {
                self.stats.hits += 1;
                debug!(key, "cache hit");
                Some(value)
            }
            Err(error) => {
                warn!(key, error = %error, "ignoring unreadable cache entry");
                None
            }
        }
    }

    pub fn write_json(&mut self, key: &str, value: &Value) -> Result<()> {
        let rendered =
            serde_json::to_string_pretty(value).context("failed to serialize cache entry")?;
        self.store.write(key, &rendered)
    }
}

/// File name for a cache key: path-hostile characters replaced, long keys
/// shortened with a digest suffix.
pub fn cache_file_name(key: &str) -> String {
    let mut output = String::with_capacity(key.len());
    for ch in key.trim().chars() {
        if ch.is_control()
            || matches!(ch, '<' | '>' | ':' | '"' | '|' | '?' | '*' | '/' | '\\')
        {
            output.push('_');
        } else {
            output.push(ch);
        }
    }
    if output.is_empty() {
        output.push('_');
    }
    if output.len() <= MAX_FILE_NAME_BYTES {
        return output;
    }

    let mut cut = TRUNCATED_PREFIX_BYTES;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    let extension = Path::new(&output)
        .extension()
        .and_then(|value| value.to_str())
        .filter(|value| value.len() <= 8)
        .map(|value| format!(".{value}"))
        .unwrap_or_default();
    format!("{}-{}{}", &output[..cut], short_digest(key), extension)
}

fn short_digest(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;
    use tempfile::tempdir;

    use super::{CacheStore, ContentCache, FsCacheStore, MemoryCacheStore, cache_file_name};

    #[test]
    fn get_or_fetch_calls_fetch_at_most_once() {
        let mut cache = ContentCache::new(MemoryCacheStore::new());
        let calls = Cell::new(0usize);

        let first = cache
            .get_or_fetch("list.html", || {
                calls.set(calls.get() + 1);
                Ok("<table></table>".to_string())
            })
            .expect("first fetch");
        let second = cache
            .get_or_fetch("list.html", || {
                calls.set(calls.get() + 1);
                Ok("different".to_string())
            })
            .expect("second fetch");

        assert_eq!(calls.get(), 1);
        assert_eq!(first, second);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn failed_fetch_leaves_no_entry() {
        let mut cache = ContentCache::new(MemoryCacheStore::new());
        let error = cache
            .get_or_fetch("jp_x.html", || Err(anyhow::anyhow!("connection reset")))
            .expect_err("must fail");
        assert!(error.to_string().contains("connection reset"));
        assert!(!cache.store().has("jp_x.html"));

        let value = cache
            .get_or_fetch("jp_x.html", || Ok("ok".to_string()))
            .expect("retry fetch");
        assert_eq!(value, "ok");
    }

    #[test]
    fn fs_store_persists_across_instances() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("cache");

        let mut cache = ContentCache::new(FsCacheStore::new(&dir));
        cache
            .get_or_fetch("idx_Bulbasaur.json", || Ok("{}".to_string()))
            .expect("write");
        assert!(dir.join("idx_Bulbasaur.json").is_file());
        assert!(!dir.join("idx_Bulbasaur.partial").exists());

        let mut reopened = ContentCache::new(FsCacheStore::new(&dir));
        let value = reopened
            .get_or_fetch("idx_Bulbasaur.json", || panic!("must not refetch"))
            .expect("read");
        assert_eq!(value, "{}");
    }

    #[test]
    fn unreadable_document_entry_is_refetched() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("cache");
        std::fs::create_dir_all(&dir).expect("create cache dir");
        std::fs::write(dir.join("list.html"), [0xff, 0xfe, 0x00]).expect("write garbage");

        let mut cache = ContentCache::new(FsCacheStore::new(&dir));
        let value = cache
            .get_or_fetch("list.html", || Ok("<table></table>".to_string()))
            .expect("refetch");
        assert_eq!(value, "<table></table>");
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(
            std::fs::read_to_string(dir.join("list.html")).expect("read back"),
            "<table></table>"
        );
    }

    #[test]
    fn json_entries_round_trip_and_ignore_garbage() {
        let mut cache = ContentCache::new(MemoryCacheStore::new());
        assert!(cache.read_json("sec_A_1.json").is_none());

        cache
            .write_json("sec_A_1.json", &json!({"parse": {"text": "<p>x</p>"}}))
            .expect("write json");
        let value = cache.read_json("sec_A_1.json").expect("cached json");
        assert_eq!(value["parse"]["text"], "<p>x</p>");

        let mut store = MemoryCacheStore::new();
        store.write("broken.json", "{not json").expect("write");
        let mut cache = ContentCache::new(store);
        assert!(cache.read_json("broken.json").is_none());
    }

    #[test]
    fn cache_file_name_sanitizes_and_bounds_length() {
        assert_eq!(cache_file_name("idx_Type: Null.json"), "idx_Type_ Null.json");
        assert_eq!(cache_file_name("sec_a/b_1.json"), "sec_a_b_1.json");

        let long_key = format!("jp_{}.html", "%E3%83%95".repeat(40));
        let name = cache_file_name(&long_key);
        assert!(name.len() <= 120);
        assert!(name.ends_with(".html"));
        assert_ne!(name, cache_file_name(&format!("jp_{}.html", "%E3%83%96".repeat(40))));
    }
}
