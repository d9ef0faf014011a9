//! Summary caching keyed by page URL and prompt identity.
//!
//! Avoids a second LLM round-trip when the same page is summarized with the
//! same saved prompt within the TTL. Entries live in the shared
//! [`KeyValueStore`] under `summary_cache_<fnv1a(url)>_<promptId>`; a
//! request without a prompt id uses [`DEFAULT_PROMPT_ID`].
//!
//! Keys track the prompt *identifier*, not the prompt text. Two ad-hoc
//! prompts without an identifier therefore share one entry per URL, and
//! editing a saved prompt must call [`SummaryCache::clear_for_prompt`].

use crate::DEFAULT_PROMPT_ID;
use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::{KeyValueStore, KeyValueStoreExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key prefix shared by every cache entry.
pub const CACHE_PREFIX: &str = "summary_cache_";

/// How long a summary stays valid.
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One persisted summary.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub summary: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Diagnostic only; lookups go through the hashed key.
    pub url: String,
}

/// TTL cache of generated summaries.
pub struct SummaryCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl_millis: i64,
}

impl SummaryCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl_millis: duration_millis(CACHE_TTL),
        }
    }

    /// Override the time-to-live.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_millis = duration_millis(ttl);
        self
    }

    /// Look up a fresh summary. Expired or unreadable entries are deleted
    /// and reported as a miss.
    pub fn get(&self, url: &str, prompt_id: Option<&str>) -> Result<Option<String>, StoreError> {
        let key = cache_key(url, prompt_id);
        let entry = match self.store.get_json::<CacheEntry>(&key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Dropping unreadable cache entry: {e}");
                self.store.remove(&[key])?;
                return Ok(None);
            }
        };

        match entry {
            Some(entry) if self.is_expired(&entry) => {
                debug!("Cache expired: {key}");
                self.store.remove(&[key])?;
                Ok(None)
            }
            Some(entry) => {
                debug!("Cache hit: {key} ({} chars)", entry.summary.len());
                Ok(Some(entry.summary))
            }
            None => {
                debug!("Cache miss: {key}");
                Ok(None)
            }
        }
    }

    /// Store `summary`, replacing any entry under the same key.
    pub fn set(&self, url: &str, summary: &str, prompt_id: Option<&str>) -> Result<(), StoreError> {
        let key = cache_key(url, prompt_id);
        let entry = CacheEntry {
            summary: summary.to_string(),
            timestamp: self.clock.now_millis(),
            url: url.to_string(),
        };
        self.store.set_json(&key, &entry)?;
        debug!("Cache store: {key} ({} chars)", summary.len());
        Ok(())
    }

    /// Remove every cache entry. Other keys in the store are untouched.
    /// Returns the number of entries removed.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let keys: Vec<String> = self
            .store
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(CACHE_PREFIX))
            .collect();
        self.store.remove(&keys)?;
        info!("Cleared {} cached summaries", keys.len());
        Ok(keys.len())
    }

    /// Remove entries produced under `prompt_id`.
    pub fn clear_for_prompt(&self, prompt_id: &str) -> Result<usize, StoreError> {
        let keys: Vec<String> = self
            .store
            .keys()?
            .into_iter()
            .filter(|k| parse_key(k).is_some_and(|(_, id)| id == prompt_id))
            .collect();
        self.store.remove(&keys)?;
        debug!("Cleared {} cached summaries for prompt {prompt_id}", keys.len());
        Ok(keys.len())
    }

    /// Sweep all expired (or unreadable) entries. Run once at startup.
    pub fn clean_expired(&self) -> Result<usize, StoreError> {
        let mut stale = Vec::new();
        for key in self.store.keys()? {
            if !key.starts_with(CACHE_PREFIX) {
                continue;
            }
            match self.store.get_json::<CacheEntry>(&key) {
                Ok(Some(entry)) if !self.is_expired(&entry) => {}
                Ok(None) => {}
                _ => stale.push(key),
            }
        }
        self.store.remove(&stale)?;
        if !stale.is_empty() {
            info!("Swept {} expired cache entries", stale.len());
        }
        Ok(stale.len())
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.clock.now_millis().saturating_sub(entry.timestamp) > self.ttl_millis
    }
}

/// Storage key for `(url, prompt_id)`.
pub fn cache_key(url: &str, prompt_id: Option<&str>) -> String {
    let prompt_id = prompt_id
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_PROMPT_ID);
    format!("{CACHE_PREFIX}{:016x}_{prompt_id}", hash_url(url))
}

/// Split a cache key into its URL hash and prompt id segments.
fn parse_key(key: &str) -> Option<(&str, &str)> {
    key.strip_prefix(CACHE_PREFIX)?.split_once('_')
}

/// 64-bit FNV-1a over the URL bytes.
fn hash_url(url: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in url.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
