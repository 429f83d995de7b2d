use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::utils::estimate_tokens;

/// One cached project artifact.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub content: String,
    pub size_tokens: usize,
    pub last_accessed: DateTime<Utc>,
    pub pinned: bool,
    /// Strictly increasing access sequence; wall-clock timestamps can tie,
    /// the sequence cannot, so LRU order stays total.
    access_seq: u64,
}

/// Warning surfaced when the cache cannot shrink below its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWarning {
    /// Every remaining entry is pinned and the ceiling is still exceeded.
    /// Pinned entries are a hard guarantee, so the cache stays oversized.
    CapacityExceededWithAllPinned {
        total_tokens: usize,
        ceiling_tokens: usize,
    },
}

impl fmt::Display for CacheWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceededWithAllPinned {
                total_tokens,
                ceiling_tokens,
            } => write!(
                f,
                "all entries pinned; {} tokens cached against a ceiling of {}",
                total_tokens, ceiling_tokens
            ),
        }
    }
}

/// Result of a `get_or_load` lookup.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub content: String,
    pub from_cache: bool,
    pub warning: Option<CacheWarning>,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Keys pinned before their first insertion; honored on insert.
    pending_pins: HashSet<String>,
    total_tokens: usize,
    next_seq: u64,
}

impl CacheInner {
    fn touch(&mut self, key: &str) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_accessed = Utc::now();
            entry.access_seq = seq;
        }
    }
}

/// Bounded, pinning-aware store of loadable project artifacts.
///
/// Eviction is strict least-recently-used over unpinned entries only; a
/// pinned entry is never evicted regardless of recency. Reads may come
/// from any stage concurrently; insert, pin, and eviction all serialize on
/// the interior lock so an entry cannot be evicted while it is being
/// inserted or pinned.
pub struct ContextCache {
    inner: Mutex<CacheInner>,
    ceiling_tokens: usize,
}

impl ContextCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                pending_pins: HashSet::new(),
                total_tokens: 0,
                next_seq: 0,
            }),
            ceiling_tokens: config.ceiling_tokens,
        }
    }

    /// Cache hit: refresh recency and return the content.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(key) {
            return None;
        }
        inner.touch(key);
        inner.entries.get(key).map(|e| e.content.clone())
    }

    /// Hit or load-and-insert. The loader only runs on a miss; eviction
    /// runs after the insert and its warning, if any, is surfaced on the
    /// result rather than failing the lookup.
    pub fn get_or_load<F>(&self, key: &str, loader: F) -> Result<Loaded>
    where
        F: FnOnce() -> Result<String>,
    {
        if let Some(content) = self.get(key) {
            return Ok(Loaded {
                content,
                from_cache: true,
                warning: None,
            });
        }

        let content = loader()?;
        let warning = self.insert(key, content.clone());
        Ok(Loaded {
            content,
            from_cache: false,
            warning,
        })
    }

    /// Insert (or replace) an entry, then evict down to the ceiling.
    pub fn insert(&self, key: &str, content: String) -> Option<CacheWarning> {
        let size_tokens = estimate_tokens(&content);
        let mut inner = self.inner.lock();

        let pinned = inner.pending_pins.remove(key)
            || inner.entries.get(key).map(|e| e.pinned).unwrap_or(false);
        if let Some(old) = inner.entries.remove(key) {
            inner.total_tokens -= old.size_tokens;
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                content,
                size_tokens,
                last_accessed: Utc::now(),
                pinned,
                access_seq: seq,
            },
        );
        inner.total_tokens += size_tokens;

        Self::evict(&mut inner, self.ceiling_tokens)
    }

    /// Mark a key exempt from eviction. Pinning an absent key is a no-op
    /// recorded for when the key is later inserted.
    pub fn pin(&self, key: &str) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.pinned = true;
        } else {
            inner.pending_pins.insert(key.to_string());
        }
    }

    pub fn unpin(&self, key: &str) {
        let mut inner = self.inner.lock();
        inner.pending_pins.remove(key);
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.pinned = false;
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Inspect an entry without refreshing its recency.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.inner.lock().entries.get(key).cloned()
    }

    pub fn is_pinned(&self, key: &str) -> bool {
        self.inner.lock().entries.get(key).map(|e| e.pinned).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_tokens(&self) -> usize {
        self.inner.lock().total_tokens
    }

    /// While over the ceiling, remove the least-recently-used unpinned
    /// entry. If only pinned entries remain and the ceiling is still
    /// exceeded, stop and surface the warning instead of breaking the pin
    /// guarantee.
    fn evict(inner: &mut CacheInner, ceiling_tokens: usize) -> Option<CacheWarning> {
        while inner.total_tokens > ceiling_tokens {
            let victim = inner
                .entries
                .values()
                .filter(|e| !e.pinned)
                .min_by_key(|e| e.access_seq)
                .map(|e| e.key.clone());

            match victim {
                Some(key) => {
                    if let Some(entry) = inner.entries.remove(&key) {
                        inner.total_tokens -= entry.size_tokens;
                        debug!(key = %key, size_tokens = entry.size_tokens, "Evicted cache entry");
                    }
                }
                None => {
                    let warning = CacheWarning::CapacityExceededWithAllPinned {
                        total_tokens: inner.total_tokens,
                        ceiling_tokens,
                    };
                    warn!(
                        total_tokens = inner.total_tokens,
                        ceiling_tokens, "Cache over ceiling with all entries pinned"
                    );
                    return Some(warning);
                }
            }
        }
        None
    }
}
