//! Multi-index translation cache. One entry is reachable through three
//! canonical key levels (exact, normalized, clean); the exact-level index
//! owns the entries and carries recency order, the looser levels are alias
//! maps pointing at the owning exact key. Bounded, recency-evicted, swept
//! for age on a timer. Keys are blake3 hashes of the canonical strings.
//! Every operation is synchronous and infallible.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use super::normalize;

type Key = [u8; 32];

fn key_of(text: &str) -> Key {
    *blake3::hash(text.as_bytes()).as_bytes()
}

struct CacheEntry {
    translation: String,
    /// Set once at insert; expiry age is measured from here.
    created_at: Instant,
    /// Refreshed on every hit, at any index level.
    last_accessed: Instant,
    norm_key: Key,
    clean_key: Key,
}

struct Indices {
    /// Recency-ordered owner of the entries. Untouched entries keep
    /// insertion order, so eviction ties resolve to the oldest insert.
    exact: LruCache<Key, CacheEntry>,
    /// normalized-form hash -> owning exact key
    normalized: HashMap<Key, Key>,
    /// clean-form hash -> owning exact key
    clean: HashMap<Key, Key>,
}

impl Indices {
    /// Drop an alias only while it still points at `owner`; a looser key
    /// conflated onto a newer entry stays with that entry.
    fn unlink(&mut self, owner: &Key, entry: &CacheEntry) {
        if self.normalized.get(&entry.norm_key) == Some(owner) {
            self.normalized.remove(&entry.norm_key);
        }
        if self.clean.get(&entry.clean_key) == Some(owner) {
            self.clean.remove(&entry.clean_key);
        }
    }

    fn evict_lru(&mut self) {
        if let Some((key, entry)) = self.exact.pop_lru() {
            self.unlink(&key, &entry);
        }
    }
}

pub struct TranslationCache {
    inner: Mutex<Indices>,
    expire_time: Duration,
}

impl TranslationCache {
    pub fn new(capacity: usize, expire_time: Duration) -> Self {
        Self {
            inner: Mutex::new(Indices {
                exact: LruCache::new(
                    NonZeroUsize::new(capacity).expect("cache capacity must be > 0"),
                ),
                normalized: HashMap::new(),
                clean: HashMap::new(),
            }),
            expire_time,
        }
    }

    /// Probe all three levels, strictest first; the first hit wins and
    /// refreshes recency on the underlying exact entry.
    pub fn lookup(&self, text: &str) -> Option<String> {
        self.probe(text, true)
    }

    /// Probe the exact and normalized levels only.
    pub fn lookup_strict(&self, text: &str) -> Option<String> {
        self.probe(text, false)
    }

    fn probe(&self, text: &str, include_clean: bool) -> Option<String> {
        let mut inner = self.inner.lock();

        let exact = key_of(normalize::exact_key(text));
        if let Some(hit) = touch(&mut inner.exact, &exact) {
            return Some(hit);
        }

        let owner = inner.normalized.get(&key_of(&normalize::normalize(text))).copied();
        if let Some(owner) = owner {
            if let Some(hit) = touch(&mut inner.exact, &owner) {
                return Some(hit);
            }
        }

        if include_clean {
            let owner = inner.clean.get(&key_of(&normalize::clean(text))).copied();
            if let Some(owner) = owner {
                if let Some(hit) = touch(&mut inner.exact, &owner) {
                    return Some(hit);
                }
            }
        }

        None
    }

    /// Insert `translation` under all three canonical forms of `source`.
    /// At capacity the least-recently-accessed entry is evicted before the
    /// insert, so the size bound holds at every return.
    pub fn store(&self, source: &str, translation: &str) {
        let mut inner = self.inner.lock();

        if inner.exact.len() >= inner.exact.cap().get() {
            inner.evict_lru();
        }

        let exact = key_of(normalize::exact_key(source));
        let norm_key = key_of(&normalize::normalize(source));
        let clean_key = key_of(&normalize::clean(source));
        let now = Instant::now();

        inner.exact.put(
            exact,
            CacheEntry {
                translation: translation.to_string(),
                created_at: now,
                last_accessed: now,
                norm_key,
                clean_key,
            },
        );
        inner.normalized.insert(norm_key, exact);
        inner.clean.insert(clean_key, exact);
    }

    /// Remove every entry older than the configured lifetime, consistently
    /// across all three indices. Age is measured from creation, so a
    /// frequently read entry still expires. Called by the background sweep.
    pub fn expire(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let dead: Vec<Key> = inner
            .exact
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.created_at) > self.expire_time)
            .map(|(key, _)| *key)
            .collect();

        for key in &dead {
            if let Some(entry) = inner.exact.pop(key) {
                inner.unlink(key, &entry);
            }
        }
        dead.len()
    }

    /// Empty all indices. Explicit reset only; not part of the normal flow.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.exact.clear();
        inner.normalized.clear();
        inner.clean.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Idle time of the least-recently-accessed entry. Diagnostic only,
    /// logged by the sweep.
    pub fn lru_idle(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        inner
            .exact
            .iter()
            .last()
            .map(|(_, entry)| entry.last_accessed.elapsed())
    }
}

fn touch(exact: &mut LruCache<Key, CacheEntry>, key: &Key) -> Option<String> {
    let entry = exact.get_mut(key)?;
    entry.last_accessed = Instant::now();
    Some(entry.translation.clone())
}
