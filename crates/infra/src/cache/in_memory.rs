use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{CacheBackend, CacheError, glob_matches};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process cache with every optional capability.
///
/// Intended for tests/dev and single-process deployments. Each operation holds
/// one mutex for its whole read-modify-write, so `incr`, `add` and
/// `compare_and_swap` are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Backend("lock poisoned".to_string()))
    }

    /// Live entry under `key`; expired entries are evicted on the way.
    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

fn entry(value: &str, ttl: Option<Duration>) -> Entry {
    Entry {
        value: value.to_string(),
        expires_at: ttl.map(|ttl| Instant::now() + ttl),
    }
}

impl CacheBackend for InMemoryCache {
    fn name(&self) -> &'static str {
        "in_memory"
    }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.lock()?;
        Ok(Self::live(&mut entries, key).map(|e| e.value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.lock()?.insert(key.to_string(), entry(value, ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn incr(&self, key: &str, delta: i64) -> Result<Option<i64>, CacheError> {
        let mut entries = self.lock()?;
        let Some(current) = Self::live(&mut entries, key) else {
            return Ok(None);
        };
        let value: i64 = current
            .value
            .parse()
            .map_err(|_| CacheError::NotAnInteger(key.to_string()))?;
        let next = value
            .checked_add(delta)
            .ok_or_else(|| CacheError::NotAnInteger(key.to_string()))?;
        current.value = next.to_string();
        Ok(Some(next))
    }

    fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, CacheError> {
        let mut entries = self.lock()?;
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), entry(value, ttl));
        Ok(true)
    }

    fn compare_and_swap(&self, key: &str, expected: Option<&str>, new: &str) -> Result<bool, CacheError> {
        let mut entries = self.lock()?;
        let current = Self::live(&mut entries, key).map(|e| e.value.clone());
        if current.as_deref() != expected {
            return Ok(false);
        }
        entries.insert(key.to_string(), entry(new, None));
        Ok(true)
    }

    fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|key, _| !glob_matches(pattern, key));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_delete() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("k").unwrap(), None);

        cache.set("k", "v", None).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v"));

        cache.delete("k").unwrap();
        cache.delete("k").unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Some(Duration::ZERO)).unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
        assert!(cache.add("k", "w", None).unwrap());
    }

    #[test]
    fn incr_only_touches_existing_integers() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.incr("n", 1).unwrap(), None);
        assert_eq!(cache.get("n").unwrap(), None);

        cache.set("n", "2", None).unwrap();
        assert_eq!(cache.incr("n", 1).unwrap(), Some(3));

        cache.set("s", "abc", None).unwrap();
        assert!(matches!(cache.incr("s", 1), Err(CacheError::NotAnInteger(_))));
    }

    #[test]
    fn add_is_set_if_absent() {
        let cache = InMemoryCache::new();
        assert!(cache.add("k", "1", None).unwrap());
        assert!(!cache.add("k", "2", None).unwrap());
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn compare_and_swap_checks_current_value() {
        let cache = InMemoryCache::new();
        assert!(!cache.compare_and_swap("k", Some("1"), "2").unwrap());
        assert!(cache.compare_and_swap("k", None, "2").unwrap());
        assert!(!cache.compare_and_swap("k", None, "3").unwrap());
        assert!(!cache.compare_and_swap("k", Some("1"), "3").unwrap());
        assert!(cache.compare_and_swap("k", Some("2"), "3").unwrap());
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn delete_pattern_counts_matches() {
        let cache = InMemoryCache::new();
        cache.set("products_list_v1", "[]", None).unwrap();
        cache.set("products_list_v2", "[]", None).unwrap();
        cache.set("product_x", "{}", None).unwrap();

        assert_eq!(cache.delete_pattern("products_list_*").unwrap(), 2);
        assert_eq!(cache.get("product_x").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn concurrent_incr_loses_nothing() {
        let cache = std::sync::Arc::new(InMemoryCache::new());
        cache.set("n", "0", None).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        cache.incr("n", 1).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.get("n").unwrap().as_deref(), Some("800"));
    }
}
