use chrono::{DateTime, Duration, Utc};
use failure::{Error, format_err};
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{from_str, to_string};
use std::collections::HashMap;
use std::sync::Mutex;

/// Serialized value together with the moment it was computed.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: String,
    pub stamp: DateTime<Utc>
}

/// Raw key-value storage behind a [`Cache`].
pub trait Store: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Entry>, Error>;
    fn save(&self, key: &str, entry: &Entry) -> Result<(), Error>;
    fn purge(&self) -> Result<(), Error>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl Store for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Entry>, Error> {
        let entries = self.entries.lock().map_err(|_| format_err!("cache lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, entry: &Entry) -> Result<(), Error> {
        let mut entries = self.entries.lock().map_err(|_| format_err!("cache lock poisoned"))?;
        entries.insert(String::from(key), entry.clone());
        Ok(())
    }

    fn purge(&self) -> Result<(), Error> {
        let mut entries = self.entries.lock().map_err(|_| format_err!("cache lock poisoned"))?;
        entries.clear();
        Ok(())
    }
}

/// Time-limited cache. Values older than `ttl` are reported as invalid
/// and get recomputed on the next access.
pub struct Cache {
    store: Box<dyn Store>,
    ttl: Duration
}

impl Cache {
    pub fn new(store: Box<dyn Store>, ttl: Duration) -> Cache {
        Cache { store, ttl }
    }

    pub fn in_memory(ttl: Duration) -> Cache {
        Cache::new(Box::new(MemoryStore::new()), ttl)
    }

    /// Value stored under `key` and whether it is still fresh.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<(T, bool)> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at<T: DeserializeOwned>(&self, key: &str, now: DateTime<Utc>) -> Option<(T, bool)> {
        // store failures only cost a recomputation
        let entry = match self.store.load(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!("cache read failed for {}: {}", key, e);
                return None;
            }
        };
        match from_str(&entry.value) {
            Ok(value) => Some((value, now.signed_duration_since(entry.stamp) < self.ttl)),
            Err(e) => {
                warn!("dropping unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T, stamp: DateTime<Utc>) {
        let value = match to_string(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("can't serialize cache entry {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.save(key, &Entry { value, stamp }) {
            warn!("cache write failed for {}: {}", key, e);
        }
    }

    /// Fresh cached value, or the result of `compute`. Only `Some` results
    /// are stored.
    pub fn cached<T, F>(&self, key: &str, compute: F) -> Option<T>
        where T: Serialize + DeserializeOwned, F: FnOnce() -> Option<T> {
        if let Some((value, true)) = self.get(key) {
            debug!("cache hit: {}", key);
            return Some(value);
        }
        let value = compute()?;
        self.put(key, &value, Utc::now());
        Some(value)
    }

    pub fn clear(&self) -> Result<(), Error> {
        self.store.purge()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn cache() -> Cache {
        Cache::in_memory(Duration::seconds(3600))
    }

    #[test]
    fn entries_expire_after_ttl() {
        let c = cache();
        let then = Utc::now();
        c.put("members/1", &vec!["alice"], then);

        let fresh: Option<(Vec<String>, bool)> = c.get_at("members/1", then + Duration::seconds(3599));
        assert_eq!(fresh, Some((vec![String::from("alice")], true)));

        let stale: Option<(Vec<String>, bool)> = c.get_at("members/1", then + Duration::seconds(3600));
        assert_eq!(stale, Some((vec![String::from("alice")], false)));
    }

    #[test]
    fn missing_key() {
        let c = cache();
        let v: Option<(u32, bool)> = c.get("nothing");
        assert_eq!(v, None);
    }

    #[test]
    fn computes_once_within_window() {
        let c = cache();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Some(vec![1, 2, 3])
        };
        assert_eq!(c.cached("k", compute), Some(vec![1, 2, 3]));
        assert_eq!(c.cached("k", compute), Some(vec![1, 2, 3]));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn stale_entries_are_recomputed() {
        let c = cache();
        c.put("k", &1u32, Utc::now() - Duration::hours(2));
        assert_eq!(c.cached("k", || Some(2u32)), Some(2));
        let v: Option<(u32, bool)> = c.get("k");
        assert_eq!(v, Some((2, true)));
    }

    #[test]
    fn failures_are_not_cached() {
        let c = cache();
        assert_eq!(c.cached::<u32, _>("k", || None), None);
        let v: Option<(u32, bool)> = c.get("k");
        assert_eq!(v, None);
    }

    #[test]
    fn clear_drops_everything() {
        let c = cache();
        c.put("a", &1u32, Utc::now());
        c.clear().unwrap();
        let v: Option<(u32, bool)> = c.get("a");
        assert_eq!(v, None);
    }
}
