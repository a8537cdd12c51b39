//! Timestamped per-keyword cache shared between a background listener
//! (writer) and the foreground caller (reader).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, saturating at the `i64` range.
pub fn unix_millis(at: SystemTime) -> i64 {
    match at.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(err) => i64::try_from(err.duration().as_millis())
            .map(|ms| -ms)
            .unwrap_or(i64::MIN),
    }
}

/// Latest payload for one keyword plus its freshness timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub payload: String,
    pub received_at: SystemTime,
    /// `None` means the entry was never checked.
    pub last_checked_at: Option<SystemTime>,
}

impl CachedEntry {
    pub fn new(payload: String, received_at: SystemTime) -> Self {
        Self {
            payload,
            received_at,
            last_checked_at: None,
        }
    }

    /// Received after the last check (or never checked).
    pub fn is_fresh(&self) -> bool {
        match self.last_checked_at {
            None => true,
            Some(checked) => self.received_at > checked,
        }
    }

    fn mark_checked(&mut self, now: SystemTime) {
        let mut checked = now.max(self.received_at);
        if let Some(prev) = self.last_checked_at {
            checked = checked.max(prev);
        }
        self.last_checked_at = Some(checked);
    }
}

/// Mutex-guarded keyword → [`CachedEntry`] map.
#[derive(Debug, Default)]
pub struct UpdateCache {
    entries: Mutex<HashMap<String, CachedEntry>>,
}

impl UpdateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a freshly received payload. `received_at` never moves backwards
    /// for a keyword, and the entry reads as never checked.
    pub fn store(&self, keyword: &str, payload: String) {
        let now = SystemTime::now();
        let mut entries = self.lock();
        let received_at = match entries.get(keyword) {
            Some(prev) => now.max(prev.received_at),
            None => now,
        };
        entries.insert(keyword.to_string(), CachedEntry::new(payload, received_at));
    }

    /// Test and consume freshness in one step.
    pub fn take_fresh(&self, keyword: &str) -> bool {
        let mut entries = self.lock();
        match entries.get_mut(keyword) {
            Some(entry) => {
                let fresh = entry.is_fresh();
                entry.mark_checked(SystemTime::now());
                fresh
            }
            None => false,
        }
    }

    /// Fresh payload, if any, consuming the freshness under the same lock.
    pub fn take_fresh_payload(&self, keyword: &str) -> Option<String> {
        let mut entries = self.lock();
        let entry = entries.get_mut(keyword)?;
        let fresh = entry.is_fresh();
        entry.mark_checked(SystemTime::now());
        fresh.then(|| entry.payload.clone())
    }

    /// Last payload for `keyword`, or an empty string.
    pub fn payload(&self, keyword: &str) -> String {
        self.lock()
            .get(keyword)
            .map(|entry| entry.payload.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the entry for `keyword`.
    pub fn entry(&self, keyword: &str) -> Option<CachedEntry> {
        self.lock().get(keyword).cloned()
    }

    pub fn remove(&self, keyword: &str) {
        self.lock().remove(keyword);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn freshness_is_consumed_once() {
        let cache = UpdateCache::new();
        cache.store("STATE", "s1".to_string());

        assert!(cache.take_fresh("STATE"));
        assert!(!cache.take_fresh("STATE"));
        assert_eq!(cache.payload("STATE"), "s1");
    }

    #[test]
    fn new_store_is_fresh_again() {
        let cache = UpdateCache::new();
        cache.store("STATE", "s1".to_string());
        assert!(cache.take_fresh("STATE"));

        cache.store("STATE", "s2".to_string());
        assert_eq!(cache.take_fresh_payload("STATE"), Some("s2".to_string()));
        assert_eq!(cache.take_fresh_payload("STATE"), None);
    }

    #[test]
    fn unknown_keyword_is_stale_and_empty() {
        let cache = UpdateCache::new();
        assert!(!cache.take_fresh("PLAN"));
        assert_eq!(cache.payload("PLAN"), "");
    }

    #[test]
    fn timestamps_never_move_backwards() {
        let cache = UpdateCache::new();
        cache.store("PLAN", "p1".to_string());
        let first = cache.entry("PLAN").unwrap();
        assert!(first.last_checked_at.is_none());

        cache.take_fresh("PLAN");
        let checked = cache.entry("PLAN").unwrap().last_checked_at.unwrap();
        assert!(checked >= first.received_at);
        assert!(checked <= SystemTime::now());

        std::thread::sleep(Duration::from_millis(2));
        cache.store("PLAN", "p2".to_string());
        assert!(cache.entry("PLAN").unwrap().received_at >= first.received_at);
    }

    #[test]
    fn concurrent_writer_and_checker() {
        let cache = Arc::new(UpdateCache::new());
        let writer = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..200 {
                    cache.store("STRING", format!("msg-{i}"));
                }
            })
        };

        let mut seen = 0usize;
        for _ in 0..200 {
            if cache.take_fresh("STRING") {
                seen += 1;
            }
        }
        writer.join().unwrap();
        if cache.take_fresh("STRING") {
            seen += 1;
        }

        assert!(seen >= 1);
        assert_eq!(cache.payload("STRING"), "msg-199");
    }

    #[test]
    fn unix_millis_of_epoch_is_zero() {
        assert_eq!(unix_millis(UNIX_EPOCH), 0);
        assert_eq!(unix_millis(UNIX_EPOCH + Duration::from_millis(1500)), 1500);
    }
}
