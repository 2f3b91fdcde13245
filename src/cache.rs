use std::time::{Duration, Instant};

/// Time source for [`TtlCache`]; swapped out in tests.
pub trait Clock: Send {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Entry<K, V> {
    key: K,
    value: V,
    expires_at: Instant,
}

/// Single-slot cache: holds the most recently stored entry until it expires.
///
/// A lookup with a different key misses, and the next insert replaces the slot.
pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Box<dyn Clock>,
    slot: Option<Entry<K, V>>,
}

impl<K: PartialEq, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Box::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Box<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            slot: None,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.slot.as_ref()?;
        if entry.key == *key && self.clock.now() < entry.expires_at {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        let expires_at = self.clock.now() + self.ttl;
        self.slot = Some(Entry {
            key,
            value,
            expires_at,
        });
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    /// Returns the cached value (and `true`) or computes, stores and returns a
    /// fresh one (and `false`). A failed computation leaves the slot untouched.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<(V, bool), E> {
        if let Some(v) = self.get(&key) {
            return Ok((v, true));
        }
        let value = compute()?;
        self.insert(key, value.clone());
        Ok((value, false))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Manually advanced clock shared between a test and the cache it drives.
    #[derive(Clone)]
    pub(crate) struct ManualClock(Arc<Mutex<Instant>>);

    impl ManualClock {
        pub(crate) fn new() -> Self {
            ManualClock(Arc::new(Mutex::new(Instant::now())))
        }

        pub(crate) fn advance(&self, by: Duration) {
            let mut now = self.0.lock().expect("clock lock");
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock().expect("clock lock")
        }
    }

    #[test]
    fn entry_expires_after_ttl() {
        let clock = ManualClock::new();
        let mut cache = TtlCache::with_clock(Duration::from_secs(60), Box::new(clock.clone()));
        cache.insert("ws", 1);

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get(&"ws"), Some(1));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&"ws"), None);
    }

    #[test]
    fn holds_only_the_latest_entry() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        cache.clear();
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn get_or_try_insert_with_computes_once_per_window() {
        let clock = ManualClock::new();
        let mut cache = TtlCache::with_clock(Duration::from_secs(60), Box::new(clock.clone()));
        let mut calls = 0;

        let (v, cached) = cache
            .get_or_try_insert_with("ws", || -> Result<i32, ()> {
                calls += 1;
                Ok(10)
            })
            .expect("first");
        assert_eq!((v, cached), (10, false));

        let (v, cached) = cache
            .get_or_try_insert_with("ws", || -> Result<i32, ()> {
                calls += 1;
                Ok(20)
            })
            .expect("second");
        assert_eq!((v, cached), (10, true));
        assert_eq!(calls, 1);

        clock.advance(Duration::from_secs(61));
        let failed = cache.get_or_try_insert_with("ws", || -> Result<i32, &str> { Err("db down") });
        assert_eq!(failed, Err("db down"));
        assert_eq!(cache.get(&"ws"), None);
    }
}
