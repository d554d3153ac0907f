//! In-process [`SharedStore`] backed by a concurrent map.
//!
//! Suitable for a single replica and for tests.  Multi-replica deployments
//! plug an external store in behind the same trait.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use nexa_kernel::StoreError;
use nexa_kernel::gateway::{Increment, SharedStore};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
enum Slot {
    Bytes(Vec<u8>),
    Counter(u64),
}

#[derive(Debug, Clone)]
struct StoredValue {
    slot: Slot,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Key-value store with per-entry expiry.
///
/// Expired entries read as absent immediately; their memory is reclaimed by
/// [`purge_expired`](Self::purge_expired), which the server calls from a
/// background task.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<String, StoredValue>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries.  Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, v| v.is_live(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "purged expired store entries");
        }
        removed
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| match &v.slot {
                Slot::Bytes(b) => b.clone(),
                Slot::Counter(n) => n.to_string().into_bytes(),
            }))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                slot: Slot::Bytes(value),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn incr_within(
        &self,
        key: &str,
        ceiling: Option<u64>,
        ttl: Duration,
    ) -> Result<Increment, StoreError> {
        let now = Instant::now();
        // The entry guard holds the shard lock for the whole read-compare-write.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let value = occupied.get_mut();
                let current = match value.slot {
                    Slot::Counter(n) => n,
                    Slot::Bytes(_) => {
                        return Err(StoreError::Malformed(format!("'{key}' is not a counter")));
                    }
                };
                if ceiling.is_some_and(|c| current >= c) {
                    return Ok(Increment {
                        admitted: false,
                        count: current,
                    });
                }
                let count = current.saturating_add(1);
                value.slot = Slot::Counter(count);
                Ok(Increment {
                    admitted: true,
                    count,
                })
            }
            Entry::Occupied(mut expired) => Ok(start_counter(expired.get_mut(), ceiling, ttl, now)),
            Entry::Vacant(vacant) => {
                let mut fresh = StoredValue {
                    slot: Slot::Counter(0),
                    expires_at: now + ttl,
                };
                let outcome = start_counter(&mut fresh, ceiling, ttl, now);
                vacant.insert(fresh);
                Ok(outcome)
            }
        }
    }

    async fn counter(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        match self.entries.get(key).filter(|v| v.is_live(now)) {
            None => Ok(0),
            Some(v) => match v.slot {
                Slot::Counter(n) => Ok(n),
                Slot::Bytes(_) => Err(StoreError::Malformed(format!("'{key}' is not a counter"))),
            },
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

fn start_counter(value: &mut StoredValue, ceiling: Option<u64>, ttl: Duration, now: Instant) -> Increment {
    let admitted = ceiling.is_none_or(|c| c > 0);
    let count = u64::from(admitted);
    value.slot = Slot::Counter(count);
    value.expires_at = now + ttl;
    Increment { admitted, count }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A store whose every call fails as if the backend were unreachable.
    pub(crate) struct DownStore;

    fn down() -> StoreError {
        StoreError::Unavailable("connection refused".into())
    }

    #[async_trait]
    impl SharedStore for DownStore {
        async fn get(&self, _: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Err(down())
        }
        async fn set_with_ttl(&self, _: &str, _: Vec<u8>, _: Duration) -> Result<(), StoreError> {
            Err(down())
        }
        async fn incr_within(
            &self,
            _: &str,
            _: Option<u64>,
            _: Duration,
        ) -> Result<Increment, StoreError> {
            Err(down())
        }
        async fn counter(&self, _: &str) -> Result<u64, StoreError> {
            Err(down())
        }
        async fn delete(&self, _: &str) -> Result<(), StoreError> {
            Err(down())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn set_get_delete() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set_with_ttl("k", b"v".to_vec(), TTL).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_and_are_purged() {
        let store = InMemoryStore::new();
        store.set_with_ttl("k", b"v".to_vec(), Duration::from_secs(5)).await.unwrap();
        store.incr_within("c", None, Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.counter("c").await.unwrap(), 0);
        assert_eq!(store.len(), 2);

        assert_eq!(store.purge_expired(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn incr_stops_at_ceiling() {
        let store = InMemoryStore::new();
        for expected in 1..=3 {
            let inc = store.incr_within("q", Some(3), TTL).await.unwrap();
            assert_eq!(inc, Increment { admitted: true, count: expected });
        }
        let denied = store.incr_within("q", Some(3), TTL).await.unwrap();
        assert_eq!(denied, Increment { admitted: false, count: 3 });
        assert_eq!(store.counter("q").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn zero_ceiling_admits_nothing() {
        let store = InMemoryStore::new();
        let inc = store.incr_within("q", Some(0), TTL).await.unwrap();
        assert!(!inc.admitted);
        assert_eq!(inc.count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_counter_restarts() {
        let store = InMemoryStore::new();
        store.incr_within("q", Some(1), Duration::from_secs(1)).await.unwrap();
        assert!(!store.incr_within("q", Some(1), Duration::from_secs(1)).await.unwrap().admitted);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.incr_within("q", Some(1), Duration::from_secs(1)).await.unwrap().admitted);
    }

    #[tokio::test]
    async fn bytes_are_not_counters() {
        let store = InMemoryStore::new();
        store.set_with_ttl("k", b"v".to_vec(), TTL).await.unwrap();
        assert!(matches!(
            store.incr_within("k", None, TTL).await,
            Err(StoreError::Malformed(_))
        ));
        assert!(store.counter("k").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_never_pass_ceiling() {
        let store = Arc::new(InMemoryStore::new());
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.incr_within("q", Some(10), TTL).await.unwrap() })
            })
            .collect();

        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap().admitted {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
        assert_eq!(store.counter("q").await.unwrap(), 10);
    }
}
