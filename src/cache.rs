use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Slot<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Slot<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Concurrent key/value store with per-entry sliding expiration.
///
/// Every read or write of a live entry pushes its deadline `ttl` into the
/// future. Check-and-set runs under the key's shard lock only. Expired
/// entries are dropped when touched and swept on every insert.
pub struct ExpiringStore<K, V> {
    ttl: Duration,
    entries: DashMap<K, Slot<V>>,
}

impl<K, V> ExpiringStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    fn slot(&self, value: V, now: Instant) -> Slot<V> {
        Slot {
            value,
            expires_at: now + self.ttl,
        }
    }

    /// Must not be called while holding a reference into the map.
    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, slot| !slot.is_expired(now));
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        {
            let mut slot = self.entries.get_mut(key)?;
            if !slot.is_expired(now) {
                slot.expires_at = now + self.ttl;
                return Some(slot.value.clone());
            }
        }
        self.entries.remove_if(key, |_, slot| slot.is_expired(now));
        None
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&self, key: K, value: V) {
        self.purge_expired();
        let slot = self.slot(value, Instant::now());
        self.entries.insert(key, slot);
    }

    /// Inserts only when no live entry exists. Returns `true` if inserted.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        self.purge_expired();
        let now = Instant::now();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now) {
                    return false;
                }
                occupied.insert(self.slot(value, now));
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.slot(value, now));
                true
            }
        }
    }

    /// Atomically replaces the value with `f(previous)` and returns the new value.
    pub fn update<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce(Option<&V>) -> V,
    {
        self.purge_expired();
        let now = Instant::now();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.get();
                let value = f((!previous.is_expired(now)).then_some(&previous.value));
                occupied.insert(self.slot(value.clone(), now));
                value
            }
            Entry::Vacant(vacant) => {
                let value = f(None);
                vacant.insert(self.slot(value.clone(), now));
                value
            }
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.entries
            .remove(key)
            .filter(|(_, slot)| !slot.is_expired(now))
            .map(|(_, slot)| slot.value)
    }

    pub fn len(&self) -> usize {
        self.purge_expired();
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
