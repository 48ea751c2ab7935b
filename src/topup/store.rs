//! Keyed per-user store.
//!
//! Every piece of top-up state is keyed by user id. The engine and the three
//! stores only see [`UserStore`]; [`MemoryStore`] is the process-lifetime
//! implementation backed by a `DashMap`. A durable backend only has to
//! honour the same per-key atomicity.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

pub trait UserStore<V>: Send + Sync {
    fn get(&self, user_id: &str) -> Option<V>;

    fn contains(&self, user_id: &str) -> bool;

    /// Insert unless an entry exists. Returns false (and drops `value`) on conflict.
    fn insert_if_absent(&self, user_id: &str, value: V) -> bool;

    /// Atomically compute the next value from the current one.
    ///
    /// Returning `None` from `f` leaves the entry untouched.
    fn update(&self, user_id: &str, f: &mut dyn FnMut(Option<&V>) -> Option<V>) -> Option<V>;

    fn remove(&self, user_id: &str) -> Option<V>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct MemoryStore<V> {
    map: DashMap<String, V>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> UserStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, user_id: &str) -> Option<V> {
        self.map.get(user_id).map(|entry| entry.value().clone())
    }

    fn contains(&self, user_id: &str) -> bool {
        self.map.contains_key(user_id)
    }

    fn insert_if_absent(&self, user_id: &str, value: V) -> bool {
        match self.map.entry(user_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    fn update(&self, user_id: &str, f: &mut dyn FnMut(Option<&V>) -> Option<V>) -> Option<V> {
        match self.map.entry(user_id.to_string()) {
            Entry::Occupied(mut slot) => {
                let next = f(Some(slot.get()))?;
                slot.insert(next.clone());
                Some(next)
            }
            Entry::Vacant(slot) => {
                let next = f(None)?;
                slot.insert(next.clone());
                Some(next)
            }
        }
    }

    fn remove(&self, user_id: &str) -> Option<V> {
        self.map.remove(user_id).map(|(_, value)| value)
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
