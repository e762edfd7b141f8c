use std::{borrow::Borrow, hash::Hash};

use rustc_hash::FxHashMap;

/// A one to one map, looked up from either side.
#[derive(Debug, Clone)]
pub struct BiMap<K, V>
where
    K: Copy + Hash + Eq,
    V: Copy + Hash + Eq,
{
    map: FxHashMap<K, V>,
    rev: FxHashMap<V, K>,
}

impl<K, V> Default for BiMap<K, V>
where
    K: Copy + Hash + Eq,
    V: Copy + Hash + Eq,
{
    fn default() -> Self {
        Self {
            map: FxHashMap::default(),
            rev: FxHashMap::default(),
        }
    }
}

impl<K, V> BiMap<K, V>
where
    K: Copy + Hash + Eq,
    V: Copy + Hash + Eq,
{
    pub fn new() -> Self { Self::default() }

    /// Insert a pair, dropping any pair either side was part of.
    pub fn insert(&mut self, k: K, v: V) {
        if let Some(old_v) = self.map.remove(&k) {
            self.rev.remove(&old_v);
        }
        if let Some(old_k) = self.rev.remove(&v) {
            self.map.remove(&old_k);
        }
        self.map.insert(k, v);
        self.rev.insert(v, k);
    }

    pub fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(k)
    }

    pub fn get_rev<Q>(&self, v: &Q) -> Option<&K>
    where
        V: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.rev.get(v)
    }

    pub fn len(&self) -> usize { self.map.len() }

    pub fn is_empty(&self) -> bool { self.map.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ { self.map.iter() }
}
