//! Counted set with a map of occurrence counts and an ordered key sequence
//! that doubles as a min-heap for eviction and as a stable ranking.

use std::borrow::Borrow;
use std::hash::Hash;

use ahash::AHashMap;

#[derive(Debug, Clone)]
pub struct FrequencySet<K = String> {
    counts: AHashMap<K, usize>,
    keys: Vec<K>,
}

impl<K: Eq + Hash + Clone> Default for FrequencySet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> FrequencySet<K> {
    pub fn new() -> Self {
        Self {
            counts: AHashMap::new(),
            keys: Vec::new(),
        }
    }

    /// Inserts `key` with a count of one, or increments its count.
    pub fn add(&mut self, key: K) {
        self.add_occurrences(key, 1);
    }

    fn add_occurrences(&mut self, key: K, occurrences: usize) {
        match self.counts.get_mut(&key) {
            Some(count) => *count += occurrences,
            None => {
                self.keys.push(key.clone());
                self.counts.insert(key, occurrences);
            }
        }
    }

    /// Removes `key`, returning whether it was present.
    ///
    /// Linear in the size of the set since the ordered sequence is searched.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.counts.remove(key).is_none() {
            return false;
        }
        if let Some(position) = self.keys.iter().position(|k| <K as Borrow<Q>>::borrow(k) == key) {
            self.keys.remove(position);
        }
        true
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.counts.contains_key(key)
    }

    /// Occurrence count of `key`, zero when absent.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in the current order of the ordered sequence.
    pub fn values(&self) -> &[K] {
        &self.keys
    }

    /// `(key, count)` pairs in the current order of the ordered sequence.
    pub fn iter(&self) -> impl Iterator<Item = (&K, usize)> + '_ {
        self.keys.iter().map(|key| (key, self.count(key)))
    }

    /// A new set holding the keys of both operands; counts of shared keys add up.
    pub fn union(&self, other: &Self) -> Self {
        let mut union = self.clone();
        union.merge(other);
        union
    }

    /// In-place [`union`](Self::union).
    pub fn merge(&mut self, other: &Self) {
        for (key, occurrences) in other.iter() {
            self.add_occurrences(key.clone(), occurrences);
        }
    }

    /// Keys present in both sets, each with a count of one.
    pub fn intersect(&self, other: &Self) -> Self {
        other
            .keys
            .iter()
            .filter(|key| self.contains(*key))
            .cloned()
            .collect()
    }

    pub fn is_superset_of(&self, other: &Self) -> bool {
        other.keys.iter().all(|key| self.contains(key))
    }

    /// Same key set, counts ignored.
    pub fn set_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.is_superset_of(other)
    }

    fn less(&self, i: usize, j: usize) -> bool {
        self.count(&self.keys[i]) < self.count(&self.keys[j])
    }

    fn sift_down(&mut self, mut i: usize, n: usize) {
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let mut smallest = left;
            let right = left + 1;
            if right < n && self.less(right, left) {
                smallest = right;
            }
            if !self.less(smallest, i) {
                break;
            }
            self.keys.swap(i, smallest);
            i = smallest;
        }
    }

    /// Rearranges the ordered sequence into a min-heap on counts.
    pub fn heapify(&mut self) {
        let n = self.keys.len();
        for i in (0..n / 2).rev() {
            self.sift_down(i, n);
        }
    }

    /// Removes and returns the least frequent key.
    ///
    /// The sequence must already be heap-shaped (see [`heapify`](Self::heapify));
    /// the heap shape is restored before returning.
    pub fn pop_min(&mut self) -> Option<K> {
        let last = self.keys.len().checked_sub(1)?;
        self.keys.swap(0, last);
        self.sift_down(0, last);
        let key = self.keys.pop()?;
        self.counts.remove(&key);
        Some(key)
    }

    /// Evicts least frequent keys until at most `cap` remain. Returns the
    /// number of evicted keys.
    pub fn trim_to(&mut self, cap: usize) -> usize {
        if self.keys.len() <= cap {
            return 0;
        }
        self.heapify();
        let mut evicted = 0;
        while self.keys.len() > cap && self.pop_min().is_some() {
            evicted += 1;
        }
        evicted
    }

    /// Stably sorts the ordered sequence ascending by count.
    pub fn rank(&mut self) {
        let Self { counts, keys } = self;
        keys.sort_by_key(|key| counts.get(key).copied().unwrap_or(0));
    }

    /// Last key of the ordered sequence, i.e. the most frequent one once
    /// [`rank`](Self::rank) has been applied. `None` on an empty set.
    pub fn max_occurring(&self) -> Option<&K> {
        self.keys.last()
    }
}

impl<K: Eq + Hash + Clone> FromIterator<K> for FrequencySet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<K: Eq + Hash + Clone> Extend<K> for FrequencySet<K> {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        for key in iter {
            self.add(key);
        }
    }
}
