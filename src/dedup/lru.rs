//! Bounded set with least-recently-touched eviction.

use std::collections::{BTreeMap, HashMap};

/// A set of strings that never grows past `capacity`.
///
/// Touching a key moves it to the most-recent position. Inserting a new key
/// into a full set evicts the least-recently-touched one.
#[derive(Debug, Clone)]
pub struct BoundedLruSet {
    capacity: usize,
    /// key -> recency stamp
    stamps: HashMap<String, u64>,
    /// recency stamp -> key, oldest first
    order: BTreeMap<u64, String>,
    next_stamp: u64,
}

impl BoundedLruSet {
    /// Capacity is floored at 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            stamps: HashMap::new(),
            order: BTreeMap::new(),
            next_stamp: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.stamps.contains_key(key)
    }

    /// Insert or refresh `key`. Returns true if it was already present.
    pub fn touch(&mut self, key: &str) -> bool {
        let stamp = self.next_stamp;
        self.next_stamp += 1;

        if let Some(old) = self.stamps.insert(key.to_string(), stamp) {
            self.order.remove(&old);
            self.order.insert(stamp, key.to_string());
            return true;
        }

        self.order.insert(stamp, key.to_string());
        while self.stamps.len() > self.capacity {
            match self.order.pop_first() {
                Some((_, evicted)) => {
                    self.stamps.remove(&evicted);
                }
                None => break,
            }
        }
        false
    }

    /// Remove `key`. Returns true if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.stamps.remove(key) {
            Some(stamp) => {
                self.order.remove(&stamp);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_reports_presence() {
        let mut set = BoundedLruSet::new(3);
        assert!(!set.touch("a"));
        assert!(set.touch("a"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let mut set = BoundedLruSet::new(3);
        for i in 0..50 {
            set.touch(&format!("k{i}"));
            assert!(set.len() <= 3);
        }
        assert!(set.contains("k49"));
        assert!(!set.contains("k46"));
    }

    #[test]
    fn test_touch_refreshes_recency() {
        let mut set = BoundedLruSet::new(2);
        set.touch("a");
        set.touch("b");
        set.touch("a"); // a is now newest
        set.touch("c"); // evicts b
        assert!(set.contains("a"));
        assert!(!set.contains("b"));
        assert!(set.contains("c"));
    }

    #[test]
    fn test_remove() {
        let mut set = BoundedLruSet::new(2);
        set.touch("a");
        assert!(set.remove("a"));
        assert!(!set.remove("a"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_zero_capacity_floors_to_one() {
        let mut set = BoundedLruSet::new(0);
        set.touch("a");
        set.touch("b");
        assert_eq!(set.capacity(), 1);
        assert_eq!(set.len(), 1);
        assert!(set.contains("b"));
    }
}
