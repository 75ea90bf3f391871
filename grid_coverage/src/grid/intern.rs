//! Bounded canonicalizing pool.
//!
//! Structurally equal values are shared through one `Arc`. The pool only
//! saves memory and speeds up equality checks between shared instances;
//! nothing relies on two equal values being the same allocation.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

/// Pool holding at most `capacity` canonical values, evicting the oldest first.
#[derive(Debug)]
pub(crate) struct Interner<T> {
    capacity: usize,
    entries: HashSet<Arc<T>>,
    order: VecDeque<Arc<T>>,
}

impl<T: Hash + Eq> Interner<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Returns the canonical instance equal to `value`, registering `value`
    /// when none exists yet.
    pub(crate) fn intern(&mut self, value: T) -> Arc<T> {
        if let Some(existing) = self.entries.get(&value) {
            return Arc::clone(existing);
        }
        let shared = Arc::new(value);
        if self.capacity == 0 {
            return shared;
        }
        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(old) => {
                    self.entries.remove(&*old);
                    log::debug!("evicted canonical entry, pool capacity {}", self.capacity);
                }
                None => break,
            }
        }
        self.entries.insert(Arc::clone(&shared));
        self.order.push_back(Arc::clone(&shared));
        shared
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_share_allocation() {
        let mut pool = Interner::new(4);
        let a = pool.intern(vec![1, 2, 3]);
        let b = pool.intern(vec![1, 2, 3]);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn oldest_entry_is_evicted() {
        let mut pool = Interner::new(2);
        let first = pool.intern(1);
        pool.intern(2);
        pool.intern(3);
        assert_eq!(pool.len(), 2);
        let again = pool.intern(1);
        assert!(!Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn zero_capacity_never_stores() {
        let mut pool = Interner::new(0);
        pool.intern("a");
        assert!(pool.is_empty());
    }
}
