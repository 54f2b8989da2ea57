//! Sparse, indexed storage for results produced out of order.
//!
//! Parallel producers partition the index space disjointly and publish
//! whenever a block completes, so results arrive in arbitrary index order.
//! [`ResultStore`] accepts them as they come and tracks two counts:
//!
//! - `total_count()` — everything inserted so far, gaps or not.
//! - `contiguous_count()` — the length of the maximal gap-free prefix
//!   `[0..k)`, which is the portion safe to iterate in order.
//!
//! The store never blocks; waiting for an index to become available is the
//! future's job. It is not internally synchronized — the owning future
//! mutates it under its own lock.

use std::collections::HashMap;

use crate::error::{FutureError, Result};

/// Indexed, possibly-sparse collection of results.
#[derive(Debug)]
pub struct ResultStore<T> {
    slots: HashMap<usize, T>,
    /// Length of the gap-free prefix `[0..contiguous)`.
    contiguous: usize,
}

impl<T> ResultStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            contiguous: 0,
        }
    }

    /// Insert a single result at `index`.
    ///
    /// Fails with [`FutureError::DuplicateIndex`] if the slot is already
    /// populated, leaving the store unchanged. Duplicate indices indicate a
    /// bug in the producing kernel, not a normal race.
    pub fn insert(&mut self, index: usize, value: T) -> Result<()> {
        if self.slots.contains_key(&index) {
            return Err(FutureError::DuplicateIndex { index });
        }
        self.slots.insert(index, value);
        self.advance_contiguous();
        Ok(())
    }

    /// Insert a contiguous run of results starting at `begin`.
    ///
    /// All-or-nothing: every target slot is checked before any write, so a
    /// duplicate anywhere in the run leaves the store unchanged.
    pub fn insert_batch(&mut self, begin: usize, values: Vec<T>) -> Result<()> {
        for offset in 0..values.len() {
            let index = begin + offset;
            if self.slots.contains_key(&index) {
                return Err(FutureError::DuplicateIndex { index });
            }
        }
        for (offset, value) in values.into_iter().enumerate() {
            self.slots.insert(begin + offset, value);
        }
        self.advance_contiguous();
        Ok(())
    }

    /// Point lookup. Returns `None` when the result has not arrived yet.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(&index)
    }

    /// Whether `index` is populated.
    pub fn contains(&self, index: usize) -> bool {
        self.slots.contains_key(&index)
    }

    /// Length of the maximal gap-free prefix `[0..k)`.
    ///
    /// Maintained incrementally on insertion: only inserts that fill the gap
    /// immediately past the current boundary trigger a scan, so the cost is
    /// O(1) amortized over any insertion order.
    pub fn contiguous_count(&self) -> usize {
        self.contiguous
    }

    /// Total number of results inserted, regardless of contiguity.
    pub fn total_count(&self) -> usize {
        self.slots.len()
    }

    fn advance_contiguous(&mut self) {
        while self.slots.contains_key(&self.contiguous) {
            self.contiguous += 1;
        }
    }
}

impl<T> Default for ResultStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_insertion() {
        let mut store = ResultStore::new();
        for i in 0..5 {
            store.insert(i, i * 10).unwrap();
            assert_eq!(store.contiguous_count(), i + 1);
        }
        assert_eq!(store.total_count(), 5);
        assert_eq!(store.get(3), Some(&30));
    }

    #[test]
    fn test_out_of_order_insertion() {
        let mut store = ResultStore::new();
        store.insert(2, "c").unwrap();
        store.insert(4, "e").unwrap();
        assert_eq!(store.contiguous_count(), 0);
        assert_eq!(store.total_count(), 2);

        store.insert(0, "a").unwrap();
        assert_eq!(store.contiguous_count(), 1);

        // Filling index 1 closes the gap through index 2.
        store.insert(1, "b").unwrap();
        assert_eq!(store.contiguous_count(), 3);

        store.insert(3, "d").unwrap();
        assert_eq!(store.contiguous_count(), 5);
        assert_eq!(store.total_count(), 5);
    }

    #[test]
    fn test_contiguous_prefix_for_every_permutation() {
        // Exhaustive over all insertion orders of 5 indices: the prefix must
        // only depend on which slots are filled, never on arrival order.
        let indices = [0usize, 1, 2, 3, 4];
        permute(&indices, &mut Vec::new(), &mut |order| {
            let mut store = ResultStore::new();
            for (step, &i) in order.iter().enumerate() {
                store.insert(i, ()).unwrap();
                let filled: Vec<usize> = order[..=step].to_vec();
                let expected = (0..).take_while(|k| filled.contains(k)).count();
                assert_eq!(store.contiguous_count(), expected);
            }
            assert_eq!(store.contiguous_count(), 5);
        });
    }

    fn permute(rest: &[usize], chosen: &mut Vec<usize>, visit: &mut impl FnMut(&[usize])) {
        if rest.is_empty() {
            visit(chosen);
            return;
        }
        for (i, &x) in rest.iter().enumerate() {
            let mut remaining = rest.to_vec();
            remaining.remove(i);
            chosen.push(x);
            permute(&remaining, chosen, visit);
            chosen.pop();
        }
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut store = ResultStore::new();
        store.insert(1, 10).unwrap();
        let err = store.insert(1, 99).unwrap_err();
        assert_eq!(err, FutureError::DuplicateIndex { index: 1 });
        assert_eq!(store.get(1), Some(&10));
        assert_eq!(store.total_count(), 1);
    }

    #[test]
    fn test_batch_insert() {
        let mut store = ResultStore::new();
        store.insert_batch(3, vec![30, 40, 50]).unwrap();
        assert_eq!(store.contiguous_count(), 0);
        store.insert_batch(0, vec![0, 10, 20]).unwrap();
        assert_eq!(store.contiguous_count(), 6);
        assert_eq!(store.get(4), Some(&40));
    }

    #[test]
    fn test_batch_insert_duplicate_is_atomic() {
        let mut store = ResultStore::new();
        store.insert(4, 40).unwrap();
        // Batch overlaps index 4 at its tail: nothing from the batch lands.
        let err = store.insert_batch(2, vec![20, 30, 99]).unwrap_err();
        assert_eq!(err, FutureError::DuplicateIndex { index: 4 });
        assert!(!store.contains(2));
        assert!(!store.contains(3));
        assert_eq!(store.get(4), Some(&40));
        assert_eq!(store.total_count(), 1);
    }
}
