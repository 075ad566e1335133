//! Self-sizing neighbor lists.
//!
//! A [`NeighborList`] tracks the nearest known peers in one ring direction as
//! an ascending list of *distances* from the local base address. The list
//! sizes itself: from the span covered by its farthest entry and the number
//! of entries inside that span it extrapolates the total ring population and
//! keeps `bit_length(estimate)` entries: roughly `log2(N)` neighbors, the
//! fault-tolerance margin Chord assumes, derived purely from locally observed
//! peer density.
//!
//! The estimate is `count * 2^64 / farthest_distance`, computed exactly in
//! `u128`. The formula is deliberately preserved as-is; neighbor-list size
//! interacts with fault-tolerance assumptions elsewhere in the system.
//!
//! A predecessor list is the same structure fed with distances reflected
//! through zero ([`crate::address::Distance::reflect`]).

use crate::address::Distance;
use crate::RING_BITS;

/// Capacity for a list of `count` entries whose farthest entry covers
/// `farthest`: `bit_length(count * 2^64 / farthest)`.
fn capacity_for(count: usize, farthest: Distance) -> usize {
    debug_assert!(!farthest.is_zero());
    let estimate = ((count as u128) << RING_BITS) / u128::from(farthest.0);
    (128 - estimate.leading_zeros()) as usize
}

/// An ordered, self-sizing list of known peer distances in one ring
/// direction.
///
/// Entries are distinct, non-zero, and kept in ascending order; the nearest
/// neighbor is the first entry. After every mutation the list is trimmed so
/// that `len() <= current_capacity()` holds.
#[derive(Clone, Debug, Default)]
pub struct NeighborList {
    /// Ascending, distinct distances.
    entries: Vec<Distance>,
}

impl NeighborList {
    /// Create an empty neighbor list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the list tracks no neighbors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of tracked neighbors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The nearest neighbor's distance.
    pub fn nearest(&self) -> Option<Distance> {
        self.entries.first().copied()
    }

    /// The farthest tracked neighbor's distance.
    pub fn farthest(&self) -> Option<Distance> {
        self.entries.last().copied()
    }

    /// The nearest `max_hop` neighbors, ascending.
    pub fn nearest_n(&self, max_hop: usize) -> Vec<Distance> {
        self.entries.iter().take(max_hop).copied().collect()
    }

    /// All tracked distances, ascending.
    pub fn all(&self) -> Vec<Distance> {
        self.entries.clone()
    }

    /// Whether `distance` is currently tracked.
    pub fn contains(&self, distance: Distance) -> bool {
        self.entries.binary_search(&distance).is_ok()
    }

    /// Average distance between tracked neighbors (`farthest / count`), a
    /// local density sample used to estimate network size.
    pub fn average_distance(&self) -> Option<Distance> {
        self.farthest().map(|f| f.divide(self.entries.len() as u64))
    }

    /// The list's current self-sized capacity; 1 when empty.
    pub fn current_capacity(&self) -> usize {
        match self.farthest() {
            None => 1,
            Some(farthest) => capacity_for(self.entries.len(), farthest),
        }
    }

    /// Offer a distance to the list.
    ///
    /// A distance inside the currently covered span is inserted in sorted
    /// position and the tail trimmed back to capacity. A distance that would
    /// extend beyond the farthest entry is admitted only if the capacity
    /// recomputed *as if it were present* accommodates the grown list.
    ///
    /// Returns true iff the distance is tracked afterwards and was not
    /// before. Zero distances (the base itself) are never admitted.
    pub fn add(&mut self, distance: Distance) -> bool {
        if distance.is_zero() {
            return false;
        }
        let pos = match self.entries.binary_search(&distance) {
            Ok(_) => return false,
            Err(pos) => pos,
        };

        if pos == self.entries.len() && !self.entries.is_empty() {
            // Extends beyond the farthest entry: admit only if the widened
            // span still justifies the grown list.
            let grown = self.entries.len() + 1;
            if capacity_for(grown, distance) >= grown {
                self.entries.push(distance);
                return true;
            }
            return false;
        }

        self.entries.insert(pos, distance);
        self.trim();
        self.contains(distance)
    }

    /// Remove a distance. Returns true iff it was tracked. The list is
    /// re-trimmed afterwards since the capacity may have shrunk.
    pub fn remove(&mut self, distance: Distance) -> bool {
        match self.entries.binary_search(&distance) {
            Ok(pos) => {
                self.entries.remove(pos);
                self.trim();
                true
            }
            Err(_) => false,
        }
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Pop farthest entries until the list fits its capacity. The capacity
    /// is recomputed after every pop: dropping the farthest entry shrinks
    /// the sampled span, which can only raise the density estimate, so the
    /// loop terminates.
    fn trim(&mut self) {
        while self.entries.len() > self.current_capacity() {
            self.entries.pop();
        }
    }
}

/// Reference implementation: the same admission and trimming algorithm over
/// an unsorted vector with linear scans. A correctness oracle for
/// differential tests; not used in production.
#[derive(Clone, Debug, Default)]
pub struct ScanNeighborList {
    entries: Vec<Distance>,
}

impl ScanNeighborList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the list tracks no neighbors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of tracked neighbors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The nearest neighbor's distance.
    pub fn nearest(&self) -> Option<Distance> {
        self.entries.iter().min().copied()
    }

    /// The farthest tracked neighbor's distance.
    pub fn farthest(&self) -> Option<Distance> {
        self.entries.iter().max().copied()
    }

    /// The nearest `max_hop` neighbors, ascending.
    pub fn nearest_n(&self, max_hop: usize) -> Vec<Distance> {
        let mut sorted = self.all();
        sorted.truncate(max_hop);
        sorted
    }

    /// All tracked distances, ascending.
    pub fn all(&self) -> Vec<Distance> {
        let mut sorted = self.entries.clone();
        sorted.sort_unstable();
        sorted
    }

    /// Whether `distance` is currently tracked.
    pub fn contains(&self, distance: Distance) -> bool {
        self.entries.contains(&distance)
    }

    /// Average distance between tracked neighbors.
    pub fn average_distance(&self) -> Option<Distance> {
        self.farthest().map(|f| f.divide(self.entries.len() as u64))
    }

    /// The list's current self-sized capacity; 1 when empty.
    pub fn current_capacity(&self) -> usize {
        match self.farthest() {
            None => 1,
            Some(farthest) => capacity_for(self.entries.len(), farthest),
        }
    }

    /// Offer a distance; same decisions as [`NeighborList::add`].
    pub fn add(&mut self, distance: Distance) -> bool {
        if distance.is_zero() || self.contains(distance) {
            return false;
        }
        if self.farthest().is_some_and(|f| distance > f) {
            let grown = self.entries.len() + 1;
            if capacity_for(grown, distance) >= grown {
                self.entries.push(distance);
                return true;
            }
            return false;
        }
        self.entries.push(distance);
        self.trim();
        self.contains(distance)
    }

    /// Remove a distance; same decisions as [`NeighborList::remove`].
    pub fn remove(&mut self, distance: Distance) -> bool {
        match self.entries.iter().position(|d| *d == distance) {
            Some(pos) => {
                self.entries.swap_remove(pos);
                self.trim();
                true
            }
            None => false,
        }
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn trim(&mut self) {
        while self.entries.len() > self.current_capacity() {
            if let Some(pos) = self
                .entries
                .iter()
                .enumerate()
                .max_by_key(|(_, d)| **d)
                .map(|(pos, _)| pos)
            {
                self.entries.swap_remove(pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list() {
        let list = NeighborList::new();
        assert!(list.is_empty());
        assert_eq!(list.nearest(), None);
        assert_eq!(list.farthest(), None);
        assert_eq!(list.average_distance(), None);
        assert_eq!(list.current_capacity(), 1);
    }

    #[test]
    fn test_zero_distance_rejected() {
        let mut list = NeighborList::new();
        assert!(!list.add(Distance::ZERO));
        assert!(list.is_empty());
    }

    #[test]
    fn test_first_entry_always_admitted() {
        // Even a peer covering almost the whole ring is worth tracking
        // when nothing else is known.
        let mut list = NeighborList::new();
        assert!(list.add(Distance(u64::MAX)));
        assert_eq!(list.len(), 1);
        assert_eq!(list.nearest(), Some(Distance(u64::MAX)));
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let mut list = NeighborList::new();
        assert!(list.add(Distance(1000)));
        assert!(!list.add(Distance(1000)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_nearest_entries_survive_trimming() {
        let mut list = NeighborList::new();
        // Sparse ring: a handful of peers near the far side. Capacity stays
        // small, and it is always the farthest entries that get dropped.
        for d in (1..=64u64).map(|i| Distance(i << 57)) {
            list.add(d);
        }
        assert!(list.len() <= list.current_capacity());
        assert_eq!(list.nearest(), Some(Distance(1 << 57)));
        let all = list.all();
        let mut sorted = all.clone();
        sorted.sort_unstable();
        assert_eq!(all, sorted);
    }

    #[test]
    fn test_capacity_bound_after_every_mutation() {
        let mut list = NeighborList::new();
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        for _ in 0..2000 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let d = Distance(state);
            if state % 3 == 0 {
                list.remove(d);
            } else {
                list.add(d);
            }
            assert!(list.len() <= list.current_capacity());
        }
    }

    #[test]
    fn test_dense_sample_grows_capacity() {
        let mut dense = NeighborList::new();
        let mut sparse = NeighborList::new();
        for i in 1..=8u64 {
            dense.add(Distance(i * 100));
            sparse.add(Distance(i << 60));
        }
        // Eight peers within a tiny span imply a huge ring population;
        // eight peers spread over the whole ring imply a small one.
        assert!(dense.current_capacity() > sparse.current_capacity());
        assert!(dense.len() >= sparse.len());
    }

    #[test]
    fn test_remove_then_retrim() {
        let mut list = NeighborList::new();
        for i in 1..=32u64 {
            list.add(Distance(i * 10));
        }
        let len_before = list.len();
        assert!(list.remove(Distance(10)));
        assert!(!list.remove(Distance(10)));
        assert!(list.len() <= len_before);
        assert!(list.len() <= list.current_capacity());
    }

    #[test]
    fn test_average_distance() {
        let mut list = NeighborList::new();
        list.add(Distance(100));
        list.add(Distance(300));
        // farthest / count
        assert_eq!(list.average_distance(), Some(Distance(150)));
    }

    #[test]
    fn test_scan_reference_matches_production() {
        let mut fast = NeighborList::new();
        let mut naive = ScanNeighborList::new();
        let mut state: u64 = 42;
        for step in 0..4000 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            // Mix whole-ring and near-base distances to exercise both
            // admission branches.
            let d = if step % 2 == 0 {
                Distance(state)
            } else {
                Distance(state % 100_000 + 1)
            };
            if state % 4 == 0 {
                assert_eq!(fast.remove(d), naive.remove(d), "remove {d:?}");
            } else {
                assert_eq!(fast.add(d), naive.add(d), "add {d:?}");
            }
            assert_eq!(fast.all(), naive.all());
            assert_eq!(fast.nearest(), naive.nearest());
            assert_eq!(fast.current_capacity(), naive.current_capacity());
            assert_eq!(fast.nearest_n(3), naive.nearest_n(3));
            assert_eq!(fast.average_distance(), naive.average_distance());
        }
    }
}
