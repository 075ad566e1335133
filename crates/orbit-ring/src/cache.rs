//! Bounded, insertion-ordered peer cache.
//!
//! The cache is the ground truth for every peer the view knows: successor,
//! predecessor, and finger entries are always a subset of its keys. It maps
//! a peer's forward [`Distance`] from the base address to its
//! [`AddressedPeer`] record, keeps an inverse locator index for
//! "peer is gone" notifications, and bounds its memory with an
//! oldest-first eviction that spares structurally important entries.
//!
//! Eviction retries are bounded by the queue length observed when trimming
//! starts: when every entry is important the cache is allowed to sit over
//! capacity rather than loop forever. Operators size the capacity well above
//! the expected number of important peers.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

use crate::address::Distance;
use crate::peer::AddressedPeer;

/// Bounded map from peer distance to peer record, in insertion order.
#[derive(Clone, Debug)]
pub struct PeerCache {
    capacity: usize,
    /// Insertion order; front is the oldest entry and the first eviction
    /// candidate. An important entry that dodges eviction moves to the back.
    queue: VecDeque<Distance>,
    entries: HashMap<Distance, AddressedPeer>,
    by_locator: HashMap<SocketAddr, Distance>,
}

impl PeerCache {
    /// Create an empty cache bounded at `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            capacity,
            queue: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
            by_locator: HashMap::with_capacity(capacity),
        }
    }

    /// The fixed capacity set at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached peers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The peer cached at `distance`.
    pub fn get(&self, distance: Distance) -> Option<&AddressedPeer> {
        self.entries.get(&distance)
    }

    /// The distance a locator is cached under.
    pub fn distance_of(&self, locator: &SocketAddr) -> Option<Distance> {
        self.by_locator.get(locator).copied()
    }

    /// Whether a peer is cached at `distance`.
    pub fn contains(&self, distance: Distance) -> bool {
        self.entries.contains_key(&distance)
    }

    /// Insert or overwrite the entry at `distance`.
    ///
    /// Overwriting keeps the entry's queue position; only the record (and
    /// the locator index) changes. The caller resolves locator conflicts
    /// *before* inserting; this method only keeps its own indexes coherent.
    pub fn insert(&mut self, distance: Distance, peer: AddressedPeer) {
        if let Some(previous) = self.entries.insert(distance, peer.clone()) {
            self.by_locator.remove(&previous.locator);
        } else {
            self.queue.push_back(distance);
        }
        self.by_locator.insert(peer.locator, distance);
    }

    /// Remove the entry at `distance`, preserving the order of the rest.
    pub fn remove(&mut self, distance: Distance) -> Option<AddressedPeer> {
        let peer = self.entries.remove(&distance)?;
        self.by_locator.remove(&peer.locator);
        if let Some(pos) = self.queue.iter().position(|d| *d == distance) {
            self.queue.remove(pos);
        }
        Some(peer)
    }

    /// Remove the entry for a locator, returning its distance and record.
    pub fn remove_by_locator(&mut self, locator: &SocketAddr) -> Option<(Distance, AddressedPeer)> {
        let distance = self.by_locator.get(locator).copied()?;
        let peer = self.remove(distance)?;
        Some((distance, peer))
    }

    /// All cached distances, ascending. Used when repairing a neighbor list
    /// or finger table after a removal: re-offering candidates nearest-first
    /// is the "next-best candidate" re-scan.
    pub fn distances_ascending(&self) -> Vec<Distance> {
        let mut distances: Vec<Distance> = self.entries.keys().copied().collect();
        distances.sort_unstable();
        distances
    }

    /// All cached peers, oldest first.
    pub fn peers(&self) -> Vec<AddressedPeer> {
        self.queue
            .iter()
            .filter_map(|d| self.entries.get(d).cloned())
            .collect()
    }

    /// Evict oldest-first down to capacity, sparing entries the caller
    /// marks important. A spared entry is reinserted at the back and the
    /// next candidate is tried; total attempts are bounded by the queue
    /// length at entry, so an all-important cache terminates over capacity.
    pub fn trim<F>(&mut self, mut is_important: F)
    where
        F: FnMut(Distance) -> bool,
    {
        let mut attempts = self.queue.len();
        while self.entries.len() > self.capacity && attempts > 0 {
            attempts -= 1;
            let Some(oldest) = self.queue.pop_front() else {
                break;
            };
            if is_important(oldest) {
                self.queue.push_back(oldest);
            } else if let Some(peer) = self.entries.remove(&oldest) {
                self.by_locator.remove(&peer.locator);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    fn peer(n: u64) -> AddressedPeer {
        AddressedPeer::new(
            Address(n),
            SocketAddr::from(([127, 0, 0, 1], 9000 + n as u16)),
        )
    }

    #[test]
    fn test_insert_and_lookup_both_ways() {
        let mut cache = PeerCache::new(8);
        let p = peer(5);
        cache.insert(Distance(5), p.clone());
        assert_eq!(cache.get(Distance(5)), Some(&p));
        assert_eq!(cache.distance_of(&p.locator), Some(Distance(5)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_overwrite_keeps_size_and_order() {
        let mut cache = PeerCache::new(8);
        cache.insert(Distance(1), peer(1));
        cache.insert(Distance(2), peer(2));

        let moved = AddressedPeer::new(Address(1), peer(9).locator);
        cache.insert(Distance(1), moved.clone());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(Distance(1)), Some(&moved));
        // The old locator index entry is gone, the new one present.
        assert_eq!(cache.distance_of(&peer(1).locator), None);
        assert_eq!(cache.distance_of(&moved.locator), Some(Distance(1)));
        // Queue position preserved: distance 1 is still the oldest.
        assert_eq!(cache.peers()[0], moved);
    }

    #[test]
    fn test_remove_by_locator() {
        let mut cache = PeerCache::new(8);
        let p = peer(3);
        cache.insert(Distance(3), p.clone());
        assert_eq!(
            cache.remove_by_locator(&p.locator),
            Some((Distance(3), p.clone()))
        );
        assert!(cache.is_empty());
        assert_eq!(cache.remove_by_locator(&p.locator), None);
    }

    #[test]
    fn test_trim_evicts_oldest_first() {
        let mut cache = PeerCache::new(2);
        for n in 1..=3u64 {
            cache.insert(Distance(n), peer(n));
        }
        cache.trim(|_| false);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(Distance(1)));
        assert!(cache.contains(Distance(2)));
        assert!(cache.contains(Distance(3)));
    }

    #[test]
    fn test_trim_spares_important_entries() {
        let mut cache = PeerCache::new(2);
        for n in 1..=3u64 {
            cache.insert(Distance(n), peer(n));
        }
        // The oldest entry is important: the next-oldest goes instead.
        cache.trim(|d| d == Distance(1));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(Distance(1)));
        assert!(!cache.contains(Distance(2)));
    }

    #[test]
    fn test_trim_all_important_terminates_over_capacity() {
        let mut cache = PeerCache::new(1);
        for n in 1..=4u64 {
            cache.insert(Distance(n), peer(n));
        }
        cache.trim(|_| true);
        // Nothing evictable: the bounded retry gives up.
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_distances_ascending() {
        let mut cache = PeerCache::new(8);
        for n in [5u64, 1, 3] {
            cache.insert(Distance(n), peer(n));
        }
        assert_eq!(
            cache.distances_ascending(),
            vec![Distance(1), Distance(3), Distance(5)]
        );
        // peers() stays in insertion order.
        let ages: Vec<Address> = cache.peers().iter().map(|p| p.address).collect();
        assert_eq!(ages, vec![Address(5), Address(1), Address(3)]);
    }
}
