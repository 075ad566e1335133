//! The per-node view of the ring.
//!
//! A view composes the successor list, predecessor list, finger table, and
//! peer cache into one snapshot of the ring as seen from a fixed `base`
//! address. It owns all mutation: transport feeds it "this peer responded"
//! ([`RingView::add_peer`]) and "this peer is gone"
//! ([`RingView::remove_peer`]) events, and it keeps the four structures
//! coherent: every tracked distance is backed by a cache entry, no entry
//! ever carries the base address, and each sub-structure's own invariants
//! hold after every call.
//!
//! The sub-structures' invariants span each other (removing a peer touches
//! the cache and up to three tracking structures atomically), so a view is
//! shared as a whole behind one mutex ([`SharedView`]) and never locked
//! piecewise.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::address::{Address, Distance};
use crate::cache::PeerCache;
use crate::fingers::{ConstTimeFingers, FingerTable, ScanFingers};
use crate::neighbors::{NeighborList, ScanNeighborList};
use crate::peer::AddressedPeer;

/// The ring-view contract, shared by the production [`RingView`] and the
/// [`MirrorView`] oracle so differential tests can drive both through one
/// seam.
pub trait View: Send {
    /// The node's own ring address.
    fn base(&self) -> Address;

    /// Record that a peer responded. Returns true iff the ring *structure*
    /// (not just the cache) changed. Never accepts the base address.
    fn add_peer(&mut self, peer: AddressedPeer) -> bool;

    /// Record that a peer is gone. Returns the peer's address if it was
    /// structurally significant, `None` for cache-only entries or unknown
    /// locators.
    fn remove_peer(&mut self, locator: &SocketAddr) -> Option<Address>;

    /// The best known peer to forward a request for `target` to, or `None`
    /// when the target lies in this node's own territory (or nothing useful
    /// is known).
    fn routing_destination(&self, target: Address) -> Option<AddressedPeer>;

    /// Whether this node is authoritative for `address`.
    fn dominates(&self, address: Address) -> bool;

    /// The inclusive address range `[base, next successor - 1]` this node is
    /// authoritative for; the whole ring when no successor is known.
    fn domain(&self) -> (Address, Address);

    /// Up to `max_hop` nearest successors, nearest first.
    fn successors(&self, max_hop: usize) -> Vec<AddressedPeer>;

    /// Up to `max_hop` nearest predecessors, nearest first.
    fn predecessors(&self, max_hop: usize) -> Vec<AddressedPeer>;

    /// The current finger peers, ascending by distance.
    fn fingers(&self) -> Vec<AddressedPeer>;

    /// Union of successors, predecessors, and fingers, ascending by
    /// distance. These entries are protected from cache eviction.
    fn important_peers(&self) -> Vec<AddressedPeer>;

    /// Every cached peer, oldest first.
    fn peers(&self) -> Vec<AddressedPeer>;

    /// Local density sample: the successor list's average spacing. Drives
    /// the finger digger's starting level.
    fn estimate_average_distance(&self) -> Option<Distance>;

    /// Number of cached peers.
    fn len(&self) -> usize;

    /// Whether no peer is known.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Production ring view.
pub struct RingView {
    base: Address,
    successors: NeighborList,
    /// Runs the successor algorithm over distances reflected through zero.
    predecessors: NeighborList,
    fingers: Box<dyn FingerTable>,
    cache: PeerCache,
}

impl RingView {
    /// Create a view for `base` with the production finger table.
    pub fn new(base: Address, cache_capacity: usize) -> Self {
        Self::with_finger_table(base, cache_capacity, Box::new(ConstTimeFingers::new()))
    }

    /// Create a view with a caller-chosen finger table implementation.
    pub fn with_finger_table(
        base: Address,
        cache_capacity: usize,
        fingers: Box<dyn FingerTable>,
    ) -> Self {
        Self {
            base,
            successors: NeighborList::new(),
            predecessors: NeighborList::new(),
            fingers,
            cache: PeerCache::new(cache_capacity),
        }
    }

    /// The node's own ring address.
    pub fn base(&self) -> Address {
        self.base
    }

    /// Number of cached peers.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no peer is known.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn is_important(&self, distance: Distance) -> bool {
        self.successors.contains(distance)
            || self.predecessors.contains(distance.reflect())
            || self.fingers.contains(distance)
    }

    /// Drop a distance from whichever structures track it and repair each
    /// affected structure by re-offering the remaining cached distances,
    /// nearest first. Returns true iff any structure changed.
    fn remove_distance(&mut self, distance: Distance) -> bool {
        let from_successors = self.successors.remove(distance);
        let from_predecessors = self.predecessors.remove(distance.reflect());
        let from_fingers = self.fingers.remove(distance);
        if !(from_successors || from_predecessors || from_fingers) {
            return false;
        }
        for candidate in self.cache.distances_ascending() {
            if from_successors {
                self.successors.add(candidate);
            }
            if from_predecessors {
                self.predecessors.add(candidate.reflect());
            }
            if from_fingers {
                self.fingers.add(candidate);
            }
        }
        true
    }

    fn trim_cache(&mut self) {
        let successors = &self.successors;
        let predecessors = &self.predecessors;
        let fingers = &self.fingers;
        self.cache.trim(|d| {
            successors.contains(d) || predecessors.contains(d.reflect()) || fingers.contains(d)
        });
    }

    /// Record that a peer responded; see [`View::add_peer`].
    pub fn add_peer(&mut self, peer: AddressedPeer) -> bool {
        if peer.address == self.base {
            return false;
        }
        let distance = self.base.distance_to(peer.address);

        let mut changed = false;
        match self.cache.distance_of(&peer.locator) {
            // The identical (address, locator) record is already cached.
            Some(stale) if stale == distance => return false,
            // The peer moved in the ring: drop its stale entry first.
            Some(stale) => {
                self.cache.remove(stale);
                changed |= self.remove_distance(stale);
            }
            None => {}
        }

        if self.cache.contains(distance) {
            // Address already known under another locator: refresh the
            // record in place; the set of tracked distances is unchanged.
            self.cache.insert(distance, peer);
            return changed || self.is_important(distance);
        }

        self.cache.insert(distance, peer);
        changed |= self.successors.add(distance);
        changed |= self.predecessors.add(distance.reflect());
        changed |= self.fingers.add(distance);
        self.trim_cache();
        changed
    }

    /// Record that a peer is gone; see [`View::remove_peer`].
    pub fn remove_peer(&mut self, locator: &SocketAddr) -> Option<Address> {
        let (distance, peer) = self.cache.remove_by_locator(locator)?;
        let structural = self.remove_distance(distance);
        structural.then_some(peer.address)
    }

    /// See [`View::routing_destination`].
    pub fn routing_destination(&self, target: Address) -> Option<AddressedPeer> {
        let distance = self.base.distance_to(target);
        if distance.is_zero() {
            return None;
        }
        if let Some(hop) = self.fingers.route(distance) {
            return self.cache.get(hop).cloned();
        }
        match self.successors.nearest() {
            Some(nearest) if nearest <= distance => self.cache.get(nearest).cloned(),
            _ => None,
        }
    }

    /// See [`View::dominates`].
    pub fn dominates(&self, address: Address) -> bool {
        match self.successors.nearest() {
            Some(nearest) => self.base.distance_to(address) < nearest,
            None => true,
        }
    }

    /// See [`View::domain`].
    pub fn domain(&self) -> (Address, Address) {
        let end = match self.successors.nearest() {
            Some(nearest) => Address(self.base.0.wrapping_add(nearest.0)).predecessor(),
            None => self.base.predecessor(),
        };
        (self.base, end)
    }

    fn resolve(&self, distances: impl IntoIterator<Item = Distance>) -> Vec<AddressedPeer> {
        distances
            .into_iter()
            .filter_map(|d| self.cache.get(d).cloned())
            .collect()
    }

    /// See [`View::successors`].
    pub fn successors(&self, max_hop: usize) -> Vec<AddressedPeer> {
        self.resolve(self.successors.nearest_n(max_hop))
    }

    /// See [`View::predecessors`].
    pub fn predecessors(&self, max_hop: usize) -> Vec<AddressedPeer> {
        self.resolve(
            self.predecessors
                .nearest_n(max_hop)
                .into_iter()
                .map(Distance::reflect),
        )
    }

    /// See [`View::fingers`].
    pub fn fingers(&self) -> Vec<AddressedPeer> {
        self.resolve(self.fingers.all())
    }

    /// See [`View::important_peers`].
    pub fn important_peers(&self) -> Vec<AddressedPeer> {
        let mut distances: std::collections::BTreeSet<Distance> = std::collections::BTreeSet::new();
        distances.extend(self.successors.all());
        distances.extend(self.predecessors.all().into_iter().map(Distance::reflect));
        distances.extend(self.fingers.all());
        self.resolve(distances)
    }

    /// See [`View::peers`].
    pub fn peers(&self) -> Vec<AddressedPeer> {
        self.cache.peers()
    }

    /// See [`View::estimate_average_distance`].
    pub fn estimate_average_distance(&self) -> Option<Distance> {
        self.successors.average_distance()
    }
}

impl View for RingView {
    fn base(&self) -> Address {
        RingView::base(self)
    }
    fn add_peer(&mut self, peer: AddressedPeer) -> bool {
        RingView::add_peer(self, peer)
    }
    fn remove_peer(&mut self, locator: &SocketAddr) -> Option<Address> {
        RingView::remove_peer(self, locator)
    }
    fn routing_destination(&self, target: Address) -> Option<AddressedPeer> {
        RingView::routing_destination(self, target)
    }
    fn dominates(&self, address: Address) -> bool {
        RingView::dominates(self, address)
    }
    fn domain(&self) -> (Address, Address) {
        RingView::domain(self)
    }
    fn successors(&self, max_hop: usize) -> Vec<AddressedPeer> {
        RingView::successors(self, max_hop)
    }
    fn predecessors(&self, max_hop: usize) -> Vec<AddressedPeer> {
        RingView::predecessors(self, max_hop)
    }
    fn fingers(&self) -> Vec<AddressedPeer> {
        RingView::fingers(self)
    }
    fn important_peers(&self) -> Vec<AddressedPeer> {
        RingView::important_peers(self)
    }
    fn peers(&self) -> Vec<AddressedPeer> {
        RingView::peers(self)
    }
    fn estimate_average_distance(&self) -> Option<Distance> {
        RingView::estimate_average_distance(self)
    }
    fn len(&self) -> usize {
        RingView::len(self)
    }
}

/// A view shared between the maintenance workers and the transport layer.
/// One monitor serializes every read and mutation; no method can be torn by
/// a concurrent call.
pub type SharedView = Arc<Mutex<RingView>>;

/// Create a [`SharedView`].
pub fn shared(view: RingView) -> SharedView {
    Arc::new(Mutex::new(view))
}

/// Lock a shared view, recovering from poisoning: the view's invariants are
/// re-established before any panic could unwind out of a mutation, so a
/// poisoned lock still guards a coherent view.
pub(crate) fn lock(view: &SharedView) -> MutexGuard<'_, RingView> {
    view.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Reference view: the same orchestration as [`RingView`] over the naive
/// sub-structures ([`ScanNeighborList`], [`ScanFingers`], a vector cache
/// scanned linearly). A differential oracle, not used in production.
pub struct MirrorView {
    base: Address,
    successors: ScanNeighborList,
    predecessors: ScanNeighborList,
    fingers: ScanFingers,
    /// Insertion-ordered cache; index 0 is the oldest entry.
    cache: Vec<(Distance, AddressedPeer)>,
    capacity: usize,
}

impl MirrorView {
    /// Create a mirror view for `base`.
    pub fn new(base: Address, cache_capacity: usize) -> Self {
        Self {
            base,
            successors: ScanNeighborList::new(),
            predecessors: ScanNeighborList::new(),
            fingers: ScanFingers::new(),
            cache: Vec::new(),
            capacity: cache_capacity,
        }
    }

    fn cached(&self, distance: Distance) -> Option<&AddressedPeer> {
        self.cache
            .iter()
            .find(|(d, _)| *d == distance)
            .map(|(_, p)| p)
    }

    fn cached_distance_of(&self, locator: &SocketAddr) -> Option<Distance> {
        self.cache
            .iter()
            .find(|(_, p)| p.locator == *locator)
            .map(|(d, _)| *d)
    }

    fn is_important(&self, distance: Distance) -> bool {
        self.successors.contains(distance)
            || self.predecessors.contains(distance.reflect())
            || self.fingers.contains(distance)
    }

    fn remove_distance(&mut self, distance: Distance) -> bool {
        let from_successors = self.successors.remove(distance);
        let from_predecessors = self.predecessors.remove(distance.reflect());
        let from_fingers = self.fingers.remove(distance);
        if !(from_successors || from_predecessors || from_fingers) {
            return false;
        }
        let mut candidates: Vec<Distance> = self.cache.iter().map(|(d, _)| *d).collect();
        candidates.sort_unstable();
        for candidate in candidates {
            if from_successors {
                self.successors.add(candidate);
            }
            if from_predecessors {
                self.predecessors.add(candidate.reflect());
            }
            if from_fingers {
                self.fingers.add(candidate);
            }
        }
        true
    }

    fn trim_cache(&mut self) {
        let mut attempts = self.cache.len();
        while self.cache.len() > self.capacity && attempts > 0 {
            attempts -= 1;
            let (oldest, peer) = self.cache.remove(0);
            if self.is_important(oldest) {
                self.cache.push((oldest, peer));
            }
        }
    }

    fn resolve(&self, distances: impl IntoIterator<Item = Distance>) -> Vec<AddressedPeer> {
        distances
            .into_iter()
            .filter_map(|d| self.cached(d).cloned())
            .collect()
    }
}

impl View for MirrorView {
    fn base(&self) -> Address {
        self.base
    }

    fn add_peer(&mut self, peer: AddressedPeer) -> bool {
        if peer.address == self.base {
            return false;
        }
        let distance = self.base.distance_to(peer.address);

        let mut changed = false;
        match self.cached_distance_of(&peer.locator) {
            Some(stale) if stale == distance => return false,
            Some(stale) => {
                self.cache.retain(|(d, _)| *d != stale);
                changed |= self.remove_distance(stale);
            }
            None => {}
        }

        if let Some(slot) = self.cache.iter_mut().find(|(d, _)| *d == distance) {
            slot.1 = peer;
            return changed || self.is_important(distance);
        }

        self.cache.push((distance, peer));
        changed |= self.successors.add(distance);
        changed |= self.predecessors.add(distance.reflect());
        changed |= self.fingers.add(distance);
        self.trim_cache();
        changed
    }

    fn remove_peer(&mut self, locator: &SocketAddr) -> Option<Address> {
        let distance = self.cached_distance_of(locator)?;
        let pos = self.cache.iter().position(|(d, _)| *d == distance)?;
        let (_, peer) = self.cache.remove(pos);
        let structural = self.remove_distance(distance);
        structural.then_some(peer.address)
    }

    fn routing_destination(&self, target: Address) -> Option<AddressedPeer> {
        let distance = self.base.distance_to(target);
        if distance.is_zero() {
            return None;
        }
        if let Some(hop) = self.fingers.route(distance) {
            return self.cached(hop).cloned();
        }
        match self.successors.nearest() {
            Some(nearest) if nearest <= distance => self.cached(nearest).cloned(),
            _ => None,
        }
    }

    fn dominates(&self, address: Address) -> bool {
        match self.successors.nearest() {
            Some(nearest) => self.base.distance_to(address) < nearest,
            None => true,
        }
    }

    fn domain(&self) -> (Address, Address) {
        let end = match self.successors.nearest() {
            Some(nearest) => Address(self.base.0.wrapping_add(nearest.0)).predecessor(),
            None => self.base.predecessor(),
        };
        (self.base, end)
    }

    fn successors(&self, max_hop: usize) -> Vec<AddressedPeer> {
        self.resolve(self.successors.nearest_n(max_hop))
    }

    fn predecessors(&self, max_hop: usize) -> Vec<AddressedPeer> {
        self.resolve(
            self.predecessors
                .nearest_n(max_hop)
                .into_iter()
                .map(Distance::reflect),
        )
    }

    fn fingers(&self) -> Vec<AddressedPeer> {
        self.resolve(self.fingers.all())
    }

    fn important_peers(&self) -> Vec<AddressedPeer> {
        let mut distances: std::collections::BTreeSet<Distance> = std::collections::BTreeSet::new();
        distances.extend(self.successors.all());
        distances.extend(self.predecessors.all().into_iter().map(Distance::reflect));
        distances.extend(self.fingers.all());
        self.resolve(distances)
    }

    fn peers(&self) -> Vec<AddressedPeer> {
        self.cache.iter().map(|(_, p)| p.clone()).collect()
    }

    fn estimate_average_distance(&self) -> Option<Distance> {
        self.successors.average_distance()
    }

    fn len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Address = Address(1000);

    fn peer(address: u64, port: u16) -> AddressedPeer {
        AddressedPeer::new(Address(address), SocketAddr::from(([10, 0, 0, 1], port)))
    }

    #[test]
    fn test_self_address_never_added() {
        let mut view = RingView::new(BASE, 64);
        assert!(!view.add_peer(peer(BASE.0, 1)));
        assert!(view.is_empty());
        assert!(view.important_peers().is_empty());
    }

    #[test]
    fn test_re_add_identical_pair_is_noop() {
        let mut view = RingView::new(BASE, 64);
        assert!(view.add_peer(peer(2000, 1)));
        assert!(!view.add_peer(peer(2000, 1)));
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn test_locator_change_updates_one_entry() {
        let mut view = RingView::new(BASE, 64);
        view.add_peer(peer(2000, 1));
        // Same address, new locator: the record is refreshed in place.
        let refreshed = peer(2000, 2);
        let structural = view.add_peer(refreshed.clone());
        // The entry is a successor, so the refresh reports importance.
        assert!(structural);
        assert_eq!(view.len(), 1);
        assert_eq!(view.peers(), vec![refreshed.clone()]);
        assert_eq!(view.remove_peer(&peer(2000, 1).locator), None);
        assert_eq!(view.len(), 1);
        assert_eq!(view.remove_peer(&refreshed.locator), Some(Address(2000)));
    }

    #[test]
    fn test_address_change_moves_entry() {
        let mut view = RingView::new(BASE, 64);
        view.add_peer(peer(2000, 1));
        // Same locator, new ring address: the stale entry goes away.
        assert!(view.add_peer(peer(3000, 1)));
        assert_eq!(view.len(), 1);
        assert_eq!(view.peers()[0].address, Address(3000));
        assert_eq!(view.routing_destination(Address(2500)), None);
    }

    #[test]
    fn test_dominates_and_domain() {
        let mut view = RingView::new(BASE, 64);
        // No successor: the whole ring is ours.
        assert!(view.dominates(Address(999)));
        assert_eq!(view.domain(), (BASE, BASE.predecessor()));

        view.add_peer(peer(2000, 1));
        assert!(view.dominates(Address(1500)));
        assert!(view.dominates(BASE));
        assert!(!view.dominates(Address(2000)));
        assert!(!view.dominates(Address(999)));
        assert_eq!(view.domain(), (BASE, Address(1999)));
    }

    #[test]
    fn test_routing_prefers_farthest_non_overshooting_peer() {
        let mut view = RingView::new(BASE, 64);
        let near = peer(1001, 1); // distance 1
        let mid = peer(1200, 2); // distance 200
        let far = peer(9000, 3); // distance 8000
        view.add_peer(near.clone());
        view.add_peer(mid.clone());
        view.add_peer(far.clone());

        assert_eq!(view.routing_destination(Address(60_000)), Some(far.clone()));
        assert_eq!(view.routing_destination(Address(8000)), Some(mid.clone()));
        // Own territory: nothing to forward to.
        assert_eq!(view.routing_destination(BASE), None);
    }

    #[test]
    fn test_routing_falls_back_to_successor() {
        let mut view = RingView::new(BASE, 64);
        let succ = peer(1004, 1); // distance 4, level 2
        view.add_peer(succ.clone());
        // Target at distance 3 (level 2): slot 2 holds 4, which overshoots,
        // and slot 1 is empty. The successor itself overshoots too.
        assert_eq!(view.routing_destination(Address(1003)), None);
        // Target at distance 5: the successor no longer overshoots.
        assert_eq!(view.routing_destination(Address(1005)), Some(succ));
    }

    #[test]
    fn test_removed_peer_leaves_important_set() {
        let mut view = RingView::new(BASE, 256);
        for n in 0..50u64 {
            view.add_peer(peer(2000 + n * 97, 100 + n as u16));
        }
        let victim = peer(2000, 100);
        let removed = view.remove_peer(&victim.locator);
        // It was the nearest successor: structurally significant.
        assert_eq!(removed, Some(Address(2000)));
        assert!(view
            .important_peers()
            .iter()
            .all(|p| p.locator != victim.locator));
        assert!(view.peers().iter().all(|p| p.locator != victim.locator));
        // Removing an unknown locator is a quiet no-op.
        assert_eq!(view.remove_peer(&victim.locator), None);
    }

    #[test]
    fn test_removal_repairs_structures_from_cache() {
        let mut view = RingView::new(BASE, 256);
        let first = peer(1010, 1);
        let second = peer(1020, 2);
        view.add_peer(first.clone());
        view.add_peer(second.clone());

        view.remove_peer(&first.locator);
        // The next-best cached peer takes over as nearest successor.
        assert_eq!(view.successors(1), vec![second.clone()]);
        assert_eq!(view.routing_destination(Address(1025)), Some(second));
    }

    #[test]
    fn test_important_peers_is_union_of_three() {
        let mut view = RingView::new(BASE, 256);
        for n in 1..=20u64 {
            view.add_peer(peer(1000 + (n << 40), n as u16));
        }
        let important = view.important_peers();
        for p in view.successors(usize::MAX) {
            assert!(important.contains(&p));
        }
        for p in view.predecessors(usize::MAX) {
            assert!(important.contains(&p));
        }
        for p in view.fingers() {
            assert!(important.contains(&p));
        }
    }

    #[test]
    fn test_eviction_spares_structure_members() {
        let mut view = RingView::new(BASE, 4);
        for n in 1..=30u64 {
            view.add_peer(peer(1000 + n * 1000, n as u16));
        }
        // The cache stayed near its bound, and whatever the structures
        // track is still resolvable.
        assert!(view.len() <= 4 + view.important_peers().len());
        assert_eq!(view.successors(1).len(), 1);
        for p in view.important_peers() {
            assert!(view.peers().contains(&p));
        }
    }
}
