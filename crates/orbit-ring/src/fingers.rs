//! Shortcut (finger) tables.
//!
//! A finger table answers one question in O(1): given a forward distance `d`
//! to a target, which is the farthest known peer that does not overshoot it?
//! Distances are bucketed by *level* (`ceil(log2(d))`, see
//! [`Distance::level`]); slot `i` holds the farthest known distance not
//! exceeding `2^i`. Because a distance at level `L` also fits every slot
//! above `L`, insertion propagates the value upward through slots that are
//! empty or smaller, and the slots always form a non-decreasing sequence by
//! level. Lookup for a target at level `L` then needs at most two probes:
//! slot `L` (if its value does not overshoot) or slot `L-1` (which, being at
//! most `2^(L-1)`, never can).
//!
//! [`ConstTimeFingers`] is the production implementation. [`LevelMapFingers`]
//! and [`ScanFingers`] run the same slot semantics on naive containers and
//! exist as correctness oracles for differential testing; all three are
//! observably equivalent for any operation sequence.

use std::collections::BTreeMap;

use crate::address::Distance;
use crate::{NUM_LEVELS, RING_BITS};

/// Routing shortcut table over peer distances.
///
/// Production code depends on this trait only; the concrete implementation
/// is chosen at view construction.
pub trait FingerTable: Send {
    /// Whether the table holds no entries.
    fn is_empty(&self) -> bool;

    /// The farthest known distance that does not exceed `target`, per the
    /// two-probe slot rule. `None` means the caller must fall back to the
    /// direct successor (or owns the target itself); that decision belongs
    /// to the view, not the table.
    fn route(&self, target: Distance) -> Option<Distance>;

    /// All distinct slot values, ascending.
    fn all(&self) -> Vec<Distance>;

    /// Whether `distance` currently holds a slot.
    fn contains(&self, distance: Distance) -> bool {
        self.all().contains(&distance)
    }

    /// Offer a distance. Returns true iff any slot changed.
    fn add(&mut self, distance: Distance) -> bool;

    /// Remove a distance. Returns true iff it held at least one slot; a
    /// distance that was overwritten earlier is no longer the table's
    /// concern and removing it is a no-op.
    fn remove(&mut self, distance: Distance) -> bool;

    /// Drop all entries.
    fn clear(&mut self);
}

/// Production finger table: one slot per distance level, O(1) lookups and
/// O(levels) worst-case mutation independent of peer count.
#[derive(Clone, Debug)]
pub struct ConstTimeFingers {
    /// `slots[i]` is the farthest known distance not exceeding `2^i`.
    /// Non-`None` values are non-decreasing with `i`.
    slots: Vec<Option<Distance>>,
}

impl Default for ConstTimeFingers {
    fn default() -> Self {
        Self {
            slots: vec![None; NUM_LEVELS],
        }
    }
}

impl ConstTimeFingers {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn slot(&self, level: usize) -> Option<Distance> {
        self.slots[level]
    }
}

impl FingerTable for ConstTimeFingers {
    fn is_empty(&self) -> bool {
        // Propagation fills every slot from the insertion level upward, so
        // the top slot is occupied iff anything is.
        self.slots[NUM_LEVELS - 1].is_none()
    }

    fn route(&self, target: Distance) -> Option<Distance> {
        if target.is_zero() {
            return None;
        }
        let level = target.level() as usize;
        match self.slots[level] {
            Some(value) if value <= target => Some(value),
            // Slot L overshoots or is empty; slot L-1 is capped at 2^(L-1)
            // and the target is strictly above that, so it never overshoots.
            _ if level > 0 => self.slots[level - 1],
            _ => None,
        }
    }

    fn all(&self) -> Vec<Distance> {
        let mut values: Vec<Distance> = self.slots.iter().filter_map(|s| *s).collect();
        values.dedup();
        values
    }

    fn add(&mut self, distance: Distance) -> bool {
        if distance.is_zero() {
            return false;
        }
        let level = distance.level() as usize;
        let mut changed = false;
        for slot in self.slots[level..].iter_mut() {
            match slot {
                Some(existing) if *existing >= distance => break,
                _ => {
                    *slot = Some(distance);
                    changed = true;
                }
            }
        }
        changed
    }

    fn remove(&mut self, distance: Distance) -> bool {
        if distance.is_zero() {
            return false;
        }
        let level = distance.level() as usize;
        if self.slots[level] != Some(distance) {
            return false;
        }
        // The removed value occupies a contiguous run of slots starting at
        // its own level. Re-derive the run from the next slot down, whose
        // value is below 2^(level-1) and therefore valid for every slot in
        // the run.
        let fallback = if level > 0 { self.slots[level - 1] } else { None };
        for slot in self.slots[level..].iter_mut() {
            if *slot == Some(distance) {
                *slot = fallback;
            } else {
                break;
            }
        }
        true
    }

    fn clear(&mut self) {
        self.slots.fill(None);
    }
}

/// Reference implementation: the slot semantics over a `BTreeMap` keyed by
/// level (absent key = empty slot). O(log n) per probe; a differential
/// oracle, not used in production.
#[derive(Clone, Debug, Default)]
pub struct LevelMapFingers {
    levels: BTreeMap<u32, Distance>,
}

impl LevelMapFingers {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FingerTable for LevelMapFingers {
    fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    fn route(&self, target: Distance) -> Option<Distance> {
        if target.is_zero() {
            return None;
        }
        let level = target.level();
        match self.levels.get(&level) {
            Some(value) if *value <= target => Some(*value),
            _ if level > 0 => self.levels.get(&(level - 1)).copied(),
            _ => None,
        }
    }

    fn all(&self) -> Vec<Distance> {
        let mut values: Vec<Distance> = self.levels.values().copied().collect();
        values.dedup();
        values
    }

    fn add(&mut self, distance: Distance) -> bool {
        if distance.is_zero() {
            return false;
        }
        let mut changed = false;
        for level in distance.level()..=RING_BITS {
            match self.levels.get(&level) {
                Some(existing) if *existing >= distance => break,
                _ => {
                    self.levels.insert(level, distance);
                    changed = true;
                }
            }
        }
        changed
    }

    fn remove(&mut self, distance: Distance) -> bool {
        if distance.is_zero() {
            return false;
        }
        let level = distance.level();
        if self.levels.get(&level) != Some(&distance) {
            return false;
        }
        let fallback = if level > 0 {
            self.levels.get(&(level - 1)).copied()
        } else {
            None
        };
        for i in level..=RING_BITS {
            if self.levels.get(&i) == Some(&distance) {
                match fallback {
                    Some(value) => {
                        self.levels.insert(i, value);
                    }
                    None => {
                        self.levels.remove(&i);
                    }
                }
            } else {
                break;
            }
        }
        true
    }

    fn clear(&mut self) {
        self.levels.clear();
    }
}

/// Reference implementation: stores only the current slot *holders* in an
/// unsorted vector and derives every slot by linear scan. A differential
/// oracle, not used in production.
#[derive(Clone, Debug, Default)]
pub struct ScanFingers {
    holders: Vec<Distance>,
}

impl ScanFingers {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// `slots[level]`: the farthest holder whose own level fits the slot.
    fn slot(&self, level: u32) -> Option<Distance> {
        self.holders
            .iter()
            .filter(|h| h.level() <= level)
            .max()
            .copied()
    }
}

impl FingerTable for ScanFingers {
    fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    fn route(&self, target: Distance) -> Option<Distance> {
        if target.is_zero() {
            return None;
        }
        let level = target.level();
        match self.slot(level) {
            Some(value) if value <= target => Some(value),
            _ if level > 0 => self.slot(level - 1),
            _ => None,
        }
    }

    fn all(&self) -> Vec<Distance> {
        let mut values = self.holders.clone();
        values.sort_unstable();
        values
    }

    fn add(&mut self, distance: Distance) -> bool {
        if distance.is_zero() {
            return false;
        }
        let level = distance.level();
        if self.slot(level).is_some_and(|s| s >= distance) {
            return false;
        }
        // Holders whose every slot the new value overwrites are gone; only
        // same-level smaller holders qualify (a smaller value never has a
        // higher level).
        self.holders
            .retain(|h| h.level() < level || *h >= distance);
        self.holders.push(distance);
        true
    }

    fn remove(&mut self, distance: Distance) -> bool {
        match self.holders.iter().position(|h| *h == distance) {
            Some(pos) => {
                self.holders.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        self.holders.clear();
    }
}
