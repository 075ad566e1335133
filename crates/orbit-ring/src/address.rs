//! Modular ring address arithmetic.
//!
//! The logical address space is the set of integers modulo 2^64. A node or
//! target occupies an [`Address`]; the forward (clockwise) separation between
//! two addresses is a [`Distance`]. Distances drive every other structure in
//! this crate: neighbor lists store them, the finger table indexes them by
//! *distance level* (`ceil(log2(d))`), and the peer cache keys on them.
//!
//! All arithmetic wraps modulo 2^64, so a forward distance is always
//! non-negative and `a.distance_to(b)` + `b.distance_to(a)` is either zero or
//! one full ring revolution.

use serde::{Deserialize, Serialize};

use crate::RING_BITS;

/// A logical position on the ring: an unsigned integer modulo 2^64.
///
/// Deployments derive addresses from the first 8 bytes of a 256-bit content
/// hash, big-endian. The type is an immutable value; every operation returns
/// a new address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub u64);

impl Address {
    /// The zero address.
    pub const ZERO: Address = Address(0);

    /// Build an address from the first 8 bytes of a hash, big-endian.
    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Address(u64::from_be_bytes(bytes))
    }

    /// The big-endian byte encoding of this address.
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Forward (clockwise) distance from `self` to `other`:
    /// `(other - self) mod 2^64`. Always non-negative; zero iff equal.
    pub fn distance_to(self, other: Address) -> Distance {
        Distance(other.0.wrapping_sub(self.0))
    }

    /// The address `2^level` positions clockwise from `self`.
    ///
    /// `level == RING_BITS` adds a full revolution and returns `self`;
    /// callers that want "just short of a full revolution" combine this with
    /// [`Address::predecessor`].
    pub fn add_power_of_two(self, level: u32) -> Address {
        if level >= RING_BITS {
            self
        } else {
            Address(self.0.wrapping_add(1u64 << level))
        }
    }

    /// The address immediately counter-clockwise of `self`.
    pub fn predecessor(self) -> Address {
        Address(self.0.wrapping_sub(1))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0.to_be_bytes()))
    }
}

/// A forward separation between two ring addresses, modulo 2^64.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Distance(pub u64);

impl Distance {
    /// The zero distance (an address's separation from itself).
    pub const ZERO: Distance = Distance(0);

    /// Whether this is the zero distance.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The distance level: `ceil(log2(d))`, with level 0 for `d <= 1`.
    ///
    /// Satisfies `2^(level-1) < d <= 2^level` for every non-zero distance,
    /// so levels range over `0..=RING_BITS`.
    pub fn level(self) -> u32 {
        match self.0 {
            0 => 0,
            d if d.is_power_of_two() => d.trailing_zeros(),
            d => 64 - d.leading_zeros(),
        }
    }

    /// Number of bits needed to represent this distance (0 for zero).
    pub fn bit_length(self) -> u32 {
        64 - self.0.leading_zeros()
    }

    /// Index of the highest set bit, or `None` for the zero distance.
    pub fn highest_set_bit(self) -> Option<u32> {
        if self.0 == 0 {
            None
        } else {
            Some(63 - self.0.leading_zeros())
        }
    }

    /// Number of set bits.
    pub fn bit_count(self) -> u32 {
        self.0.count_ones()
    }

    /// Integer division of the distance. `n` must be non-zero.
    pub fn divide(self, n: u64) -> Distance {
        Distance(self.0 / n)
    }

    /// The same separation measured in the counter-clockwise direction:
    /// `(2^64 - d) mod 2^64`. Reflecting twice yields the original distance.
    ///
    /// Predecessor lists run the successor-list algorithm over reflected
    /// distances, so "nearest backward peer" becomes "smallest reflected
    /// distance".
    pub fn reflect(self) -> Distance {
        Distance(self.0.wrapping_neg())
    }
}
