//! # orbit-ring
//!
//! Ring membership and routing core for the Orbit P2P network.
//!
//! This crate implements a self-sizing Chord-family routing table:
//! - Modular ring address arithmetic over a 64-bit logical address space
//! - Self-sizing successor and predecessor lists that infer their own
//!   fault-tolerance margin from locally observed peer density
//! - A constant-time finger (shortcut) table with one slot per distance level
//! - A capacity-bounded, insertion-ordered peer cache whose eviction never
//!   removes structurally important peers
//! - A periodic maintenance protocol (two stabilizers and a finger digger)
//!   under a restart-on-failure supervisor
//!
//! The crate owns no sockets and performs no I/O. Maintenance workers emit
//! [`maintenance::ProbeRequest`]s onto an outbound queue; the transport layer
//! performs the actual network operations and feeds results back through
//! [`view::RingView::add_peer`] / [`view::RingView::remove_peer`].
//!
//! ## Key Parameters
//!
//! | Parameter | Value |
//! |---|---|
//! | Ring width | 64 bits (`u64` addresses, modulo 2^64) |
//! | Distance levels | 0..=64 |
//! | Finger slots | 65 (one per level) |
//! | Neighbor list capacity | `bit_length(count * 2^64 / farthest)` |
//! | Default peer cache capacity | 1024 entries |
//! | Default maintenance interval | 1000 ms |
//! | Address derivation | first 8 bytes of a 256-bit content hash, big-endian |

pub mod address;
pub mod cache;
pub mod fingers;
pub mod maintenance;
pub mod neighbors;
pub mod peer;
pub mod service;
pub mod view;

pub use address::{Address, Distance};
pub use peer::AddressedPeer;
pub use service::{RingConfig, RingService};

/// Number of bits in the logical ring address space.
pub const RING_BITS: u32 = 64;

/// Number of finger slots: one per distance level `0..=RING_BITS`.
pub const NUM_LEVELS: usize = RING_BITS as usize + 1;

/// Default peer cache capacity. Operators should keep this well above the
/// expected number of structurally important peers (successors +
/// predecessors + fingers) so that eviction rarely has to retry.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Default maintenance interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Error types for ring core operations.
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    /// The peer cache capacity is invalid (zero).
    #[error("invalid peer cache capacity: {capacity}")]
    InvalidCapacity { capacity: usize },

    /// The maintenance interval is invalid (zero).
    #[error("invalid maintenance interval: {interval_ms} ms")]
    InvalidInterval { interval_ms: u64 },
}

/// Convenience result type for ring core operations.
pub type Result<T> = std::result::Result<T, RingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(RING_BITS, 64);
        assert_eq!(NUM_LEVELS, 65);
        assert!(DEFAULT_CACHE_CAPACITY >= 100);
        assert!(DEFAULT_INTERVAL_MS > 0);
    }

    #[test]
    fn test_error_display() {
        let err = RingError::InvalidCapacity { capacity: 0 };
        assert!(err.to_string().contains('0'));

        let err = RingError::InvalidInterval { interval_ms: 0 };
        assert!(err.to_string().contains("ms"));
    }
}
