//! The ring service façade.
//!
//! [`RingService`] is the object the rest of the node holds: it owns the
//! shared view, the outbound probe queue, and the maintenance supervisor's
//! lifecycle, and it re-exposes the view's query and mutation surface with
//! the locking handled internally. Construction validates the configuration
//! and fails fast; nothing is silently clamped.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::address::{Address, Distance};
use crate::maintenance::{self, ProbeQueue, ProbeRequest};
use crate::peer::AddressedPeer;
use crate::view::{self, RingView, SharedView};
use crate::{RingError, Result, DEFAULT_CACHE_CAPACITY, DEFAULT_INTERVAL_MS};

/// Construction parameters for a [`RingService`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RingConfig {
    /// This node's own ring address.
    pub base: Address,
    /// Peer cache capacity. Keep well above the expected number of
    /// structurally important peers; at least 100 is recommended, 1000+
    /// avoids pathological eviction retries.
    pub cache_capacity: usize,
    /// Maintenance pacing in milliseconds. Pacing only, never a deadline;
    /// network timeouts are the transport's job.
    pub interval_ms: u64,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            base: Address::ZERO,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

impl RingConfig {
    /// Create a config for `base` with default capacity and pacing.
    pub fn new(base: Address) -> Self {
        Self {
            base,
            ..Default::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(RingError::InvalidCapacity {
                capacity: self.cache_capacity,
            });
        }
        if self.interval_ms == 0 {
            return Err(RingError::InvalidInterval {
                interval_ms: self.interval_ms,
            });
        }
        Ok(())
    }
}

/// A running ring core: view + probe queue + supervised maintenance.
///
/// Must be started from within a Tokio runtime. The transport layer calls
/// [`RingService::add_peer`] / [`RingService::remove_peer`] as it learns
/// outcomes, and drains probes via [`RingService::take_probe`] (awaiting) or
/// [`RingService::take_probe_if_exists`] (polling).
pub struct RingService {
    view: SharedView,
    probes: ProbeQueue,
    shutdown: broadcast::Sender<()>,
    supervisor: JoinHandle<()>,
}

impl RingService {
    /// Validate `config`, build the view, and start the maintenance
    /// workers under their supervisor.
    pub fn start(config: RingConfig) -> Result<Self> {
        config.validate()?;
        info!(
            base = %config.base,
            cache_capacity = config.cache_capacity,
            interval_ms = config.interval_ms,
            "ring service starting"
        );

        let view = view::shared(RingView::new(config.base, config.cache_capacity));
        let (probe_tx, probes) = ProbeQueue::channel();
        let (shutdown, _) = broadcast::channel(1);
        let supervisor = maintenance::spawn_supervisor(
            view.clone(),
            probe_tx,
            Duration::from_millis(config.interval_ms),
            shutdown.clone(),
        );

        Ok(Self {
            view,
            probes,
            shutdown,
            supervisor,
        })
    }

    /// This node's own ring address.
    pub fn base(&self) -> Address {
        view::lock(&self.view).base()
    }

    /// A clone of the shared view handle, for callers that batch several
    /// operations under one lock acquisition.
    pub fn view(&self) -> SharedView {
        self.view.clone()
    }

    /// Record that a peer responded. See [`RingView::add_peer`].
    pub fn add_peer(&self, peer: AddressedPeer) -> bool {
        view::lock(&self.view).add_peer(peer)
    }

    /// Record that a peer is gone. See [`RingView::remove_peer`].
    pub fn remove_peer(&self, locator: &std::net::SocketAddr) -> Option<Address> {
        view::lock(&self.view).remove_peer(locator)
    }

    /// See [`RingView::routing_destination`].
    pub fn routing_destination(&self, target: Address) -> Option<AddressedPeer> {
        view::lock(&self.view).routing_destination(target)
    }

    /// See [`RingView::dominates`].
    pub fn dominates(&self, address: Address) -> bool {
        view::lock(&self.view).dominates(address)
    }

    /// See [`RingView::domain`].
    pub fn domain(&self) -> (Address, Address) {
        view::lock(&self.view).domain()
    }

    /// See [`RingView::successors`].
    pub fn successors(&self, max_hop: usize) -> Vec<AddressedPeer> {
        view::lock(&self.view).successors(max_hop)
    }

    /// See [`RingView::predecessors`].
    pub fn predecessors(&self, max_hop: usize) -> Vec<AddressedPeer> {
        view::lock(&self.view).predecessors(max_hop)
    }

    /// See [`RingView::fingers`].
    pub fn fingers(&self) -> Vec<AddressedPeer> {
        view::lock(&self.view).fingers()
    }

    /// See [`RingView::important_peers`].
    pub fn important_peers(&self) -> Vec<AddressedPeer> {
        view::lock(&self.view).important_peers()
    }

    /// See [`RingView::peers`].
    pub fn peers(&self) -> Vec<AddressedPeer> {
        view::lock(&self.view).peers()
    }

    /// See [`RingView::estimate_average_distance`].
    pub fn estimate_average_distance(&self) -> Option<Distance> {
        view::lock(&self.view).estimate_average_distance()
    }

    /// Number of cached peers.
    pub fn len(&self) -> usize {
        view::lock(&self.view).len()
    }

    /// Whether no peer is known.
    pub fn is_empty(&self) -> bool {
        view::lock(&self.view).is_empty()
    }

    /// Wait for the next outbound probe.
    pub async fn take_probe(&mut self) -> Option<ProbeRequest> {
        self.probes.take().await
    }

    /// Return the next outbound probe if one is queued, without waiting.
    pub fn take_probe_if_exists(&mut self) -> Option<ProbeRequest> {
        self.probes.take_if_exists()
    }

    /// Stop all maintenance workers and wait for the supervisor to exit.
    pub async fn shutdown(self) {
        info!("ring service stopping");
        let _ = self.shutdown.send(());
        let _ = self.supervisor.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn peer(address: u64, port: u16) -> AddressedPeer {
        AddressedPeer::new(Address(address), SocketAddr::from(([10, 0, 0, 3], port)))
    }

    #[test]
    fn test_config_validation() {
        assert!(RingConfig::new(Address(1)).validate().is_ok());

        let config = RingConfig {
            cache_capacity: 0,
            ..RingConfig::new(Address(1))
        };
        assert!(matches!(
            config.validate(),
            Err(RingError::InvalidCapacity { capacity: 0 })
        ));

        let config = RingConfig {
            interval_ms: 0,
            ..RingConfig::new(Address(1))
        };
        assert!(matches!(
            config.validate(),
            Err(RingError::InvalidInterval { interval_ms: 0 })
        ));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = RingConfig {
            cache_capacity: 0,
            ..RingConfig::new(Address(1))
        };
        assert!(RingService::start(config).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_facade_round_trip() {
        let service = RingService::start(RingConfig::new(Address(100))).expect("valid config");
        assert!(service.is_empty());
        assert_eq!(service.base(), Address(100));

        let p = peer(5000, 1);
        assert!(service.add_peer(p.clone()));
        assert!(!service.add_peer(p.clone()));
        assert_eq!(service.len(), 1);
        assert_eq!(service.successors(8), vec![p.clone()]);
        assert!(service.dominates(Address(200)));
        assert!(!service.dominates(Address(5000)));

        assert_eq!(service.remove_peer(&p.locator), Some(Address(5000)));
        assert!(service.is_empty());

        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_flow_through_facade() {
        let mut service =
            RingService::start(RingConfig::new(Address(0))).expect("valid config");
        service.add_peer(peer(1 << 30, 1));

        let probe = tokio::time::timeout(Duration::from_millis(1600), service.take_probe())
            .await
            .expect("maintenance must emit within 1.5 intervals")
            .expect("queue open");
        match probe {
            ProbeRequest::PeerAccess { peer } => {
                assert_eq!(peer.address, Address(1 << 30));
            }
            ProbeRequest::AddressAccess { target } => {
                assert_ne!(target, Address(0));
            }
        }

        service.shutdown().await;
    }
}
