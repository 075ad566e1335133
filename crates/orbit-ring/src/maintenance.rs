//! Periodic ring maintenance.
//!
//! Three workers keep the view honest while peers churn:
//!
//! - The **successor stabilizer** re-verifies a random successor each round.
//! - The **finger stabilizer** re-verifies a random finger peer each round.
//! - The **finger digger** finds distance levels no finger covers yet and
//!   asks the transport to discover a peer near `base + 2^level`.
//!
//! Workers never touch the network. They emit [`ProbeRequest`]s onto an
//! unbounded queue; the transport layer drains the queue, performs the I/O,
//! and feeds outcomes back into the view (`add_peer` on success or
//! discovery, `remove_peer` on failure).
//!
//! A supervisor launches the workers and restarts any that fails, reusing
//! the worker's constructor closure. Restart is immediate: a failure is
//! uncorrelated with the next round's inputs (peer selection is random), so
//! backing off buys nothing. Workers exit cleanly when the shutdown
//! broadcast fires or when the probe queue's consumer is gone.

use std::collections::HashSet;
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::address::Address;
use crate::peer::AddressedPeer;
use crate::view::{self, SharedView};
use crate::RING_BITS;

/// A unit of work for the transport layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeRequest {
    /// Contact this known peer. On success, call `add_peer` with its
    /// (possibly updated) address; on failure, call `remove_peer`.
    PeerAccess {
        /// The peer to contact.
        peer: AddressedPeer,
    },
    /// Discover some live peer whose address is near `target`, typically by
    /// routing a lookup through the network, and `add_peer` the result.
    AddressAccess {
        /// The ring address to resolve.
        target: Address,
    },
}

/// Producer half of the probe queue.
pub(crate) type ProbeSender = mpsc::UnboundedSender<ProbeRequest>;

/// Consumer handle for the outbound probe queue. Production is FIFO; the
/// transport is expected to drain it continuously.
pub struct ProbeQueue {
    rx: mpsc::UnboundedReceiver<ProbeRequest>,
}

impl ProbeQueue {
    /// Create the queue, returning the producer and consumer halves.
    pub(crate) fn channel() -> (ProbeSender, ProbeQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, ProbeQueue { rx })
    }

    /// Wait for the next probe. `None` once every producer is gone.
    pub async fn take(&mut self) -> Option<ProbeRequest> {
        self.rx.recv().await
    }

    /// Return the next probe if one is already queued, without waiting.
    pub fn take_if_exists(&mut self) -> Option<ProbeRequest> {
        self.rx.try_recv().ok()
    }
}

/// Identifies a maintenance worker in supervisor reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerKind {
    SuccessorStabilizer,
    FingerStabilizer,
    FingerDigger,
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkerKind::SuccessorStabilizer => "successor-stabilizer",
            WorkerKind::FingerStabilizer => "finger-stabilizer",
            WorkerKind::FingerDigger => "finger-digger",
        };
        f.write_str(name)
    }
}

/// A worker crash, reported to the supervisor's inbox.
#[derive(Debug)]
struct WorkerReport {
    kind: WorkerKind,
    cause: String,
}

/// Constructor closure the supervisor re-invokes to (re)start a worker.
type WorkerFactory = Box<dyn Fn() -> JoinHandle<()> + Send>;

/// Launch the supervisor and its three workers. Every worker is running
/// (and subscribed to the shutdown broadcast) before this returns, so a
/// shutdown sent immediately afterwards is never missed. The returned join
/// handle resolves after the shutdown broadcast fires.
pub(crate) fn spawn_supervisor(
    view: SharedView,
    probes: ProbeSender,
    interval: Duration,
    shutdown: broadcast::Sender<()>,
) -> JoinHandle<()> {
    let workers: Vec<(WorkerKind, WorkerFactory)> = [
        WorkerKind::SuccessorStabilizer,
        WorkerKind::FingerStabilizer,
        WorkerKind::FingerDigger,
    ]
    .into_iter()
    .map(|kind| {
        let view = view.clone();
        let probes = probes.clone();
        let shutdown = shutdown.clone();
        let factory: WorkerFactory = Box::new(move || {
            tokio::spawn(worker_loop(
                kind,
                view.clone(),
                probes.clone(),
                interval,
                shutdown.subscribe(),
            ))
        });
        (kind, factory)
    })
    .collect();

    let (reports_tx, reports_rx) = mpsc::unbounded_channel();
    for (kind, factory) in &workers {
        Supervisor::launch(*kind, factory, &reports_tx);
    }
    let supervisor = Supervisor {
        workers,
        shutdown: shutdown.subscribe(),
        reports_tx,
        reports_rx,
    };
    tokio::spawn(supervisor.run())
}

/// Minimal supervision tree: workers report crashes (never normal values)
/// to a shared inbox, and the supervisor's only decision is which
/// constructor to re-invoke.
struct Supervisor {
    workers: Vec<(WorkerKind, WorkerFactory)>,
    shutdown: broadcast::Receiver<()>,
    reports_tx: mpsc::UnboundedSender<WorkerReport>,
    reports_rx: mpsc::UnboundedReceiver<WorkerReport>,
}

impl Supervisor {
    async fn run(mut self) {
        debug!("maintenance supervisor running");
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    debug!("maintenance supervisor stopping");
                    return;
                }
                report = self.reports_rx.recv() => {
                    let Some(report) = report else { return };
                    match self.workers.iter().find(|(kind, _)| *kind == report.kind) {
                        Some((kind, factory)) => {
                            warn!(
                                worker = %report.kind,
                                cause = %report.cause,
                                "maintenance worker failed; restarting"
                            );
                            Self::launch(*kind, factory, &self.reports_tx);
                        }
                        None => {
                            warn!(worker = %report.kind, "report names no known worker; ignored");
                        }
                    }
                }
            }
        }
    }

    /// Start a worker and a monitor that forwards its crash, if any, to the
    /// report inbox. A clean exit (shutdown, queue teardown) is not
    /// reported.
    fn launch(kind: WorkerKind, factory: &WorkerFactory, reports: &mpsc::UnboundedSender<WorkerReport>) {
        let handle = factory();
        let reports = reports.clone();
        tokio::spawn(async move {
            if let Err(join_error) = handle.await {
                if join_error.is_panic() {
                    let _ = reports.send(WorkerReport {
                        kind,
                        cause: join_error.to_string(),
                    });
                }
            }
        });
    }
}

async fn worker_loop(
    kind: WorkerKind,
    view: SharedView,
    probes: ProbeSender,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    debug!(worker = %kind, "maintenance worker started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.recv() => {
                debug!(worker = %kind, "maintenance worker stopped");
                return;
            }
        }
        let emitted = match kind {
            WorkerKind::SuccessorStabilizer => stabilize_successor(&view, &probes),
            WorkerKind::FingerStabilizer => stabilize_finger(&view, &probes),
            WorkerKind::FingerDigger => dig_finger(&view, &probes),
        };
        if emitted.is_err() {
            // The queue's consumer is gone; the node is tearing down.
            debug!(worker = %kind, "probe queue closed; maintenance worker stopped");
            return;
        }
    }
}

type EmitResult = std::result::Result<(), mpsc::error::SendError<ProbeRequest>>;

/// Pick one known successor uniformly at random and ask the transport to
/// verify it is still alive.
fn stabilize_successor(view: &SharedView, probes: &ProbeSender) -> EmitResult {
    let candidates = view::lock(view).successors(usize::MAX);
    if let Some(peer) = candidates.choose(&mut rand::thread_rng()) {
        debug!(peer = %peer.address, "probing successor");
        probes.send(ProbeRequest::PeerAccess { peer: peer.clone() })?;
    }
    Ok(())
}

/// Pick one finger peer uniformly at random and ask the transport to verify
/// it is still alive.
fn stabilize_finger(view: &SharedView, probes: &ProbeSender) -> EmitResult {
    let candidates = view::lock(view).fingers();
    if let Some(peer) = candidates.choose(&mut rand::thread_rng()) {
        debug!(peer = %peer.address, "probing finger");
        probes.send(ProbeRequest::PeerAccess { peer: peer.clone() })?;
    }
    Ok(())
}

/// Find a distance level no finger covers yet, between the level of the
/// estimated average peer spacing and the full ring, and ask the transport
/// to discover a peer near `base + 2^level`. Levels below the average
/// spacing are the successor list's job, not the finger table's.
fn dig_finger(view: &SharedView, probes: &ProbeSender) -> EmitResult {
    let (base, start_level, covered) = {
        let view = view::lock(view);
        let Some(average) = view.estimate_average_distance() else {
            // No successor, no density estimate, and no peer to route a
            // discovery through: skip the round.
            return Ok(());
        };
        let base = view.base();
        let covered: HashSet<u32> = view
            .fingers()
            .iter()
            .map(|peer| base.distance_to(peer.address).level())
            .collect();
        (base, average.level(), covered)
    };

    let uncovered: Vec<u32> = (start_level..=RING_BITS)
        .filter(|level| !covered.contains(level))
        .collect();
    if let Some(&level) = uncovered.choose(&mut rand::thread_rng()) {
        // A full revolution wraps to the base itself; aim just short of it.
        let target = if level == RING_BITS {
            base.predecessor()
        } else {
            base.add_power_of_two(level)
        };
        debug!(level, target = %target, "digging for finger");
        probes.send(ProbeRequest::AddressAccess { target })?;
    }
    Ok(())
}
