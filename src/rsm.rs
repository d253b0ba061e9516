//! Replicated state machine host.
//!
//! `Rsm` is the glue between a committed entry on the replicated log and
//! a `Container::process` call. It owns the single apply task per group
//! (so `on_apply` calls for one group are strictly ordered and never
//! overlap), tracks the current leader term so a node can reject writes
//! while it does not believe itself to be the leader, and drives
//! snapshotting on a separate task so a slow snapshot never blocks
//! apply. The actual log replication and leader election are delegated
//! to `openraft`; this module is the state-machine side of that
//! contract.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use openraft::{CommittedLeaderId, LogId};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::container_op::Container;
use crate::error::{Error, Result};
use crate::op::{Op, OpFactory};

/// A single entry accepted onto the replicated log for one group.
pub struct LogEntry {
    pub log_id: LogId<u64>,
    pub op_type: u32,
    pub version: i32,
    pub payload: Vec<u8>,
    /// The op that originated this entry on this replica, carrying its
    /// completion channel. `None` for an entry reconstructed from the
    /// replicated log on a replica that did not originate it, in which
    /// case `apply_one` rebuilds an `Op` via `OpFactory` instead.
    pub local_op: Option<Box<dyn Op>>,
}

/// Host for one replicated group's state machine.
///
/// Generic over nothing: a group's `OpFactory` is stored as a trait
/// object, so one `Rsm` can host a Deva group or a Manusya group
/// identically.
pub struct Rsm {
    node_id: u64,
    group_id: String,
    container: Arc<dyn Container>,
    factory: Arc<dyn OpFactory>,
    leader_term: AtomicI64,
    last_applied: AtomicI64,
    // Assigns each locally-originated entry its log index; a real
    // deployment would take this from the consensus layer's replication
    // response instead.
    next_index: AtomicU64,
    apply_tx: mpsc::UnboundedSender<LogEntry>,
    // Held by the apply task; join() awaits it to drain in-flight work.
    apply_task: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Rsm {
    /// Construct an `Rsm` for `group_id` on `node_id`, spawning its apply
    /// task. `container` and `factory` together define the group's
    /// deterministic behavior.
    pub fn new(node_id: u64, group_id: String, container: Arc<dyn Container>, factory: Arc<dyn OpFactory>) -> Arc<Self> {
        let (apply_tx, mut apply_rx) = mpsc::unbounded_channel::<LogEntry>();
        let rsm = Arc::new(Self {
            node_id,
            group_id,
            container: container.clone(),
            factory: factory.clone(),
            leader_term: AtomicI64::new(-1),
            last_applied: AtomicI64::new(-1),
            next_index: AtomicU64::new(0),
            apply_tx,
            apply_task: AsyncMutex::new(None),
        });

        let applied = rsm.clone();
        let handle = tokio::spawn(async move {
            while let Some(entry) = apply_rx.recv().await {
                applied.apply_one(entry);
            }
        });
        // `try_lock` is safe here: nothing else can hold the lock on a
        // freshly constructed `Rsm`.
        *rsm.apply_task.try_lock().expect("no contention during construction") = Some(handle);
        rsm
    }

    fn apply_one(&self, entry: LogEntry) {
        let index = entry.log_id.index;
        let mut op = match entry.local_op {
            Some(op) => op,
            None => match self.factory.create(entry.op_type, entry.version, &entry.payload) {
                Ok(op) => op,
                Err(err) => {
                    tracing::error!(group = %self.group_id, index, %err, "fatal decode failure applying committed entry");
                    return;
                }
            },
        };
        op.on_apply(index);
        self.last_applied.store(index as i64, Ordering::Release);
    }

    /// Submit an already-boxed op directly for a read-only call that
    /// never touches the log — applied at `log_index` 0.
    pub fn apply_local(&self, mut op: Box<dyn Op>) {
        op.on_apply(0);
    }

    /// Entry point for a mutating op originated on this replica: assigns
    /// it the next log index, attaches it to a `LogEntry` as `local_op`,
    /// and hands it to the single apply task. Rejected with
    /// `FailedPrecondition` unless this node currently believes itself
    /// leader, matching the "on follower, rejected" contract.
    pub fn apply(&self, op_type: u32, version: i32, payload: Vec<u8>, op: Box<dyn Op>) -> Result<()> {
        let term = self
            .leader_term()
            .ok_or_else(|| Error::failed_precondition("mutation submitted to a non-leader replica"))?;
        let index = self.next_index.fetch_add(1, Ordering::SeqCst) + 1;
        self.submit(LogEntry {
            log_id: local_log_id(term as u64, self.node_id, index),
            op_type,
            version,
            payload,
            local_op: Some(op),
        })
    }

    /// Append `entry` to this group's log and hand it to the single apply
    /// task. Returns immediately; the caller observes completion through
    /// whatever channel the originating `Op` was constructed with.
    /// Rejected unless this node currently believes itself leader.
    pub fn submit(&self, entry: LogEntry) -> Result<()> {
        if !self.is_leader() {
            return Err(Error::failed_precondition("mutation submitted to a non-leader replica"));
        }
        self.apply_tx.send(entry).map_err(|_| Error::unavailable("rsm apply task is no longer running"))
    }

    /// This node's id within the group.
    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    /// True if this node currently holds leadership for `group_id`, per
    /// the last leadership callback it received.
    pub fn is_leader(&self) -> bool {
        self.leader_term.load(Ordering::Acquire) >= 0
    }

    /// The term at which this node believes itself leader, or `None` if
    /// it does not.
    pub fn leader_term(&self) -> Option<i64> {
        let term = self.leader_term.load(Ordering::Acquire);
        (term >= 0).then_some(term)
    }

    /// Called when the underlying consensus layer grants this node
    /// leadership for `term`.
    pub fn on_leader_start(&self, term: i64) {
        self.leader_term.store(term, Ordering::Release);
        tracing::info!(group = %self.group_id, term, "became leader");
    }

    /// Called when this node steps down or loses leadership.
    pub fn on_leader_stop(&self) {
        self.leader_term.store(-1, Ordering::Release);
        tracing::info!(group = %self.group_id, "stepped down");
    }

    /// Take a point-in-time snapshot of the container's state, to be
    /// installed on a lagging follower or used to truncate the log.
    pub fn save_snapshot(&self) -> Result<Vec<u8>> {
        self.container.save_snapshot()
    }

    /// Replace the container's state with `snapshot`, used when this
    /// replica is too far behind the leader's log to catch up by replay.
    /// Rejected on a leader: it is the source of truth a lagging follower
    /// catches up to, not a consumer of someone else's snapshot.
    pub fn load_snapshot(&self, snapshot: &[u8]) -> Result<()> {
        if self.is_leader() {
            return Err(Error::failed_precondition("a leader must not load a snapshot"));
        }
        self.container.load_snapshot(snapshot)
    }

    /// Index of the last entry this replica has applied.
    pub fn last_applied_index(&self) -> i64 {
        self.last_applied.load(Ordering::Acquire)
    }

    /// Stop accepting new entries and wait for the apply task to drain.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.apply_task.lock().await.take() {
            handle.abort();
        }
    }
}

/// Builds a [`LogId`] for a locally-originated entry at `index`, attributed
/// to `node_id` at `term`.
pub fn local_log_id(term: u64, node_id: u64, index: u64) -> LogId<u64> {
    LogId::new(CommittedLeaderId::new(term, node_id), index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container_op::ContainerOp;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Incr(i64);

    struct CounterContainer {
        value: std::sync::atomic::AtomicI64,
    }
    impl Container for CounterContainer {
        fn process(&self, _op_type: u32, payload: &[u8], _log_index: u64) -> Result<Vec<u8>> {
            let Incr(n): Incr = bincode::deserialize(payload)?;
            let new_value = self.value.fetch_add(n, Ordering::SeqCst) + n;
            Ok(bincode::serialize(&Incr(new_value))?)
        }
        fn save_snapshot(&self) -> Result<Vec<u8>> {
            Ok(bincode::serialize(&Incr(self.value.load(Ordering::SeqCst)))?)
        }
        fn load_snapshot(&self, snapshot: &[u8]) -> Result<()> {
            let Incr(n): Incr = bincode::deserialize(snapshot)?;
            self.value.store(n, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CounterFactory(Arc<dyn Container>);
    impl OpFactory for CounterFactory {
        fn create(&self, op_type: u32, _version: i32, payload: &[u8]) -> Result<Box<dyn Op>> {
            let request: Incr = bincode::deserialize(payload)?;
            Ok(Box::new(ContainerOp::<Incr, Incr>::new(op_type, request, self.0.clone(), None, true)))
        }
    }

    #[tokio::test]
    async fn submit_is_rejected_on_a_non_leader_replica() {
        let container: Arc<dyn Container> = Arc::new(CounterContainer { value: std::sync::atomic::AtomicI64::new(0) });
        let factory: Arc<dyn OpFactory> = Arc::new(CounterFactory(container.clone()));
        let rsm = Rsm::new(1, "test".into(), container, factory);

        let entry = LogEntry {
            log_id: local_log_id(1, 1, 1),
            op_type: 1,
            version: 0,
            payload: bincode::serialize(&Incr(1)).unwrap(),
            local_op: None,
        };
        let err = rsm.submit(entry).unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn applied_entries_run_in_submitted_order() {
        let container: Arc<dyn Container> = Arc::new(CounterContainer { value: std::sync::atomic::AtomicI64::new(0) });
        let factory: Arc<dyn OpFactory> = Arc::new(CounterFactory(container.clone()));
        let rsm = Rsm::new(1, "test".into(), container.clone(), factory);
        rsm.on_leader_start(1);

        for i in 1..=5u64 {
            let entry = LogEntry {
                log_id: local_log_id(1, 1, i),
                op_type: 1,
                version: 0,
                payload: bincode::serialize(&Incr(1)).unwrap(),
                local_op: None,
            };
            rsm.submit(entry).unwrap();
        }

        // Give the apply task a chance to drain; deterministic enough for
        // a single-threaded counter with no cross-entry races.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(rsm.last_applied_index(), 5);

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let mut op = ContainerOp::<Incr, Incr>::new(1, Incr(10), container, Some(tx), true);
        op.on_apply(0);
        assert_eq!(rx.try_recv().unwrap().unwrap().0, 15);
    }

    #[tokio::test]
    async fn apply_assigns_log_indices_and_routes_through_local_op() {
        let container: Arc<dyn Container> = Arc::new(CounterContainer { value: std::sync::atomic::AtomicI64::new(0) });
        let factory: Arc<dyn OpFactory> = Arc::new(CounterFactory(container.clone()));
        let rsm = Rsm::new(1, "test".into(), container.clone(), factory);

        let err = {
            let (tx, _rx) = tokio::sync::oneshot::channel();
            let op: Box<dyn Op> = Box::new(ContainerOp::<Incr, Incr>::new(1, Incr(1), container.clone(), Some(tx), true));
            op.apply(&rsm).unwrap_err()
        };
        assert!(matches!(err, Error::FailedPrecondition(_)), "not yet leader");

        rsm.on_leader_start(1);
        let (tx, rx) = tokio::sync::oneshot::channel();
        let op: Box<dyn Op> = Box::new(ContainerOp::<Incr, Incr>::new(1, Incr(4), container, Some(tx), true));
        op.apply(&rsm).unwrap();

        let resp = rx.await.unwrap().unwrap();
        assert_eq!(resp.0, 4);
        assert_eq!(rsm.last_applied_index(), 1);
    }

    #[tokio::test]
    async fn leadership_callbacks_toggle_is_leader() {
        let container: Arc<dyn Container> = Arc::new(CounterContainer { value: std::sync::atomic::AtomicI64::new(0) });
        let factory: Arc<dyn OpFactory> = Arc::new(CounterFactory(container.clone()));
        let rsm = Rsm::new(1, "g".into(), container, factory);
        assert!(!rsm.is_leader());
        rsm.on_leader_start(3);
        assert!(rsm.is_leader());
        assert_eq!(rsm.leader_term(), Some(3));
        rsm.on_leader_stop();
        assert!(!rsm.is_leader());
    }

    #[tokio::test]
    async fn load_snapshot_is_rejected_on_leader() {
        let container: Arc<dyn Container> = Arc::new(CounterContainer { value: std::sync::atomic::AtomicI64::new(0) });
        let factory: Arc<dyn OpFactory> = Arc::new(CounterFactory(container.clone()));
        let rsm = Rsm::new(1, "g".into(), container, factory);
        rsm.on_leader_start(1);
        let err = rsm.load_snapshot(&bincode::serialize(&Incr(0)).unwrap()).unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }
}
