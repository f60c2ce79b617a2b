//! Sync engine
//!
//! A single actor consumes the fan-in channel of every relay subscription,
//! so events are decoded and applied one at a time in arrival order.
//!
//! # Architecture
//!
//! ```text
//! relay A ──┐
//! relay B ──┼── Subscriber::subscribe_all ── mpsc (bounded) ──> SyncActor
//! relay C ──┘                                                   │
//!                                   decode ─> reducer::apply ─> LedgerStore
//!                                                               │
//!                                           watch<Option<StableReport>>
//! ```
//!
//! The stable point is reached once every relay has finished sending stored
//! events (or closed), or when the wait bound elapses, whichever comes first.
//! It is signalled exactly once; the actor keeps applying live events after
//! that until cancelled.

use crate::codec::{self, LogEvent};
use crate::metrics::Metrics;
use crate::observer::{StableReport, WalletObserver};
use crate::reducer::{self, Applied};
use crate::signer::Signer;
use crate::store::LedgerStore;
use crate::{Error, Result};
use parking_lot::RwLock;
use relay_bus::{Inbound, RelayMessage, RelayUrl, SignedEvent, Subscriber};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Shared state the actor writes into
#[derive(Clone)]
pub struct SyncContext {
    /// Ledger snapshot
    pub store: Arc<RwLock<LedgerStore>>,

    /// Owner key for decryption
    pub signer: Arc<dyn Signer>,

    /// Reporter
    pub observer: Arc<dyn WalletObserver>,

    /// Metrics
    pub metrics: Metrics,
}

/// Single consumer of relay messages
pub struct SyncActor {
    ctx: SyncContext,

    /// Fan-in of every relay subscription
    inbound: mpsc::Receiver<Inbound>,

    /// Relays that have not finished sending stored events
    pending: BTreeSet<RelayUrl>,

    /// Relays that have
    responded: Vec<RelayUrl>,

    stable_timeout: Duration,
    stable_tx: watch::Sender<Option<StableReport>>,
    cancel: CancellationToken,
}

impl SyncActor {
    /// Create new actor
    pub fn new(
        ctx: SyncContext,
        inbound: mpsc::Receiver<Inbound>,
        relays: &[RelayUrl],
        stable_timeout: Duration,
        stable_tx: watch::Sender<Option<StableReport>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            inbound,
            pending: relays.iter().cloned().collect(),
            responded: Vec::new(),
            stable_timeout,
            stable_tx,
            cancel,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let deadline = tokio::time::sleep(self.stable_timeout);
        tokio::pin!(deadline);

        if self.pending.is_empty() {
            self.declare_stable();
        }

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("Sync cancelled");
                    break;
                }

                _ = &mut deadline, if !self.is_stable() => {
                    warn!(
                        pending = ?self.pending.iter().map(RelayUrl::short).collect::<Vec<_>>(),
                        timeout_ms = self.stable_timeout.as_millis() as u64,
                        "Relays did not finish in time, declaring stable"
                    );
                    self.declare_stable();
                }

                message = self.inbound.recv() => match message {
                    Some(Inbound { relay, message }) => self.handle_message(relay, message).await,
                    None => {
                        // Every relay task has finished
                        if !self.is_stable() {
                            self.declare_stable();
                        }
                        debug!("All subscriptions ended");
                        break;
                    }
                },
            }
        }
    }

    async fn handle_message(&mut self, relay: RelayUrl, message: RelayMessage) {
        match message {
            RelayMessage::Event(event) => self.handle_event(&relay, event).await,
            RelayMessage::EndOfStoredEvents => {
                debug!(relay = %relay, "End of stored events");
                self.mark_responded(relay);
            }
            RelayMessage::Closed(reason) => {
                debug!(relay = %relay, "Subscription closed: {}", reason);
                self.mark_responded(relay);
            }
        }
    }

    async fn handle_event(&mut self, relay: &RelayUrl, event: SignedEvent) {
        if self.ctx.store.read().is_seen(&event.id) {
            trace!(relay = %relay, event_id = %event.id, "Duplicate event");
            self.ctx.metrics.record_duplicate();
            return;
        }

        let decoded = codec::decode(&event, self.ctx.signer.as_ref()).await;
        self.apply_decoded(relay, &event, decoded);
    }

    fn apply_decoded(&self, relay: &RelayUrl, event: &SignedEvent, decoded: Result<LogEvent>) {
        match decoded {
            Ok(log_event) => {
                let (applied, balance) = {
                    let mut store = self.ctx.store.write();
                    let applied = reducer::apply(&mut store, &log_event);
                    (applied, store.balance())
                };

                if applied == Applied::Duplicate {
                    self.ctx.metrics.record_duplicate();
                    return;
                }

                self.ctx.metrics.record_applied();
                self.ctx.metrics.update_balance(balance);
                self.ctx.observer.on_event_applied(event, None);
            }
            Err(e) => {
                if !self.ctx.store.write().mark_seen(&event.id) {
                    self.ctx.metrics.record_duplicate();
                    return;
                }

                warn!(relay = %relay, event_id = %event.id, "Dropping log event: {}", e);
                self.ctx.metrics.record_dropped();
                self.ctx.observer.on_event_applied(event, Some(&e));
            }
        }
    }

    fn mark_responded(&mut self, relay: RelayUrl) {
        if !self.pending.remove(&relay) {
            return;
        }
        self.responded.push(relay);

        if self.pending.is_empty() && !self.is_stable() {
            self.declare_stable();
        }
    }

    fn is_stable(&self) -> bool {
        self.stable_tx.borrow().is_some()
    }

    fn declare_stable(&mut self) {
        let (events_seen, balance) = {
            let store = self.ctx.store.read();
            (store.seen_count(), store.balance())
        };

        let report = StableReport {
            responded: self.responded.clone(),
            timed_out: self.pending.iter().cloned().collect(),
            events_seen,
            balance,
        };

        info!(
            responded = report.responded.len(),
            timed_out = report.timed_out.len(),
            events = events_seen,
            balance,
            "Ledger stable"
        );

        self.ctx.metrics.update_balance(balance);
        self.ctx.observer.on_stable(&report);
        self.stable_tx.send_replace(Some(report));
    }
}

/// Handle to a running sync actor
#[derive(Debug)]
pub struct SyncHandle {
    stable: watch::Receiver<Option<StableReport>>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Wait for the stable point
    ///
    /// Fails if the actor stopped (session closed) before reaching it.
    pub async fn wait_stable(&self) -> Result<StableReport> {
        let mut stable = self.stable.clone();
        let report = stable
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::Concurrency("Sync stopped before the ledger was stable".to_string()))?
            .clone();

        report.ok_or_else(|| Error::Concurrency("Stable signal without report".to_string()))
    }

    /// Report, if the stable point was already reached
    pub fn stable_report(&self) -> Option<StableReport> {
        self.stable.borrow().clone()
    }

    /// Wait for the actor task to finish
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Concurrency(format!("Sync task failed: {}", e)))
    }
}

/// Subscribe to the owner's wallet log and spawn the actor
pub fn spawn_sync(
    ctx: SyncContext,
    subscriber: &Subscriber,
    relays: &[RelayUrl],
    stable_timeout: Duration,
    cancel: CancellationToken,
) -> SyncHandle {
    let owner = ctx.signer.public_key();
    let targets: Vec<RelayUrl> = relays
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let inbound = subscriber.subscribe_all(&targets, codec::log_filter(&owner), &cancel);
    let (stable_tx, stable_rx) = watch::channel(None);

    let actor = SyncActor::new(ctx, inbound, &targets, stable_timeout, stable_tx, cancel);
    let task = tokio::spawn(actor.run());

    SyncHandle {
        stable: stable_rx,
        task,
    }
}
