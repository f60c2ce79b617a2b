//! Reporter hooks
//!
//! Observers are called inline from the sync actor and the publish path, so
//! they must return quickly and never block.

use crate::Error;
use relay_bus::{kind, PublishOutcome, RelayUrl, SignedEvent};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Summary handed out when the ledger reaches the stable point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StableReport {
    /// Relays that finished sending stored events (or closed)
    pub responded: Vec<RelayUrl>,

    /// Relays still pending when the wait bound elapsed
    pub timed_out: Vec<RelayUrl>,

    /// Distinct events processed before the stable point
    pub events_seen: usize,

    /// Balance at the stable point
    pub balance: u64,
}

/// Receives wallet progress notifications
pub trait WalletObserver: Send + Sync {
    /// An inbound log event was applied, or dropped with `error`
    fn on_event_applied(&self, _event: &SignedEvent, _error: Option<&Error>) {}

    /// One relay answered a publish of an event of `kind`
    fn on_publish_result(&self, _kind: u16, _outcome: &PublishOutcome) {}

    /// The ledger reached the stable point
    fn on_stable(&self, _report: &StableReport) {}
}

/// Ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl WalletObserver for NoopObserver {}

/// Logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl WalletObserver for TracingObserver {
    fn on_event_applied(&self, event: &SignedEvent, error: Option<&Error>) {
        match error {
            None => info!(event_id = %event.id, kind = kind::label(event.kind), "Processed event"),
            Some(e) => warn!(event_id = %event.id, kind = kind::label(event.kind), "Error processing event: {}", e),
        }
    }

    fn on_publish_result(&self, event_kind: u16, outcome: &PublishOutcome) {
        match &outcome.error {
            None => info!(relay = %outcome.relay.short(), kind = kind::label(event_kind), "Saved"),
            Some(e) => warn!(relay = %outcome.relay.short(), kind = kind::label(event_kind), "Save failed: {}", e),
        }
    }

    fn on_stable(&self, report: &StableReport) {
        info!(
            responded = report.responded.len(),
            timed_out = report.timed_out.len(),
            balance = report.balance,
            "Wallet stable"
        );
    }
}

/// Notification forwarded by [`ChannelObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletNotice {
    /// Inbound event processed
    EventApplied {
        /// Event id
        event_id: String,
        /// Event kind
        kind: u16,
        /// Drop reason, if the event was rejected
        error: Option<String>,
    },

    /// Publish outcome
    Published {
        /// Event kind
        kind: u16,
        /// Relay result
        outcome: PublishOutcome,
    },

    /// Stable point reached
    Stable(StableReport),
}

/// Forwards notifications into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<WalletNotice>,
}

impl ChannelObserver {
    /// Create observer and the receiving end
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WalletNotice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, notice: WalletNotice) {
        // Receiver dropped: nobody is listening anymore.
        let _ = self.sender.send(notice);
    }
}

impl WalletObserver for ChannelObserver {
    fn on_event_applied(&self, event: &SignedEvent, error: Option<&Error>) {
        self.send(WalletNotice::EventApplied {
            event_id: event.id.clone(),
            kind: event.kind,
            error: error.map(ToString::to_string),
        });
    }

    fn on_publish_result(&self, kind: u16, outcome: &PublishOutcome) {
        self.send(WalletNotice::Published {
            kind,
            outcome: outcome.clone(),
        });
    }

    fn on_stable(&self, report: &StableReport) {
        self.send(WalletNotice::Stable(report.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_bus::UnsignedEvent;

    #[test]
    fn test_channel_observer_forwards() {
        let (observer, mut rx) = ChannelObserver::new();
        let event = UnsignedEvent::new("ab", kind::TOKEN, vec![], "x").into_signed("sig");

        observer.on_event_applied(&event, Some(&Error::malformed(&event.id, "bad json")));
        observer.on_publish_result(kind::TOKEN, &PublishOutcome::ok(RelayUrl::new("wss://r")));
        observer.on_stable(&StableReport::default());

        match rx.try_recv().unwrap() {
            WalletNotice::EventApplied { error, .. } => assert!(error.unwrap().contains("bad json")),
            other => panic!("unexpected notice {:?}", other),
        }
        assert!(matches!(rx.try_recv().unwrap(), WalletNotice::Published { .. }));
        assert!(matches!(rx.try_recv().unwrap(), WalletNotice::Stable(_)));
    }

    #[test]
    fn test_dropped_receiver_does_not_panic() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.on_stable(&StableReport::default());
    }
}
