//! Subscription fan-in
//!
//! Opens one task per relay and funnels everything into a single bounded
//! channel so a single consumer can apply events in arrival order.

use crate::{
    event::Filter,
    pool::RelayPool,
    types::{RelayMessage, RelayUrl},
};
use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Capacity of the shared inbound channel
    pub channel_capacity: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

/// Message tagged with the relay it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Source relay
    pub relay: RelayUrl,

    /// What the relay sent
    pub message: RelayMessage,
}

/// Relay subscriber
#[derive(Clone)]
pub struct Subscriber {
    pool: Arc<dyn RelayPool>,
    config: SubscriberConfig,
}

impl Subscriber {
    /// Create new subscriber
    pub fn new(pool: Arc<dyn RelayPool>, config: SubscriberConfig) -> Self {
        Self { pool, config }
    }

    /// Subscribe to `filter` on every relay
    ///
    /// A relay that cannot be subscribed to, or whose subscription ends,
    /// yields a final [`RelayMessage::Closed`]. All tasks stop on `cancel`.
    pub fn subscribe_all(
        &self,
        relays: &[RelayUrl],
        filter: Filter,
        cancel: &CancellationToken,
    ) -> mpsc::Receiver<Inbound> {
        let targets: BTreeSet<RelayUrl> = relays.iter().cloned().collect();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        info!(relays = targets.len(), kinds = ?filter.kinds, "Opening subscriptions");

        for relay in targets {
            let pool = Arc::clone(&self.pool);
            let filter = filter.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();

            tokio::spawn(async move {
                forward(pool, relay, filter, tx, cancel).await;
            });
        }

        rx
    }
}

async fn forward(
    pool: Arc<dyn RelayPool>,
    relay: RelayUrl,
    filter: Filter,
    tx: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        opened = pool.subscribe(&relay, filter) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            warn!(relay = %relay, "Subscription failed: {}", e);
            let _ = tx
                .send(Inbound {
                    relay,
                    message: RelayMessage::Closed(e.to_string()),
                })
                .await;
            return;
        }
    };

    debug!(relay = %relay, "Subscription open");

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(relay = %relay, "Subscription cancelled");
                return;
            }
            next = stream.next() => next,
        };

        let message = match next {
            Some(message) => message,
            None => RelayMessage::Closed("subscription ended".to_string()),
        };
        let closed = matches!(message, RelayMessage::Closed(_));

        let sent = tokio::select! {
            _ = cancel.cancelled() => return,
            sent = tx.send(Inbound { relay: relay.clone(), message }) => sent,
        };

        if sent.is_err() || closed {
            return;
        }
    }
}
