//! Publish fan-out
//!
//! One event goes to N relays concurrently. Every relay yields exactly one
//! [`PublishOutcome`] unless the fan-out is cancelled first, in which case the
//! stream simply ends early: events already accepted by a relay stay published.

use crate::{
    event::SignedEvent,
    pool::RelayPool,
    types::{kind, PublishOutcome, PublishReport, RelayUrl},
    Error,
};
use futures::{Stream, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Per-relay publish timeout
    pub publish_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            publish_timeout: Duration::from_secs(5),
        }
    }
}

/// Stream of per-relay outcomes, in completion order
pub type PublishStream = ReceiverStream<PublishOutcome>;

/// Event publisher
#[derive(Clone)]
pub struct Publisher {
    pool: Arc<dyn RelayPool>,
    config: PublisherConfig,
}

impl Publisher {
    /// Create new publisher
    pub fn new(pool: Arc<dyn RelayPool>, config: PublisherConfig) -> Self {
        Self { pool, config }
    }

    /// Publisher configuration
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Publish `event` to every relay concurrently
    ///
    /// Duplicate relay URLs are sent to once.
    pub fn publish_many(
        &self,
        event: SignedEvent,
        relays: &[RelayUrl],
        cancel: &CancellationToken,
    ) -> PublishStream {
        let targets: BTreeSet<RelayUrl> = relays.iter().cloned().collect();
        let (tx, rx) = mpsc::channel(targets.len().max(1));
        let event = Arc::new(event);

        info!(
            event_id = %event.id,
            kind = kind::label(event.kind),
            relays = targets.len(),
            "Publishing event"
        );

        for relay in targets {
            let pool = Arc::clone(&self.pool);
            let event = Arc::clone(&event);
            let tx = tx.clone();
            let cancel = cancel.clone();
            let timeout = self.config.publish_timeout;

            tokio::spawn(async move {
                let start = Instant::now();
                let attempt = tokio::time::timeout(timeout, pool.publish(&relay, &event));

                let result = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(relay = %relay, "Publish cancelled");
                        return;
                    }
                    result = attempt => result,
                };

                let outcome = match result {
                    Ok(Ok(())) => {
                        debug!(relay = %relay, elapsed = ?start.elapsed(), "Relay accepted event");
                        PublishOutcome::ok(relay)
                    }
                    Ok(Err(e)) => {
                        warn!(relay = %relay, "Publish failed: {}", e);
                        PublishOutcome::failed(relay, e.to_string())
                    }
                    Err(_) => {
                        let e = Error::Timeout(timeout.as_millis() as u64);
                        warn!(relay = %relay, "Publish failed: {}", e);
                        PublishOutcome::failed(relay, e.to_string())
                    }
                };

                // Receiver gone means the caller stopped listening; nothing to undo.
                let _ = tx.send(outcome).await;
            });
        }

        ReceiverStream::new(rx)
    }

    /// Publish and drain the outcome stream into a report
    ///
    /// `on_outcome` sees every outcome as it arrives.
    pub async fn publish_and_collect<F>(
        &self,
        event: SignedEvent,
        relays: &[RelayUrl],
        cancel: &CancellationToken,
        on_outcome: F,
    ) -> PublishReport
    where
        F: FnMut(&PublishOutcome),
    {
        collect_report(self.publish_many(event, relays, cancel), on_outcome).await
    }
}

/// Drain an outcome stream until exhaustion
pub async fn collect_report<S, F>(stream: S, mut on_outcome: F) -> PublishReport
where
    S: Stream<Item = PublishOutcome>,
    F: FnMut(&PublishOutcome),
{
    let mut report = PublishReport::default();
    futures::pin_mut!(stream);

    while let Some(outcome) = stream.next().await {
        on_outcome(&outcome);
        report.push(outcome);
    }

    report
}
