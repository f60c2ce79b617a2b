//! Relay pool collaborator
//!
//! The pool owns connections; this crate only subscribes, publishes and
//! queries through it.

use crate::{
    event::{Filter, SignedEvent},
    types::{RelayMessage, RelayUrl},
    Error, Result,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};

/// Lazy, unbounded sequence of messages from one relay subscription
pub type EventStream = BoxStream<'static, RelayMessage>;

/// Upper bound for a single relay answering a one-shot query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool shared by the wallet
#[async_trait]
pub trait RelayPool: Send + Sync {
    /// Open a subscription on one relay
    ///
    /// The stream ends when the relay drops the subscription; reopening is
    /// the only way to restart it.
    async fn subscribe(&self, relay: &RelayUrl, filter: Filter) -> Result<EventStream>;

    /// Publish one event to one relay
    async fn publish(&self, relay: &RelayUrl, event: &SignedEvent) -> Result<()>;

    /// Newest stored event matching `filter` across `relays`
    ///
    /// Relays that fail or stall are skipped; an error is returned only when
    /// no relay answered at all.
    async fn query_single(
        &self,
        filter: Filter,
        relays: &[RelayUrl],
    ) -> Result<Option<SignedEvent>> {
        let queries = relays.iter().map(|relay| {
            let filter = filter.clone();
            async move {
                let result =
                    tokio::time::timeout(DEFAULT_QUERY_TIMEOUT, stored_events(self, relay, filter))
                        .await
                        .map_err(|_| Error::Timeout(DEFAULT_QUERY_TIMEOUT.as_millis() as u64))
                        .and_then(|r| r);
                (relay, result)
            }
        });

        let mut answered = false;
        let mut newest: Option<SignedEvent> = None;

        for (relay, result) in futures::future::join_all(queries).await {
            match result {
                Ok(events) => {
                    answered = true;
                    for event in events {
                        if newest.as_ref().map_or(true, |best| is_newer(&event, best)) {
                            newest = Some(event);
                        }
                    }
                }
                Err(e) => warn!(relay = %relay, "Query failed: {}", e),
            }
        }

        if !answered && !relays.is_empty() {
            return Err(Error::Connection("no relay answered the query".to_string()));
        }

        Ok(newest)
    }
}

/// Collect stored events until end-of-stored-events
async fn stored_events<P>(pool: &P, relay: &RelayUrl, filter: Filter) -> Result<Vec<SignedEvent>>
where
    P: RelayPool + ?Sized,
{
    let mut stream = pool.subscribe(relay, filter.clone()).await?;
    let mut events = Vec::new();

    while let Some(message) = stream.next().await {
        match message {
            RelayMessage::Event(event) if filter.matches(&event) => events.push(event),
            RelayMessage::Event(_) => {}
            RelayMessage::EndOfStoredEvents => break,
            RelayMessage::Closed(reason) => {
                debug!(relay = %relay, "Query closed: {}", reason);
                break;
            }
        }
    }

    Ok(events)
}

/// Newer by timestamp; equal timestamps resolve to the smaller id
fn is_newer(candidate: &SignedEvent, current: &SignedEvent) -> bool {
    (candidate.created_at, std::cmp::Reverse(&candidate.id))
        > (current.created_at, std::cmp::Reverse(&current.id))
}
