//! In-process relay pool
//!
//! Keeps one event list per relay URL and forwards published events to live
//! subscriptions. Relay behaviour can be degraded per URL to exercise partial
//! failure paths.

use crate::{
    event::{Filter, SignedEvent},
    pool::{EventStream, RelayPool},
    types::{RelayMessage, RelayUrl},
    Error, Result,
};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// How a relay responds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayBehavior {
    /// Accepts publishes and serves subscriptions
    #[default]
    Online,
    /// Refuses every request
    Offline,
    /// Never answers: publishes hang, subscriptions stay silent
    Stalled,
    /// Serves stored events but never signals their end
    NoEndOfStored,
}

#[derive(Default)]
struct RelayState {
    behavior: RelayBehavior,
    events: Vec<SignedEvent>,
    subscribers: Vec<(Filter, mpsc::UnboundedSender<RelayMessage>)>,
    publishes: usize,
}

/// Relay pool backed by process memory
#[derive(Default)]
pub struct MemoryRelayPool {
    relays: Mutex<HashMap<RelayUrl, RelayState>>,
}

impl MemoryRelayPool {
    /// Create empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Change how `relay` responds from now on
    pub fn set_behavior(&self, relay: &RelayUrl, behavior: RelayBehavior) {
        self.relays.lock().entry(relay.clone()).or_default().behavior = behavior;
    }

    /// Store an event without going through `publish`
    pub fn seed(&self, relay: &RelayUrl, event: SignedEvent) {
        let mut relays = self.relays.lock();
        store_event(relays.entry(relay.clone()).or_default(), event);
    }

    /// Events currently stored on `relay`
    pub fn stored(&self, relay: &RelayUrl) -> Vec<SignedEvent> {
        self.relays
            .lock()
            .get(relay)
            .map(|state| state.events.clone())
            .unwrap_or_default()
    }

    /// Number of publish attempts `relay` received
    pub fn publish_count(&self, relay: &RelayUrl) -> usize {
        self.relays.lock().get(relay).map_or(0, |state| state.publishes)
    }

    fn behavior(&self, relay: &RelayUrl) -> RelayBehavior {
        self.relays
            .lock()
            .get(relay)
            .map(|state| state.behavior)
            .unwrap_or_default()
    }
}

/// Insert keeping relay semantics: ids are unique and replaceable kinds
/// (10000..20000) keep only the newest event per author.
fn store_event(state: &mut RelayState, event: SignedEvent) -> bool {
    if state.events.iter().any(|e| e.id == event.id) {
        return false;
    }

    if (10_000..20_000).contains(&event.kind) {
        let newer_exists = state.events.iter().any(|e| {
            e.kind == event.kind && e.pubkey == event.pubkey && e.created_at > event.created_at
        });
        if newer_exists {
            return false;
        }
        state
            .events
            .retain(|e| !(e.kind == event.kind && e.pubkey == event.pubkey));
    }

    state.events.push(event);
    true
}

#[async_trait]
impl RelayPool for MemoryRelayPool {
    async fn subscribe(&self, relay: &RelayUrl, filter: Filter) -> Result<EventStream> {
        match self.behavior(relay) {
            RelayBehavior::Offline => {
                return Err(Error::Connection(format!("{} is unreachable", relay)))
            }
            RelayBehavior::Stalled => return Ok(futures::stream::pending().boxed()),
            RelayBehavior::Online | RelayBehavior::NoEndOfStored => {}
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut relays = self.relays.lock();
        let state = relays.entry(relay.clone()).or_default();

        let mut stored: Vec<&SignedEvent> =
            state.events.iter().filter(|e| filter.matches(e)).collect();
        stored.sort_by_key(|e| e.created_at);
        if let Some(limit) = filter.limit {
            let skip = stored.len().saturating_sub(limit);
            stored.drain(..skip);
        }

        for event in stored {
            let _ = tx.send(RelayMessage::Event(event.clone()));
        }
        if state.behavior != RelayBehavior::NoEndOfStored {
            let _ = tx.send(RelayMessage::EndOfStoredEvents);
        }

        state.subscribers.push((filter, tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn publish(&self, relay: &RelayUrl, event: &SignedEvent) -> Result<()> {
        match self.behavior(relay) {
            RelayBehavior::Offline => {
                return Err(Error::Publish(format!("{} refused the event", relay)))
            }
            RelayBehavior::Stalled => futures::future::pending::<()>().await,
            RelayBehavior::Online | RelayBehavior::NoEndOfStored => {}
        }

        if !event.verify_id() {
            return Err(Error::InvalidEvent(format!("bad id {}", event.id)));
        }

        let mut relays = self.relays.lock();
        let state = relays.entry(relay.clone()).or_default();
        state.publishes += 1;

        if store_event(state, event.clone()) {
            state.subscribers.retain(|(filter, tx)| {
                !filter.matches(event) || tx.send(RelayMessage::Event(event.clone())).is_ok()
            });
        }

        Ok(())
    }
}
