//! Relay bus
//!
//! Relay-facing plumbing for the wallet:
//! - Signed event envelope and subscription filters
//! - `RelayPool` collaborator trait (subscribe / publish / query)
//! - Subscription fan-in: one task per relay, one consumer channel
//! - Publish fan-out with per-relay outcomes and cancellation
//! - In-process pool for tests and local tooling

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod event;
pub mod memory;
pub mod pool;
pub mod publisher;
pub mod subscriber;
pub mod types;

pub use error::{Error, Result};
pub use event::{Filter, SignedEvent, UnsignedEvent};
pub use memory::{MemoryRelayPool, RelayBehavior};
pub use pool::{EventStream, RelayPool};
pub use publisher::{Publisher, PublisherConfig};
pub use subscriber::{Inbound, Subscriber, SubscriberConfig};
pub use types::{kind, PublishOutcome, PublishReport, RelayMessage, RelayUrl};
pub use tokio_util::sync::CancellationToken;
