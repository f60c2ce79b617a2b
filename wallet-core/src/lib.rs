//! Nutsack Wallet Core
//!
//! Ecash wallet whose ledger lives on relays as an encrypted event log.
//!
//! # Architecture
//!
//! - **Event Sourcing**: the ledger is rebuilt from the owner's wallet events
//! - **Single Consumer**: one sync actor applies inbound events in order
//! - **Stable Barrier**: reads are trustworthy once every relay answered or
//!   the wait bound elapsed
//! - **Fan-out**: mutations publish to every relay and report per relay
//!
//! # Invariants
//!
//! - Balance is always the sum of live tokens
//! - Re-applying an event is a no-op
//! - A retired token never comes back, whatever the arrival order
//! - Spending conserves value: inputs = sent + change + fees

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod mint;
pub mod observer;
pub mod reducer;
pub mod select;
pub mod signer;
pub mod store;
pub mod sync;
pub mod token;
pub mod types;
pub mod wallet;

// Re-exports
pub use config::Config;
pub use discovery::{Discovery, Profile};
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use mint::{MeltQuote, MeltResult, MintClient, SwapOutput};
pub use observer::{
    ChannelObserver, NoopObserver, StableReport, TracingObserver, WalletNotice, WalletObserver,
};
pub use signer::Signer;
pub use store::LedgerStore;
pub use types::{Direction, HistoryEntry, MintUrl, NutzapInfo, Proof, Token, TokenId, TokenOrigin};
pub use wallet::{
    Collaborators, NutzapOptions, NutzapResult, PayOptions, PayResult, ReceiveOptions,
    ReceiveResult, SendOptions, SendResult, Wallet,
};
