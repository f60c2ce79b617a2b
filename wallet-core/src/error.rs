//! Error types for the wallet

use crate::types::MintUrl;
use thiserror::Error;

/// Result type for wallet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wallet errors
#[derive(Error, Debug)]
pub enum Error {
    /// Token string could not be parsed
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Amount is zero or otherwise unusable
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Not enough value in any single mint
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Amount asked for
        requested: u64,
        /// Largest amount held in one eligible mint
        available: u64,
    },

    /// No subset of the proofs adds up to the target; the mint must reissue
    #[error("No exact split for {0}")]
    NoExactSplit(u64),

    /// Mint is not trusted or not reachable as a destination
    #[error("Untrusted mint: {0}")]
    UntrustedMint(String),

    /// A private key is already registered
    #[error("Private key already set")]
    KeyAlreadySet,

    /// Operation needs a wallet private key
    #[error("Missing private key")]
    MissingPrivateKey,

    /// Mint round-trip failed
    #[error("Mint unavailable ({mint}): {reason}")]
    MintUnavailable {
        /// Mint that failed
        mint: MintUrl,
        /// Failure detail
        reason: String,
    },

    /// Relay round-trip failed
    #[error("Relay unavailable: {0}")]
    RelayUnavailable(String),

    /// Log event could not be decrypted or decoded
    #[error("Malformed log event {event_id}: {reason}")]
    MalformedLogEvent {
        /// Offending event id
        event_id: String,
        /// Failure detail
        reason: String,
    },

    /// Signer refused or failed
    #[error("Signer error: {0}")]
    Signer(String),

    /// Profile or relay discovery failed
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Relay bus error
    #[error("Relay error: {0}")]
    Relay(#[from] relay_bus::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Concurrency error (sync actor gone, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Transient, per-endpoint failures
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::MintUnavailable { .. } | Error::RelayUnavailable(_) | Error::Relay(_)
        )
    }

    /// Build a `MalformedLogEvent`
    pub fn malformed(event_id: impl Into<String>, reason: impl ToString) -> Self {
        Error::MalformedLogEvent {
            event_id: event_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a `MintUnavailable`
    pub fn mint_unavailable(mint: &MintUrl, reason: impl ToString) -> Self {
        Error::MintUnavailable {
            mint: mint.clone(),
            reason: reason.to_string(),
        }
    }
}
