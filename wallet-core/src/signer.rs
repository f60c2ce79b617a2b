//! Signing and encryption capability of the ledger owner

use crate::Result;
use async_trait::async_trait;
use relay_bus::{SignedEvent, UnsignedEvent};

/// Key holder for the ledger owner
///
/// Wallet events are encrypted to the owner's own key, so `encrypt` and
/// `decrypt` take no counterparty.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Owner public key (hex)
    fn public_key(&self) -> String;

    /// Produce id and signature for an event
    async fn sign(&self, event: UnsignedEvent) -> Result<SignedEvent>;

    /// Encrypt wallet content to the owner
    async fn encrypt(&self, plaintext: &str) -> Result<String>;

    /// Decrypt wallet content addressed to the owner
    async fn decrypt(&self, ciphertext: &str) -> Result<String>;

    /// Public key for a wallet private key (used in nutzap info)
    fn derive_public_key(&self, private_key: &str) -> Result<String>;
}
