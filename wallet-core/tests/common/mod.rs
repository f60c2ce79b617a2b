//! Shared fixtures for wallet integration tests
//!
//! Everything runs in process: relays are a [`MemoryRelayPool`], the mint
//! keeps its spent set in memory and the signer "encrypts" with base64.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use relay_bus::{MemoryRelayPool, RelayUrl, SignedEvent, UnsignedEvent};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wallet_core::mint::{MeltQuote, MeltResult, MintClient, SwapOutput};
use wallet_core::types::{proofs_amount, split_amount};
use wallet_core::{
    Collaborators, Config, Discovery, Error, MintUrl, Profile, Proof, Result, Signer, Token, Wallet,
    WalletObserver,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn mint_url(name: &str) -> MintUrl {
    MintUrl::new(format!("https://{}.mint.test", name))
}

fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// Wallet key for `name`, as 64 hex chars
pub fn wallet_key(name: &str) -> String {
    sha256_hex(format!("wallet-key-{}", name))
}

/// Deterministic owner key; content is wrapped, not really encrypted
#[derive(Debug)]
pub struct TestSigner {
    name: String,
    pubkey: String,
    refuse_signing: AtomicBool,
}

impl TestSigner {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            pubkey: sha256_hex(name),
            refuse_signing: AtomicBool::new(false),
        })
    }

    /// Make every later `sign` call fail
    pub fn set_refuse_signing(&self, refuse: bool) {
        self.refuse_signing.store(refuse, Ordering::SeqCst);
    }

    fn envelope_prefix(&self) -> String {
        format!("{}:", &self.pubkey[..8])
    }
}

#[async_trait]
impl Signer for TestSigner {
    fn public_key(&self) -> String {
        self.pubkey.clone()
    }

    async fn sign(&self, event: UnsignedEvent) -> Result<SignedEvent> {
        if self.refuse_signing.load(Ordering::SeqCst) {
            return Err(Error::Signer("signing refused".to_string()));
        }
        Ok(event.into_signed(format!("sig-{}", self.name)))
    }

    async fn encrypt(&self, plaintext: &str) -> Result<String> {
        Ok(format!("{}{}", self.envelope_prefix(), STANDARD.encode(plaintext)))
    }

    async fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let body = ciphertext
            .strip_prefix(&self.envelope_prefix())
            .ok_or_else(|| Error::Signer("not addressed to this key".to_string()))?;
        let bytes = STANDARD
            .decode(body)
            .map_err(|e| Error::Signer(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| Error::Signer(e.to_string()))
    }

    fn derive_public_key(&self, private_key: &str) -> Result<String> {
        let bytes = hex::decode(private_key).map_err(|e| Error::Signer(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(Error::Signer("private key must be 32 bytes".to_string()));
        }
        Ok(format!("02{}", sha256_hex(bytes)))
    }
}

#[derive(Default)]
struct MintState {
    counter: u64,
    spent: HashSet<String>,
    invoices: HashMap<String, u64>,
    quotes: HashMap<String, u64>,
    fee_reserve: u64,
    fee_charged: u64,
    offline: HashSet<MintUrl>,
    fail_melts: bool,
    swaps: usize,
    transfers: usize,
    melts: usize,
}

impl MintState {
    fn issue(&mut self, amount: u64, lock_to: Option<&str>) -> Vec<Proof> {
        split_amount(amount)
            .into_iter()
            .map(|denomination| self.proof(denomination, lock_to))
            .collect()
    }

    fn proof(&mut self, amount: u64, lock_to: Option<&str>) -> Proof {
        self.counter += 1;
        let nonce = hex::encode(rand::random::<[u8; 32]>());
        let secret = match lock_to {
            Some(pubkey) => format!(r#"["P2PK",{{"nonce":"{}","data":"{}"}}]"#, nonce, pubkey),
            None => nonce,
        };
        Proof::new(amount, "00testkeyset", secret, format!("02{:062x}", self.counter))
    }

    /// Mark proofs spent, returning their value
    fn redeem(&mut self, mint: &MintUrl, proofs: &[Proof]) -> Result<u64> {
        if self.offline.contains(mint) {
            return Err(Error::mint_unavailable(mint, "connection refused"));
        }
        if let Some(spent) = proofs.iter().find(|p| self.spent.contains(&p.secret)) {
            return Err(Error::mint_unavailable(
                mint,
                format!("proof {} already spent", spent.secret),
            ));
        }
        for proof in proofs {
            self.spent.insert(proof.secret.clone());
        }
        Ok(proofs_amount(proofs))
    }
}

/// In-memory mint serving every mint url
#[derive(Default)]
pub struct TestMint {
    state: Mutex<MintState>,
}

impl TestMint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fresh token with exactly these denominations
    pub fn issue(&self, mint: &MintUrl, amounts: &[u64]) -> Token {
        let mut state = self.state.lock();
        let proofs = amounts.iter().map(|&a| state.proof(a, None)).collect();
        Token::new(mint.clone(), proofs)
    }

    /// Fresh token encoded for `Wallet::receive`
    pub fn issue_encoded(&self, mint: &MintUrl, amounts: &[u64]) -> String {
        wallet_core::token::encode(&self.issue(mint, amounts)).expect("token encodes")
    }

    pub fn add_invoice(&self, invoice: &str, amount: u64) {
        self.state.lock().invoices.insert(invoice.to_string(), amount);
    }

    pub fn set_fee_reserve(&self, fee_reserve: u64) {
        self.state.lock().fee_reserve = fee_reserve;
    }

    pub fn set_fee_charged(&self, fee: u64) {
        self.state.lock().fee_charged = fee;
    }

    pub fn set_offline(&self, mint: &MintUrl, offline: bool) {
        let mut state = self.state.lock();
        if offline {
            state.offline.insert(mint.clone());
        } else {
            state.offline.remove(mint);
        }
    }

    pub fn fail_melts(&self, fail: bool) {
        self.state.lock().fail_melts = fail;
    }

    pub fn is_spent(&self, proof: &Proof) -> bool {
        self.state.lock().spent.contains(&proof.secret)
    }

    pub fn swap_count(&self) -> usize {
        self.state.lock().swaps
    }

    pub fn transfer_count(&self) -> usize {
        self.state.lock().transfers
    }

    pub fn melt_count(&self) -> usize {
        self.state.lock().melts
    }
}

#[async_trait]
impl MintClient for TestMint {
    async fn swap(
        &self,
        mint: &MintUrl,
        proofs: Vec<Proof>,
        amount: u64,
        lock_to: Option<&str>,
    ) -> Result<SwapOutput> {
        let mut state = self.state.lock();
        let total = proofs_amount(&proofs);
        if amount > total {
            return Err(Error::mint_unavailable(mint, "swap outputs exceed inputs"));
        }
        state.redeem(mint, &proofs)?;
        state.swaps += 1;

        Ok(SwapOutput {
            send: state.issue(amount, lock_to),
            keep: state.issue(total - amount, None),
        })
    }

    async fn transfer(&self, from: &MintUrl, to: &MintUrl, proofs: Vec<Proof>) -> Result<Vec<Proof>> {
        let mut state = self.state.lock();
        if state.offline.contains(to) {
            return Err(Error::mint_unavailable(to, "connection refused"));
        }
        let total = state.redeem(from, &proofs)?;
        state.transfers += 1;
        Ok(state.issue(total, None))
    }

    async fn melt_quote(&self, mint: &MintUrl, invoice: &str) -> Result<MeltQuote> {
        let mut state = self.state.lock();
        if state.offline.contains(mint) {
            return Err(Error::mint_unavailable(mint, "connection refused"));
        }
        let amount = *state
            .invoices
            .get(invoice)
            .ok_or_else(|| Error::mint_unavailable(mint, "unknown invoice"))?;

        state.counter += 1;
        let quote_id = format!("quote-{}", state.counter);
        state.quotes.insert(quote_id.clone(), amount);

        Ok(MeltQuote {
            quote_id,
            amount,
            fee_reserve: state.fee_reserve,
        })
    }

    async fn melt(&self, mint: &MintUrl, quote: &MeltQuote, proofs: Vec<Proof>) -> Result<MeltResult> {
        let mut state = self.state.lock();
        if state.fail_melts {
            return Err(Error::mint_unavailable(mint, "lightning payment failed"));
        }
        if !state.quotes.contains_key(&quote.quote_id) {
            return Err(Error::mint_unavailable(mint, "unknown quote"));
        }
        let paid = proofs_amount(&proofs);
        let fee = state.fee_charged.min(quote.fee_reserve);
        if paid < quote.amount + fee {
            return Err(Error::mint_unavailable(mint, "not enough inputs"));
        }
        state.redeem(mint, &proofs)?;
        state.melts += 1;

        Ok(MeltResult {
            preimage: sha256_hex(&quote.quote_id),
            change: state.issue(paid - quote.amount - fee, None),
        })
    }
}

/// Profiles and relay lists keyed by name and public key
#[derive(Default)]
pub struct TestDiscovery {
    profiles: Mutex<HashMap<String, Profile>>,
    outbox: Mutex<HashMap<String, Vec<RelayUrl>>>,
    inbox: Mutex<HashMap<String, Vec<RelayUrl>>>,
}

impl TestDiscovery {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, name: &str, pubkey: &str, outbox: Vec<RelayUrl>, inbox: Vec<RelayUrl>) {
        let profile = Profile {
            pubkey: pubkey.to_string(),
            display_name: Some(name.to_string()),
        };
        let mut profiles = self.profiles.lock();
        profiles.insert(name.to_string(), profile.clone());
        profiles.insert(pubkey.to_string(), profile);
        self.outbox.lock().insert(pubkey.to_string(), outbox);
        self.inbox.lock().insert(pubkey.to_string(), inbox);
    }
}

#[async_trait]
impl Discovery for TestDiscovery {
    async fn resolve_profile(&self, query: &str) -> Result<Profile> {
        self.profiles
            .lock()
            .get(query)
            .cloned()
            .ok_or_else(|| Error::Discovery(format!("unknown profile {}", query)))
    }

    async fn outbox_relays(&self, pubkey: &str, limit: usize) -> Result<Vec<RelayUrl>> {
        Ok(self
            .outbox
            .lock()
            .get(pubkey)
            .map(|relays| relays.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn inbox_relays(&self, pubkey: &str) -> Result<Vec<RelayUrl>> {
        Ok(self.inbox.lock().get(pubkey).cloned().unwrap_or_default())
    }
}

/// Relays, mint and discovery shared by every wallet in a test
pub struct TestEnvironment {
    pub pool: Arc<MemoryRelayPool>,
    pub mint: Arc<TestMint>,
    pub discovery: Arc<TestDiscovery>,
    pub relays: Vec<RelayUrl>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_relay_count(3)
    }

    pub fn with_relay_count(count: usize) -> Self {
        init_tracing();
        Self {
            pool: Arc::new(MemoryRelayPool::new()),
            mint: TestMint::new(),
            discovery: TestDiscovery::new(),
            relays: (0..count)
                .map(|i| RelayUrl::new(format!("wss://relay-{}.test", i)))
                .collect(),
        }
    }

    pub fn config(&self) -> Config {
        let mut config = Config::with_relays(self.relays.iter().cloned());
        config.sync.stable_timeout_ms = 2_000;
        config.publish.timeout_ms = 500;
        config
    }

    pub fn collaborators(&self, signer: &Arc<TestSigner>) -> Collaborators {
        Collaborators::new(
            signer.clone(),
            self.pool.clone(),
            self.mint.clone(),
            self.discovery.clone(),
        )
    }

    /// Open a session and wait for the initial replay
    pub async fn open(&self, signer: &Arc<TestSigner>) -> Wallet {
        self.open_with(self.config(), self.collaborators(signer)).await
    }

    pub async fn open_observed(
        &self,
        signer: &Arc<TestSigner>,
        observer: Arc<dyn WalletObserver>,
    ) -> Wallet {
        self.open_with(self.config(), self.collaborators(signer).with_observer(observer))
            .await
    }

    pub async fn open_with(&self, config: Config, collaborators: Collaborators) -> Wallet {
        let wallet = Wallet::open(config, collaborators)
            .await
            .expect("wallet opens");
        wallet.stable().await.expect("wallet reaches stable");
        wallet
    }

    /// Session trusting `mint` and holding one token per denomination list
    pub async fn funded(&self, signer: &Arc<TestSigner>, mint: &MintUrl, tokens: &[&[u64]]) -> Wallet {
        let wallet = self.open(signer).await;
        wallet
            .add_mints([mint.clone()])
            .await
            .expect("mint added");
        for amounts in tokens {
            wallet
                .receive(&self.mint.issue_encoded(mint, amounts), Default::default())
                .await
                .expect("token received");
        }
        wallet
    }

    /// Events of `kind` stored on `relay`
    pub fn stored_of_kind(&self, relay: &RelayUrl, kind: u16) -> Vec<SignedEvent> {
        self.pool
            .stored(relay)
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }
}
