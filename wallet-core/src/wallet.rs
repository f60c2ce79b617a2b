//! Wallet session
//!
//! Ties the sync actor, the ledger store and the collaborators together into
//! the public API. Mutations are serialized on one operation lock, apply
//! their own log events locally before publishing them, and return results
//! computed locally.
//!
//! # Example
//!
//! ```no_run
//! use wallet_core::{Collaborators, Config, SendOptions, Wallet};
//!
//! async fn run(collaborators: Collaborators) -> wallet_core::Result<()> {
//!     let config = Config::with_relays(["wss://relay.example"]);
//!     let wallet = Wallet::open(config, collaborators).await?;
//!     wallet.stable().await?;
//!
//!     let sent = wallet.send(21, SendOptions::default()).await?;
//!     println!("{}", sent.token);
//!
//!     wallet.close().await
//! }
//! ```

use crate::codec::{self, LogEntry, LogEvent, NutzapDraft};
use crate::discovery::{Discovery, Profile};
use crate::metrics::Metrics;
use crate::mint::{MeltQuote, MintClient};
use crate::observer::{StableReport, TracingObserver, WalletObserver};
use crate::reducer;
use crate::select::{cover_with_tokens, select_proofs};
use crate::signer::Signer;
use crate::store::{LedgerStore, MintList};
use crate::sync::{spawn_sync, SyncContext, SyncHandle};
use crate::token;
use crate::types::{
    proofs_amount, Direction, HistoryEntry, MintUrl, NutzapInfo, Proof, Token, TokenId, TokenOrigin,
};
use crate::{Config, Error, Result};
use chrono::Utc;
use parking_lot::RwLock;
use relay_bus::{
    kind, CancellationToken, Filter, PublishReport, Publisher, RelayPool, RelayUrl, SignedEvent,
    Subscriber,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::DropGuard;
use tracing::{debug, error, info, warn};

/// External capabilities a wallet session needs
#[derive(Clone)]
pub struct Collaborators {
    /// Owner key holder
    pub signer: Arc<dyn Signer>,

    /// Relay connections
    pub pool: Arc<dyn RelayPool>,

    /// Mint operations
    pub mint: Arc<dyn MintClient>,

    /// Profile and relay lookups
    pub discovery: Arc<dyn Discovery>,

    /// Progress reporter
    pub observer: Arc<dyn WalletObserver>,
}

impl Collaborators {
    /// Bundle collaborators; progress is logged through `tracing`
    pub fn new(
        signer: Arc<dyn Signer>,
        pool: Arc<dyn RelayPool>,
        mint: Arc<dyn MintClient>,
        discovery: Arc<dyn Discovery>,
    ) -> Self {
        Self {
            signer,
            pool,
            mint,
            discovery,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the progress reporter
    pub fn with_observer(mut self, observer: Arc<dyn WalletObserver>) -> Self {
        self.observer = observer;
        self
    }
}

/// Options for [`Wallet::receive`]
#[derive(Debug, Clone, Default)]
pub struct ReceiveOptions {
    /// Mint to end up holding the value in
    pub destination: Option<MintUrl>,
}

/// Options for [`Wallet::send`]
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Spend from this mint only
    pub mint: Option<MintUrl>,

    /// Lock the sent proofs to this public key
    pub lock_to: Option<String>,
}

/// Options for [`Wallet::pay_bolt11`]
#[derive(Debug, Clone, Default)]
pub struct PayOptions {
    /// Pay from this mint only
    pub mint: Option<MintUrl>,
}

/// Options for [`Wallet::send_nutzap`]
#[derive(Debug, Clone, Default)]
pub struct NutzapOptions {
    /// Message attached to the nutzap
    pub note: String,

    /// Event being zapped
    pub event_id: Option<String>,

    /// Send from this mint only (must be accepted by the recipient)
    pub mint: Option<MintUrl>,
}

/// Result of [`Wallet::receive`]
#[derive(Debug, Clone)]
pub struct ReceiveResult {
    /// Value added to the wallet
    pub amount: u64,

    /// Mint now holding the value
    pub mint: MintUrl,

    /// Stored token
    pub token_id: TokenId,

    /// Publish outcomes of the ledger events
    pub outcomes: PublishReport,
}

/// Result of [`Wallet::send`]
#[derive(Debug, Clone)]
pub struct SendResult {
    /// Encoded token for the recipient
    pub token: String,

    /// Value sent
    pub amount: u64,

    /// Mint the value came from
    pub mint: MintUrl,

    /// Publish outcomes of the ledger events
    pub outcomes: PublishReport,
}

/// Result of [`Wallet::pay_bolt11`]
#[derive(Debug, Clone)]
pub struct PayResult {
    /// Payment preimage
    pub preimage: String,

    /// Invoice amount
    pub amount: u64,

    /// Routing fee actually kept by the mint
    pub fee_paid: u64,

    /// Mint that paid
    pub mint: MintUrl,

    /// Publish outcomes of the ledger events
    pub outcomes: PublishReport,
}

/// Result of [`Wallet::send_nutzap`]
#[derive(Debug, Clone)]
pub struct NutzapResult {
    /// Recipient
    pub recipient: Profile,

    /// Value sent
    pub amount: u64,

    /// Mint the proofs belong to
    pub mint: MintUrl,

    /// Published nutzap event id
    pub event_id: String,

    /// Publish outcomes of the nutzap event
    pub outcomes: PublishReport,

    /// Publish outcomes of the ledger events
    pub ledger_outcomes: PublishReport,
}

/// Tokens picked to fund a spend
struct Spend {
    mint: MintUrl,
    inputs: Vec<TokenId>,
    proofs: Vec<Proof>,
}

/// Wallet session for one ledger owner
pub struct Wallet {
    config: Config,
    signer: Arc<dyn Signer>,
    pool: Arc<dyn RelayPool>,
    mint: Arc<dyn MintClient>,
    discovery: Arc<dyn Discovery>,
    observer: Arc<dyn WalletObserver>,
    store: Arc<RwLock<LedgerStore>>,
    metrics: Metrics,
    publisher: Publisher,

    /// Serializes mutations
    op_lock: Mutex<()>,

    sync: SyncHandle,
    cancel: CancellationToken,
    _shutdown: DropGuard,
}

impl Wallet {
    /// Open a session and start syncing the owner's wallet log
    ///
    /// Returns immediately; use [`Wallet::stable`] to wait for the initial
    /// replay.
    pub async fn open(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let Collaborators {
            signer,
            pool,
            mint,
            discovery,
            observer,
        } = collaborators;

        let metrics = Metrics::new().map_err(|e| Error::Other(format!("metrics: {}", e)))?;
        let store = Arc::new(RwLock::new(LedgerStore::new()));
        let cancel = CancellationToken::new();

        let subscriber = Subscriber::new(Arc::clone(&pool), config.subscriber_config());
        let sync = spawn_sync(
            SyncContext {
                store: Arc::clone(&store),
                signer: Arc::clone(&signer),
                observer: Arc::clone(&observer),
                metrics: metrics.clone(),
            },
            &subscriber,
            &config.relays,
            config.stable_timeout(),
            cancel.clone(),
        );

        info!(
            owner = %signer.public_key(),
            relays = config.relays.len(),
            "Opened wallet"
        );

        Ok(Self {
            publisher: Publisher::new(Arc::clone(&pool), config.publisher_config()),
            config,
            signer,
            pool,
            mint,
            discovery,
            observer,
            store,
            metrics,
            op_lock: Mutex::new(()),
            sync,
            _shutdown: cancel.clone().drop_guard(),
            cancel,
        })
    }

    /// Wait until the initial replay is done (or the wait bound elapsed)
    pub async fn stable(&self) -> Result<StableReport> {
        self.sync.wait_stable().await
    }

    /// Stop syncing and wait for the actor to finish
    pub async fn close(self) -> Result<()> {
        let Wallet { sync, cancel, .. } = self;
        cancel.cancel();
        sync.join().await?;
        debug!("Wallet closed");
        Ok(())
    }

    // Read API

    /// Sum of all live tokens
    pub fn balance(&self) -> u64 {
        self.store.read().balance()
    }

    /// Live value per mint
    pub fn balance_by_mint(&self) -> BTreeMap<MintUrl, u64> {
        self.store.read().balance_by_mint()
    }

    /// Trusted mints
    pub fn mints(&self) -> Vec<MintUrl> {
        self.store.read().mints().to_vec()
    }

    /// Live tokens
    pub fn tokens(&self) -> Vec<Token> {
        self.store.read().tokens().map(|(_, t)| t.clone()).collect()
    }

    /// Spending history, oldest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.store.read().history().cloned().collect()
    }

    /// Whether a wallet private key is registered
    pub fn private_key_set(&self) -> bool {
        self.store.read().private_key().is_some()
    }

    /// Latest nutzap info published by the owner
    pub fn nutzap_info(&self) -> Option<NutzapInfo> {
        self.store.read().nutzap_info().cloned()
    }

    /// Session metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Owner relays
    pub fn relays(&self) -> &[RelayUrl] {
        &self.config.relays
    }

    // Mutations

    /// Add value from an encoded token
    pub async fn receive(&self, encoded: &str, options: ReceiveOptions) -> Result<ReceiveResult> {
        let incoming = token::decode(encoded)?;
        let _guard = self.op_lock.lock().await;

        let destination = {
            let store = self.store.read();
            if incoming.proofs.iter().any(|proof| store.knows_proof(&proof.secret)) {
                return Err(Error::InvalidToken("proofs already in the wallet".to_string()));
            }
            if store.balance().checked_add(incoming.amount()).is_none() {
                return Err(Error::InvalidToken("amount overflows the balance".to_string()));
            }

            match options.destination {
                Some(destination) if !store.is_trusted(&destination) => {
                    return Err(Error::UntrustedMint(destination.to_string()))
                }
                Some(destination) => destination,
                None if store.is_trusted(&incoming.mint) => incoming.mint.clone(),
                None => store
                    .mints()
                    .first()
                    .cloned()
                    .ok_or_else(|| Error::UntrustedMint(incoming.mint.to_string()))?,
            }
        };

        let proofs = if destination == incoming.mint {
            incoming.proofs
        } else {
            info!(from = %incoming.mint, to = %destination, "Moving received value between mints");
            self.mint
                .transfer(&incoming.mint, &destination, incoming.proofs)
                .await
                .map_err(|e| {
                    Error::UntrustedMint(format!(
                        "cannot move value from {} to {}: {}",
                        incoming.mint, destination, e
                    ))
                })?
        };

        let received = Token::new(destination.clone(), proofs);
        let token_id = received.id();
        let amount = received.amount();

        {
            let store = self.store.read();
            if store.token(&token_id).is_some() || store.is_tombstoned(&token_id) {
                return Err(Error::InvalidToken("token already in the wallet".to_string()));
            }
        }

        let events = self
            .record(vec![
                LogEntry::Token {
                    token: received,
                    origin: TokenOrigin::Received,
                    retired: vec![],
                },
                LogEntry::History(HistoryEntry {
                    direction: Direction::In,
                    amount,
                    mint: Some(destination.clone()),
                    created: vec![token_id.clone()],
                    destroyed: vec![],
                }),
            ])
            .await?;

        info!(amount, mint = %destination.short(), "Received");
        let outcomes = self.broadcast(events, &self.config.relays).await;

        Ok(ReceiveResult {
            amount,
            mint: destination,
            token_id,
            outcomes,
        })
    }

    /// Take `amount` out of the wallet as an encoded token
    ///
    /// Once the mint has swapped the inputs the spend is settled in this
    /// session even if the log records cannot be signed.
    pub async fn send(&self, amount: u64, options: SendOptions) -> Result<SendResult> {
        if amount == 0 {
            return Err(Error::InvalidAmount("cannot send 0".to_string()));
        }
        let _guard = self.op_lock.lock().await;

        let spend = self.gather_inputs(amount, options.mint.as_ref())?;
        let (send, keep) = self.split(&spend, amount, options.lock_to.as_deref()).await?;

        let events = self.record_spend(spend_entries(&spend, keep, amount)).await?;
        let encoded = token::encode(&Token::new(spend.mint.clone(), send))?;

        info!(amount, mint = %spend.mint.short(), "Sent");
        let outcomes = self.broadcast(events, &self.config.relays).await;

        Ok(SendResult {
            token: encoded,
            amount,
            mint: spend.mint,
            outcomes,
        })
    }

    /// Pay a Lightning invoice through a mint
    ///
    /// Mint failures leave the ledger untouched. After a successful melt the
    /// spend is settled in this session even if the log records cannot be
    /// signed.
    pub async fn pay_bolt11(&self, invoice: &str, options: PayOptions) -> Result<PayResult> {
        let _guard = self.op_lock.lock().await;

        let (mint, quote) = self.quote_payment(invoice, options.mint.as_ref()).await?;
        let total = quote.total();

        let spend = self.gather_inputs(total, Some(&mint))?;
        let (pay, mut keep) = match select_proofs(&spend.proofs, total) {
            Ok(selection) => (selection.send, selection.keep),
            // overpay; the mint returns the excess as change
            Err(Error::NoExactSplit(_)) => (spend.proofs.clone(), Vec::new()),
            Err(e) => return Err(e),
        };

        let paid_in = proofs_amount(&pay);
        let melted = self.mint.melt(&mint, &quote, pay).await?;
        let fee_paid = paid_in
            .saturating_sub(quote.amount)
            .saturating_sub(proofs_amount(&melted.change));
        keep.extend(melted.change);

        let events = self
            .record_spend(spend_entries(&spend, keep, quote.amount + fee_paid))
            .await?;

        info!(amount = quote.amount, fee_paid, mint = %mint.short(), "Paid invoice");
        let outcomes = self.broadcast(events, &self.config.relays).await;

        Ok(PayResult {
            preimage: melted.preimage,
            amount: quote.amount,
            fee_paid,
            mint,
            outcomes,
        })
    }

    /// Trust additional mints
    pub async fn add_mints<I>(&self, urls: I) -> Result<PublishReport>
    where
        I: IntoIterator<Item = MintUrl>,
    {
        let _guard = self.op_lock.lock().await;

        let mut mints = self.store.read().mint_list().clone();
        if !mints.add(urls) {
            debug!("Mints already trusted");
            return Ok(PublishReport::default());
        }

        self.save_wallet_config(mints, None).await
    }

    /// Stop trusting mints; tokens already held stay in the wallet
    pub async fn remove_mints<'a, I>(&self, urls: I) -> Result<PublishReport>
    where
        I: IntoIterator<Item = &'a MintUrl>,
    {
        let _guard = self.op_lock.lock().await;

        let mut mints = self.store.read().mint_list().clone();
        if !mints.remove(urls) {
            debug!("Mints not in the wallet");
            return Ok(PublishReport::default());
        }

        self.save_wallet_config(mints, None).await
    }

    /// Register the wallet private key used to receive locked proofs
    ///
    /// Replacing an existing key requires `force`.
    pub async fn set_private_key(&self, private_key: &str, force: bool) -> Result<PublishReport> {
        let _guard = self.op_lock.lock().await;

        let mints = {
            let store = self.store.read();
            if store.private_key() == Some(private_key) {
                return Ok(PublishReport::default());
            }
            store.check_key_registration(force)?;
            store.mint_list().clone()
        };

        // rejects malformed key material
        self.signer.derive_public_key(private_key)?;

        self.save_wallet_config(mints, Some(private_key)).await
    }

    /// Send `amount` to another user as a nutzap
    pub async fn send_nutzap(
        &self,
        recipient: &str,
        amount: u64,
        options: NutzapOptions,
    ) -> Result<NutzapResult> {
        if amount == 0 {
            return Err(Error::InvalidAmount("cannot zap 0".to_string()));
        }

        let profile = self.discovery.resolve_profile(recipient).await?;
        let outbox = self
            .discovery
            .outbox_relays(&profile.pubkey, self.config.discovery.outbox_relay_count)
            .await?;

        let filter = Filter::new()
            .kinds([kind::NUTZAP_INFO])
            .author(profile.pubkey.as_str())
            .limit(1);
        let info_event = self
            .pool
            .query_single(filter, &outbox)
            .await
            .map_err(|e| Error::RelayUnavailable(format!("nutzap info lookup failed: {}", e)))?
            .ok_or_else(|| {
                Error::Discovery(format!("{} does not accept nutzaps", profile.short_name()))
            })?;
        let info = codec::nutzap_info_from_event(&info_event);
        let lock_to = info.pubkey.clone().ok_or_else(|| {
            Error::Discovery(format!("{} published nutzap info without a key", profile.short_name()))
        })?;

        let mut targets: BTreeSet<RelayUrl> = info.relays.iter().cloned().collect();
        match self.discovery.inbox_relays(&profile.pubkey).await {
            Ok(inbox) => targets.extend(inbox),
            Err(e) => warn!(recipient = %profile.short_name(), "Inbox relay lookup failed: {}", e),
        }
        let targets: Vec<RelayUrl> = targets.into_iter().collect();

        info!(amount, recipient = %profile.short_name(), "Sending nutzap");

        let _guard = self.op_lock.lock().await;

        let mint = self.nutzap_mint(&info, amount, options.mint.as_ref())?;
        let spend = self.gather_inputs(amount, Some(&mint))?;
        let (send, keep) = self.split(&spend, amount, Some(&lock_to)).await?;
        let events = self.record_spend(spend_entries(&spend, keep, amount)).await?;

        let nutzap = codec::encode_nutzap(
            &NutzapDraft {
                mint: &mint,
                proofs: &send,
                recipient: &profile.pubkey,
                event_id: options.event_id.as_deref(),
                note: &options.note,
            },
            self.signer.as_ref(),
        )
        .await?;

        let ledger_outcomes = self.broadcast(events, &self.config.relays).await;
        let event_id = nutzap.id.clone();
        let outcomes = self.broadcast(vec![nutzap], &targets).await;

        Ok(NutzapResult {
            recipient: profile,
            amount,
            mint,
            event_id,
            outcomes,
            ledger_outcomes,
        })
    }

    /// Publish where and how the owner accepts nutzaps
    ///
    /// Needs a registered private key. Empty `mints` defaults to the wallet
    /// mints; empty `relays` to the owner relays.
    pub async fn setup_nutzap_info(
        &self,
        mints: Vec<MintUrl>,
        relays: Vec<RelayUrl>,
    ) -> Result<PublishReport> {
        let _guard = self.op_lock.lock().await;

        let (private_key, wallet_mints) = {
            let store = self.store.read();
            (
                store.private_key().map(str::to_string),
                store.mints().to_vec(),
            )
        };
        let private_key = private_key.ok_or(Error::MissingPrivateKey)?;
        let pubkey = self.signer.derive_public_key(&private_key)?;

        let mints = if mints.is_empty() { wallet_mints } else { mints };
        if mints.is_empty() {
            return Err(Error::UntrustedMint("no mint to receive nutzaps in".to_string()));
        }
        let relays = if relays.is_empty() {
            self.config.relays.clone()
        } else {
            relays
        };

        let mut targets: BTreeSet<RelayUrl> = self.config.relays.iter().cloned().collect();
        targets.extend(relays.iter().cloned());
        let targets: Vec<RelayUrl> = targets.into_iter().collect();

        let events = self
            .record(vec![LogEntry::NutzapInfo(NutzapInfo {
                relays,
                mints,
                pubkey: Some(pubkey),
            })])
            .await?;

        Ok(self.broadcast(events, &targets).await)
    }

    // Internals

    async fn save_wallet_config(
        &self,
        mints: MintList,
        new_key: Option<&str>,
    ) -> Result<PublishReport> {
        let private_key = match new_key {
            Some(key) => Some(key.to_string()),
            None => self.store.read().private_key().map(str::to_string),
        };

        let events = self
            .record(vec![LogEntry::WalletConfig {
                mints: mints.into_vec(),
                private_key,
            }])
            .await?;

        Ok(self.broadcast(events, &self.config.relays).await)
    }

    /// Pick a mint with enough value and the tokens that cover `amount`
    fn gather_inputs(&self, amount: u64, preferred: Option<&MintUrl>) -> Result<Spend> {
        let store = self.store.read();
        let mint = choose_mint(&store, amount, preferred)?;

        let candidates = store.tokens_for_mint(&mint);
        let picked = cover_with_tokens(&candidates, amount).ok_or_else(|| Error::InsufficientFunds {
            requested: amount,
            available: store.mint_balance(&mint),
        })?;

        Ok(Spend {
            inputs: picked.iter().map(|t| t.id()).collect(),
            proofs: picked.iter().flat_map(|t| t.proofs.iter().cloned()).collect(),
            mint,
        })
    }

    /// Split the spend into proofs worth exactly `amount` and the rest
    ///
    /// Goes through a mint swap when no exact subset exists or the proofs
    /// must be locked.
    async fn split(
        &self,
        spend: &Spend,
        amount: u64,
        lock_to: Option<&str>,
    ) -> Result<(Vec<Proof>, Vec<Proof>)> {
        if lock_to.is_none() {
            match select_proofs(&spend.proofs, amount) {
                Ok(selection) => return Ok((selection.send, selection.keep)),
                Err(Error::NoExactSplit(_)) => {
                    debug!(amount, mint = %spend.mint.short(), "No exact split, swapping")
                }
                Err(e) => return Err(e),
            }
        }

        let swapped = self
            .mint
            .swap(&spend.mint, spend.proofs.clone(), amount, lock_to)
            .await?;

        let sent = proofs_amount(&swapped.send);
        if sent != amount {
            return Err(Error::mint_unavailable(
                &spend.mint,
                format!("swap returned {} instead of {}", sent, amount),
            ));
        }

        Ok((swapped.send, swapped.keep))
    }

    async fn quote_payment(
        &self,
        invoice: &str,
        preferred: Option<&MintUrl>,
    ) -> Result<(MintUrl, MeltQuote)> {
        let candidates: Vec<(MintUrl, u64)> = {
            let store = self.store.read();
            match preferred {
                Some(mint) => vec![(mint.clone(), store.mint_balance(mint))],
                None => ordered_balances(&store),
            }
        };

        let mut smallest_total = None;
        let mut last_error = None;
        for (mint, balance) in &candidates {
            match self.mint.melt_quote(mint, invoice).await {
                Ok(quote) if quote.total() <= *balance => return Ok((mint.clone(), quote)),
                Ok(quote) => {
                    debug!(mint = %mint.short(), needed = quote.total(), balance, "Mint cannot cover invoice");
                    smallest_total = Some(smallest_total.map_or(quote.total(), |t: u64| t.min(quote.total())));
                }
                Err(e) => {
                    warn!(mint = %mint.short(), "Melt quote failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        match (smallest_total, last_error) {
            (Some(requested), _) => Err(Error::InsufficientFunds {
                requested,
                available: candidates.iter().map(|(_, b)| *b).max().unwrap_or(0),
            }),
            (None, Some(e)) => Err(e),
            (None, None) => Err(Error::InsufficientFunds {
                requested: 0,
                available: 0,
            }),
        }
    }

    fn nutzap_mint(&self, info: &NutzapInfo, amount: u64, preferred: Option<&MintUrl>) -> Result<MintUrl> {
        let store = self.store.read();

        if let Some(mint) = preferred {
            if !info.mints.contains(mint) {
                return Err(Error::UntrustedMint(format!("recipient does not accept {}", mint)));
            }
            return Ok(mint.clone());
        }

        let held: Vec<(&MintUrl, u64)> = info
            .mints
            .iter()
            .map(|mint| (mint, store.mint_balance(mint)))
            .filter(|(_, balance)| *balance > 0)
            .collect();

        if held.is_empty() {
            return Err(Error::UntrustedMint(
                "no mint in common with the recipient".to_string(),
            ));
        }

        held.iter()
            .find(|(_, balance)| *balance >= amount)
            .map(|(mint, _)| (*mint).clone())
            .ok_or_else(|| Error::InsufficientFunds {
                requested: amount,
                available: held.iter().map(|(_, b)| *b).max().unwrap_or(0),
            })
    }

    /// Encode entries and apply them to the local store
    ///
    /// Nothing is applied unless every entry encodes.
    async fn record(&self, entries: Vec<LogEntry>) -> Result<Vec<SignedEvent>> {
        let created_at = self.next_created_at();

        let mut events = Vec::with_capacity(entries.len());
        for entry in &entries {
            events.push(codec::encode(entry, created_at, self.signer.as_ref()).await?);
        }

        let balance = {
            let mut store = self.store.write();
            for (entry, event) in entries.into_iter().zip(&events) {
                reducer::apply(
                    &mut store,
                    &LogEvent {
                        id: event.id.clone(),
                        created_at,
                        entry,
                    },
                );
            }
            store.balance()
        };
        self.metrics.update_balance(balance);

        Ok(events)
    }

    /// Record the entries of a spend the mint already executed
    ///
    /// When the records cannot be produced the inputs are still retired and
    /// the change kept in this session. A later replay will list the inputs
    /// again until a new spend record retires them.
    async fn record_spend(&self, entries: Vec<LogEntry>) -> Result<Vec<SignedEvent>> {
        match self.record(entries.clone()).await {
            Ok(events) => Ok(events),
            Err(e) => {
                let balance = {
                    let mut store = self.store.write();
                    for entry in entries {
                        match entry {
                            LogEntry::Token { token, retired, .. } => {
                                store.insert_token(token);
                                for id in &retired {
                                    store.retire_token(id);
                                }
                            }
                            LogEntry::Deletion { tokens } => {
                                for id in &tokens {
                                    store.retire_token(id);
                                }
                            }
                            _ => {}
                        }
                    }
                    store.balance()
                };
                self.metrics.update_balance(balance);
                error!(balance, "Spend settled at the mint but not recorded: {}", e);
                Err(e)
            }
        }
    }

    /// Publish events one after another, collecting every outcome
    async fn broadcast(&self, events: Vec<SignedEvent>, relays: &[RelayUrl]) -> PublishReport {
        let mut report = PublishReport::default();

        for event in events {
            let event_kind = event.kind;
            let event_report = self
                .publisher
                .publish_and_collect(event, relays, &self.cancel, |outcome| {
                    self.metrics.record_publish(outcome.is_success());
                    self.observer.on_publish_result(event_kind, outcome);
                })
                .await;

            if !relays.is_empty() && !event_report.any_success() {
                warn!(kind = kind::label(event_kind), "No relay accepted the event");
            }
            report.extend(event_report.outcomes);
        }

        report
    }

    /// Timestamp for new events, never behind the mint list in effect
    fn next_created_at(&self) -> i64 {
        let store = self.store.read();
        let floor = store
            .mints_version()
            .into_iter()
            .chain(store.private_key_version())
            .map(|version| version.created_at + 1)
            .max()
            .unwrap_or(0);
        Utc::now().timestamp().max(floor)
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("owner", &self.signer.public_key())
            .field("relays", &self.config.relays)
            .field("balance", &self.balance())
            .finish()
    }
}

/// Ledger records for spending `amount` out of `spend`, keeping `keep`
fn spend_entries(spend: &Spend, keep: Vec<Proof>, amount: u64) -> Vec<LogEntry> {
    let mut entries = Vec::with_capacity(3);
    let mut created = Vec::new();

    if !keep.is_empty() {
        let change = Token::new(spend.mint.clone(), keep);
        created.push(change.id());
        entries.push(LogEntry::Token {
            token: change,
            origin: TokenOrigin::Change,
            retired: spend.inputs.clone(),
        });
    }

    entries.push(LogEntry::Deletion {
        tokens: spend.inputs.clone(),
    });
    entries.push(LogEntry::History(HistoryEntry {
        direction: Direction::Out,
        amount,
        mint: Some(spend.mint.clone()),
        created,
        destroyed: spend.inputs.clone(),
    }));

    entries
}

/// Trusted mints in list order, then any other mint holding value
fn ordered_balances(store: &LedgerStore) -> Vec<(MintUrl, u64)> {
    let balances = store.balance_by_mint();
    let mut ordered: Vec<(MintUrl, u64)> = store
        .mints()
        .iter()
        .map(|mint| (mint.clone(), balances.get(mint).copied().unwrap_or(0)))
        .collect();

    for (mint, balance) in balances {
        if !store.is_trusted(&mint) {
            ordered.push((mint, balance));
        }
    }

    ordered.retain(|(_, balance)| *balance > 0);
    ordered
}

/// Mint to spend `amount` from: the preferred one, else the first trusted
/// mint with enough value, else any mint with enough value
fn choose_mint(store: &LedgerStore, amount: u64, preferred: Option<&MintUrl>) -> Result<MintUrl> {
    if let Some(mint) = preferred {
        let available = store.mint_balance(mint);
        if available < amount {
            return Err(Error::InsufficientFunds {
                requested: amount,
                available,
            });
        }
        return Ok(mint.clone());
    }

    let ordered = ordered_balances(store);
    ordered
        .iter()
        .find(|(_, balance)| *balance >= amount)
        .map(|(mint, _)| mint.clone())
        .ok_or_else(|| Error::InsufficientFunds {
            requested: amount,
            available: ordered.iter().map(|(_, b)| *b).max().unwrap_or(0),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(mint: &str, amount: u64, secret: &str) -> Token {
        Token::new(MintUrl::new(mint), vec![Proof::new(amount, "k", secret, "c")])
    }

    fn store_with(mints: &[&str], tokens: Vec<Token>) -> LedgerStore {
        let mut store = LedgerStore::new();
        store.replace_mints(mints.iter().map(|m| MintUrl::new(*m)).collect(), crate::store::Version::new(1, "v"));
        for t in tokens {
            store.insert_token(t);
        }
        store
    }

    #[test]
    fn test_choose_mint_prefers_trusted_order() {
        let store = store_with(
            &["b", "a"],
            vec![token("a", 10, "1"), token("b", 10, "2"), token("c", 50, "3")],
        );

        assert_eq!(choose_mint(&store, 5, None).unwrap(), MintUrl::new("b"));
        assert_eq!(choose_mint(&store, 40, None).unwrap(), MintUrl::new("c"));
    }

    #[test]
    fn test_choose_mint_reports_largest_single_mint() {
        let store = store_with(&["a"], vec![token("a", 7, "1"), token("b", 9, "2")]);

        let err = choose_mint(&store, 12, None).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientFunds {
                requested: 12,
                available: 9
            }
        ));
    }

    #[test]
    fn test_choose_preferred_mint() {
        let store = store_with(&[], vec![token("a", 7, "1")]);
        assert!(choose_mint(&store, 8, Some(&MintUrl::new("a"))).is_err());
        assert_eq!(choose_mint(&store, 7, Some(&MintUrl::new("a"))).unwrap(), MintUrl::new("a"));
    }

    #[test]
    fn test_spend_entries() {
        let spend = Spend {
            mint: MintUrl::new("a"),
            inputs: vec![TokenId::from_hex("t1"), TokenId::from_hex("t2")],
            proofs: vec![],
        };
        let entries = spend_entries(&spend, vec![Proof::new(2, "k", "change", "c")], 10);

        assert_eq!(entries.len(), 3);
        assert!(matches!(&entries[0], LogEntry::Token { origin: TokenOrigin::Change, retired, .. } if retired.len() == 2));
        assert!(matches!(&entries[1], LogEntry::Deletion { tokens } if tokens.len() == 2));
        assert!(matches!(&entries[2], LogEntry::History(h) if h.amount == 10 && h.created.len() == 1));

        assert_eq!(spend_entries(&spend, vec![], 10).len(), 2);
    }
}
