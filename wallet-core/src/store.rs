//! In-memory ledger store
//!
//! The store is a snapshot derived from the event log: trusted mints, live
//! tokens, retired token ids, the wallet private key, spending history and
//! the owner's nutzap info. Balance is never stored; it is summed from the
//! live tokens on every read.

use crate::types::{HistoryEntry, MintUrl, NutzapInfo, Token, TokenId};
use crate::{Error, Result};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Position of a replaceable log record
///
/// A later timestamp wins; on equal timestamps the smaller event id wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Event timestamp
    pub created_at: i64,

    /// Event id
    pub event_id: String,
}

impl Version {
    /// Create new version
    pub fn new(created_at: i64, event_id: impl Into<String>) -> Self {
        Self {
            created_at,
            event_id: event_id.into(),
        }
    }

    /// Whether this version replaces `current`
    pub fn supersedes(&self, current: &Version) -> bool {
        match self.created_at.cmp(&current.created_at) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.event_id < current.event_id,
        }
    }
}

/// Ordered, duplicate-free list of trusted mints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MintList(Vec<MintUrl>);

impl MintList {
    /// Build from urls, dropping duplicates
    pub fn new(urls: impl IntoIterator<Item = MintUrl>) -> Self {
        let mut list = Self::default();
        list.add(urls);
        list
    }

    /// Mints in insertion order
    pub fn as_slice(&self) -> &[MintUrl] {
        &self.0
    }

    /// Whether the list holds `mint`
    pub fn contains(&self, mint: &MintUrl) -> bool {
        self.0.contains(mint)
    }

    /// Append mints not already present; true when the list changed
    pub fn add(&mut self, urls: impl IntoIterator<Item = MintUrl>) -> bool {
        let before = self.0.len();
        for url in urls {
            if !self.0.contains(&url) {
                self.0.push(url);
            }
        }
        self.0.len() != before
    }

    /// Drop mints; absent ones are ignored. True when the list changed
    pub fn remove<'a>(&mut self, urls: impl IntoIterator<Item = &'a MintUrl>) -> bool {
        let remove: BTreeSet<&MintUrl> = urls.into_iter().collect();
        let before = self.0.len();
        self.0.retain(|mint| !remove.contains(mint));
        self.0.len() != before
    }

    /// Take the urls
    pub fn into_vec(self) -> Vec<MintUrl> {
        self.0
    }
}

/// Ledger snapshot
#[derive(Debug, Default)]
pub struct LedgerStore {
    mints: MintList,
    mints_version: Option<Version>,
    tokens: BTreeMap<TokenId, Token>,
    tombstones: BTreeSet<TokenId>,
    secrets: HashSet<String>,
    private_key: Option<(Version, String)>,
    history: BTreeMap<(i64, String), HistoryEntry>,
    nutzap_info: Option<(Version, NutzapInfo)>,
    seen: HashSet<String>,
}

impl LedgerStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    // Mints

    /// Trusted mints in insertion order
    pub fn mints(&self) -> &[MintUrl] {
        self.mints.as_slice()
    }

    /// Trusted mint list
    pub fn mint_list(&self) -> &MintList {
        &self.mints
    }

    /// Whether `mint` is in the trusted list
    pub fn is_trusted(&self, mint: &MintUrl) -> bool {
        self.mints.contains(mint)
    }

    /// Version of the mint list currently in effect
    pub fn mints_version(&self) -> Option<&Version> {
        self.mints_version.as_ref()
    }

    /// Replace the mint list if `version` wins over the current one
    pub fn replace_mints(&mut self, mints: Vec<MintUrl>, version: Version) -> bool {
        if let Some(current) = &self.mints_version {
            if !version.supersedes(current) {
                return false;
            }
        }

        self.mints = MintList::new(mints);
        self.mints_version = Some(version);
        true
    }

    // Tokens

    /// Live tokens ordered by id
    pub fn tokens(&self) -> impl Iterator<Item = (&TokenId, &Token)> {
        self.tokens.iter()
    }

    /// Live token by id
    pub fn token(&self, id: &TokenId) -> Option<&Token> {
        self.tokens.get(id)
    }

    /// Live tokens issued by `mint`
    pub fn tokens_for_mint(&self, mint: &MintUrl) -> Vec<&Token> {
        self.tokens.values().filter(|t| &t.mint == mint).collect()
    }

    /// Number of live tokens
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the token was retired
    pub fn is_tombstoned(&self, id: &TokenId) -> bool {
        self.tombstones.contains(id)
    }

    /// Whether a proof with this secret was ever logged, live or retired
    pub fn knows_proof(&self, secret: &str) -> bool {
        self.secrets.contains(secret)
    }

    /// Insert a token unless it is live or retired
    ///
    /// Proof secrets are indexed even when the token itself is rejected.
    pub fn insert_token(&mut self, token: Token) -> bool {
        self.secrets
            .extend(token.proofs.iter().map(|proof| proof.secret.clone()));

        let id = token.id();
        if token.is_empty() || self.tombstones.contains(&id) || self.tokens.contains_key(&id) {
            return false;
        }
        self.tokens.insert(id, token);
        true
    }

    /// Retire a token; the tombstone is recorded even if it was never live
    pub fn retire_token(&mut self, id: &TokenId) -> Option<Token> {
        self.tombstones.insert(id.clone());
        self.tokens.remove(id)
    }

    // Balances

    /// Sum of all live tokens, saturating at `u64::MAX`
    pub fn balance(&self) -> u64 {
        self.tokens
            .values()
            .fold(0u64, |total, token| total.saturating_add(token.amount()))
    }

    /// Live value per mint
    pub fn balance_by_mint(&self) -> BTreeMap<MintUrl, u64> {
        let mut balances = BTreeMap::new();
        for token in self.tokens.values() {
            let balance = balances.entry(token.mint.clone()).or_insert(0u64);
            *balance = balance.saturating_add(token.amount());
        }
        balances
    }

    /// Live value held at `mint`
    pub fn mint_balance(&self, mint: &MintUrl) -> u64 {
        self.tokens
            .values()
            .filter(|t| &t.mint == mint)
            .fold(0u64, |total, token| total.saturating_add(token.amount()))
    }

    // Private key

    /// Registered wallet private key
    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_ref().map(|(_, key)| key.as_str())
    }

    /// Version of the config record that carried the current key
    pub fn private_key_version(&self) -> Option<&Version> {
        self.private_key.as_ref().map(|(version, _)| version)
    }

    /// Check a local key registration is allowed
    ///
    /// Fails with `KeyAlreadySet` when a key exists and `force` is false.
    pub fn check_key_registration(&self, force: bool) -> Result<()> {
        if self.private_key.is_some() && !force {
            return Err(Error::KeyAlreadySet);
        }
        Ok(())
    }

    /// Register the wallet private key carried by the record at `version`
    ///
    /// Fails with `KeyAlreadySet` when a key exists and `force` is false.
    pub fn register_private_key(
        &mut self,
        material: impl Into<String>,
        version: Version,
        force: bool,
    ) -> Result<bool> {
        self.check_key_registration(force)?;
        Ok(self.replace_private_key(material, version))
    }

    /// Replace the private key if `version` wins over the record that set
    /// the current one. Config records without a key never clear it.
    pub fn replace_private_key(&mut self, material: impl Into<String>, version: Version) -> bool {
        if let Some((current, _)) = &self.private_key {
            if !version.supersedes(current) {
                return false;
            }
        }
        self.private_key = Some((version, material.into()));
        true
    }

    // History

    /// History entries, oldest first
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.values()
    }

    /// Record a history entry
    pub fn record_history(&mut self, created_at: i64, event_id: &str, entry: HistoryEntry) -> bool {
        self.history
            .insert((created_at, event_id.to_string()), entry)
            .is_none()
    }

    // Nutzap info

    /// Latest published nutzap info
    pub fn nutzap_info(&self) -> Option<&NutzapInfo> {
        self.nutzap_info.as_ref().map(|(_, info)| info)
    }

    /// Replace the nutzap info if `version` wins over the current one
    pub fn replace_nutzap_info(&mut self, info: NutzapInfo, version: Version) -> bool {
        if let Some((current, _)) = &self.nutzap_info {
            if !version.supersedes(current) {
                return false;
            }
        }
        self.nutzap_info = Some((version, info));
        true
    }

    // Seen events

    /// Whether an event id was already processed
    pub fn is_seen(&self, event_id: &str) -> bool {
        self.seen.contains(event_id)
    }

    /// Mark an event id as processed; false if it already was
    pub fn mark_seen(&mut self, event_id: &str) -> bool {
        self.seen.insert(event_id.to_string())
    }

    /// Number of distinct events processed
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}
