//! Log event codec
//!
//! Maps wallet records to relay events and back. Private records (wallet
//! config, tokens, deletions, history) are JSON encrypted to the owner; the
//! nutzap info record is public and lives in tags.

use crate::signer::Signer;
use crate::types::{
    checked_proofs_amount, HistoryEntry, MintUrl, NutzapInfo, Proof, Token, TokenId, TokenOrigin,
};
use crate::{Error, Result};
use relay_bus::{kind, Filter, RelayUrl, SignedEvent, UnsignedEvent};
use serde::{Deserialize, Serialize};

/// Kinds that make up the owner's wallet log
pub const LOG_KINDS: [u16; 5] = [
    kind::WALLET,
    kind::TOKEN,
    kind::DELETION,
    kind::HISTORY,
    kind::NUTZAP_INFO,
];

/// Subscription filter for the owner's wallet log
pub fn log_filter(owner: &str) -> Filter {
    Filter::new().kinds(LOG_KINDS).author(owner)
}

/// Decoded wallet record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// Mint list and wallet private key
    WalletConfig {
        /// Full trusted mint list
        mints: Vec<MintUrl>,
        /// Wallet private key (hex)
        private_key: Option<String>,
    },

    /// Unspent proofs
    Token {
        /// The token
        token: Token,
        /// Why it was written
        origin: TokenOrigin,
        /// Tokens this one replaces
        retired: Vec<TokenId>,
    },

    /// Spent tokens
    Deletion {
        /// Retired token ids
        tokens: Vec<TokenId>,
    },

    /// Spending history
    History(HistoryEntry),

    /// Where the owner accepts nutzaps
    NutzapInfo(NutzapInfo),
}

impl LogEntry {
    /// Relay event kind for this record
    pub fn kind(&self) -> u16 {
        match self {
            LogEntry::WalletConfig { .. } => kind::WALLET,
            LogEntry::Token { .. } => kind::TOKEN,
            LogEntry::Deletion { .. } => kind::DELETION,
            LogEntry::History(_) => kind::HISTORY,
            LogEntry::NutzapInfo(_) => kind::NUTZAP_INFO,
        }
    }
}

/// Decoded record with its log position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Relay event id
    pub id: String,

    /// Event timestamp
    pub created_at: i64,

    /// Record
    pub entry: LogEntry,
}

#[derive(Serialize, Deserialize)]
struct WalletContent {
    #[serde(default)]
    mints: Vec<MintUrl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    privkey: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct TokenContent {
    mint: MintUrl,
    proofs: Vec<Proof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin: Option<TokenOrigin>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    del: Vec<TokenId>,
}

#[derive(Serialize, Deserialize)]
struct DeletionContent {
    tokens: Vec<TokenId>,
}

/// Decode (and decrypt) a relay event into a wallet record
///
/// Every failure is reported as `MalformedLogEvent` for this event id.
pub async fn decode(event: &SignedEvent, signer: &dyn Signer) -> Result<LogEvent> {
    if !event.verify_id() {
        return Err(Error::malformed(&event.id, "id does not match content"));
    }

    let entry = match event.kind {
        kind::NUTZAP_INFO => LogEntry::NutzapInfo(nutzap_info_from_event(event)),
        kind::DELETION if event.first_tag("k") != Some("7375") => {
            // deletions of other kinds carry nothing for the wallet
            LogEntry::Deletion { tokens: Vec::new() }
        }
        kind::WALLET | kind::TOKEN | kind::DELETION | kind::HISTORY => {
            let plaintext = signer
                .decrypt(&event.content)
                .await
                .map_err(|e| Error::malformed(&event.id, e))?;
            decode_private(event.kind, &plaintext).map_err(|e| Error::malformed(&event.id, e))?
        }
        other => {
            return Err(Error::malformed(
                &event.id,
                format!("unexpected kind {}", other),
            ))
        }
    };

    Ok(LogEvent {
        id: event.id.clone(),
        created_at: event.created_at,
        entry,
    })
}

fn decode_private(kind: u16, plaintext: &str) -> std::result::Result<LogEntry, String> {
    let entry = match kind {
        kind::WALLET => {
            let content: WalletContent = serde_json::from_str(plaintext).map_err(|e| e.to_string())?;
            LogEntry::WalletConfig {
                mints: content.mints,
                private_key: content.privkey.filter(|k| !k.is_empty()),
            }
        }
        kind::TOKEN => {
            let content: TokenContent = serde_json::from_str(plaintext).map_err(|e| e.to_string())?;
            if content.proofs.is_empty() {
                return Err("token without proofs".to_string());
            }
            if checked_proofs_amount(&content.proofs).is_none() {
                return Err("token amount overflows".to_string());
            }
            LogEntry::Token {
                token: Token::new(content.mint, content.proofs),
                origin: content.origin.unwrap_or(TokenOrigin::Received),
                retired: content.del,
            }
        }
        kind::DELETION => {
            let content: DeletionContent = serde_json::from_str(plaintext).map_err(|e| e.to_string())?;
            LogEntry::Deletion {
                tokens: content.tokens,
            }
        }
        kind::HISTORY => LogEntry::History(serde_json::from_str(plaintext).map_err(|e| e.to_string())?),
        other => return Err(format!("kind {} is not a private wallet record", other)),
    };
    Ok(entry)
}

/// Read nutzap info tags from a public kind 10019 event
pub fn nutzap_info_from_event(event: &SignedEvent) -> NutzapInfo {
    NutzapInfo {
        relays: event.tag_values("relay").map(RelayUrl::new).collect(),
        mints: event.tag_values("mint").map(MintUrl::new).collect(),
        pubkey: event.first_tag("pubkey").map(str::to_string),
    }
}

/// Encode (and encrypt) a wallet record as a signed relay event
pub async fn encode(entry: &LogEntry, created_at: i64, signer: &dyn Signer) -> Result<SignedEvent> {
    let mut tags = Vec::new();

    let content = match entry {
        LogEntry::NutzapInfo(info) => {
            for relay in &info.relays {
                tags.push(vec!["relay".to_string(), relay.to_string()]);
            }
            for mint in &info.mints {
                tags.push(vec!["mint".to_string(), mint.to_string(), "sat".to_string()]);
            }
            if let Some(pubkey) = &info.pubkey {
                tags.push(vec!["pubkey".to_string(), pubkey.clone()]);
            }
            String::new()
        }
        LogEntry::WalletConfig { mints, private_key } => {
            let plaintext = serde_json::to_string(&WalletContent {
                mints: mints.clone(),
                privkey: private_key.clone(),
            })?;
            signer.encrypt(&plaintext).await?
        }
        LogEntry::Token {
            token,
            origin,
            retired,
        } => {
            let plaintext = serde_json::to_string(&TokenContent {
                mint: token.mint.clone(),
                proofs: token.proofs.clone(),
                origin: Some(*origin),
                del: retired.clone(),
            })?;
            signer.encrypt(&plaintext).await?
        }
        LogEntry::Deletion { tokens } => {
            tags.push(vec!["k".to_string(), kind::TOKEN.to_string()]);
            let plaintext = serde_json::to_string(&DeletionContent {
                tokens: tokens.clone(),
            })?;
            signer.encrypt(&plaintext).await?
        }
        LogEntry::History(history) => signer.encrypt(&serde_json::to_string(history)?).await?,
    };

    let unsigned =
        UnsignedEvent::new(signer.public_key(), entry.kind(), tags, content).with_created_at(created_at);
    signer.sign(unsigned).await
}

/// Public nutzap addressed to a recipient
#[derive(Debug, Clone)]
pub struct NutzapDraft<'a> {
    /// Mint the proofs belong to
    pub mint: &'a MintUrl,

    /// Proofs locked to the recipient
    pub proofs: &'a [Proof],

    /// Recipient public key
    pub recipient: &'a str,

    /// Zapped event, if any
    pub event_id: Option<&'a str>,

    /// Free-form message
    pub note: &'a str,
}

/// Build and sign a nutzap event
pub async fn encode_nutzap(draft: &NutzapDraft<'_>, signer: &dyn Signer) -> Result<SignedEvent> {
    let mut tags = Vec::with_capacity(draft.proofs.len() + 3);
    for proof in draft.proofs {
        tags.push(vec!["proof".to_string(), serde_json::to_string(proof)?]);
    }
    tags.push(vec!["u".to_string(), draft.mint.to_string()]);
    tags.push(vec!["p".to_string(), draft.recipient.to_string()]);
    if let Some(event_id) = draft.event_id {
        tags.push(vec!["e".to_string(), event_id.to_string()]);
    }

    signer
        .sign(UnsignedEvent::new(
            signer.public_key(),
            kind::NUTZAP,
            tags,
            draft.note,
        ))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use async_trait::async_trait;

    /// Reversible stand-in for real encryption
    struct ReverseSigner;

    #[async_trait]
    impl Signer for ReverseSigner {
        fn public_key(&self) -> String {
            "ab".repeat(32)
        }

        async fn sign(&self, event: UnsignedEvent) -> Result<SignedEvent> {
            Ok(event.into_signed("sig"))
        }

        async fn encrypt(&self, plaintext: &str) -> Result<String> {
            Ok(plaintext.chars().rev().collect())
        }

        async fn decrypt(&self, ciphertext: &str) -> Result<String> {
            Ok(ciphertext.chars().rev().collect())
        }

        fn derive_public_key(&self, private_key: &str) -> Result<String> {
            Ok(format!("pub-{}", private_key))
        }
    }

    fn token() -> Token {
        Token::new(
            MintUrl::new("https://mint.example"),
            vec![Proof::new(4, "k1", "s1", "02aa"), Proof::new(1, "k1", "s2", "02bb")],
        )
    }

    async fn round_trip(entry: LogEntry) -> LogEvent {
        let event = encode(&entry, 1_700_000_000, &ReverseSigner).await.unwrap();
        assert_eq!(event.kind, entry.kind());
        decode(&event, &ReverseSigner).await.unwrap()
    }

    #[tokio::test]
    async fn test_token_event() {
        let entry = LogEntry::Token {
            token: token(),
            origin: TokenOrigin::Change,
            retired: vec![TokenId::from_hex("dead")],
        };
        let event = encode(&entry, 1_700_000_000, &ReverseSigner).await.unwrap();

        assert!(!event.content.contains("\"proofs\""));
        let decoded = decode(&event, &ReverseSigner).await.unwrap();
        assert_eq!(decoded.entry, entry);
        assert_eq!(decoded.created_at, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_private_records() {
        let config = LogEntry::WalletConfig {
            mints: vec![MintUrl::new("https://a"), MintUrl::new("https://b")],
            private_key: Some("11".repeat(32)),
        };
        assert_eq!(round_trip(config.clone()).await.entry, config);

        let deletion = LogEntry::Deletion {
            tokens: vec![token().id()],
        };
        assert_eq!(round_trip(deletion.clone()).await.entry, deletion);

        let history = LogEntry::History(HistoryEntry {
            direction: Direction::Out,
            amount: 10,
            mint: Some(MintUrl::new("https://a")),
            created: vec![],
            destroyed: vec![token().id()],
        });
        assert_eq!(round_trip(history.clone()).await.entry, history);
    }

    #[tokio::test]
    async fn test_nutzap_info_is_public() {
        let info = NutzapInfo {
            relays: vec![RelayUrl::new("wss://relay.one")],
            mints: vec![MintUrl::new("https://a")],
            pubkey: Some("02ff".to_string()),
        };
        let event = encode(&LogEntry::NutzapInfo(info.clone()), 1, &ReverseSigner)
            .await
            .unwrap();

        assert!(event.content.is_empty());
        assert_eq!(event.first_tag("pubkey"), Some("02ff"));
        assert_eq!(
            decode(&event, &ReverseSigner).await.unwrap().entry,
            LogEntry::NutzapInfo(info)
        );
    }

    #[tokio::test]
    async fn test_malformed_content() {
        let unsigned = UnsignedEvent::new(ReverseSigner.public_key(), kind::TOKEN, vec![], "}ton{");
        let event = unsigned.into_signed("sig");

        let err = decode(&event, &ReverseSigner).await.unwrap_err();
        assert!(matches!(err, Error::MalformedLogEvent { event_id, .. } if event_id == event.id));
    }

    #[tokio::test]
    async fn test_overflowing_token_is_malformed() {
        let entry = LogEntry::Token {
            token: Token::new(
                MintUrl::new("https://mint.example"),
                vec![Proof::new(u64::MAX, "k1", "s1", "02aa"), Proof::new(1, "k1", "s2", "02bb")],
            ),
            origin: TokenOrigin::Received,
            retired: vec![],
        };
        let event = encode(&entry, 1_700_000_000, &ReverseSigner).await.unwrap();

        assert!(matches!(
            decode(&event, &ReverseSigner).await,
            Err(Error::MalformedLogEvent { .. })
        ));
    }

    #[tokio::test]
    async fn test_tampered_id_rejected() {
        let mut event = encode(&LogEntry::Deletion { tokens: vec![] }, 5, &ReverseSigner)
            .await
            .unwrap();
        event.created_at += 1;

        assert!(matches!(
            decode(&event, &ReverseSigner).await,
            Err(Error::MalformedLogEvent { .. })
        ));
    }

    #[tokio::test]
    async fn test_foreign_deletion_is_empty() {
        let event = UnsignedEvent::new(ReverseSigner.public_key(), kind::DELETION, vec![], "")
            .with_tag(["k", "1"])
            .into_signed("sig");

        let decoded = decode(&event, &ReverseSigner).await.unwrap();
        assert_eq!(decoded.entry, LogEntry::Deletion { tokens: vec![] });
    }

    #[tokio::test]
    async fn test_nutzap_tags() {
        let mint = MintUrl::new("https://a");
        let proofs = vec![Proof::new(2, "k", "s", "c")];
        let draft = NutzapDraft {
            mint: &mint,
            proofs: &proofs,
            recipient: "cafe",
            event_id: Some("beef"),
            note: "thanks",
        };

        let event = encode_nutzap(&draft, &ReverseSigner).await.unwrap();
        assert_eq!(event.kind, kind::NUTZAP);
        assert_eq!(event.content, "thanks");
        assert_eq!(event.first_tag("p"), Some("cafe"));
        assert_eq!(event.first_tag("e"), Some("beef"));
        assert_eq!(event.tag_values("proof").count(), 1);
    }
}
