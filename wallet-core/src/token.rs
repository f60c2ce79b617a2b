//! Token string codec
//!
//! Tokens travel out of band as `cashuA` strings: the prefix followed by
//! URL-safe base64 of `{"token":[{"mint":..,"proofs":[..]}],"unit":"sat"}`.

use crate::types::{checked_proofs_amount, MintUrl, Proof, Token};
use crate::{Error, Result};
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

const V3_PREFIX: &str = "cashuA";
const URI_SCHEME: &str = "cashu:";
const DEFAULT_UNIT: &str = "sat";

#[derive(Serialize, Deserialize)]
struct TokenV3 {
    token: Vec<TokenV3Entry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memo: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct TokenV3Entry {
    mint: String,
    proofs: Vec<Proof>,
}

/// Serialize a token for out-of-band transfer
pub fn encode(token: &Token) -> Result<String> {
    let v3 = TokenV3 {
        token: vec![TokenV3Entry {
            mint: token.mint.to_string(),
            proofs: token.proofs.clone(),
        }],
        unit: Some(DEFAULT_UNIT.to_string()),
        memo: None,
    };

    let json = serde_json::to_vec(&v3)?;
    Ok(format!("{}{}", V3_PREFIX, URL_SAFE.encode(json)))
}

/// Parse a token string
///
/// Accepts an optional `cashu:` scheme, padded or unpadded base64 and either
/// base64 alphabet. All proofs must come from a single mint.
pub fn decode(input: &str) -> Result<Token> {
    let trimmed = input.trim();
    let without_scheme = trimmed.strip_prefix(URI_SCHEME).unwrap_or(trimmed);
    let body = without_scheme
        .strip_prefix(V3_PREFIX)
        .ok_or_else(|| Error::InvalidToken("unsupported token prefix".to_string()))?;

    let normalized: String = body
        .chars()
        .filter(|c| *c != '=')
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    let bytes = URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| Error::InvalidToken(format!("bad base64: {}", e)))?;

    let v3: TokenV3 = serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidToken(format!("bad token json: {}", e)))?;

    if let Some(unit) = v3.unit.as_deref() {
        if unit != DEFAULT_UNIT {
            return Err(Error::InvalidToken(format!("unsupported unit {}", unit)));
        }
    }

    let mut entries = v3.token.into_iter().filter(|e| !e.proofs.is_empty());
    let first = entries
        .next()
        .ok_or_else(|| Error::InvalidToken("token has no proofs".to_string()))?;

    let mint = MintUrl::new(&first.mint);
    let mut proofs = first.proofs;
    for entry in entries {
        if MintUrl::new(&entry.mint) != mint {
            return Err(Error::InvalidToken(
                "token mixes proofs from several mints".to_string(),
            ));
        }
        proofs.extend(entry.proofs);
    }

    if checked_proofs_amount(&proofs).is_none() {
        return Err(Error::InvalidToken("token amount overflows".to_string()));
    }

    Ok(Token::new(mint, proofs))
}
