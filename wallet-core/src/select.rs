//! Proof selection
//!
//! Pure set selection over one mint's proofs. When no subset matches the
//! target exactly the caller has to ask the mint to reissue denominations.

use crate::types::{proofs_amount, Proof, Token};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Proofs split into the part to hand out and the part to keep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Proofs summing exactly to the target
    pub send: Vec<Proof>,

    /// Remaining proofs
    pub keep: Vec<Proof>,
}

/// Split `proofs` into a subset summing to `target` and the remainder
///
/// Prefers larger denominations. Fails with `InsufficientFunds` when the
/// proofs cannot cover `target` at all and `NoExactSplit` when they can but
/// no subset matches exactly.
pub fn select_proofs(proofs: &[Proof], target: u64) -> Result<Selection> {
    let available = proofs_amount(proofs);
    if available < target {
        return Err(Error::InsufficientFunds {
            requested: target,
            available,
        });
    }

    let mut order: Vec<usize> = (0..proofs.len()).collect();
    order.sort_by(|&a, &b| proofs[b].amount.cmp(&proofs[a].amount));

    // reachable sum -> (previous sum, proof index that reached it)
    let mut reachable: BTreeMap<u64, Option<(u64, usize)>> = BTreeMap::new();
    reachable.insert(0, None);

    for &index in &order {
        if reachable.contains_key(&target) {
            break;
        }
        let amount = proofs[index].amount;
        let sums: Vec<u64> = reachable.keys().rev().copied().collect();
        for sum in sums {
            match sum.checked_add(amount) {
                Some(next) if next <= target && !reachable.contains_key(&next) => {
                    reachable.insert(next, Some((sum, index)));
                }
                _ => {}
            }
        }
    }

    if !reachable.contains_key(&target) {
        return Err(Error::NoExactSplit(target));
    }

    let mut chosen = vec![false; proofs.len()];
    let mut cursor = target;
    while let Some(Some((previous, index))) = reachable.get(&cursor).copied() {
        chosen[index] = true;
        cursor = previous;
    }

    let (send, keep): (Vec<(usize, &Proof)>, Vec<(usize, &Proof)>) =
        proofs.iter().enumerate().partition(|(i, _)| chosen[*i]);

    Ok(Selection {
        send: send.into_iter().map(|(_, p)| p.clone()).collect(),
        keep: keep.into_iter().map(|(_, p)| p.clone()).collect(),
    })
}

/// Pick tokens largest-first until they cover `target`
///
/// Returns `None` when all tokens together are not enough.
pub fn cover_with_tokens<'a>(tokens: &[&'a Token], target: u64) -> Option<Vec<&'a Token>> {
    let mut sorted: Vec<&Token> = tokens.to_vec();
    sorted.sort_by(|a, b| b.amount().cmp(&a.amount()).then_with(|| a.id().cmp(&b.id())));

    let mut picked = Vec::new();
    let mut total = 0u64;
    for token in sorted {
        if total >= target {
            break;
        }
        total = total.saturating_add(token.amount());
        picked.push(token);
    }

    (total >= target).then_some(picked)
}
