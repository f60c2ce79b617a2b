//! Event log reducer
//!
//! Folds decoded wallet records into the [`LedgerStore`]. Application is
//! idempotent per event id, and token/deletion records commute because
//! retired token ids are remembered as tombstones.

use crate::codec::{LogEntry, LogEvent};
use crate::store::{LedgerStore, Version};
use tracing::{debug, trace};

/// What applying one event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Store changed
    Changed,
    /// Event was new but changed nothing (older config, tombstoned token, ...)
    Unchanged,
    /// Event id was already processed
    Duplicate,
}

/// Apply one event to the store
pub fn apply(store: &mut LedgerStore, event: &LogEvent) -> Applied {
    if !store.mark_seen(&event.id) {
        trace!(event_id = %event.id, "Skipping already applied event");
        return Applied::Duplicate;
    }

    let changed = match &event.entry {
        LogEntry::Token { token, retired, .. } => {
            let mut changed = store.insert_token(token.clone());
            for id in retired {
                changed |= store.retire_token(id).is_some();
            }
            changed
        }

        LogEntry::Deletion { tokens } => {
            let mut changed = false;
            for id in tokens {
                changed |= store.retire_token(id).is_some();
            }
            changed
        }

        LogEntry::WalletConfig { mints, private_key } => {
            let version = Version::new(event.created_at, &event.id);
            let mut changed = store.replace_mints(mints.clone(), version.clone());

            if let Some(key) = private_key {
                changed |= store.replace_private_key(key.clone(), version);
            }
            changed
        }

        LogEntry::History(entry) => store.record_history(event.created_at, &event.id, entry.clone()),

        LogEntry::NutzapInfo(info) => {
            store.replace_nutzap_info(info.clone(), Version::new(event.created_at, &event.id))
        }
    };

    debug!(
        event_id = %event.id,
        kind = relay_bus::kind::label(event.entry.kind()),
        changed,
        "Applied log event"
    );

    if changed {
        Applied::Changed
    } else {
        Applied::Unchanged
    }
}
