//! Audit hash chain over ledger entries
//!
//! Every entry commits to the hash of the previous entry of the same
//! account, so any edit or removal in the middle of an account's history
//! breaks every later link.

use crate::types::LedgerEntry;
use sha2::{Digest, Sha256};

/// Hash of a zero-length chain
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// Compute the chained hash of an entry (ignores the stored `hash` field)
pub fn entry_hash(entry: &LedgerEntry) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(entry.prev_hash);
    hasher.update(entry.entry_id.as_bytes());
    hasher.update(entry.account_id.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(entry.sequence.to_be_bytes());
    hasher.update([entry.pool as u8, entry.kind as u8]);
    hasher.update(entry.delta.normalize().to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(entry.balance_after.normalize().to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(entry.reference.as_bytes());
    hasher.update([0u8]);
    hasher.update(
        entry
            .recorded_at
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .to_be_bytes(),
    );
    hasher.finalize().into()
}

/// Check that `entries` (ascending by sequence) form an unbroken chain
pub fn verify_chain<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> bool {
    let mut expected_prev = GENESIS_HASH;
    let mut expected_seq = 1u64;

    for entry in entries {
        if entry.sequence != expected_seq
            || entry.prev_hash != expected_prev
            || entry_hash(entry) != entry.hash
        {
            return false;
        }
        expected_prev = entry.hash;
        expected_seq += 1;
    }

    true
}

/// Lowercase hex rendering for logs
pub fn hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}
