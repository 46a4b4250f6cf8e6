//! Hash chain over audit entries
//!
//! `hash = sha256(seq || entry_id || appended_at || prev_hash || record_json)`.
//! The first entry links to `GENESIS_HASH`.

use chrono::{DateTime, Utc};
use relgate_core::{AuditReceipt, AuditRecord, PersistenceFailure};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ulid::Ulid;

/// `prev_hash` of the first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One sealed log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the log, starting at 0
    pub seq: u64,
    /// Entry ID
    pub entry_id: Ulid,
    /// Append time
    pub appended_at: DateTime<Utc>,
    /// Hash of the previous entry
    pub prev_hash: String,
    /// Hash of this entry
    pub hash: String,
    /// The record
    pub record: AuditRecord,
}

impl AuditEntry {
    /// Receipt for this entry
    #[must_use]
    pub fn receipt(&self) -> AuditReceipt {
        AuditReceipt {
            seq: self.seq,
            hash: self.hash.clone(),
        }
    }
}

/// Chain verification failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// Entries are missing or reordered
    #[error("sequence gap: expected {expected}, found {found}")]
    SequenceGap {
        /// Expected sequence number
        expected: u64,
        /// Sequence number found
        found: u64,
    },

    /// Entry does not link to its predecessor
    #[error("entry {seq} does not link to its predecessor")]
    BrokenLink {
        /// Offending entry
        seq: u64,
    },

    /// Entry content does not match its hash
    #[error("entry {seq} was modified after it was written")]
    Tampered {
        /// Offending entry
        seq: u64,
    },

    /// Entry could not be re-serialized for hashing
    #[error("entry {seq} could not be encoded: {message}")]
    Encoding {
        /// Offending entry
        seq: u64,
        /// Encoder message
        message: String,
    },
}

fn compute_hash(
    seq: u64,
    entry_id: Ulid,
    appended_at: &DateTime<Utc>,
    prev_hash: &str,
    record: &AuditRecord,
) -> Result<String, serde_json::Error> {
    let record_json = serde_json::to_vec(record)?;
    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    hasher.update(entry_id.to_bytes());
    hasher.update(appended_at.to_rfc3339().as_bytes());
    hasher.update([0]);
    hasher.update(prev_hash.as_bytes());
    hasher.update([0]);
    hasher.update(&record_json);
    Ok(hex::encode(hasher.finalize()))
}

/// Head of a chain; seals new entries onto it
#[derive(Debug, Clone)]
pub struct ChainHead {
    next_seq: u64,
    last_hash: String,
}

impl ChainHead {
    /// Empty chain
    #[must_use]
    pub fn genesis() -> Self {
        Self {
            next_seq: 0,
            last_hash: GENESIS_HASH.to_string(),
        }
    }

    /// Resume after the last of `entries`
    #[must_use]
    pub fn after(entries: &[AuditEntry]) -> Self {
        entries.last().map_or_else(Self::genesis, |last| Self {
            next_seq: last.seq + 1,
            last_hash: last.hash.clone(),
        })
    }

    /// Sequence number the next entry will get
    #[inline]
    #[must_use]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Build the next entry without committing it
    ///
    /// # Errors
    /// `PersistenceFailure` if the record cannot be encoded.
    pub fn seal(&self, record: AuditRecord) -> Result<AuditEntry, PersistenceFailure> {
        let entry_id = Ulid::new();
        let appended_at = Utc::now();
        let hash = compute_hash(self.next_seq, entry_id, &appended_at, &self.last_hash, &record)
            .map_err(|e| PersistenceFailure::new(record.kind(), e.to_string()))?;
        Ok(AuditEntry {
            seq: self.next_seq,
            entry_id,
            appended_at,
            prev_hash: self.last_hash.clone(),
            hash,
            record,
        })
    }

    /// Advance past an entry once it is durably stored
    pub fn commit(&mut self, entry: &AuditEntry) {
        self.next_seq = entry.seq + 1;
        self.last_hash.clone_from(&entry.hash);
    }
}

impl Default for ChainHead {
    fn default() -> Self {
        Self::genesis()
    }
}

/// Verify a full chain from genesis
///
/// # Errors
/// The first `ChainError` found, in log order.
pub fn verify_chain(entries: &[AuditEntry]) -> Result<(), ChainError> {
    let mut prev = GENESIS_HASH.to_string();
    for (expected, entry) in (0_u64..).zip(entries) {
        if entry.seq != expected {
            return Err(ChainError::SequenceGap {
                expected,
                found: entry.seq,
            });
        }
        if entry.prev_hash != prev {
            return Err(ChainError::BrokenLink { seq: entry.seq });
        }
        let recomputed = compute_hash(
            entry.seq,
            entry.entry_id,
            &entry.appended_at,
            &entry.prev_hash,
            &entry.record,
        )
        .map_err(|e| ChainError::Encoding {
            seq: entry.seq,
            message: e.to_string(),
        })?;
        if recomputed != entry.hash {
            return Err(ChainError::Tampered { seq: entry.seq });
        }
        prev.clone_from(&entry.hash);
    }
    Ok(())
}
