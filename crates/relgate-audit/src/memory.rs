//! In-memory audit log

use crate::chain::{verify_chain, AuditEntry, ChainError, ChainHead};
use parking_lot::Mutex;
use relgate_core::{AuditReceipt, AuditRecord, AuditSink, IncidentId, PersistenceFailure};

#[derive(Debug, Default)]
struct Inner {
    head: ChainHead,
    entries: Vec<AuditEntry>,
}

/// Hash-chained log held in memory
///
/// Appends are serialized by a single lock, so concurrent runs never
/// interleave partial entries.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    inner: Mutex<Inner>,
}

impl MemoryAuditLog {
    /// Create empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append synchronously
    ///
    /// # Errors
    /// `PersistenceFailure` if the record cannot be encoded.
    pub fn append_entry(&self, record: AuditRecord) -> Result<AuditEntry, PersistenceFailure> {
        let mut guard = self.inner.lock();
        let entry = guard.head.seal(record)?;
        guard.head.commit(&entry);
        guard.entries.push(entry.clone());
        Ok(entry)
    }

    /// Snapshot of all entries
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().entries.clone()
    }

    /// Snapshot of all records
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|e| e.record.clone())
            .collect()
    }

    /// Records for one incident, in append order
    #[must_use]
    pub fn records_for(&self, incident_id: &IncidentId) -> Vec<AuditRecord> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.record.incident_id() == incident_id)
            .map(|e| e.record.clone())
            .collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Verify the chain
    ///
    /// # Errors
    /// First `ChainError` found.
    pub fn verify(&self) -> Result<(), ChainError> {
        verify_chain(&self.inner.lock().entries)
    }
}

#[async_trait::async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<AuditReceipt, PersistenceFailure> {
        self.append_entry(record).map(|e| e.receipt())
    }
}
