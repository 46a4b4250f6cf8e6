//! JSON-lines audit log
//!
//! One entry per line. Each append is written and synced under a single
//! lock before it is acknowledged. A write that fails part way is cut back
//! to the last acknowledged byte, and a torn final line left by a crash is
//! dropped when the log is reopened.

use crate::chain::{verify_chain, AuditEntry, ChainError, ChainHead};
use relgate_core::{AuditReceipt, AuditRecord, AuditSink, PersistenceFailure};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Failure reading or opening a log file
#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    /// File could not be read or opened
    #[error("audit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A line is not a valid entry
    #[error("line {line}: {source}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// Decoder error
        #[source]
        source: serde_json::Error,
    },

    /// The existing chain does not verify
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Read every entry from a JSON-lines log
///
/// Blank lines are skipped. The chain is not verified here.
///
/// # Errors
/// `AuditLogError::Io` or `AuditLogError::Parse`.
pub async fn read_jsonl(path: impl AsRef<Path>) -> Result<Vec<AuditEntry>, AuditLogError> {
    let text = tokio::fs::read_to_string(path).await?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| AuditLogError::Parse {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

struct Writer {
    file: File,
    head: ChainHead,
    /// File length up to the last acknowledged entry
    len: u64,
}

/// Drop a final line that has no terminator and does not decode
async fn repair_tail(path: &Path) -> Result<(), AuditLogError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if bytes.last().map_or(true, |b| *b == b'\n') {
        return Ok(());
    }
    let start = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    let mut file = OpenOptions::new().append(true).open(path).await?;
    if serde_json::from_slice::<AuditEntry>(&bytes[start..]).is_ok() {
        file.write_all(b"\n").await?;
    } else {
        warn!(
            path = %path.display(),
            bytes = bytes.len() - start,
            "discarding torn audit line"
        );
        file.set_len(start as u64).await?;
    }
    file.sync_data().await?;
    Ok(())
}

/// Hash-chained log persisted as JSON lines
pub struct JsonlAuditLog {
    path: PathBuf,
    writer: Mutex<Writer>,
}

impl JsonlAuditLog {
    /// Open or create a log, resuming an existing chain
    ///
    /// # Errors
    /// `AuditLogError` if the file cannot be opened or its chain is broken.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AuditLogError> {
        let path = path.into();
        repair_tail(&path).await?;
        let existing = match read_jsonl(&path).await {
            Ok(entries) => entries,
            Err(AuditLogError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        verify_chain(&existing)?;
        let head = ChainHead::after(&existing);
        debug!(path = %path.display(), entries = existing.len(), "audit log opened");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let len = file.metadata().await?.len();
        Ok(Self {
            path,
            writer: Mutex::new(Writer { file, head, len }),
        })
    }

    /// Log file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl AuditSink for JsonlAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<AuditReceipt, PersistenceFailure> {
        let kind = record.kind();
        let mut writer = self.writer.lock().await;
        let entry = writer.head.seal(record)?;
        let mut line = serde_json::to_vec(&entry)
            .map_err(|e| PersistenceFailure::new(kind, e.to_string()))?;
        line.push(b'\n');

        let file = &mut writer.file;
        let written = async {
            file.write_all(&line).await?;
            file.flush().await?;
            file.sync_data().await
        }
        .await;
        if let Err(e) = written {
            let len = writer.len;
            if let Err(cut) = writer.file.set_len(len).await {
                error!(error = %cut, len, "partial audit line could not be cut back");
            }
            return Err(PersistenceFailure::new(kind, e.to_string()));
        }
        writer.len += line.len() as u64;
        writer.head.commit(&entry);
        Ok(entry.receipt())
    }
}

impl std::fmt::Debug for JsonlAuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlAuditLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
