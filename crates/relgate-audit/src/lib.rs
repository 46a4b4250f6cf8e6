//! Reliability Gate audit log
//!
//! Append-only, hash-chained implementations of the `AuditSink` contract
//! plus KPI summaries computed from a trail.

pub mod chain;
pub mod jsonl;
pub mod memory;
pub mod summary;

pub use chain::{verify_chain, AuditEntry, ChainError, ChainHead, GENESIS_HASH};
pub use jsonl::{read_jsonl, AuditLogError, JsonlAuditLog};
pub use memory::MemoryAuditLog;
pub use summary::{summarize, KpiSummary, ModelKpi};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
