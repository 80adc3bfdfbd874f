//! cg-store: durable state for the gate.
//!
//! Two stores: the persisted rule list (JSONL, read on load, appended on
//! rule creation) and the append-only audit log. Persistence failures are
//! the one loudly-surfaced error class — a gate that cannot record its own
//! decisions must not pretend nothing happened.

pub mod audit;
pub mod rules;

pub use audit::{export_jsonl, export_table, AuditEvent, AuditLog, AuditReader};
pub use rules::RuleStore;

use std::io;

use thiserror::Error;

/// Errors from the rule store or audit log.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed record at line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
    #[error("no rule with id {0}")]
    UnknownRule(u64),
}
