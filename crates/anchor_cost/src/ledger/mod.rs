//! Fee ledgers and anchor lists on disk: loading and incremental CSV output.

mod loader;
mod writer;

pub use loader::{
    load_fee_ledger, read_anchor_refs, read_fee_ledger, read_ledger_heights, AnchorRef, FeeRecord,
};
pub use writer::{AnchorCsvWriter, DatedLedgerWriter, FeeLedgerWriter};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: {reason}")]
    Malformed { line: u64, reason: String },
}
