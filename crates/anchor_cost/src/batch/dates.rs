//! Attach confirmation times to an existing fee ledger.

use crate::chain::{Chain, TimestampSource};
use crate::ledger::{DatedLedgerWriter, FeeRecord, LedgerError};
use std::io::Write;
use tracing::{info, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DateSummary {
    pub written: u64,
    pub failed: u64,
}

pub async fn attach_dates<S, W>(
    source: &S,
    chain: Chain,
    ledger: &[FeeRecord],
    out: &mut DatedLedgerWriter<W>,
) -> Result<DateSummary, LedgerError>
where
    S: TimestampSource + ?Sized,
    W: Write,
{
    let total = ledger.len();
    let mut summary = DateSummary::default();
    for (i, rec) in ledger.iter().enumerate() {
        match source.transaction_timestamp(&rec.tx_hash).await {
            Ok(at) => {
                out.write(rec.height, &rec.tx_hash, rec.fee, at)?;
                summary.written += 1;
            }
            Err(e) => {
                summary.failed += 1;
                warn!(
                    chain = chain.symbol(),
                    tx_hash = %rec.tx_hash,
                    error = %e,
                    "timestamp lookup failed"
                );
            }
        }
        info!(progress = i + 1, total, "dated");
    }
    Ok(summary)
}
