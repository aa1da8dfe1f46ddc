//! Fee harvest: anchor references in, `height,txid,fee` ledger rows out.

use crate::chain::FeeSource;
use crate::ledger::{AnchorRef, FeeLedgerWriter, LedgerError};
use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use tracing::{info, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub written: u64,
    /// Heights already present in the output ledger from an earlier run.
    pub already_done: u64,
    /// References whose txid was already written in this run.
    pub duplicate_tx: u64,
    pub failed: u64,
}

/// Query the fee of every anchor not yet in the ledger and append a row for it.
///
/// Upstream failures skip that reference only; rerunning picks it up again
/// because its height is still missing from the ledger.
pub async fn harvest_fees<S, W>(
    source: &S,
    refs: &[AnchorRef],
    done: &BTreeSet<u64>,
    out: &mut FeeLedgerWriter<W>,
) -> Result<HarvestSummary, LedgerError>
where
    S: FeeSource + ?Sized,
    W: Write,
{
    let chain = source.chain();
    let mut seen = HashSet::new();
    let mut summary = HarvestSummary::default();
    for anchor in refs {
        if done.contains(&anchor.height) {
            summary.already_done += 1;
            continue;
        }
        if seen.contains(anchor.tx_hash.as_str()) {
            summary.duplicate_tx += 1;
            continue;
        }
        match source.transaction_fee(&anchor.tx_hash).await {
            Ok(fee) => {
                out.write(anchor.height, &anchor.tx_hash, fee.native_amount())?;
                seen.insert(anchor.tx_hash.as_str());
                summary.written += 1;
                info!(chain = chain.symbol(), height = anchor.height, "height done");
            }
            Err(e) => {
                summary.failed += 1;
                warn!(
                    chain = chain.symbol(),
                    height = anchor.height,
                    tx_hash = %anchor.tx_hash,
                    error = %e,
                    "fee lookup failed"
                );
            }
        }
    }
    info!(chain = chain.symbol(), ?summary, "harvest complete");
    Ok(summary)
}
