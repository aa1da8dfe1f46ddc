//! Reading previously harvested `height,txid,fee` ledgers.

use super::LedgerError;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// One anchor payment. Unique by `tx_hash` within a ledger.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeeRecord {
    pub height: u64,
    pub tx_hash: String,
    /// Native units (ETH or BTC).
    pub fee: f64,
}

/// Anchor reference exported by the host protocol: the height and the chain
/// transaction that anchored it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnchorRef {
    pub height: u64,
    pub tx_hash: String,
}

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input)
}

fn line_of(record: &csv::StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn field<'r>(
    record: &'r csv::StringRecord,
    idx: usize,
    name: &str,
) -> Result<&'r str, LedgerError> {
    match record.get(idx) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(LedgerError::Malformed {
            line: line_of(record),
            reason: format!("missing {name}"),
        }),
    }
}

fn parse_height(record: &csv::StringRecord) -> Result<u64, LedgerError> {
    let raw = field(record, 0, "height")?;
    raw.parse::<u64>().map_err(|_| LedgerError::Malformed {
        line: line_of(record),
        reason: format!("invalid height {raw:?}"),
    })
}

/// Parse a fee ledger. The first occurrence of a txid wins; later rows with the
/// same txid are skipped before their other fields are inspected.
pub fn read_fee_ledger<R: Read>(input: R) -> Result<Vec<FeeRecord>, LedgerError> {
    let mut rdr = reader(input);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rdr.records() {
        let record = row?;
        let tx_hash = field(&record, 1, "txid")?;
        if !seen.insert(tx_hash.to_string()) {
            debug!(tx_hash, line = line_of(&record), "duplicate txid skipped");
            continue;
        }
        let height = parse_height(&record)?;
        let raw_fee = field(&record, 2, "fee")?;
        let fee = raw_fee
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .ok_or_else(|| LedgerError::Malformed {
                line: line_of(&record),
                reason: format!("invalid fee {raw_fee:?}"),
            })?;
        out.push(FeeRecord {
            height,
            tx_hash: tx_hash.to_string(),
            fee,
        });
    }
    Ok(out)
}

pub fn load_fee_ledger(path: impl AsRef<Path>) -> Result<Vec<FeeRecord>, LedgerError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let records = read_fee_ledger(file)?;
    info!(path = %path.display(), count = records.len(), "loaded fee ledger");
    Ok(records)
}

/// Heights already present in a ledger (column 0), for resuming a harvest.
pub fn read_ledger_heights<R: Read>(input: R) -> Result<BTreeSet<u64>, LedgerError> {
    let mut rdr = reader(input);
    let mut heights = BTreeSet::new();
    for row in rdr.records() {
        heights.insert(parse_height(&row?)?);
    }
    Ok(heights)
}

/// Parse a `height,txid` anchor list.
pub fn read_anchor_refs<R: Read>(input: R) -> Result<Vec<AnchorRef>, LedgerError> {
    let mut rdr = reader(input);
    let mut out = Vec::new();
    for row in rdr.records() {
        let record = row?;
        let height = parse_height(&record)?;
        let tx_hash = field(&record, 1, "txid")?.to_string();
        out.push(AnchorRef { height, tx_hash });
    }
    Ok(out)
}
