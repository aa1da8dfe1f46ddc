//! Join of a fee ledger with block times and prices into a cumulative report.

use crate::ledger::FeeRecord;
use crate::stitch::block_times::BlockTimeMap;
use crate::stitch::prices::{PriceSeries, Resolution};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StitchedRow {
    pub height: u64,
    /// Block time; absent when the height is missing from the block-time table.
    #[serde(with = "time::serde::rfc3339::option")]
    pub time: Option<OffsetDateTime>,
    pub price: f64,
    pub fee: f64,
    pub fee_usd: f64,
    pub cumulative_fee: f64,
    pub cumulative_usd: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StitchSummary {
    pub symbol: String,
    pub resolution: Resolution,
    pub rows: usize,
    pub missing_time: usize,
    pub missing_price: usize,
    pub total_fee: f64,
    pub total_usd: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Stitched {
    pub summary: StitchSummary,
    pub rows: Vec<StitchedRow>,
}

/// One row per ledger entry, in ledger order. Missing block times or prices
/// degrade to a zero price rather than failing the batch.
pub fn stitch(
    symbol: &str,
    ledger: &[FeeRecord],
    block_times: &BlockTimeMap,
    prices: &PriceSeries,
) -> Stitched {
    let mut rows = Vec::with_capacity(ledger.len());
    let mut cumulative_fee = 0.0;
    let mut cumulative_usd = 0.0;
    let mut missing_time = 0;
    let mut missing_price = 0;

    for rec in ledger {
        let time = block_times.get(rec.height);
        let price = match time {
            Some(t) => prices.price_at(t).unwrap_or_else(|| {
                missing_price += 1;
                0.0
            }),
            None => {
                warn!(height = rec.height, tx_hash = %rec.tx_hash, "no block time");
                missing_time += 1;
                0.0
            }
        };
        let fee_usd = rec.fee * price;
        cumulative_fee += rec.fee;
        cumulative_usd += fee_usd;
        rows.push(StitchedRow {
            height: rec.height,
            time,
            price,
            fee: rec.fee,
            fee_usd,
            cumulative_fee,
            cumulative_usd,
        });
    }

    let summary = StitchSummary {
        symbol: symbol.to_string(),
        resolution: prices.resolution(),
        rows: rows.len(),
        missing_time,
        missing_price,
        total_fee: cumulative_fee,
        total_usd: cumulative_usd,
    };
    info!(
        symbol,
        rows = summary.rows,
        missing_time,
        missing_price,
        total_usd = summary.total_usd,
        "stitched"
    );
    Stitched { summary, rows }
}
