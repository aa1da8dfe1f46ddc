//! Append-only CSV writers. Every row is flushed as soon as it is written so a
//! crash loses at most the row in flight.

use super::LedgerError;
use crate::chain::{format_minute, Chain};
use crate::crawl::AnchorRecord;
use std::io::Write;
use time::OffsetDateTime;

fn csv_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(inner)
}

fn into_inner<W: Write>(w: csv::Writer<W>) -> Result<W, LedgerError> {
    w.into_inner()
        .map_err(|e| LedgerError::Io(std::io::Error::other(e.to_string())))
}

/// `TxID,Height,KeyMR,TxDate` rows produced by the anchor crawler.
pub struct AnchorCsvWriter<W: Write> {
    inner: csv::Writer<W>,
    rows: u64,
}

impl<W: Write> AnchorCsvWriter<W> {
    /// Pass `write_header = false` when appending to a file that already has one.
    pub fn new(inner: W, write_header: bool) -> Result<Self, LedgerError> {
        let mut inner = csv_writer(inner);
        if write_header {
            inner.write_record(["TxID", "Height", "KeyMR", "TxDate"])?;
            inner.flush()?;
        }
        Ok(Self { inner, rows: 0 })
    }

    pub fn write(&mut self, rec: &AnchorRecord) -> Result<(), LedgerError> {
        self.inner.write_record([
            rec.tx_hash.clone(),
            rec.block_height.to_string(),
            rec.key_mr_hex(),
            format_minute(rec.tx_time),
        ])?;
        self.inner.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> Result<(), LedgerError> {
        Ok(self.inner.flush()?)
    }

    pub fn into_inner(self) -> Result<W, LedgerError> {
        into_inner(self.inner)
    }
}

/// `Height,TxID,<fee label>` rows produced by the fee harvest.
pub struct FeeLedgerWriter<W: Write> {
    inner: csv::Writer<W>,
}

impl<W: Write> FeeLedgerWriter<W> {
    pub fn new(inner: W, chain: Chain, write_header: bool) -> Result<Self, LedgerError> {
        let mut inner = csv_writer(inner);
        if write_header {
            inner.write_record(["Height", "TxID", chain.fee_label()])?;
            inner.flush()?;
        }
        Ok(Self { inner })
    }

    pub fn write(&mut self, height: u64, tx_hash: &str, fee: f64) -> Result<(), LedgerError> {
        self.inner
            .write_record([height.to_string(), tx_hash.to_string(), format!("{fee:.9}")])?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W, LedgerError> {
        into_inner(self.inner)
    }
}

/// `Height,TxID,<Sym>Paid,TxDate` rows produced by the date attachment pass.
pub struct DatedLedgerWriter<W: Write> {
    inner: csv::Writer<W>,
}

impl<W: Write> DatedLedgerWriter<W> {
    pub fn new(inner: W, chain: Chain) -> Result<Self, LedgerError> {
        let mut inner = csv_writer(inner);
        let paid = match chain {
            Chain::Bitcoin => "BtcPaid",
            Chain::Ethereum => "EthPaid",
        };
        inner.write_record(["Height", "TxID", paid, "TxDate"])?;
        inner.flush()?;
        Ok(Self { inner })
    }

    pub fn write(
        &mut self,
        height: u64,
        tx_hash: &str,
        fee: f64,
        at: OffsetDateTime,
    ) -> Result<(), LedgerError> {
        self.inner.write_record([
            height.to_string(),
            tx_hash.to_string(),
            format!("{fee:.6}"),
            format_minute(at),
        ])?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W, LedgerError> {
        into_inner(self.inner)
    }
}
