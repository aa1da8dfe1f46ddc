//! anchor_cost: fee harvesting and cost reconciliation for checkpoint anchors.
//!
//! Crawls explorer APIs for anchor transactions on Bitcoin and Ethereum, reads
//! harvested fee ledgers, and stitches them with block times and price history
//! into cumulative cost reports. Read-only; never signs or sends transactions.

pub mod batch;
pub mod chain;
pub mod crawl;
pub mod ledger;
pub mod report;
pub mod stitch;

pub use chain::{
    AddressHistory, BlockchainInfoClient, Cache, Chain, ChainFee, EtherscanClient, FeeSource,
    FetchConfig, FetchError, Fetcher, RateLimiter, TimestampSource, TxOutput, TxRecord,
};
pub use crawl::{AnchorRecord, CrawlConfig, Crawler};
pub use ledger::{FeeRecord, LedgerError};
pub use report::ReportData;
pub use stitch::{stitch, BlockTimeMap, PriceSeries, Resolution, Sma, StitchedRow};
