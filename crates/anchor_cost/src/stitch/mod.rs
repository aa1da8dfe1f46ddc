//! Time-keyed join of fee ledgers with block times and price history.

mod block_times;
mod prices;
pub mod sma;
mod stitcher;

pub use block_times::{load_block_times, parse_block_times, BlockTimeError, BlockTimeMap};
pub use prices::{load_price_series, read_price_series, PriceError, PriceSeries, Resolution};
pub use sma::{smooth, Sma};
pub use stitcher::{stitch, StitchSummary, Stitched, StitchedRow};
