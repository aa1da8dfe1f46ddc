//! Explorer clients, rate limiting, response caching, and normalization.

pub mod blockchain_info;
mod cache;
pub mod etherscan;
pub mod explorer;
pub(crate) mod fetch;
mod limiter;
mod normalize;

pub use blockchain_info::BlockchainInfoClient;
pub use cache::{Cache, CacheError};
pub use etherscan::EtherscanClient;
pub use explorer::{
    AddressHistory, Chain, ChainFee, FeeSource, TimestampSource, TxOutput, TxRecord,
};
pub use fetch::{FetchConfig, FetchError, Fetcher};
pub use limiter::RateLimiter;
pub use normalize::{
    format_minute, parse_hex_quantity, truncate_to_day, truncate_to_hour, truncate_to_minute,
    unix_to_minute, NormalizeError, MINUTE_FORMAT,
};
