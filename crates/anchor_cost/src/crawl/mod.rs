//! Anchor crawl over an address's transaction history.

mod crawler;
mod decode;

pub use crawler::{CrawlConfig, CrawlError, CrawlStats, Crawler, Step};
pub use decode::{
    decode_anchor, decode_payload, AnchorRecord, Reject, ANCHOR_MARKER, MIN_PAYLOAD_LEN,
};
