//! Host-protocol block height → UTC timestamp table.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use time::{OffsetDateTime, UtcOffset};
use tracing::info;

#[derive(Error, Debug)]
pub enum BlockTimeError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct Stamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

/// Read-only lookup loaded once from `{"<height>": "<RFC3339>"}`.
#[derive(Clone, Debug, Default)]
pub struct BlockTimeMap {
    times: HashMap<u64, OffsetDateTime>,
}

impl BlockTimeMap {
    pub fn get(&self, height: u64) -> Option<OffsetDateTime> {
        self.times.get(&height).copied()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

impl FromIterator<(u64, OffsetDateTime)> for BlockTimeMap {
    fn from_iter<I: IntoIterator<Item = (u64, OffsetDateTime)>>(iter: I) -> Self {
        Self {
            times: iter
                .into_iter()
                .map(|(h, t)| (h, t.to_offset(UtcOffset::UTC)))
                .collect(),
        }
    }
}

pub fn parse_block_times(json: &str) -> Result<BlockTimeMap, BlockTimeError> {
    let raw: HashMap<u64, Stamp> = serde_json::from_str(json)?;
    Ok(raw.into_iter().map(|(h, Stamp(t))| (h, t)).collect())
}

pub fn load_block_times(path: impl AsRef<Path>) -> Result<BlockTimeMap, BlockTimeError> {
    let path = path.as_ref();
    let map = parse_block_times(&std::fs::read_to_string(path)?)?;
    info!(path = %path.display(), heights = map.len(), "loaded block times");
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_string_keys_and_offsets() {
        let map = parse_block_times(
            r#"{"0":"2015-09-10T18:00:00Z","257723":"2020-08-12T06:51:00+02:00"}"#,
        )
        .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(0), Some(datetime!(2015-09-10 18:00 UTC)));
        let t = map.get(257_723).unwrap();
        assert_eq!(t, datetime!(2020-08-12 04:51 UTC));
        assert_eq!(t.offset(), UtcOffset::UTC);
        assert_eq!(map.get(1), None);
    }

    #[test]
    fn bad_key_or_time_is_error() {
        assert!(parse_block_times(r#"{"abc":"2015-09-10T18:00:00Z"}"#).is_err());
        assert!(parse_block_times(r#"{"1":"yesterday"}"#).is_err());
    }
}
