//! Historical price series (CryptoDataDownload-style exchange exports).
//!
//! Layout: one metadata line, one header line, then
//! `date,symbol,open,high,low,close,volume_base,volume_quote`. Only `date`,
//! `high` and `low` are used; the price of a bucket is the high/low midpoint.

use crate::chain::{truncate_to_day, truncate_to_hour};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use tracing::{debug, info};

const PREAMBLE_LINES: usize = 2;

#[derive(Error, Debug)]
pub enum PriceError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: {reason}")]
    Malformed { line: u64, reason: String },
    #[error("line {line}: {found:?} row in a {expected:?} series")]
    MixedResolution {
        line: u64,
        expected: Resolution,
        found: Resolution,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Day,
    Hour,
}

impl Resolution {
    /// Bucket key for `t` at this resolution.
    pub fn bucket(self, t: OffsetDateTime) -> OffsetDateTime {
        match self {
            Resolution::Day => truncate_to_day(t),
            Resolution::Hour => truncate_to_hour(t),
        }
    }
}

/// Bucketed prices at a single resolution.
#[derive(Clone, Debug)]
pub struct PriceSeries {
    resolution: Resolution,
    points: HashMap<OffsetDateTime, f64>,
}

impl PriceSeries {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            points: HashMap::new(),
        }
    }

    /// Insert a price; `at` is bucketed at the series resolution.
    pub fn insert(&mut self, at: OffsetDateTime, price: f64) {
        self.points.insert(self.resolution.bucket(at), price);
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Price of the bucket containing `t`.
    pub fn price_at(&self, t: OffsetDateTime) -> Option<f64> {
        self.points.get(&self.resolution.bucket(t)).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Parse `2020-08-10` (day) or `2020-08-10 09-PM` / `2020-08-10 21:00:00` (hour).
fn parse_bucket(raw: &str) -> Option<(Resolution, OffsetDateTime)> {
    let (date_part, hour_part) = match raw.split_once(' ') {
        Some((d, h)) => (d, Some(h.trim())),
        None => (raw, None),
    };
    let date = Date::parse(date_part, format_description!("[year]-[month]-[day]")).ok()?;
    let Some(hour_part) = hour_part else {
        return Some((Resolution::Day, PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_utc()));
    };
    let hour = if let Some((h, period)) = hour_part.split_once('-') {
        let h: u8 = h.parse().ok().filter(|h| (1..=12).contains(h))?;
        match period.to_ascii_uppercase().as_str() {
            "AM" => h % 12,
            "PM" => h % 12 + 12,
            _ => return None,
        }
    } else {
        let t = Time::parse(hour_part, format_description!("[hour]:[minute]:[second]")).ok()?;
        t.hour()
    };
    let time = Time::from_hms(hour, 0, 0).ok()?;
    Some((Resolution::Hour, PrimitiveDateTime::new(date, time).assume_utc()))
}

fn parse_price(
    record: &csv::StringRecord,
    idx: usize,
    name: &str,
    line: u64,
) -> Result<f64, PriceError> {
    record
        .get(idx)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| PriceError::Malformed {
            line,
            reason: format!("invalid {name}"),
        })
}

/// Parse a price export. The first data row fixes the series resolution.
pub fn read_price_series<R: Read>(input: R) -> Result<PriceSeries, PriceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    let mut series: Option<PriceSeries> = None;
    for row in rdr.records().skip(PREAMBLE_LINES) {
        let record = row?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let raw_date = record.get(0).unwrap_or_default();
        let (resolution, at) = parse_bucket(raw_date).ok_or_else(|| PriceError::Malformed {
            line,
            reason: format!("invalid date {raw_date:?}"),
        })?;
        let high = parse_price(&record, 3, "high", line)?;
        let low = parse_price(&record, 4, "low", line)?;

        let series = series.get_or_insert_with(|| PriceSeries::new(resolution));
        if series.resolution != resolution {
            return Err(PriceError::MixedResolution {
                line,
                expected: series.resolution,
                found: resolution,
            });
        }
        if series.points.contains_key(&at) {
            debug!(line, date = raw_date, "duplicate bucket, keeping latest");
        }
        series.insert(at, (high + low) / 2.0);
    }
    Ok(series.unwrap_or_else(|| PriceSeries::new(Resolution::Day)))
}

pub fn load_price_series(path: impl AsRef<Path>) -> Result<PriceSeries, PriceError> {
    let path = path.as_ref();
    let series = read_price_series(std::fs::File::open(path)?)?;
    info!(
        path = %path.display(),
        points = series.len(),
        resolution = ?series.resolution(),
        "loaded price series"
    );
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const DAILY: &str = "Timestamps are UTC timezone,https://www.CryptoDataDownload.com\n\
        Date,Symbol,Open,High,Low,Close,Volume BTC,Volume USD\n\
        2020-08-11,BTCUSD,11880.0,11940.0,11100.0,11390.0,100,1000\n\
        2020-08-10,BTCUSD,11680.0,12060.0,11520.0,11880.0,100,1000\n";

    const HOURLY: &str = "Timestamps are UTC timezone,https://www.CryptoDataDownload.com\n\
        Date,Symbol,Open,High,Low,Close,Volume ETH,Volume USD\n\
        2020-08-10 09-PM,ETHUSD,390,400,380,395,1,1\n\
        2020-08-10 12-AM,ETHUSD,370,372,368,371,1,1\n\
        2020-08-10 12-PM,ETHUSD,380,384,376,381,1,1\n";

    #[test]
    fn daily_midpoints() {
        let s = read_price_series(DAILY.as_bytes()).unwrap();
        assert_eq!(s.resolution(), Resolution::Day);
        assert_eq!(s.len(), 2);
        assert_eq!(s.price_at(datetime!(2020-08-10 17:45 UTC)), Some(11790.0));
        assert_eq!(s.price_at(datetime!(2020-08-11 00:00 UTC)), Some(11520.0));
        assert_eq!(s.price_at(datetime!(2020-08-12 00:00 UTC)), None);
    }

    #[test]
    fn hourly_twelve_hour_clock() {
        let s = read_price_series(HOURLY.as_bytes()).unwrap();
        assert_eq!(s.resolution(), Resolution::Hour);
        assert_eq!(s.price_at(datetime!(2020-08-10 21:59 UTC)), Some(390.0));
        assert_eq!(s.price_at(datetime!(2020-08-10 00:10 UTC)), Some(370.0));
        assert_eq!(s.price_at(datetime!(2020-08-10 12:00 UTC)), Some(380.0));
        assert_eq!(s.price_at(datetime!(2020-08-10 13:00 UTC)), None);
    }

    #[test]
    fn mixed_resolution_rejected() {
        let mixed = format!("{DAILY}2020-08-09 01-AM,BTCUSD,1,2,1,1,1,1\n");
        assert!(matches!(
            read_price_series(mixed.as_bytes()),
            Err(PriceError::MixedResolution { line: 5, .. })
        ));
    }

    #[test]
    fn malformed_row_is_fatal() {
        let bad = format!("{DAILY}2020-08-09,BTCUSD,1,oops,1,1,1,1\n");
        match read_price_series(bad.as_bytes()) {
            Err(PriceError::Malformed { line, reason }) => {
                assert_eq!(line, 5);
                assert!(reason.contains("high"));
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn bucket_parsing() {
        assert_eq!(
            parse_bucket("2020-08-10 21:00:00"),
            Some((Resolution::Hour, datetime!(2020-08-10 21:00 UTC)))
        );
        assert_eq!(parse_bucket("2020-08-10 13-PM"), None);
        assert_eq!(parse_bucket("10/08/2020"), None);
    }
}
