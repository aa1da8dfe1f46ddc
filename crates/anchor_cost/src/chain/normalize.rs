//! Normalization of upstream numeric and time fields.

use thiserror::Error;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, Time};

/// `YYYY-MM-DD HH:MM`, the minute-resolution layout used in every emitted CSV.
pub const MINUTE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("invalid hex quantity: {0}")]
    InvalidHex(String),
    #[error("invalid unix timestamp: {0}")]
    InvalidTimestamp(i64),
}

/// Parse a `0x`-prefixed (or bare) hex quantity as returned by Ethereum JSON-RPC.
pub fn parse_hex_quantity(s: &str) -> Result<u64, NormalizeError> {
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    u64::from_str_radix(digits, 16).map_err(|_| NormalizeError::InvalidHex(s.to_string()))
}

/// Unix seconds to UTC, truncated to the minute.
pub fn unix_to_minute(ts: i64) -> Result<OffsetDateTime, NormalizeError> {
    let dt = OffsetDateTime::from_unix_timestamp(ts)
        .map_err(|_| NormalizeError::InvalidTimestamp(ts))?;
    Ok(truncate_to_minute(dt))
}

pub fn truncate_to_minute(dt: OffsetDateTime) -> OffsetDateTime {
    let t = dt.time();
    // hour/minute come from a valid Time, so this cannot fail
    let floored = Time::from_hms(t.hour(), t.minute(), 0).unwrap_or(Time::MIDNIGHT);
    dt.replace_time(floored)
}

pub fn truncate_to_hour(dt: OffsetDateTime) -> OffsetDateTime {
    let floored = Time::from_hms(dt.hour(), 0, 0).unwrap_or(Time::MIDNIGHT);
    dt.replace_time(floored)
}

pub fn truncate_to_day(dt: OffsetDateTime) -> OffsetDateTime {
    dt.replace_time(Time::MIDNIGHT)
}

/// Format as `YYYY-MM-DD HH:MM` in UTC.
pub fn format_minute(dt: OffsetDateTime) -> String {
    dt.to_offset(time::UtcOffset::UTC)
        .format(MINUTE_FORMAT)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn hex_with_prefix() {
        assert_eq!(parse_hex_quantity("0x5208").unwrap(), 21000);
        assert_eq!(parse_hex_quantity("0x0").unwrap(), 0);
    }

    #[test]
    fn hex_without_prefix() {
        assert_eq!(parse_hex_quantity("ff").unwrap(), 255);
    }

    #[test]
    fn hex_rejects_garbage() {
        assert!(parse_hex_quantity("0xzz").is_err());
        assert!(parse_hex_quantity("").is_err());
        assert!(parse_hex_quantity("-0x1").is_err());
    }

    #[test]
    fn minute_truncation_and_format() {
        let t = unix_to_minute(1_597_207_885).unwrap();
        assert_eq!(t, datetime!(2020-08-12 04:51 UTC));
        assert_eq!(format_minute(t), "2020-08-12 04:51");
    }

    #[test]
    fn hour_and_day_truncation() {
        let t = datetime!(2020-08-12 04:51:25 UTC);
        assert_eq!(truncate_to_hour(t), datetime!(2020-08-12 04:00 UTC));
        assert_eq!(truncate_to_day(t), datetime!(2020-08-12 0:00 UTC));
    }
}
