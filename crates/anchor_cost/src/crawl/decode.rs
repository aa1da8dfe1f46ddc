//! Anchor payload extraction from a transaction's second output script.

use crate::chain::{unix_to_minute, TxRecord};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

/// `OP_RETURN`, push 40 bytes, then the ASCII tag `Fa`.
pub const ANCHOR_MARKER: [u8; 4] = *b"j(Fa";
/// Marker + 6-byte height + digest.
pub const MIN_PAYLOAD_LEN: usize = 40;
const HEIGHT_LEN: usize = 6;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AnchorRecord {
    pub tx_hash: String,
    pub block_height: u64,
    /// Directory-block key Merkle root; 32 bytes for a canonical anchor.
    pub key_mr: Vec<u8>,
    #[serde(with = "time::serde::rfc3339")]
    pub tx_time: OffsetDateTime,
}

impl AnchorRecord {
    pub fn key_mr_hex(&self) -> String {
        hex::encode(&self.key_mr)
    }
}

/// Why a transaction is not an anchor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Reject {
    #[error("expected 2 outputs, found {0}")]
    OutputCount(usize),
    #[error("script is not hex: {0}")]
    ScriptHex(String),
    #[error("payload too short: {0} bytes")]
    ShortPayload(usize),
    #[error("unknown script: {0}")]
    UnknownMarker(String),
    #[error("invalid tx time: {0}")]
    Time(i64),
}

impl Reject {
    /// Shape mismatches are routine for an address that also receives ordinary
    /// payments; these are logged at debug rather than warn.
    pub fn is_routine(&self) -> bool {
        matches!(self, Reject::OutputCount(_) | Reject::ShortPayload(_))
    }
}

/// Split a raw anchor payload into `(height, key_mr)`.
pub fn decode_payload(payload: &[u8]) -> Result<(u64, Vec<u8>), Reject> {
    if payload.len() < MIN_PAYLOAD_LEN {
        return Err(Reject::ShortPayload(payload.len()));
    }
    let Some(body) = payload.strip_prefix(&ANCHOR_MARKER[..]) else {
        return Err(Reject::UnknownMarker(hex::encode(payload)));
    };
    let mut be = [0u8; 8];
    be[8 - HEIGHT_LEN..].copy_from_slice(&body[..HEIGHT_LEN]);
    Ok((u64::from_be_bytes(be), body[HEIGHT_LEN..].to_vec()))
}

/// Decode an anchor from a transaction, or say why it is not one.
pub fn decode_anchor(tx: &TxRecord) -> Result<AnchorRecord, Reject> {
    if tx.outputs.len() != 2 {
        return Err(Reject::OutputCount(tx.outputs.len()));
    }
    let script = &tx.outputs[1].script;
    let payload = hex::decode(script).map_err(|e| Reject::ScriptHex(e.to_string()))?;
    let (block_height, key_mr) = decode_payload(&payload)?;
    let tx_time = unix_to_minute(tx.time).map_err(|_| Reject::Time(tx.time))?;
    Ok(AnchorRecord {
        tx_hash: tx.hash.clone(),
        block_height,
        key_mr,
        tx_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TxOutput;
    use time::macros::datetime;

    const ANCHOR_SCRIPT: &str =
        "6a28466100000003eebbbe5a5e36d029fe5dad88394dd53539df09465fba9c07140630162ba47aaa37ba";

    fn tx_with_scripts(scripts: &[&str]) -> TxRecord {
        TxRecord {
            hash: "067aca7c".into(),
            time: 1_597_207_885,
            inputs: vec![],
            outputs: scripts
                .iter()
                .map(|s| TxOutput {
                    value: 0,
                    spent: false,
                    script: s.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn decodes_canonical_anchor() {
        let tx = tx_with_scripts(&["76a914c5b7", ANCHOR_SCRIPT]);
        let rec = decode_anchor(&tx).unwrap();
        assert_eq!(rec.block_height, 257_723);
        assert_eq!(
            rec.key_mr_hex(),
            "be5a5e36d029fe5dad88394dd53539df09465fba9c07140630162ba47aaa37ba"
        );
        assert_eq!(rec.key_mr.len(), 32);
        assert_eq!(rec.tx_time, datetime!(2020-08-12 04:51 UTC));
    }

    #[test]
    fn payload_decode_is_bit_exact() {
        let mut payload = ANCHOR_MARKER.to_vec();
        payload.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        payload.extend((0u8..32).collect::<Vec<_>>());
        let (height, key_mr) = decode_payload(&payload).unwrap();
        assert_eq!(height, 0x0102_0304_0506);
        assert_eq!(key_mr, (0u8..32).collect::<Vec<_>>());
        assert_eq!(decode_payload(&payload).unwrap(), (height, key_mr));
    }

    #[test]
    fn rejects_wrong_output_count() {
        assert_eq!(
            decode_anchor(&tx_with_scripts(&[ANCHOR_SCRIPT])),
            Err(Reject::OutputCount(1))
        );
        assert_eq!(
            decode_anchor(&tx_with_scripts(&["00", ANCHOR_SCRIPT, "00"])),
            Err(Reject::OutputCount(3))
        );
    }

    #[test]
    fn rejects_wrong_marker() {
        let other = format!("6a284662{}", &ANCHOR_SCRIPT[8..]);
        let err = decode_anchor(&tx_with_scripts(&["00", &other])).unwrap_err();
        assert!(matches!(err, Reject::UnknownMarker(_)));
        assert!(!err.is_routine());
    }

    #[test]
    fn rejects_short_payload() {
        let short = &ANCHOR_SCRIPT[..78];
        assert_eq!(
            decode_anchor(&tx_with_scripts(&["00", short])),
            Err(Reject::ShortPayload(39))
        );
    }

    #[test]
    fn rejects_non_hex_script() {
        let err = decode_anchor(&tx_with_scripts(&["00", "zz"])).unwrap_err();
        assert!(matches!(err, Reject::ScriptHex(_)));
    }

    #[test]
    fn minimum_length_payload_accepted() {
        let min = &ANCHOR_SCRIPT[..80];
        let rec = decode_anchor(&tx_with_scripts(&["00", min])).unwrap();
        assert_eq!(rec.block_height, 257_723);
        assert_eq!(rec.key_mr.len(), 30);
    }
}
