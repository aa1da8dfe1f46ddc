//! Etherscan proxy-API client (account model).

use crate::chain::explorer::{Chain, ChainFee, FeeSource, TimestampSource};
use crate::chain::fetch::{FetchError, Fetcher};
use crate::chain::normalize::{parse_hex_quantity, unix_to_minute};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::debug;

const WEI_PER_GWEI: u64 = 1_000_000_000;

/// Outer shape shared by every proxy action.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthTransaction {
    pub gas_price: String,
    pub block_number: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthReceipt {
    pub gas_used: String,
    pub effective_gas_price: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EthBlock {
    pub timestamp: String,
}

/// Decode a proxy response body, promoting a body-level `error` (or a bare string
/// `result`, which Etherscan uses for quota and key failures) to `FetchError`.
pub fn decode_proxy<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, FetchError> {
    let env: Envelope = serde_json::from_str(body)?;
    if let Some(err) = env.error {
        let msg = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(FetchError::Upstream(msg));
    }
    match env.result {
        None | Some(serde_json::Value::Null) => Err(FetchError::NotFound(what.to_string())),
        Some(serde_json::Value::String(s)) => Err(FetchError::Upstream(s)),
        Some(v) => Ok(serde_json::from_value(v)?),
    }
}

/// Integer gwei per gas (truncated) and gas used, preferring the receipt's
/// effective price when the upstream reports one.
pub fn gas_fee(tx: &EthTransaction, receipt: &EthReceipt) -> Result<ChainFee, FetchError> {
    let price_wei = match &receipt.effective_gas_price {
        Some(p) => parse_hex_quantity(p)?,
        None => parse_hex_quantity(&tx.gas_price)?,
    };
    let gas_used = parse_hex_quantity(&receipt.gas_used)?;
    Ok(ChainFee::Gas {
        gas_price_gwei: price_wei / WEI_PER_GWEI,
        gas_used,
    })
}

/// Decode a `eth_getTransactionByHash` body, treating a pending transaction
/// (no block number yet) as not found.
pub fn decode_mined_transaction(body: &str, txid: &str) -> Result<EthTransaction, FetchError> {
    let tx: EthTransaction = decode_proxy(body, &format!("transaction {txid}"))?;
    if tx.block_number.is_none() {
        return Err(FetchError::NotFound(format!("block for pending tx {txid}")));
    }
    Ok(tx)
}

pub struct EtherscanClient {
    fetcher: Fetcher,
    api_key: String,
}

impl EtherscanClient {
    pub fn new(fetcher: Fetcher, api_key: impl Into<String>) -> Self {
        Self {
            fetcher,
            api_key: api_key.into(),
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Proxy call through the response cache. Only bodies that `decode` accepts
    /// are stored.
    async fn proxy<T, F>(&self, query: &str, decode: F) -> Result<T, FetchError>
    where
        F: Fn(&str) -> Result<T, FetchError>,
    {
        let path = format!("?module=proxy&{query}");
        self.fetcher
            .get_cached(&path, Some(("apikey", &self.api_key)), decode)
            .await
    }

    /// A mined transaction. Pending ones are `NotFound` so that neither the
    /// lookup nor its missing block number is cached.
    pub async fn transaction(&self, txid: &str) -> Result<EthTransaction, FetchError> {
        let query = format!(
            "action=eth_getTransactionByHash&txhash={}",
            urlencoding::encode(txid)
        );
        self.proxy(&query, |body| decode_mined_transaction(body, txid)).await
    }

    pub async fn receipt(&self, txid: &str) -> Result<EthReceipt, FetchError> {
        let query = format!(
            "action=eth_getTransactionReceipt&txhash={}",
            urlencoding::encode(txid)
        );
        let what = format!("receipt {txid}");
        self.proxy(&query, |body| decode_proxy(body, &what)).await
    }

    /// `tag` is the block number as a hex quantity.
    pub async fn block(&self, tag: &str) -> Result<EthBlock, FetchError> {
        let query = format!(
            "action=eth_getBlockByNumber&tag={}&boolean=false",
            urlencoding::encode(tag)
        );
        let what = format!("block {tag}");
        self.proxy(&query, |body| decode_proxy(body, &what)).await
    }
}

#[async_trait]
impl FeeSource for EtherscanClient {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    async fn transaction_fee(&self, txid: &str) -> Result<ChainFee, FetchError> {
        let tx = self.transaction(txid).await?;
        let receipt = self.receipt(txid).await?;
        let fee = gas_fee(&tx, &receipt)?;
        debug!(txid, ?fee, "eth fee");
        Ok(fee)
    }
}

#[async_trait]
impl TimestampSource for EtherscanClient {
    async fn transaction_timestamp(&self, txid: &str) -> Result<OffsetDateTime, FetchError> {
        let tx = self.transaction(txid).await?;
        let number = tx
            .block_number
            .ok_or_else(|| FetchError::NotFound(format!("block for pending tx {txid}")))?;
        let block = self.block(&number).await?;
        let ts = parse_hex_quantity(&block.timestamp)?;
        let ts = i64::try_from(ts)
            .map_err(|_| FetchError::Upstream(format!("timestamp out of range: {ts}")))?;
        Ok(unix_to_minute(ts)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TX: &str = r#"{"jsonrpc":"2.0","id":1,"result":{
        "hash":"0x1e29","gasPrice":"0xba43b7400","blockNumber":"0x5daf3b","nonce":"0x15"}}"#;
    const RECEIPT: &str = r#"{"jsonrpc":"2.0","id":1,"result":{
        "gasUsed":"0x5208","status":"0x1"}}"#;

    #[test]
    fn fee_from_tx_and_receipt() {
        let tx: EthTransaction = decode_proxy(TX, "tx").unwrap();
        let receipt: EthReceipt = decode_proxy(RECEIPT, "receipt").unwrap();
        // 0xba43b7400 wei = 50 gwei, 0x5208 = 21000 gas
        let fee = gas_fee(&tx, &receipt).unwrap();
        assert_eq!(
            fee,
            ChainFee::Gas {
                gas_price_gwei: 50,
                gas_used: 21_000
            }
        );
        assert!((fee.native_amount() - 0.00105).abs() < 1e-12);
    }

    #[test]
    fn effective_price_wins() {
        let tx: EthTransaction = decode_proxy(TX, "tx").unwrap();
        let receipt = EthReceipt {
            gas_used: "0x5208".into(),
            effective_gas_price: Some("0x4a817c800".into()),
        };
        match gas_fee(&tx, &receipt).unwrap() {
            ChainFee::Gas { gas_price_gwei, .. } => assert_eq!(gas_price_gwei, 20),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rpc_error_is_promoted() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"invalid argument 0"}}"#;
        match decode_proxy::<EthTransaction>(body, "tx") {
            Err(FetchError::Upstream(msg)) => assert_eq!(msg, "invalid argument 0"),
            Err(other) => panic!("unexpected {other:?}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn string_result_is_upstream_error() {
        let body = r#"{"status":"0","message":"NOTOK","result":"Invalid API Key"}"#;
        assert!(matches!(
            decode_proxy::<EthTransaction>(body, "tx"),
            Err(FetchError::Upstream(_))
        ));
    }

    #[test]
    fn pending_transaction_is_not_found() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{
            "hash":"0x1e29","gasPrice":"0xba43b7400","blockNumber":null}}"#;
        assert!(matches!(
            decode_mined_transaction(body, "0x1e29"),
            Err(FetchError::NotFound(_))
        ));
        assert!(decode_mined_transaction(TX, "0x1e29").is_ok());
    }

    #[test]
    fn null_result_is_not_found() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        assert!(matches!(
            decode_proxy::<EthReceipt>(body, "receipt"),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn bad_hex_field_is_error() {
        let tx = EthTransaction {
            gas_price: "0xnothex".into(),
            block_number: None,
        };
        let receipt = EthReceipt {
            gas_used: "0x1".into(),
            effective_gas_price: None,
        };
        assert!(matches!(
            gas_fee(&tx, &receipt),
            Err(FetchError::Normalize(_))
        ));
    }
}
