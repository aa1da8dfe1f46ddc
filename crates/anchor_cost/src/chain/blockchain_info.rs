//! blockchain.info explorer client (UTXO model).

use crate::chain::explorer::{
    AddressHistory, Chain, ChainFee, FeeSource, TimestampSource, TxOutput, TxRecord,
};
use crate::chain::fetch::{FetchError, Fetcher};
use crate::chain::normalize::unix_to_minute;
use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Clone, Debug, Deserialize)]
pub struct RawOutput {
    #[serde(default)]
    pub spent: bool,
    #[serde(default)]
    pub value: u64,
    #[serde(default)]
    pub script: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawInput {
    pub prev_out: Option<RawOutput>,
}

/// `rawtx/{hash}` body; also the element type of `rawaddr` pages.
#[derive(Clone, Debug, Deserialize)]
pub struct RawTx {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub inputs: Vec<RawInput>,
    #[serde(default)]
    pub out: Vec<RawOutput>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawAddress {
    #[serde(default)]
    pub txs: Vec<RawTx>,
}

impl From<RawOutput> for TxOutput {
    fn from(o: RawOutput) -> Self {
        TxOutput {
            value: o.value,
            spent: o.spent,
            script: o.script,
        }
    }
}

impl From<RawTx> for TxRecord {
    fn from(tx: RawTx) -> Self {
        TxRecord {
            hash: tx.hash,
            time: tx.time,
            // coinbase inputs carry no prev_out
            inputs: tx
                .inputs
                .into_iter()
                .filter_map(|i| i.prev_out.map(TxOutput::from))
                .collect(),
            outputs: tx.out.into_iter().map(TxOutput::from).collect(),
        }
    }
}

/// Body-level `{"error": ...}` that blockchain.info returns with a 200 status.
#[derive(Deserialize)]
struct ErrorBody {
    error: Option<serde_json::Value>,
    message: Option<String>,
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, FetchError> {
    if let Ok(ErrorBody {
        error: Some(err),
        message,
    }) = serde_json::from_str::<ErrorBody>(body)
    {
        let detail = message.unwrap_or_else(|| err.to_string());
        return Err(FetchError::Upstream(detail));
    }
    Ok(serde_json::from_str(body)?)
}

/// Parse a `rawtx` response body into a transaction record.
pub fn parse_raw_tx(body: &str) -> Result<TxRecord, FetchError> {
    decode::<RawTx>(body).map(TxRecord::from)
}

/// Parse a `rawaddr` response body into its page of transactions.
pub fn parse_raw_address(body: &str) -> Result<Vec<TxRecord>, FetchError> {
    let addr: RawAddress = decode(body)?;
    Ok(addr.txs.into_iter().map(TxRecord::from).collect())
}

pub struct BlockchainInfoClient {
    fetcher: Fetcher,
}

impl BlockchainInfoClient {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub async fn raw_tx(&self, txid: &str) -> Result<TxRecord, FetchError> {
        let path = format!("rawtx/{}", urlencoding::encode(txid));
        self.fetcher.get_cached(&path, None, parse_raw_tx).await
    }
}

#[async_trait]
impl FeeSource for BlockchainInfoClient {
    fn chain(&self) -> Chain {
        Chain::Bitcoin
    }

    async fn transaction_fee(&self, txid: &str) -> Result<ChainFee, FetchError> {
        let tx = self.raw_tx(txid).await?;
        let satoshis = tx.spent_fee()?;
        debug!(txid, satoshis, "btc fee");
        Ok(ChainFee::Utxo { satoshis })
    }
}

#[async_trait]
impl TimestampSource for BlockchainInfoClient {
    async fn transaction_timestamp(&self, txid: &str) -> Result<OffsetDateTime, FetchError> {
        let tx = self.raw_tx(txid).await?;
        Ok(unix_to_minute(tx.time)?)
    }
}

#[async_trait]
impl AddressHistory for BlockchainInfoClient {
    async fn address_history(
        &self,
        address: &str,
        offset: u64,
        page_size: u32,
    ) -> Result<Vec<TxRecord>, FetchError> {
        let path = format!(
            "rawaddr/{}?offset={}&limit={}",
            urlencoding::encode(address),
            offset,
            page_size
        );
        let body = self.fetcher.get_text(&path, None).await?;
        parse_raw_address(&body)
    }
}
