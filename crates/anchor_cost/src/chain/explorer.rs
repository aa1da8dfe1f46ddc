//! Uniform explorer capabilities over chain-specific clients.

use crate::chain::fetch::FetchError;
use async_trait::async_trait;
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chain {
    Bitcoin,
    Ethereum,
}

impl Chain {
    pub fn symbol(self) -> &'static str {
        match self {
            Chain::Bitcoin => "BTC",
            Chain::Ethereum => "ETH",
        }
    }

    /// Header label for the fee column of a harvested ledger.
    pub fn fee_label(self) -> &'static str {
        match self {
            Chain::Bitcoin => "BTC Fee",
            Chain::Ethereum => "Eth Paid",
        }
    }
}

/// Fee paid by one transaction, in the chain's own terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainFee {
    /// Account model: integer gwei per gas and gas consumed.
    Gas { gas_price_gwei: u64, gas_used: u64 },
    /// UTXO model: satoshis.
    Utxo { satoshis: u64 },
}

impl ChainFee {
    /// Amount in whole native units (ETH or BTC).
    pub fn native_amount(&self) -> f64 {
        match *self {
            ChainFee::Gas {
                gas_price_gwei,
                gas_used,
            } => (u128::from(gas_price_gwei) * u128::from(gas_used)) as f64 / 1e9,
            ChainFee::Utxo { satoshis } => satoshis as f64 / 1e8,
        }
    }
}

/// Output (or spent previous output) of a UTXO transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub spent: bool,
    /// Hex-encoded locking script.
    pub script: String,
}

/// Provider-neutral UTXO transaction record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxRecord {
    pub hash: String,
    /// Unix seconds.
    pub time: i64,
    /// Previous outputs consumed by this transaction.
    pub inputs: Vec<TxOutput>,
    pub outputs: Vec<TxOutput>,
}

impl TxRecord {
    /// `sum(spent inputs) - sum(spent outputs)`.
    ///
    /// The result reflects the upstream's `spent` flags at query time. An output
    /// not yet spent is left out, so this only equals the conventional
    /// inputs-minus-outputs fee when the upstream's view happens to line up.
    pub fn spent_fee(&self) -> Result<u64, FetchError> {
        let inputs: u64 = self
            .inputs
            .iter()
            .filter(|o| o.spent)
            .map(|o| o.value)
            .sum();
        let outputs: u64 = self
            .outputs
            .iter()
            .filter(|o| o.spent)
            .map(|o| o.value)
            .sum();
        inputs
            .checked_sub(outputs)
            .ok_or_else(|| FetchError::NegativeFee {
                txid: self.hash.clone(),
                inputs,
                outputs,
            })
    }
}

#[async_trait]
pub trait FeeSource: Send + Sync {
    fn chain(&self) -> Chain;
    async fn transaction_fee(&self, txid: &str) -> Result<ChainFee, FetchError>;
}

#[async_trait]
pub trait TimestampSource: Send + Sync {
    /// Confirmation time of `txid`, UTC truncated to the minute.
    async fn transaction_timestamp(&self, txid: &str) -> Result<OffsetDateTime, FetchError>;
}

#[async_trait]
pub trait AddressHistory: Send + Sync {
    /// One page of an address's transactions starting at `offset`. An empty page
    /// does not mean the history is exhausted.
    async fn address_history(
        &self,
        address: &str,
        offset: u64,
        page_size: u32,
    ) -> Result<Vec<TxRecord>, FetchError>;
}
