//! On-chain state reader
//!
//! The tracker only needs two questions answered: what happened to a
//! submitted transaction, and what a token balance is. Concrete RPC
//! clients live with the binaries; [`StaticBlockchain`] answers from
//! values set in process.

use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use thiserror::Error;

/// Outcome of a submitted transaction as seen by the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxStatus {
    /// Known to the node but not yet mined
    Pending,
    Success,
    /// Mined and reverted
    Failure,
    /// Unknown to the node
    NotFound,
}

impl TxStatus {
    /// Terminal statuses resolve the swap
    pub fn is_final(&self) -> bool {
        matches!(self, TxStatus::Success | TxStatus::Failure)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxStatus::Pending => "pending",
            TxStatus::Success => "success",
            TxStatus::Failure => "failure",
            TxStatus::NotFound => "not-found",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("rpc transport error: {0}")]
    Transport(String),

    #[error("rpc returned an error: {0}")]
    Rpc(String),

    #[error("malformed rpc response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait BlockchainReader: Send + Sync {
    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, ChainError>;

    /// Balance of `token` held by `address`, in the token's smallest unit
    async fn token_balance(&self, token: &str, address: &str) -> Result<Decimal, ChainError>;
}

/// In-process reader with programmable answers
///
/// Unknown transactions report `NotFound`; unknown balances are zero.
#[derive(Debug, Default)]
pub struct StaticBlockchain {
    statuses: DashMap<String, TxStatus>,
    failures: DashMap<String, ChainError>,
    balances: DashMap<(String, String), Decimal>,
}

impl StaticBlockchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, tx_hash: impl Into<String>, status: TxStatus) {
        self.statuses.insert(tx_hash.into(), status);
    }

    /// Make lookups of `tx_hash` fail until cleared
    pub fn fail_lookups(&self, tx_hash: impl Into<String>, error: ChainError) {
        self.failures.insert(tx_hash.into(), error);
    }

    pub fn clear_failure(&self, tx_hash: &str) {
        self.failures.remove(tx_hash);
    }

    pub fn set_balance(&self, token: impl Into<String>, address: impl Into<String>, amount: Decimal) {
        self.balances.insert((token.into(), address.into()), amount);
    }
}

#[async_trait]
impl BlockchainReader for StaticBlockchain {
    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, ChainError> {
        if let Some(error) = self.failures.get(tx_hash) {
            return Err(error.value().clone());
        }
        Ok(self
            .statuses
            .get(tx_hash)
            .map(|status| *status.value())
            .unwrap_or(TxStatus::NotFound))
    }

    async fn token_balance(&self, token: &str, address: &str) -> Result<Decimal, ChainError> {
        Ok(self
            .balances
            .get(&(token.to_string(), address.to_string()))
            .map(|balance| *balance.value())
            .unwrap_or(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_statuses() {
        let chain = StaticBlockchain::new();
        assert_eq!(chain.transaction_status("0x1").await.unwrap(), TxStatus::NotFound);

        chain.set_status("0x1", TxStatus::Success);
        assert_eq!(chain.transaction_status("0x1").await.unwrap(), TxStatus::Success);
        assert!(TxStatus::Success.is_final());
        assert!(!TxStatus::Pending.is_final());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let chain = StaticBlockchain::new();
        chain.set_status("0x2", TxStatus::Pending);
        chain.fail_lookups("0x2", ChainError::Transport("connection refused".to_string()));
        assert!(chain.transaction_status("0x2").await.is_err());

        chain.clear_failure("0x2");
        assert_eq!(chain.transaction_status("0x2").await.unwrap(), TxStatus::Pending);
    }

    #[tokio::test]
    async fn test_balances_default_to_zero() {
        let chain = StaticBlockchain::new();
        chain.set_balance("0xtoken", "0xuser", Decimal::from(5));
        assert_eq!(chain.token_balance("0xtoken", "0xuser").await.unwrap(), Decimal::from(5));
        assert_eq!(chain.token_balance("0xtoken", "0xother").await.unwrap(), Decimal::ZERO);
    }
}
