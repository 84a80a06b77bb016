//! Ports to the remote exchange program.
//!
//! The session layer only ever talks to [`AdminLedger`] and [`UserLedger`].
//! [`rpc`] implements them over JSON-RPC and a websocket account feed;
//! [`crate::testing`] implements them in memory.

pub mod accounts;
pub mod feed;
pub mod instructions;
pub mod rpc;

use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use thiserror::Error;

use crate::config::EffectiveConfig;
use crate::error::AdminResult;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("account not found: {0}")]
    AccountNotFound(Pubkey),

    #[error("failed to decode {account}: {reason}")]
    Decode {
        account: &'static str,
        reason: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("market {0} is not initialized")]
    MarketNotInitialized(u64),

    #[error("exchange state not loaded; subscribe first")]
    StateNotLoaded,

    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<solana_client::client_error::ClientError> for LedgerError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        LedgerError::Rpc(err.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// AMM curve parameters of one market
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveParameters {
    pub sqrt_k: u128,
    pub peg_multiplier: u128,
}

/// Privileged side of the exchange: connection, operator signer, program
#[async_trait]
pub trait AdminLedger: Send + Sync {
    /// Operator public key
    fn authority(&self) -> Pubkey;

    /// Start the account-update feed
    async fn subscribe(&mut self) -> LedgerResult<()>;

    /// Stop the account-update feed and release its connection
    async fn unsubscribe(&mut self) -> LedgerResult<()>;

    /// Ordered market list, read fresh on every call. Works before
    /// `subscribe`, as a one-shot fetch.
    async fn read_market_state(&self) -> LedgerResult<Vec<CurveParameters>>;

    async fn submit_rescale_k(&self, new_sqrt_k: u128, market_index: u64)
        -> LedgerResult<Signature>;

    async fn submit_repeg(&self, new_peg: u128, market_index: u64) -> LedgerResult<Signature>;

    async fn submit_initialize(
        &self,
        collateral_mint: Pubkey,
        admin_controls_prices: bool,
    ) -> LedgerResult<Signature>;

    /// End-user view sharing this connection and signer
    fn user_ledger(&self) -> Box<dyn UserLedger>;
}

/// End-user side of the exchange
#[async_trait]
pub trait UserLedger: Send + Sync {
    fn authority(&self) -> Pubkey;

    async fn subscribe(&mut self) -> LedgerResult<()>;

    async fn unsubscribe(&mut self) -> LedgerResult<()>;

    /// Mint of the exchange's collateral token
    async fn collateral_mint(&self) -> LedgerResult<Pubkey>;

    async fn submit_deposit(&self, amount: u64, token_account: Pubkey) -> LedgerResult<Signature>;
}

/// Builds the admin ledger handle for a resolved configuration
pub trait Connector: Send + Sync {
    /// Load the signer and open the network client. Nothing is subscribed yet.
    fn open_admin(&self, config: &EffectiveConfig) -> AdminResult<Box<dyn AdminLedger>>;
}
