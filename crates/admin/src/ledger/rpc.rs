//! JSON-RPC implementation of the ledger ports

use std::sync::Arc;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    instruction::Instruction,
    pubkey,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use tracing::{debug, info};
use url::Url;

use super::accounts::{self, ExchangeState, MarketsAccount};
use super::feed::AccountFeed;
use super::instructions::{self, ExchangePda};
use super::{AdminLedger, Connector, CurveParameters, LedgerError, LedgerResult, UserLedger};
use crate::config::EffectiveConfig;
use crate::error::{AdminError, AdminResult};
use crate::wallet;

/// Published exchange program id
pub const DEFAULT_PROGRAM_ID: Pubkey = pubkey!("dammHkt7jmytvbS3nHTxQNEcP59aE57nxwV21YdqEDN");

/// Websocket endpoint paired with an RPC url: `http→ws`, `https→wss`, and an
/// explicit port moves up by one (8899 → 8900).
pub fn websocket_url(rpc_url: &str) -> AdminResult<String> {
    let mut url = Url::parse(rpc_url)
        .map_err(|e| AdminError::invalid_value("url", format!("`{}`: {}", rpc_url, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(AdminError::invalid_value(
                "url",
                format!("unsupported scheme `{}`", other),
            ))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| AdminError::invalid_value("url", "cannot derive websocket scheme"))?;

    if let Some(port) = url.port() {
        let ws_port = port.checked_add(1).ok_or_else(|| {
            AdminError::invalid_value("url", format!("no websocket port above {}", port))
        })?;
        url.set_port(Some(ws_port))
            .map_err(|_| AdminError::invalid_value("url", "cannot derive websocket port"))?;
    }

    Ok(url.to_string())
}

pub struct RpcConnector {
    program_id: Pubkey,
    commitment: CommitmentConfig,
}

impl RpcConnector {
    pub fn new(program_id: Pubkey) -> Self {
        Self {
            program_id,
            commitment: CommitmentConfig::confirmed(),
        }
    }
}

impl Connector for RpcConnector {
    fn open_admin(&self, config: &EffectiveConfig) -> AdminResult<Box<dyn AdminLedger>> {
        let signer = Arc::new(wallet::load_keypair(&config.keypair)?);
        let ws_url = websocket_url(&config.url)?;
        info!(
            network = %config.network,
            url = %config.url,
            authority = %signer.pubkey(),
            program = %self.program_id,
            "connecting to exchange"
        );

        let rpc = Arc::new(RpcClient::new_with_commitment(
            config.url.clone(),
            self.commitment,
        ));
        Ok(Box::new(RpcExchange {
            inner: Arc::new(Shared {
                rpc,
                ws_url,
                signer,
                pda: ExchangePda::new(self.program_id),
                commitment: self.commitment,
            }),
            state: None,
            feed: None,
        }))
    }
}

/// Connection pieces shared by the admin handle and the users it creates
struct Shared {
    rpc: Arc<RpcClient>,
    ws_url: String,
    signer: Arc<Keypair>,
    pda: ExchangePda,
    commitment: CommitmentConfig,
}

impl Shared {
    /// State account, or `None` before the exchange is initialized
    async fn fetch_state(&self) -> LedgerResult<Option<ExchangeState>> {
        let address = self.pda.state();
        let response = self
            .rpc
            .get_account_with_commitment(&address, self.commitment)
            .await?;
        response
            .value
            .map(|account| accounts::decode_state(&account.data))
            .transpose()
    }

    async fn fetch_markets(&self, address: Pubkey) -> LedgerResult<MarketsAccount> {
        let response = self
            .rpc
            .get_account_with_commitment(&address, self.commitment)
            .await?;
        let account = response
            .value
            .ok_or(LedgerError::AccountNotFound(address))?;
        accounts::decode_markets(&account.data)
    }

    async fn send(&self, instruction: Instruction) -> LedgerResult<Signature> {
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let payer = self.signer.pubkey();
        let tx = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&payer),
            &[self.signer.as_ref()],
            blockhash,
        );
        let signature = self.rpc.send_and_confirm_transaction(&tx).await?;
        debug!(%signature, "transaction confirmed");
        Ok(signature)
    }

    async fn start_feed(&self, account: Pubkey) -> LedgerResult<AccountFeed> {
        AccountFeed::start(self.ws_url.clone(), account, self.commitment).await
    }
}

async fn stop_feed(feed: &mut Option<AccountFeed>) -> LedgerResult<()> {
    match feed.take() {
        Some(feed) => {
            debug!(account = %feed.account(), last_slot = ?feed.last_slot(), "stopping account feed");
            feed.stop().await
        }
        None => Ok(()),
    }
}

pub struct RpcExchange {
    inner: Arc<Shared>,
    state: Option<ExchangeState>,
    feed: Option<AccountFeed>,
}

impl RpcExchange {
    fn state(&self) -> LedgerResult<&ExchangeState> {
        self.state.as_ref().ok_or(LedgerError::StateNotLoaded)
    }

    /// Markets account from the loaded state, or fetched one-shot when the
    /// handle is not subscribed
    async fn markets_address(&self) -> LedgerResult<Pubkey> {
        if let Some(state) = &self.state {
            return Ok(state.markets);
        }
        let state = self
            .inner
            .fetch_state()
            .await?
            .ok_or(LedgerError::AccountNotFound(self.inner.pda.state()))?;
        Ok(state.markets)
    }

    async fn oracle_for(&self, market_index: u64) -> LedgerResult<Pubkey> {
        let markets = self.inner.fetch_markets(self.state()?.markets).await?;
        Ok(markets.market(market_index)?.amm.oracle)
    }
}

#[async_trait]
impl AdminLedger for RpcExchange {
    fn authority(&self) -> Pubkey {
        self.inner.signer.pubkey()
    }

    async fn subscribe(&mut self) -> LedgerResult<()> {
        let feed = self.inner.start_feed(self.inner.pda.state()).await?;
        self.state = match self.inner.fetch_state().await {
            Ok(state) => state,
            Err(e) => {
                let _ = feed.stop().await;
                return Err(e);
            }
        };
        if self.state.is_none() {
            info!("exchange state account does not exist yet");
        }
        self.feed = Some(feed);
        Ok(())
    }

    async fn unsubscribe(&mut self) -> LedgerResult<()> {
        self.state = None;
        stop_feed(&mut self.feed).await
    }

    async fn read_market_state(&self) -> LedgerResult<Vec<CurveParameters>> {
        let address = self.markets_address().await?;
        let markets = self.inner.fetch_markets(address).await?;
        Ok(markets.markets.iter().map(|m| m.curve()).collect())
    }

    async fn submit_rescale_k(
        &self,
        new_sqrt_k: u128,
        market_index: u64,
    ) -> LedgerResult<Signature> {
        let oracle = self.oracle_for(market_index).await?;
        let ix = instructions::update_k(
            &self.inner.pda,
            self.authority(),
            self.state()?,
            oracle,
            new_sqrt_k,
            market_index,
        )?;
        self.inner.send(ix).await
    }

    async fn submit_repeg(&self, new_peg: u128, market_index: u64) -> LedgerResult<Signature> {
        let oracle = self.oracle_for(market_index).await?;
        let ix = instructions::repeg_amm_curve(
            &self.inner.pda,
            self.authority(),
            self.state()?,
            oracle,
            new_peg,
            market_index,
        )?;
        self.inner.send(ix).await
    }

    async fn submit_initialize(
        &self,
        collateral_mint: Pubkey,
        admin_controls_prices: bool,
    ) -> LedgerResult<Signature> {
        if self.state.is_some() {
            return Err(LedgerError::Rejected(
                "exchange state is already initialized".to_string(),
            ));
        }
        let ix = instructions::initialize(
            &self.inner.pda,
            self.authority(),
            collateral_mint,
            admin_controls_prices,
        )?;
        self.inner.send(ix).await
    }

    fn user_ledger(&self) -> Box<dyn UserLedger> {
        Box::new(RpcUser {
            inner: Arc::clone(&self.inner),
            state: None,
            feed: None,
        })
    }
}

pub struct RpcUser {
    inner: Arc<Shared>,
    state: Option<ExchangeState>,
    feed: Option<AccountFeed>,
}

#[async_trait]
impl UserLedger for RpcUser {
    fn authority(&self) -> Pubkey {
        self.inner.signer.pubkey()
    }

    async fn subscribe(&mut self) -> LedgerResult<()> {
        let user_account = self.inner.pda.user(&self.authority());
        let feed = self.inner.start_feed(user_account).await?;
        self.state = match self.inner.fetch_state().await {
            Ok(Some(state)) => Some(state),
            Ok(None) => {
                let _ = feed.stop().await;
                return Err(LedgerError::AccountNotFound(self.inner.pda.state()));
            }
            Err(e) => {
                let _ = feed.stop().await;
                return Err(e);
            }
        };
        self.feed = Some(feed);
        Ok(())
    }

    async fn unsubscribe(&mut self) -> LedgerResult<()> {
        self.state = None;
        stop_feed(&mut self.feed).await
    }

    async fn collateral_mint(&self) -> LedgerResult<Pubkey> {
        self.state
            .as_ref()
            .map(|s| s.collateral_mint)
            .ok_or(LedgerError::StateNotLoaded)
    }

    async fn submit_deposit(&self, amount: u64, token_account: Pubkey) -> LedgerResult<Signature> {
        let state = self.state.as_ref().ok_or(LedgerError::StateNotLoaded)?;
        let ix = instructions::deposit_collateral(
            &self.inner.pda,
            self.authority(),
            state,
            token_account,
            amount,
        )?;
        self.inner.send(ix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        assert_eq!(
            websocket_url("https://api.devnet.solana.com").unwrap(),
            "wss://api.devnet.solana.com/"
        );
        assert_eq!(
            websocket_url("http://127.0.0.1:8899").unwrap(),
            "ws://127.0.0.1:8900/"
        );
        assert!(websocket_url("ftp://example.com").is_err());
        assert!(matches!(
            websocket_url("http://127.0.0.1:65535"),
            Err(AdminError::InvalidValue { name: "url", .. })
        ));
        assert_eq!(
            websocket_url("http://127.0.0.1:65534").unwrap(),
            "ws://127.0.0.1:65535/"
        );
        assert!(websocket_url("not a url").is_err());
    }

    #[test]
    fn test_default_program_id() {
        assert_eq!(
            DEFAULT_PROGRAM_ID.to_string(),
            "dammHkt7jmytvbS3nHTxQNEcP59aE57nxwV21YdqEDN"
        );
    }

    #[test]
    fn test_open_admin_reports_missing_keypair() {
        let dir = tempfile::tempdir().unwrap();
        let config = EffectiveConfig {
            network: crate::config::Network::Localnet,
            url: "http://127.0.0.1:8899".to_string(),
            keypair: dir.path().join("missing.json").display().to_string(),
        };
        let err = RpcConnector::new(DEFAULT_PROGRAM_ID)
            .open_admin(&config)
            .err()
            .unwrap();
        assert!(matches!(err, AdminError::KeypairLoad { .. }));
    }
}
