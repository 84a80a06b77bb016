//! In-memory ledger for tests.
//!
//! Every call made through [`MockConnector`] is appended to a shared
//! [`Journal`], submissions mutate the configured market list, and any call
//! kind can be made to fail.

use std::mem::{discriminant, Discriminant};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use tracing::debug;

use crate::config::EffectiveConfig;
use crate::error::{AdminError, AdminResult};
use crate::ledger::{
    AdminLedger, Connector, CurveParameters, LedgerError, LedgerResult, UserLedger,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    AdminSubscribe,
    AdminUnsubscribe,
    UserSubscribe,
    UserUnsubscribe,
    ReadMarkets,
    CollateralMint,
    RescaleK { market: u64, sqrt_k: u128 },
    Repeg { market: u64, peg: u128 },
    Initialize { collateral_mint: Pubkey, admin_controls_prices: bool },
    Deposit { amount: u64, token_account: Pubkey },
    /// Marker recorded by a test's own action
    Action(String),
}

impl LedgerCall {
    fn kind(&self) -> Discriminant<LedgerCall> {
        discriminant(self)
    }

    pub fn is_submission(&self) -> bool {
        matches!(
            self,
            LedgerCall::RescaleK { .. }
                | LedgerCall::Repeg { .. }
                | LedgerCall::Initialize { .. }
                | LedgerCall::Deposit { .. }
        )
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered record of ledger calls, shared by every handle of one connector
#[derive(Debug, Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<LedgerCall>>>,
}

impl Journal {
    pub fn record(&self, call: LedgerCall) {
        debug!(?call, "ledger call");
        lock(&self.calls).push(call);
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        lock(&self.calls).clone()
    }

    /// Calls of the same kind as `call`, ignoring payloads
    pub fn count(&self, call: LedgerCall) -> usize {
        let kind = call.kind();
        lock(&self.calls).iter().filter(|c| c.kind() == kind).count()
    }

    pub fn submissions(&self) -> Vec<LedgerCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.is_submission())
            .cloned()
            .collect()
    }
}

#[derive(Debug)]
struct Failure {
    kind: Discriminant<LedgerCall>,
    /// Calls of this kind that still succeed before failures start
    remaining: usize,
}

#[derive(Debug)]
struct MockState {
    journal: Journal,
    authority: Pubkey,
    collateral_mint: Pubkey,
    markets: Mutex<Vec<CurveParameters>>,
    failures: Mutex<Vec<Failure>>,
    fail_open: Mutex<bool>,
    signatures: Mutex<u64>,
}

impl MockState {
    /// Record `call`, then fail it if a failure is armed for its kind
    fn call(&self, call: LedgerCall) -> LedgerResult<()> {
        let kind = call.kind();
        let label = format!("{:?}", call);
        self.journal.record(call);

        let mut failures = lock(&self.failures);
        match failures.iter_mut().find(|f| f.kind == kind) {
            Some(failure) if failure.remaining == 0 => Err(LedgerError::Rejected(format!(
                "injected failure on {}",
                label
            ))),
            Some(failure) => {
                failure.remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn next_signature(&self) -> Signature {
        let mut counter = lock(&self.signatures);
        *counter += 1;
        let mut bytes = [0u8; 64];
        bytes[..8].copy_from_slice(&counter.to_le_bytes());
        Signature::from(bytes)
    }

    fn update_market(
        &self,
        market: u64,
        update: impl FnOnce(&mut CurveParameters),
    ) -> LedgerResult<Signature> {
        let mut markets = lock(&self.markets);
        let curve = usize::try_from(market)
            .ok()
            .and_then(|i| markets.get_mut(i))
            .ok_or(LedgerError::MarketNotInitialized(market))?;
        update(curve);
        drop(markets);
        Ok(self.next_signature())
    }
}

#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::with_markets(Vec::new())
    }
}

impl MockConnector {
    pub fn with_markets(markets: Vec<CurveParameters>) -> Self {
        Self {
            state: Arc::new(MockState {
                journal: Journal::default(),
                authority: Pubkey::new_unique(),
                collateral_mint: Pubkey::new_unique(),
                markets: Mutex::new(markets),
                failures: Mutex::new(Vec::new()),
                fail_open: Mutex::new(false),
                signatures: Mutex::new(0),
            }),
        }
    }

    pub fn journal(&self) -> Journal {
        self.state.journal.clone()
    }

    pub fn authority(&self) -> Pubkey {
        self.state.authority
    }

    pub fn collateral_mint(&self) -> Pubkey {
        self.state.collateral_mint
    }

    pub fn markets(&self) -> Vec<CurveParameters> {
        lock(&self.state.markets).clone()
    }

    pub fn set_markets(&self, markets: Vec<CurveParameters>) {
        *lock(&self.state.markets) = markets;
    }

    /// Fail every call of the same kind as `call`
    pub fn fail_on(&self, call: LedgerCall) {
        self.fail_after(call, 0);
    }

    /// Let `successes` calls of this kind through, then fail the rest
    pub fn fail_after(&self, call: LedgerCall, successes: usize) {
        let kind = call.kind();
        let mut failures = lock(&self.state.failures);
        failures.retain(|f| f.kind != kind);
        failures.push(Failure {
            kind,
            remaining: successes,
        });
    }

    /// Make `open_admin` fail as if the keypair could not be loaded
    pub fn fail_open(&self) {
        *lock(&self.state.fail_open) = true;
    }

    /// Admin handle on the same state, bypassing `open_admin`
    pub fn exchange(&self) -> MockExchange {
        MockExchange {
            state: Arc::clone(&self.state),
        }
    }
}

impl Connector for MockConnector {
    fn open_admin(&self, config: &EffectiveConfig) -> AdminResult<Box<dyn AdminLedger>> {
        if *lock(&self.state.fail_open) {
            return Err(AdminError::KeypairLoad {
                path: config.keypair.clone().into(),
                reason: "file not found".to_string(),
            });
        }
        Ok(Box::new(self.exchange()))
    }
}

#[derive(Debug)]
pub struct MockExchange {
    state: Arc<MockState>,
}

#[async_trait]
impl AdminLedger for MockExchange {
    fn authority(&self) -> Pubkey {
        self.state.authority
    }

    async fn subscribe(&mut self) -> LedgerResult<()> {
        self.state.call(LedgerCall::AdminSubscribe)
    }

    async fn unsubscribe(&mut self) -> LedgerResult<()> {
        self.state.call(LedgerCall::AdminUnsubscribe)
    }

    async fn read_market_state(&self) -> LedgerResult<Vec<CurveParameters>> {
        self.state.call(LedgerCall::ReadMarkets)?;
        Ok(lock(&self.state.markets).clone())
    }

    async fn submit_rescale_k(
        &self,
        new_sqrt_k: u128,
        market_index: u64,
    ) -> LedgerResult<Signature> {
        self.state.call(LedgerCall::RescaleK {
            market: market_index,
            sqrt_k: new_sqrt_k,
        })?;
        self.state
            .update_market(market_index, |curve| curve.sqrt_k = new_sqrt_k)
    }

    async fn submit_repeg(&self, new_peg: u128, market_index: u64) -> LedgerResult<Signature> {
        self.state.call(LedgerCall::Repeg {
            market: market_index,
            peg: new_peg,
        })?;
        self.state
            .update_market(market_index, |curve| curve.peg_multiplier = new_peg)
    }

    async fn submit_initialize(
        &self,
        collateral_mint: Pubkey,
        admin_controls_prices: bool,
    ) -> LedgerResult<Signature> {
        self.state.call(LedgerCall::Initialize {
            collateral_mint,
            admin_controls_prices,
        })?;
        Ok(self.state.next_signature())
    }

    fn user_ledger(&self) -> Box<dyn UserLedger> {
        Box::new(MockUser {
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct MockUser {
    state: Arc<MockState>,
}

#[async_trait]
impl UserLedger for MockUser {
    fn authority(&self) -> Pubkey {
        self.state.authority
    }

    async fn subscribe(&mut self) -> LedgerResult<()> {
        self.state.call(LedgerCall::UserSubscribe)
    }

    async fn unsubscribe(&mut self) -> LedgerResult<()> {
        self.state.call(LedgerCall::UserUnsubscribe)
    }

    async fn collateral_mint(&self) -> LedgerResult<Pubkey> {
        self.state.call(LedgerCall::CollateralMint)?;
        Ok(self.state.collateral_mint)
    }

    async fn submit_deposit(&self, amount: u64, token_account: Pubkey) -> LedgerResult<Signature> {
        self.state.call(LedgerCall::Deposit {
            amount,
            token_account,
        })?;
        Ok(self.state.next_signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fail_after_lets_first_calls_through() {
        let connector = MockConnector::with_markets(vec![CurveParameters {
            sqrt_k: 1,
            peg_multiplier: 1,
        }]);
        connector.fail_after(LedgerCall::ReadMarkets, 2);
        let exchange = connector.exchange();

        assert!(exchange.read_market_state().await.is_ok());
        assert!(exchange.read_market_state().await.is_ok());
        assert!(exchange.read_market_state().await.is_err());
        assert_eq!(connector.journal().count(LedgerCall::ReadMarkets), 3);
    }

    #[tokio::test]
    async fn test_submission_on_missing_market() {
        let connector = MockConnector::default();
        let err = connector.exchange().submit_repeg(5, 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::MarketNotInitialized(0)));
    }

    #[test]
    fn test_count_ignores_payload() {
        let journal = Journal::default();
        journal.record(LedgerCall::Action("a".into()));
        journal.record(LedgerCall::Action("b".into()));
        journal.record(LedgerCall::ReadMarkets);
        assert_eq!(journal.count(LedgerCall::Action(String::new())), 2);
        assert!(journal.submissions().is_empty());
    }
}
