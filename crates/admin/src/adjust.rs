//! AMM parameter adjustments: exact rescaling of `sqrt_k`, peg updates, and
//! the read, submit, re-read audit trail around each change.

use ethnum::U256;
use solana_sdk::signature::Signature;
use tracing::{info, warn};

use crate::error::{AdminError, AdminResult};
use crate::ledger::{AdminLedger, CurveParameters};

/// `floor(sqrt_k * numerator / denominator)` with a 256-bit intermediate.
///
/// The product of two `u128` values always fits in 256 bits, so the only
/// failure modes are a zero denominator and a quotient above `u128::MAX`.
pub fn rescale(sqrt_k: u128, numerator: u128, denominator: u128) -> AdminResult<u128> {
    if denominator == 0 {
        return Err(AdminError::DivisionByZero);
    }
    let scaled = U256::from(sqrt_k) * U256::from(numerator) / U256::from(denominator);
    if scaled > U256::from(u128::MAX) {
        return Err(AdminError::Overflow);
    }
    Ok(scaled.as_u128())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentRequest {
    RescaleK {
        market: u64,
        numerator: u128,
        denominator: u128,
    },
    Repeg {
        market: u64,
        new_peg: u128,
    },
}

impl AdjustmentRequest {
    pub fn rescale_k(market: u64, numerator: u128, denominator: u128) -> AdminResult<Self> {
        if denominator == 0 {
            return Err(AdminError::DivisionByZero);
        }
        if numerator == 0 {
            return Err(AdminError::invalid_value(
                "numerator",
                "a zero numerator would collapse the curve",
            ));
        }
        Ok(AdjustmentRequest::RescaleK {
            market,
            numerator,
            denominator,
        })
    }

    pub fn repeg(market: u64, new_peg: u128) -> AdminResult<Self> {
        if new_peg == 0 {
            return Err(AdminError::invalid_value("peg", "must be non-zero"));
        }
        Ok(AdjustmentRequest::Repeg { market, new_peg })
    }

    pub fn market(&self) -> u64 {
        match self {
            AdjustmentRequest::RescaleK { market, .. } | AdjustmentRequest::Repeg { market, .. } => {
                *market
            }
        }
    }

    fn parameter(&self) -> &'static str {
        match self {
            AdjustmentRequest::RescaleK { .. } => "sqrt_k",
            AdjustmentRequest::Repeg { .. } => "peg_multiplier",
        }
    }

    /// Current value of the parameter this request changes
    fn current(&self, curve: &CurveParameters) -> u128 {
        match self {
            AdjustmentRequest::RescaleK { .. } => curve.sqrt_k,
            AdjustmentRequest::Repeg { .. } => curve.peg_multiplier,
        }
    }

    /// Value to submit given the market's current curve
    fn target(&self, curve: &CurveParameters) -> AdminResult<u128> {
        match self {
            AdjustmentRequest::RescaleK {
                numerator,
                denominator,
                ..
            } => rescale(curve.sqrt_k, *numerator, *denominator),
            AdjustmentRequest::Repeg { new_peg, .. } => Ok(*new_peg),
        }
    }
}

/// Audit record of one submitted adjustment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentReport {
    pub market: u64,
    pub before: u128,
    pub submitted: u128,
    /// Value read back after confirmation; `None` if the re-read failed
    pub after: Option<u128>,
    pub signature: Signature,
}

pub fn select_market(markets: &[CurveParameters], index: u64) -> AdminResult<&CurveParameters> {
    usize::try_from(index)
        .ok()
        .and_then(|i| markets.get(i))
        .ok_or(AdminError::MarketNotFound {
            index,
            count: markets.len(),
        })
}

/// One-shot read that rejects a bad request before a session is subscribed
pub async fn check_market(
    ledger: &dyn AdminLedger,
    request: &AdjustmentRequest,
) -> AdminResult<CurveParameters> {
    if let AdjustmentRequest::RescaleK { denominator: 0, .. } = request {
        return Err(AdminError::DivisionByZero);
    }
    let markets = ledger.read_market_state().await?;
    let curve = *select_market(&markets, request.market())?;
    request.target(&curve)?;
    Ok(curve)
}

/// Read the market, submit the change, and read it back.
pub async fn apply(
    ledger: &dyn AdminLedger,
    request: &AdjustmentRequest,
) -> AdminResult<AdjustmentReport> {
    if let AdjustmentRequest::RescaleK { denominator: 0, .. } = request {
        return Err(AdminError::DivisionByZero);
    }

    let market = request.market();
    let parameter = request.parameter();

    let markets = ledger.read_market_state().await?;
    let curve = select_market(&markets, market)?;
    let before = request.current(curve);
    let submitted = request.target(curve)?;
    info!(market, parameter, old = before, new = submitted, "submitting adjustment");

    let signature = match request {
        AdjustmentRequest::RescaleK { .. } => ledger.submit_rescale_k(submitted, market).await?,
        AdjustmentRequest::Repeg { .. } => ledger.submit_repeg(submitted, market).await?,
    };

    let after = match ledger.read_market_state().await {
        Ok(markets) => match select_market(&markets, market) {
            Ok(curve) => {
                let confirmed = request.current(curve);
                info!(market, parameter, value = confirmed, %signature, "adjustment confirmed");
                Some(confirmed)
            }
            Err(e) => {
                warn!(market, %signature, "submitted, but market is missing on re-read: {}", e);
                None
            }
        },
        Err(e) => {
            warn!(market, %signature, "submitted, but re-read failed: {}", e);
            None
        }
    };

    Ok(AdjustmentReport {
        market,
        before,
        submitted,
        after,
        signature,
    })
}
