//! On-chain account layouts read by the operator tool.
//!
//! Accounts are Anchor accounts: an 8-byte discriminator followed by borsh
//! fields. Only the leading fields the tool needs are declared; trailing
//! bytes are ignored.

use anchor_lang::{AnchorDeserialize, AnchorSerialize};
use solana_sdk::pubkey::Pubkey;

use super::{CurveParameters, LedgerError, LedgerResult};

// Account discriminators
pub const STATE_ACCOUNT_DISCRIMINATOR: [u8; 8] = [216, 146, 107, 94, 104, 75, 182, 177];
pub const MARKETS_ACCOUNT_DISCRIMINATOR: [u8; 8] = [140, 75, 251, 123, 50, 123, 172, 82];

/// Global exchange state
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct ExchangeState {
    pub admin: Pubkey,
    pub exchange_paused: bool,
    pub funding_paused: bool,
    pub admin_controls_prices: bool,
    pub collateral_mint: Pubkey,
    pub collateral_vault: Pubkey,
    pub insurance_vault: Pubkey,
    pub markets: Pubkey,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct AmmRecord {
    pub oracle: Pubkey,
    pub base_asset_reserve: u128,
    pub quote_asset_reserve: u128,
    pub sqrt_k: u128,
    pub peg_multiplier: u128,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct MarketRecord {
    pub initialized: bool,
    pub amm: AmmRecord,
}

impl MarketRecord {
    pub fn curve(&self) -> CurveParameters {
        CurveParameters {
            sqrt_k: self.amm.sqrt_k,
            peg_multiplier: self.amm.peg_multiplier,
        }
    }
}

/// Ordered market list; the position in `markets` is the market index
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct MarketsAccount {
    pub markets: Vec<MarketRecord>,
}

impl MarketsAccount {
    /// Initialized market at `index`
    pub fn market(&self, index: u64) -> LedgerResult<&MarketRecord> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.markets.get(i))
            .filter(|m| m.initialized)
            .ok_or(LedgerError::MarketNotInitialized(index))
    }
}

/// Check the discriminator and decode the leading fields of an account
pub fn decode_account<T: AnchorDeserialize>(
    data: &[u8],
    discriminator: &[u8; 8],
    account: &'static str,
) -> LedgerResult<T> {
    if data.len() < 8 {
        return Err(LedgerError::Decode {
            account,
            reason: format!("{} bytes is shorter than the discriminator", data.len()),
        });
    }
    if &data[..8] != discriminator {
        return Err(LedgerError::Decode {
            account,
            reason: "discriminator mismatch".to_string(),
        });
    }
    let mut body = &data[8..];
    T::deserialize(&mut body).map_err(|e| LedgerError::Decode {
        account,
        reason: e.to_string(),
    })
}

pub fn decode_state(data: &[u8]) -> LedgerResult<ExchangeState> {
    decode_account(data, &STATE_ACCOUNT_DISCRIMINATOR, "exchange state")
}

pub fn decode_markets(data: &[u8]) -> LedgerResult<MarketsAccount> {
    decode_account(data, &MARKETS_ACCOUNT_DISCRIMINATOR, "markets")
}

#[cfg(test)]
pub(crate) fn encode_account<T: AnchorSerialize>(discriminator: &[u8; 8], value: &T) -> Vec<u8> {
    let mut data = discriminator.to_vec();
    value.serialize(&mut data).unwrap();
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sqrt_k: u128, peg: u128, initialized: bool) -> MarketRecord {
        MarketRecord {
            initialized,
            amm: AmmRecord {
                oracle: Pubkey::new_unique(),
                base_asset_reserve: sqrt_k,
                quote_asset_reserve: sqrt_k,
                sqrt_k,
                peg_multiplier: peg,
            },
        }
    }

    #[test]
    fn test_decode_markets_ignores_trailing_bytes() {
        let account = MarketsAccount {
            markets: vec![record(1_000_000, 40_000, true), record(2_000_000, 1_000, true)],
        };
        let mut data = encode_account(&MARKETS_ACCOUNT_DISCRIMINATOR, &account);
        data.extend_from_slice(&[0u8; 64]);

        let decoded = decode_markets(&data).unwrap();
        assert_eq!(decoded, account);
        assert_eq!(
            decoded.markets[1].curve(),
            CurveParameters {
                sqrt_k: 2_000_000,
                peg_multiplier: 1_000
            }
        );
    }

    #[test]
    fn test_decode_rejects_wrong_discriminator() {
        let state = ExchangeState {
            admin: Pubkey::new_unique(),
            exchange_paused: false,
            funding_paused: false,
            admin_controls_prices: true,
            collateral_mint: Pubkey::new_unique(),
            collateral_vault: Pubkey::new_unique(),
            insurance_vault: Pubkey::new_unique(),
            markets: Pubkey::new_unique(),
        };
        let data = encode_account(&MARKETS_ACCOUNT_DISCRIMINATOR, &state);
        assert!(matches!(
            decode_state(&data),
            Err(LedgerError::Decode { account: "exchange state", .. })
        ));

        let data = encode_account(&STATE_ACCOUNT_DISCRIMINATOR, &state);
        assert_eq!(decode_state(&data).unwrap(), state);
    }

    #[test]
    fn test_decode_short_account() {
        assert!(decode_markets(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_uninitialized_market_is_rejected() {
        let account = MarketsAccount {
            markets: vec![record(1, 1, true), record(1, 1, false)],
        };
        assert!(account.market(0).is_ok());
        assert!(matches!(
            account.market(1),
            Err(LedgerError::MarketNotInitialized(1))
        ));
        assert!(account.market(7).is_err());
    }
}
