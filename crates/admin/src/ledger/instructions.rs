use anchor_lang::AnchorSerialize;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program, sysvar,
};

use super::accounts::ExchangeState;
use super::{LedgerError, LedgerResult};

// Instruction discriminators
const INITIALIZE_DISCRIMINATOR: [u8; 8] = [175, 175, 109, 31, 13, 152, 155, 237];
const UPDATE_K_DISCRIMINATOR: [u8; 8] = [72, 98, 9, 139, 129, 229, 172, 56];
const REPEG_AMM_CURVE_DISCRIMINATOR: [u8; 8] = [3, 36, 102, 89, 180, 128, 120, 213];
const DEPOSIT_COLLATERAL_DISCRIMINATOR: [u8; 8] = [156, 131, 142, 116, 146, 247, 162, 120];

pub mod seeds {
    pub const STATE: &[u8] = b"clearing_house";
    pub const MARKETS: &[u8] = b"markets";
    pub const COLLATERAL_VAULT: &[u8] = b"collateral_vault";
    pub const INSURANCE_VAULT: &[u8] = b"insurance_vault";
    pub const USER: &[u8] = b"user";
}

/// Instruction args prefixed by their 8-byte discriminator
pub trait InstructionData: AnchorSerialize {
    const DISCRIMINATOR: [u8; 8];

    fn build_data(&self) -> LedgerResult<Vec<u8>> {
        let mut data = Self::DISCRIMINATOR.to_vec();
        self.serialize(&mut data)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        Ok(data)
    }
}

macro_rules! impl_instruction {
    ($name:ident, $discriminator:expr) => {
        impl InstructionData for $name {
            const DISCRIMINATOR: [u8; 8] = $discriminator;
        }
    };
}

#[derive(AnchorSerialize, Clone, Debug)]
pub struct InitializeParams {
    pub admin_controls_prices: bool,
}

impl_instruction!(InitializeParams, INITIALIZE_DISCRIMINATOR);

#[derive(AnchorSerialize, Clone, Debug)]
pub struct UpdateKParams {
    pub sqrt_k: u128,
    pub market_index: u64,
}

impl_instruction!(UpdateKParams, UPDATE_K_DISCRIMINATOR);

#[derive(AnchorSerialize, Clone, Debug)]
pub struct RepegParams {
    pub new_peg_candidate: u128,
    pub market_index: u64,
}

impl_instruction!(RepegParams, REPEG_AMM_CURVE_DISCRIMINATOR);

#[derive(AnchorSerialize, Clone, Debug)]
pub struct DepositCollateralParams {
    pub amount: u64,
}

impl_instruction!(DepositCollateralParams, DEPOSIT_COLLATERAL_DISCRIMINATOR);

/// Program-derived addresses of the exchange
#[derive(Debug, Clone, Copy)]
pub struct ExchangePda {
    pub program_id: Pubkey,
}

impl ExchangePda {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn state(&self) -> Pubkey {
        self.find(&[seeds::STATE])
    }

    pub fn markets(&self) -> Pubkey {
        self.find(&[seeds::MARKETS])
    }

    pub fn collateral_vault(&self) -> Pubkey {
        self.find(&[seeds::COLLATERAL_VAULT])
    }

    pub fn insurance_vault(&self) -> Pubkey {
        self.find(&[seeds::INSURANCE_VAULT])
    }

    pub fn user(&self, authority: &Pubkey) -> Pubkey {
        self.find(&[seeds::USER, authority.as_ref()])
    }

    fn find(&self, seeds: &[&[u8]]) -> Pubkey {
        Pubkey::find_program_address(seeds, &self.program_id).0
    }
}

/// Account list + data for one exchange instruction
struct AccountsBuilder {
    program_id: Pubkey,
    accounts: Vec<AccountMeta>,
}

impl AccountsBuilder {
    fn new(program_id: Pubkey) -> Self {
        Self {
            program_id,
            accounts: Vec::new(),
        }
    }

    fn signer(mut self, pubkey: Pubkey) -> Self {
        self.accounts.push(AccountMeta::new(pubkey, true));
        self
    }

    fn writable(mut self, pubkey: Pubkey) -> Self {
        self.accounts.push(AccountMeta::new(pubkey, false));
        self
    }

    fn readonly(mut self, pubkey: Pubkey) -> Self {
        self.accounts.push(AccountMeta::new_readonly(pubkey, false));
        self
    }

    fn build<P: InstructionData>(self, params: &P) -> LedgerResult<Instruction> {
        Ok(Instruction {
            program_id: self.program_id,
            accounts: self.accounts,
            data: params.build_data()?,
        })
    }
}

pub fn initialize(
    pda: &ExchangePda,
    admin: Pubkey,
    collateral_mint: Pubkey,
    admin_controls_prices: bool,
) -> LedgerResult<Instruction> {
    AccountsBuilder::new(pda.program_id)
        .signer(admin)
        .writable(pda.state())
        .readonly(collateral_mint)
        .writable(pda.collateral_vault())
        .writable(pda.insurance_vault())
        .writable(pda.markets())
        .readonly(sysvar::rent::id())
        .readonly(system_program::id())
        .readonly(spl_token::id())
        .build(&InitializeParams {
            admin_controls_prices,
        })
}

pub fn update_k(
    pda: &ExchangePda,
    admin: Pubkey,
    state: &ExchangeState,
    oracle: Pubkey,
    sqrt_k: u128,
    market_index: u64,
) -> LedgerResult<Instruction> {
    AccountsBuilder::new(pda.program_id)
        .signer(admin)
        .readonly(pda.state())
        .writable(state.markets)
        .readonly(oracle)
        .build(&UpdateKParams {
            sqrt_k,
            market_index,
        })
}

pub fn repeg_amm_curve(
    pda: &ExchangePda,
    admin: Pubkey,
    state: &ExchangeState,
    oracle: Pubkey,
    new_peg_candidate: u128,
    market_index: u64,
) -> LedgerResult<Instruction> {
    AccountsBuilder::new(pda.program_id)
        .signer(admin)
        .readonly(pda.state())
        .writable(state.markets)
        .readonly(oracle)
        .build(&RepegParams {
            new_peg_candidate,
            market_index,
        })
}

pub fn deposit_collateral(
    pda: &ExchangePda,
    authority: Pubkey,
    state: &ExchangeState,
    user_collateral_account: Pubkey,
    amount: u64,
) -> LedgerResult<Instruction> {
    AccountsBuilder::new(pda.program_id)
        .signer(authority)
        .writable(pda.user(&authority))
        .readonly(pda.state())
        .readonly(state.markets)
        .writable(state.collateral_vault)
        .writable(user_collateral_account)
        .readonly(spl_token::id())
        .build(&DepositCollateralParams { amount })
}
