//! Command-line surface of `perp-admin`

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::{ConfigOverrides, Network};

#[derive(Parser, Debug)]
#[command(name = "perp-admin")]
#[command(about = "Operator CLI for the perpetual-futures exchange", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags accepted by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Network override (devnet, testnet, mainnet-beta, localnet)
    #[arg(long, global = true)]
    pub env: Option<Network>,

    /// RPC URL override
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Keypair file override
    #[arg(long, global = true)]
    pub keypair: Option<String>,

    /// Operator config file (defaults to ~/.config/perp-admin/config.json)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Exchange program id (defaults to the published program)
    #[arg(long, global = true)]
    pub program_id: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            env: self.env,
            url: self.url.clone(),
            keypair: self.keypair.clone(),
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the exchange state and vaults
    Initialize {
        /// Mint of the collateral token
        collateral_mint: String,

        /// Whether the admin sets oracle prices (true or false)
        #[arg(action = ArgAction::Set)]
        admin_controls_prices: bool,
    },

    /// Rescale a market's sqrt_k by numerator/denominator
    UpdateK {
        market: u64,
        numerator: u128,
        denominator: u128,
    },

    /// Set a market's peg multiplier
    Repeg { market: u64, peg: u128 },

    /// Deposit collateral from the operator's associated token account
    Deposit { amount: u64 },

    /// Manage the stored operator profile
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Write the default profile, replacing any existing one
    Init,

    /// Change one key (network, url, keypair)
    Set { key: String, value: String },

    /// Print the stored profile
    Get,
}
