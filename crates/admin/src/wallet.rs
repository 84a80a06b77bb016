// Keypair loading and token account helpers

use std::path::PathBuf;
use std::str::FromStr;

use solana_sdk::{
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair},
};
use spl_associated_token_account::get_associated_token_address;

use crate::error::{AdminError, AdminResult};

pub fn home_dir() -> AdminResult<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .ok_or(AdminError::HomeUnavailable)
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> AdminResult<PathBuf> {
    if path == "~" {
        return home_dir();
    }
    match path.strip_prefix("~/") {
        Some(rest) => Ok(home_dir()?.join(rest)),
        None => Ok(PathBuf::from(path)),
    }
}

/// Load a keypair from a file path, expanding ~ if needed
pub fn load_keypair(path: &str) -> AdminResult<Keypair> {
    let expanded = expand_home(path)?;

    if !expanded.is_file() {
        return Err(AdminError::KeypairLoad {
            path: expanded,
            reason: "file not found".to_string(),
        });
    }

    read_keypair_file(&expanded).map_err(|e| AdminError::KeypairLoad {
        reason: format!("malformed keypair file: {}", e),
        path: expanded,
    })
}

/// Parse a pubkey argument
pub fn parse_pubkey(name: &'static str, value: &str) -> AdminResult<Pubkey> {
    Pubkey::from_str(value.trim())
        .map_err(|e| AdminError::invalid_value(name, format!("`{}`: {}", value, e)))
}

/// Owner's associated token account for the collateral mint
pub fn associated_collateral_account(mint: &Pubkey, owner: &Pubkey) -> Pubkey {
    get_associated_token_address(owner, mint)
}
