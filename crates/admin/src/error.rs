//! Error types for the operator tool

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigKey;
use crate::ledger::LedgerError;

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("no operator config at {}; run `perp-admin config init` first", path.display())]
    ConfigMissing { path: PathBuf },

    #[error("invalid config key `{0}` (expected one of: network, url, keypair)")]
    InvalidKey(String),

    #[error("no {0} configured: pass --{flag} or run `perp-admin config set {0} <value>`", flag = .0.flag())]
    MissingSetting(ConfigKey),

    #[error("failed to load keypair from {}: {reason}", path.display())]
    KeypairLoad { path: PathBuf, reason: String },

    #[error("denominator must be non-zero")]
    DivisionByZero,

    #[error("market {index} not found ({count} markets on chain)")]
    MarketNotFound { index: u64, count: usize },

    #[error("session lifecycle violation: {0}")]
    LifecycleViolation(String),

    #[error("action failed: {0:#}")]
    ActionFailure(anyhow::Error),

    #[error("invalid {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("rescaled sqrt_k does not fit in 128 bits")]
    Overflow,

    #[error("cannot locate home directory: HOME is not set")]
    HomeUnavailable,

    #[error("config I/O error at {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed operator config at {}: {source}", path.display())]
    ConfigFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl AdminError {
    pub fn invalid_value(name: &'static str, reason: impl Into<String>) -> Self {
        AdminError::InvalidValue {
            name,
            reason: reason.into(),
        }
    }

    pub fn lifecycle(msg: impl Into<String>) -> Self {
        AdminError::LifecycleViolation(msg.into())
    }
}

pub type AdminResult<T> = Result<T, AdminError>;
