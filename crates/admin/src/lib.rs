pub mod adjust;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod ledger;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod wallet;

pub use adjust::{rescale, AdjustmentReport, AdjustmentRequest};
pub use config::{ConfigOverrides, ConfigStore, EffectiveConfig, Network, OperatorConfig};
pub use error::{AdminError, AdminResult};
pub use ledger::rpc::{RpcConnector, DEFAULT_PROGRAM_ID};
pub use ledger::{AdminLedger, Connector, CurveParameters, LedgerError, UserLedger};
pub use session::{
    run_admin_session, with_admin_session, with_user_session, AdminSession, SessionOutcome,
    SessionState, UserSession,
};
