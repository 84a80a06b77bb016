//! Command execution: config subcommands act on the store, everything else
//! runs inside a session.

use solana_sdk::signature::Signature;
use tracing::{debug, error, info, warn};

use crate::adjust::{self, AdjustmentReport, AdjustmentRequest};
use crate::cli::{Command, ConfigCommand};
use crate::config::{ConfigOverrides, ConfigStore, EffectiveConfig, OperatorConfig};
use crate::error::{AdminError, AdminResult};
use crate::ledger::Connector;
use crate::session::{
    run_admin_session, with_admin_session, with_user_session, AdminSession, SessionOutcome,
};
use crate::wallet;

/// Run one command to completion.
///
/// Configuration, validation and lifecycle errors are returned, as is a
/// market index outside the on-chain list, which is checked before the
/// session subscribes. A failure inside the session action has already been
/// logged and yields `Ok(())`.
pub async fn execute<C>(
    command: Command,
    overrides: &ConfigOverrides,
    store: &ConfigStore,
    connector: &C,
) -> AdminResult<()>
where
    C: Connector + ?Sized,
{
    match command {
        Command::Config(cmd) => execute_config(cmd, store),
        Command::Initialize {
            collateral_mint,
            admin_controls_prices,
        } => {
            let config = effective_config(store, overrides)?;
            let mint = wallet::parse_pubkey("collateral mint", &collateral_mint)?;
            info!(%mint, admin_controls_prices, "initializing exchange");

            let outcome = with_admin_session(connector, &config, move |admin| {
                Box::pin(async move {
                    let signature = admin
                        .ledger()
                        .submit_initialize(mint, admin_controls_prices)
                        .await?;
                    Ok::<_, anyhow::Error>(signature)
                })
            })
            .await?;
            log_submission("initialize", outcome);
            Ok(())
        }
        Command::UpdateK {
            market,
            numerator,
            denominator,
        } => {
            let config = effective_config(store, overrides)?;
            let request = AdjustmentRequest::rescale_k(market, numerator, denominator)?;
            adjust_in_session(connector, &config, request).await
        }
        Command::Repeg { market, peg } => {
            let config = effective_config(store, overrides)?;
            let request = AdjustmentRequest::repeg(market, peg)?;
            adjust_in_session(connector, &config, request).await
        }
        Command::Deposit { amount } => {
            let config = effective_config(store, overrides)?;
            if amount == 0 {
                return Err(AdminError::invalid_value("amount", "must be non-zero"));
            }

            let outcome = with_user_session(connector, &config, move |user| {
                Box::pin(async move {
                    let mint = user.ledger().collateral_mint().await?;
                    let token_account =
                        wallet::associated_collateral_account(&mint, &user.authority());
                    info!(amount, %token_account, "depositing collateral");
                    let signature = user.ledger().submit_deposit(amount, token_account).await?;
                    Ok::<_, anyhow::Error>(signature)
                })
            })
            .await?;
            log_submission("deposit", outcome);
            Ok(())
        }
    }
}

fn execute_config(command: ConfigCommand, store: &ConfigStore) -> AdminResult<()> {
    match command {
        ConfigCommand::Init => {
            let config = store.init()?;
            println!("Wrote default config to {}", store.path().display());
            print_config(store, &config)
        }
        ConfigCommand::Set { key, value } => {
            let config = store.set(&key, &value)?;
            println!("Set {} = {}", key, value);
            print_config(store, &config)
        }
        ConfigCommand::Get => {
            let config = store.get()?;
            print_config(store, &config)
        }
    }
}

fn print_config(store: &ConfigStore, config: &OperatorConfig) -> AdminResult<()> {
    let rendered =
        serde_json::to_string_pretty(config).map_err(|source| AdminError::ConfigFormat {
            path: store.path().to_path_buf(),
            source,
        })?;
    println!("{}", rendered);
    Ok(())
}

fn effective_config(
    store: &ConfigStore,
    overrides: &ConfigOverrides,
) -> AdminResult<EffectiveConfig> {
    let stored = store.load_optional()?;
    EffectiveConfig::resolve(stored.as_ref(), overrides)
}

async fn adjust_in_session<C>(
    connector: &C,
    config: &EffectiveConfig,
    request: AdjustmentRequest,
) -> AdminResult<()>
where
    C: Connector + ?Sized,
{
    let admin = AdminSession::open(connector, config)?;
    let curve = adjust::check_market(admin.ledger(), &request).await?;
    debug!(market = request.market(), ?curve, "market found");

    let outcome = run_admin_session(admin, move |admin| {
        Box::pin(async move {
            let report: AdjustmentReport = adjust::apply(admin.ledger(), &request).await?;
            Ok::<_, anyhow::Error>(report)
        })
    })
    .await?;

    match outcome {
        SessionOutcome::Completed(report) => info!(
            market = report.market,
            before = report.before,
            submitted = report.submitted,
            after = ?report.after,
            signature = %report.signature,
            "adjustment complete"
        ),
        SessionOutcome::ActionFailed(_) => warn!("adjustment not applied; session released"),
    }
    Ok(())
}

fn log_submission(command: &str, outcome: SessionOutcome<Signature>) {
    match outcome {
        SessionOutcome::Completed(signature) => info!(command, %signature, "transaction confirmed"),
        SessionOutcome::ActionFailed(_) => warn!(command, "command not applied; session released"),
    }
}

/// Process exit status for a finished command, logging the error if any.
///
/// Only a returned error is a failure; a swallowed action failure is not.
pub fn exit_status(result: &AdminResult<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            1
        }
    }
}
