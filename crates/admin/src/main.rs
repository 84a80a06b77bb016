// Operator CLI for the perpetual-futures exchange
//
// Every command except `config` opens a session against the exchange program,
// performs one privileged or end-user action, and releases the session.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::prelude::*;

use perp_admin::cli::Cli;
use perp_admin::{commands, wallet, AdminResult, ConfigStore, RpcConnector, DEFAULT_PROGRAM_ID};

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("perp_admin={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> AdminResult<()> {
    let store = ConfigStore::locate(cli.global.config.as_deref())?;
    let program_id = match cli.global.program_id.as_deref() {
        Some(id) => wallet::parse_pubkey("program id", id)?,
        None => DEFAULT_PROGRAM_ID,
    };
    let connector = RpcConnector::new(program_id);

    commands::execute(cli.command, &cli.global.overrides(), &store, &connector).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let result = run(cli).await;
    ExitCode::from(commands::exit_status(&result))
}
