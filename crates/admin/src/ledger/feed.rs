//! Websocket account-update feed backing a subscribed session.
//!
//! The pubsub client lives on its own task so the session can hold a plain
//! handle. `start` returns only once the remote subscription is confirmed;
//! `stop` unsubscribes and waits for the connection to close.

use futures::StreamExt;
use solana_account_decoder::UiAccountEncoding;
use solana_client::{nonblocking::pubsub_client::PubsubClient, rpc_config::RpcAccountInfoConfig};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{LedgerError, LedgerResult};

pub struct AccountFeed {
    account: Pubkey,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<LedgerResult<()>>,
    last_slot: watch::Receiver<Option<u64>>,
}

impl AccountFeed {
    pub async fn start(
        ws_url: String,
        account: Pubkey,
        commitment: CommitmentConfig,
    ) -> LedgerResult<Self> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (slot_tx, slot_rx) = watch::channel(None);

        let task = tokio::spawn(run_feed(
            ws_url,
            account,
            commitment,
            ready_tx,
            shutdown_rx,
            slot_tx,
        ));

        match ready_rx.await {
            Ok(Ok(())) => {
                info!(%account, "account feed subscribed");
                Ok(Self {
                    account,
                    shutdown: Some(shutdown_tx),
                    task,
                    last_slot: slot_rx,
                })
            }
            Ok(Err(reason)) => {
                let _ = task.await;
                Err(LedgerError::Subscription(reason))
            }
            Err(_) => Err(LedgerError::Subscription(format!(
                "feed for {} exited before subscribing",
                account
            ))),
        }
    }

    pub fn account(&self) -> Pubkey {
        self.account
    }

    /// Slot of the most recent update seen, if any
    pub fn last_slot(&self) -> Option<u64> {
        *self.last_slot.borrow()
    }

    pub async fn stop(mut self) -> LedgerResult<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let result = self
            .task
            .await
            .map_err(|e| LedgerError::Subscription(format!("feed task failed: {}", e)))?;
        info!(account = %self.account, "account feed closed");
        result
    }
}

async fn run_feed(
    ws_url: String,
    account: Pubkey,
    commitment: CommitmentConfig,
    ready: oneshot::Sender<Result<(), String>>,
    mut shutdown: oneshot::Receiver<()>,
    last_slot: watch::Sender<Option<u64>>,
) -> LedgerResult<()> {
    let client = match PubsubClient::new(&ws_url).await {
        Ok(client) => client,
        Err(e) => {
            let _ = ready.send(Err(format!("connect {}: {}", ws_url, e)));
            return Ok(());
        }
    };

    let config = RpcAccountInfoConfig {
        encoding: Some(UiAccountEncoding::Base64),
        commitment: Some(commitment),
        ..RpcAccountInfoConfig::default()
    };

    {
        let (mut updates, unsubscribe) = match client.account_subscribe(&account, Some(config)).await
        {
            Ok(subscription) => subscription,
            Err(e) => {
                let _ = ready.send(Err(format!("account_subscribe {}: {}", account, e)));
                return Ok(());
            }
        };
        let _ = ready.send(Ok(()));

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                update = updates.next() => match update {
                    Some(response) => {
                        debug!(%account, slot = response.context.slot, "account updated");
                        let _ = last_slot.send(Some(response.context.slot));
                    }
                    None => {
                        warn!(%account, "account feed closed by remote");
                        break;
                    }
                },
            }
        }

        drop(updates);
        unsubscribe().await;
    }

    client
        .shutdown()
        .await
        .map_err(|e| LedgerError::Subscription(e.to_string()))
}
