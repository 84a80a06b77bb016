//! Session lifecycle around every exchange operation.
//!
//! An [`AdminSession`] owns the ledger handle. A [`UserSession`] is created by
//! an admin session and only keeps a `Weak` view of its parent's lifecycle.
//! The wrappers [`with_admin_session`] and [`with_user_session`] subscribe,
//! run one action, and release in reverse order on every exit path. An action
//! error never propagates: it is logged and reported as
//! [`SessionOutcome::ActionFailed`].

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, error, warn};

use crate::config::EffectiveConfig;
use crate::error::{AdminError, AdminResult};
use crate::ledger::{AdminLedger, Connector, UserLedger};

/// Future returned by a session action
pub type ActionFuture<'s, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 's>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unsubscribed,
    Subscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Admin,
    User,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Admin => f.write_str("admin"),
            SessionKind::User => f.write_str("user"),
        }
    }
}

/// Result of running an action inside a session
#[must_use]
#[derive(Debug)]
pub enum SessionOutcome<T> {
    Completed(T),
    ActionFailed(anyhow::Error),
}

impl<T> SessionOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            SessionOutcome::Completed(value) => Some(value),
            SessionOutcome::ActionFailed(_) => None,
        }
    }

    /// Surface an absorbed failure as [`AdminError::ActionFailure`]
    pub fn into_result(self) -> AdminResult<T> {
        match self {
            SessionOutcome::Completed(value) => Ok(value),
            SessionOutcome::ActionFailed(err) => Err(AdminError::ActionFailure(err)),
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    kind: SessionKind,
    subscribed: AtomicBool,
}

impl Lifecycle {
    fn new(kind: SessionKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            subscribed: AtomicBool::new(false),
        })
    }

    fn state(&self) -> SessionState {
        if self.subscribed.load(Ordering::SeqCst) {
            SessionState::Subscribed
        } else {
            SessionState::Unsubscribed
        }
    }

    fn require(&self, expected: SessionState, transition: &str) -> AdminResult<()> {
        let actual = self.state();
        if actual != expected {
            return Err(AdminError::lifecycle(format!(
                "{} session cannot {} while {:?}",
                self.kind, transition, actual
            )));
        }
        Ok(())
    }

    fn set(&self, state: SessionState) {
        self.subscribed
            .store(state == SessionState::Subscribed, Ordering::SeqCst);
        debug!(session = %self.kind, ?state, "session transition");
    }
}

pub struct AdminSession {
    ledger: Box<dyn AdminLedger>,
    lifecycle: Arc<Lifecycle>,
    children: Vec<Weak<Lifecycle>>,
}

impl AdminSession {
    pub fn new(ledger: Box<dyn AdminLedger>) -> Self {
        Self {
            ledger,
            lifecycle: Lifecycle::new(SessionKind::Admin),
            children: Vec::new(),
        }
    }

    /// Load the signer and open the client for `config`; not yet subscribed
    pub fn open<C: Connector + ?Sized>(
        connector: &C,
        config: &EffectiveConfig,
    ) -> AdminResult<Self> {
        Ok(Self::new(connector.open_admin(config)?))
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    pub fn authority(&self) -> Pubkey {
        self.ledger.authority()
    }

    pub fn ledger(&self) -> &dyn AdminLedger {
        self.ledger.as_ref()
    }

    pub async fn subscribe(&mut self) -> AdminResult<()> {
        self.lifecycle.require(SessionState::Unsubscribed, "subscribe")?;
        self.ledger.subscribe().await?;
        self.lifecycle.set(SessionState::Subscribed);
        Ok(())
    }

    pub async fn unsubscribe(&mut self) -> AdminResult<()> {
        self.lifecycle.require(SessionState::Subscribed, "unsubscribe")?;
        let live_children = self
            .children
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|child| child.state() == SessionState::Subscribed)
            .count();
        if live_children > 0 {
            return Err(AdminError::lifecycle(format!(
                "admin session cannot unsubscribe with {} user session(s) still subscribed",
                live_children
            )));
        }
        self.ledger.unsubscribe().await?;
        self.lifecycle.set(SessionState::Unsubscribed);
        Ok(())
    }

    /// Nested user session sharing this session's connection and signer
    pub fn user_session(&mut self) -> UserSession {
        let user = UserSession {
            ledger: self.ledger.user_ledger(),
            lifecycle: Lifecycle::new(SessionKind::User),
            parent: Arc::downgrade(&self.lifecycle),
        };
        self.children.retain(|c| c.strong_count() > 0);
        self.children.push(Arc::downgrade(&user.lifecycle));
        user
    }
}

pub struct UserSession {
    ledger: Box<dyn UserLedger>,
    lifecycle: Arc<Lifecycle>,
    parent: Weak<Lifecycle>,
}

impl UserSession {
    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    pub fn authority(&self) -> Pubkey {
        self.ledger.authority()
    }

    pub fn ledger(&self) -> &dyn UserLedger {
        self.ledger.as_ref()
    }

    pub async fn subscribe(&mut self) -> AdminResult<()> {
        self.lifecycle.require(SessionState::Unsubscribed, "subscribe")?;
        match self.parent.upgrade() {
            Some(parent) if parent.state() == SessionState::Subscribed => {}
            Some(_) => {
                return Err(AdminError::lifecycle(
                    "user session cannot subscribe while its admin session is unsubscribed",
                ))
            }
            None => {
                return Err(AdminError::lifecycle(
                    "user session outlived its admin session",
                ))
            }
        }
        self.ledger.subscribe().await?;
        self.lifecycle.set(SessionState::Subscribed);
        Ok(())
    }

    pub async fn unsubscribe(&mut self) -> AdminResult<()> {
        self.lifecycle.require(SessionState::Subscribed, "unsubscribe")?;
        self.ledger.unsubscribe().await?;
        self.lifecycle.set(SessionState::Unsubscribed);
        Ok(())
    }
}

/// A subscribed session that can be released
#[async_trait]
trait Release: Send {
    fn kind(&self) -> SessionKind;

    async fn release(&mut self) -> AdminResult<()>;
}

#[async_trait]
impl Release for AdminSession {
    fn kind(&self) -> SessionKind {
        SessionKind::Admin
    }

    async fn release(&mut self) -> AdminResult<()> {
        self.unsubscribe().await
    }
}

#[async_trait]
impl Release for UserSession {
    fn kind(&self) -> SessionKind {
        SessionKind::User
    }

    async fn release(&mut self) -> AdminResult<()> {
        self.unsubscribe().await
    }
}

/// Release sessions in reverse acquisition order. Every session is attempted;
/// the first failure is returned.
async fn release_stack(stack: Vec<&mut dyn Release>) -> AdminResult<()> {
    let mut first_error = None;
    for session in stack.into_iter().rev() {
        if let Err(e) = session.release().await {
            error!(session = %session.kind(), error = %e, "failed to release session");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Await an action, turning an error or panic into `ActionFailed`
async fn run_action<T>(kind: SessionKind, action: ActionFuture<'_, T>) -> SessionOutcome<T> {
    match AssertUnwindSafe(action).catch_unwind().await {
        Ok(Ok(value)) => SessionOutcome::Completed(value),
        Ok(Err(err)) => {
            error!(session = %kind, "action failed: {:#}", err);
            SessionOutcome::ActionFailed(err)
        }
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            warn!(session = %kind, "action panicked: {}", msg);
            SessionOutcome::ActionFailed(anyhow::anyhow!("action panicked: {}", msg))
        }
    }
}

/// Run `action` inside a subscribed admin session.
///
/// Setup and release failures propagate; an action failure is logged and
/// returned as [`SessionOutcome::ActionFailed`] after the session is released.
pub async fn with_admin_session<C, T, F>(
    connector: &C,
    config: &EffectiveConfig,
    action: F,
) -> AdminResult<SessionOutcome<T>>
where
    C: Connector + ?Sized,
    F: for<'s> FnOnce(&'s AdminSession) -> ActionFuture<'s, T>,
{
    let admin = AdminSession::open(connector, config)?;
    run_admin_session(admin, action).await
}

/// Subscribe an already opened admin session, run `action`, and release it.
///
/// Lets a caller read through the unsubscribed session first and reject bad
/// input before any subscription exists.
pub async fn run_admin_session<T, F>(
    mut admin: AdminSession,
    action: F,
) -> AdminResult<SessionOutcome<T>>
where
    F: for<'s> FnOnce(&'s AdminSession) -> ActionFuture<'s, T>,
{
    admin.subscribe().await?;

    let outcome = run_action(SessionKind::Admin, action(&admin)).await;

    release_stack(vec![&mut admin as &mut dyn Release]).await?;
    Ok(outcome)
}

/// Run `action` inside a user session nested in an admin session.
///
/// Order: admin subscribe, user subscribe, action, user unsubscribe, admin
/// unsubscribe.
pub async fn with_user_session<C, T, F>(
    connector: &C,
    config: &EffectiveConfig,
    action: F,
) -> AdminResult<SessionOutcome<T>>
where
    C: Connector + ?Sized,
    F: for<'s> FnOnce(&'s UserSession) -> ActionFuture<'s, T>,
{
    let mut admin = AdminSession::open(connector, config)?;
    admin.subscribe().await?;

    let mut user = admin.user_session();
    if let Err(e) = user.subscribe().await {
        if let Err(release_err) = release_stack(vec![&mut admin as &mut dyn Release]).await {
            error!(error = %release_err, "admin session release failed after user subscribe error");
        }
        return Err(e);
    }

    let outcome = run_action(SessionKind::User, action(&user)).await;

    release_stack(vec![&mut admin as &mut dyn Release, &mut user]).await?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LedgerCall, MockConnector};

    fn config() -> EffectiveConfig {
        EffectiveConfig {
            network: crate::config::Network::Localnet,
            url: "http://127.0.0.1:8899".to_string(),
            keypair: "unused".to_string(),
        }
    }

    #[tokio::test]
    async fn test_double_subscribe_is_rejected() {
        let connector = MockConnector::default();
        let mut admin = AdminSession::open(&connector, &config()).unwrap();
        admin.subscribe().await.unwrap();
        let err = admin.subscribe().await.unwrap_err();
        assert!(matches!(err, AdminError::LifecycleViolation(_)));
        assert_eq!(connector.journal().count(LedgerCall::AdminSubscribe), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_from_unsubscribed_is_rejected() {
        let connector = MockConnector::default();
        let mut admin = AdminSession::open(&connector, &config()).unwrap();
        let err = admin.unsubscribe().await.unwrap_err();
        assert!(matches!(err, AdminError::LifecycleViolation(_)));
        assert!(connector.journal().calls().is_empty());
    }

    #[tokio::test]
    async fn test_user_requires_subscribed_parent() {
        let connector = MockConnector::default();
        let mut admin = AdminSession::open(&connector, &config()).unwrap();
        let mut user = admin.user_session();
        let err = user.subscribe().await.unwrap_err();
        assert!(matches!(err, AdminError::LifecycleViolation(_)));
        assert_eq!(user.state(), SessionState::Unsubscribed);
    }

    #[tokio::test]
    async fn test_admin_cannot_release_before_user() {
        let connector = MockConnector::default();
        let mut admin = AdminSession::open(&connector, &config()).unwrap();
        admin.subscribe().await.unwrap();
        let mut user = admin.user_session();
        user.subscribe().await.unwrap();

        let err = admin.unsubscribe().await.unwrap_err();
        assert!(matches!(err, AdminError::LifecycleViolation(_)));
        assert_eq!(admin.state(), SessionState::Subscribed);

        user.unsubscribe().await.unwrap();
        admin.unsubscribe().await.unwrap();
        assert_eq!(admin.state(), SessionState::Unsubscribed);
    }

    #[tokio::test]
    async fn test_failed_remote_unsubscribe_keeps_state() {
        let connector = MockConnector::default();
        connector.fail_on(LedgerCall::AdminUnsubscribe);
        let mut admin = AdminSession::open(&connector, &config()).unwrap();
        admin.subscribe().await.unwrap();
        assert!(admin.unsubscribe().await.is_err());
        assert_eq!(admin.state(), SessionState::Subscribed);
    }

    #[test]
    fn test_outcome_into_result() {
        let ok: SessionOutcome<u8> = SessionOutcome::Completed(3);
        assert_eq!(ok.into_result().unwrap(), 3);

        let failed: SessionOutcome<u8> = SessionOutcome::ActionFailed(anyhow::anyhow!("boom"));
        assert!(!failed.is_completed());
        assert!(matches!(
            failed.into_result(),
            Err(AdminError::ActionFailure(_))
        ));
    }
}
