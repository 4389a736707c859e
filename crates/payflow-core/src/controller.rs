//! Payment Confirmation Controller
//!
//! Drives one confirmation run as a tokio task:
//!
//! ```text
//!            load record ── missing/malformed ──────────────┐
//!                 │                                          ▼
//!   ┌──── order code supplied? ── no ──▶ initiate session ─ error ─▶ failed
//!   │ yes                                     │
//!   ▼                                         ▼
//! poll every interval ◀──────── PENDING / error / commit incomplete
//!   │ PAID + commit ok          │ CANCELLED + history cancelled
//!   ▼                           ▼
//! succeeded ─ clear record,   failed
//!             redirect after grace delay
//! ```
//!
//! Progress is published through a `watch` channel as [`PaymentSnapshot`]s.
//! The run owns both of its timers; [`ControllerHandle::shutdown`] or dropping
//! the handle aborts the task and cancels them.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use uuid::Uuid;

use crate::api::PlatformApi;
use crate::commit::{CommitOutcome, CommitPolicy, CommitSequence};
use crate::error::{PaymentError, Result};
use crate::model::{ControllerStatus, FailureReason, PendingPayment, Role, SettlementStatus};
use crate::poller::{PollerConfig, SettlementPoller, Tick, interval_from_millis};
use crate::session::initiate_session;
use crate::store::PendingPaymentStore;

/// Grace period between success and redirect
pub const DEFAULT_REDIRECT_DELAY: Duration = Duration::from_millis(3000);

/// Where a successful run sends the user
pub const DEFAULT_HOME_ROUTE: &str = "/";

/// Controller configuration
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Settlement polling limits
    pub poller: PollerConfig,

    /// Delay between `succeeded` and the redirect signal
    pub redirect_delay: Duration,

    /// Redirect target on success
    pub home_route: String,

    /// Where retried commits start
    pub commit_policy: CommitPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            redirect_delay: DEFAULT_REDIRECT_DELAY,
            home_route: DEFAULT_HOME_ROUTE.into(),
            commit_policy: CommitPolicy::default(),
        }
    }
}

impl ControllerConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let interval = env_parse::<i64>("PAYFLOW_POLL_INTERVAL_MS")
            .map_or(defaults.poller.interval, interval_from_millis);
        let redirect_delay = env_parse::<u64>("PAYFLOW_REDIRECT_DELAY_MS")
            .map_or(defaults.redirect_delay, Duration::from_millis);
        let max_attempts = env_parse::<u32>("PAYFLOW_MAX_POLL_ATTEMPTS").filter(|n| *n > 0);
        let deadline = env_parse::<u64>("PAYFLOW_POLL_DEADLINE_SECS")
            .filter(|n| *n > 0)
            .map(Duration::from_secs);
        let commit_policy = match std::env::var("PAYFLOW_COMMIT_POLICY") {
            Ok(raw) => CommitPolicy::parse(&raw)?,
            Err(_) => defaults.commit_policy,
        };
        let home_route = std::env::var("PAYFLOW_HOME_ROUTE").unwrap_or(defaults.home_route);

        Ok(Self {
            poller: PollerConfig {
                interval,
                max_attempts,
                deadline,
            },
            redirect_delay,
            home_route,
            commit_policy,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Unique run identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable state of a run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSnapshot {
    pub run_id: RunId,
    pub status: ControllerStatus,
    pub transaction_id: Option<String>,
    pub checkout_url: Option<String>,
    pub order_code: Option<i64>,
    pub poll_attempts: u32,
    pub failure: Option<FailureReason>,
    /// Set once the post-success grace delay has elapsed
    pub redirect_to: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentSnapshot {
    fn new(run_id: RunId, order_code: Option<i64>) -> Self {
        Self {
            run_id,
            status: ControllerStatus::Pending,
            transaction_id: None,
            checkout_url: None,
            order_code,
            poll_attempts: 0,
            failure: None,
            redirect_to: None,
            updated_at: Utc::now(),
        }
    }

    /// Apply a status change; terminal states are never left
    fn transition(&mut self, to: ControllerStatus, failure: Option<FailureReason>) -> bool {
        if !self.status.can_transition_to(to) {
            return false;
        }
        self.status = to;
        self.failure = failure;
        self.updated_at = Utc::now();
        true
    }
}

/// Caller-supplied parameters of a run
#[derive(Clone, Debug, Default)]
pub struct StartOptions {
    /// Payer role, selects profile lookup and subscription endpoint
    pub role: Role,

    /// Order code handed back by the gateway redirect, if any
    pub order_code: Option<i64>,
}

/// Payment confirmation controller
pub struct PaymentController {
    api: Arc<dyn PlatformApi>,
    store: Arc<dyn PendingPaymentStore>,
    config: ControllerConfig,
}

impl PaymentController {
    pub fn new(
        api: Arc<dyn PlatformApi>,
        store: Arc<dyn PendingPaymentStore>,
        config: ControllerConfig,
    ) -> Self {
        Self { api, store, config }
    }

    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Start a run. Must be called from within a tokio runtime.
    ///
    /// The pending record is loaded before anything is spawned: a missing or
    /// unusable record yields a handle that is already `failed`.
    pub fn start(&self, options: StartOptions) -> ControllerHandle {
        let run_id = RunId::new();
        let (tx, rx) = watch::channel(PaymentSnapshot::new(run_id, options.order_code));

        let payment = match self.store.load() {
            Ok(Some(payment)) => payment,
            Ok(None) => return Self::failed_handle(&tx, rx, &PaymentError::MissingRecord),
            Err(e) => return Self::failed_handle(&tx, rx, &e),
        };

        tx.send_modify(|s| s.transaction_id = Some(payment.transaction_id.clone()));
        tracing::info!(
            run_id = %run_id,
            transaction_id = %payment.transaction_id,
            role = %options.role,
            order_code = ?options.order_code,
            "Starting payment confirmation"
        );

        let run = Run {
            run_id,
            api: self.api.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
            payment,
            role: options.role,
            tx,
        };

        ControllerHandle {
            snapshot: rx,
            task: Some(tokio::spawn(run.drive(options.order_code))),
        }
    }

    fn failed_handle(
        tx: &watch::Sender<PaymentSnapshot>,
        rx: watch::Receiver<PaymentSnapshot>,
        err: &PaymentError,
    ) -> ControllerHandle {
        tracing::warn!(error = %err, "Pending payment unavailable");
        tx.send_modify(|s| {
            s.transition(ControllerStatus::Failed, Some(FailureReason::from_error(err)));
        });
        ControllerHandle { snapshot: rx, task: None }
    }
}

/// One in-flight run
struct Run {
    run_id: RunId,
    api: Arc<dyn PlatformApi>,
    store: Arc<dyn PendingPaymentStore>,
    config: ControllerConfig,
    payment: PendingPayment,
    role: Role,
    tx: watch::Sender<PaymentSnapshot>,
}

impl Run {
    async fn drive(self, order_code: Option<i64>) {
        let order_code = match order_code {
            Some(code) => {
                tracing::debug!(run_id = %self.run_id, order_code = code, "Order code supplied");
                code
            }
            None => match initiate_session(self.api.as_ref(), &self.payment, self.role).await {
                Ok(session) => {
                    let code = session.order_code;
                    self.tx.send_modify(|s| {
                        s.checkout_url = Some(session.checkout_url);
                        s.order_code = Some(code);
                    });
                    code
                }
                Err(e) => {
                    tracing::warn!(run_id = %self.run_id, error = %e, "Checkout session failed");
                    self.fail(FailureReason::from_error(&e));
                    return;
                }
            },
        };

        match self.poll(order_code).await {
            Ok(()) => self.succeed().await,
            Err(reason) => self.fail(reason),
        }
    }

    /// Poll until a terminal outcome. Ticks run one at a time.
    async fn poll(&self, order_code: i64) -> std::result::Result<(), FailureReason> {
        let mut poller = SettlementPoller::start(&self.config.poller);
        let mut commit = CommitSequence::new(
            self.api.clone(),
            self.config.commit_policy,
            self.payment.clone(),
            self.role,
            order_code,
        );

        loop {
            let attempt = match poller.tick().await {
                Tick::Probe(attempt) => attempt,
                Tick::Exhausted(why) => {
                    tracing::warn!(
                        run_id = %self.run_id,
                        order_code,
                        reason = %why,
                        "Settlement polling exhausted"
                    );
                    return Err(FailureReason::PollingExhausted);
                }
            };
            self.tx.send_modify(|s| s.poll_attempts = attempt);

            if let ControlFlow::Break(result) = self.probe(order_code, attempt, &mut commit).await {
                return result;
            }
        }
    }

    async fn probe(
        &self,
        order_code: i64,
        attempt: u32,
        commit: &mut CommitSequence,
    ) -> ControlFlow<std::result::Result<(), FailureReason>> {
        let check = match self.api.check_payment(order_code).await {
            Ok(check) => check,
            Err(e) if e.is_retryable() => {
                tracing::warn!(order_code, attempt, error = %e, "Settlement check failed");
                return ControlFlow::Continue(());
            }
            Err(e) => {
                tracing::error!(order_code, attempt, error = %e, "Settlement check rejected");
                return ControlFlow::Continue(());
            }
        };

        match check.settlement() {
            SettlementStatus::Paid => match commit.run().await {
                Ok(CommitOutcome::Committed) => ControlFlow::Break(Ok(())),
                Ok(CommitOutcome::Incomplete(_)) => ControlFlow::Continue(()),
                Err(e) => {
                    tracing::warn!(order_code, attempt, error = %e, "Commit attempt failed");
                    ControlFlow::Continue(())
                }
            },
            SettlementStatus::Cancelled => {
                match self.api.cancel_history(&self.payment.transaction_id).await {
                    Ok(()) => {
                        tracing::info!(
                            transaction_id = %self.payment.transaction_id,
                            order_code,
                            "Payment cancelled at gateway"
                        );
                        ControlFlow::Break(Err(FailureReason::CancelledByPayer))
                    }
                    Err(e) => {
                        tracing::warn!(order_code, error = %e, "Cancelling history failed");
                        ControlFlow::Continue(())
                    }
                }
            }
            SettlementStatus::Pending => {
                tracing::debug!(order_code, attempt, status = ?check.status, "Not settled yet");
                ControlFlow::Continue(())
            }
        }
    }

    async fn succeed(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(run_id = %self.run_id, error = %e, "Failed to clear pending payment");
        }
        self.tx.send_modify(|s| {
            s.transition(ControllerStatus::Succeeded, None);
        });
        tracing::info!(
            run_id = %self.run_id,
            transaction_id = %self.payment.transaction_id,
            "Payment succeeded"
        );

        time::sleep(self.config.redirect_delay).await;
        let target = self.config.home_route.clone();
        tracing::debug!(run_id = %self.run_id, target = %target, "Redirecting");
        self.tx.send_modify(|s| s.redirect_to = Some(target));
    }

    fn fail(&self, reason: FailureReason) {
        tracing::warn!(
            run_id = %self.run_id,
            transaction_id = %self.payment.transaction_id,
            reason = ?reason,
            "Payment failed"
        );
        self.tx.send_modify(|s| {
            s.transition(ControllerStatus::Failed, Some(reason));
        });
    }
}

/// Handle to a started run. Dropping it tears the run down.
pub struct ControllerHandle {
    snapshot: watch::Receiver<PaymentSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    /// Current state
    pub fn snapshot(&self) -> PaymentSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> ControllerStatus {
        self.snapshot.borrow().status
    }

    /// Receiver for state changes
    pub fn subscribe(&self) -> watch::Receiver<PaymentSnapshot> {
        self.snapshot.clone()
    }

    /// Whether the run task is still alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait until the run reaches `succeeded` or `failed`
    pub async fn wait_for_terminal(&mut self) -> ControllerStatus {
        let reached = self
            .snapshot
            .wait_for(|s| s.status.is_terminal())
            .await
            .map(|s| s.status);
        reached.unwrap_or_else(|_| self.status())
    }

    /// Wait for the post-success redirect. `None` if the run ended without one.
    pub async fn wait_for_redirect(&mut self) -> Option<String> {
        self.snapshot
            .wait_for(|s| s.redirect_to.is_some())
            .await
            .ok()
            .and_then(|s| s.redirect_to.clone())
    }

    /// Abort the run, cancelling its poll and redirect timers
    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
