//! Post-Settlement Commit Sequence
//!
//! Once the gateway reports `PAID`, three remote mutations materialize the
//! purchase, strictly in order:
//!
//! ```text
//! accept history ──▶ create subscription ──▶ upgrade tier ──▶ committed
//!       │                    │ falsy              │ falsy
//!       └── error ───────────┴────────────────────┴──▶ incomplete (retry next tick)
//! ```
//!
//! [`CommitPolicy`] decides where the next attempt starts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::PlatformApi;
use crate::error::{PaymentError, Result};
use crate::model::{PendingPayment, Role, SubscriptionRequest, UpgradeTierRequest};

/// Where a retried commit starts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitPolicy {
    /// Re-run every step on each attempt. Relies on the platform
    /// deduplicating by transaction id.
    #[default]
    Replay,
    /// Skip steps that already succeeded during this run
    Resume,
}

impl CommitPolicy {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "replay" => Ok(Self::Replay),
            "resume" => Ok(Self::Resume),
            other => Err(PaymentError::Config(format!("unknown commit policy '{other}'"))),
        }
    }
}

/// One remote mutation of the sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStep {
    AcceptHistory,
    CreateSubscription,
    UpgradeTier,
}

static COMMIT_ORDER: [CommitStep; 3] = [
    CommitStep::AcceptHistory,
    CommitStep::CreateSubscription,
    CommitStep::UpgradeTier,
];

impl CommitStep {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AcceptHistory => "accept_history",
            Self::CreateSubscription => "create_subscription",
            Self::UpgradeTier => "upgrade_tier",
        }
    }
}

impl std::fmt::Display for CommitStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one commit attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every step confirmed
    Committed,
    /// The platform answered falsy at this step
    Incomplete(CommitStep),
}

/// Ordered commit of a settled payment
pub struct CommitSequence {
    api: Arc<dyn PlatformApi>,
    policy: CommitPolicy,
    role: Role,
    order_code: i64,
    payment: PendingPayment,
    /// Steps confirmed so far; only consulted under [`CommitPolicy::Resume`]
    completed: usize,
    attempts: u32,
}

impl CommitSequence {
    pub fn new(
        api: Arc<dyn PlatformApi>,
        policy: CommitPolicy,
        payment: PendingPayment,
        role: Role,
        order_code: i64,
    ) -> Self {
        Self {
            api,
            policy,
            role,
            order_code,
            payment,
            completed: 0,
            attempts: 0,
        }
    }

    /// Run the sequence once. An `Err` means a step failed in transport and
    /// the attempt can be retried like an incomplete one.
    pub async fn run(&mut self) -> Result<CommitOutcome> {
        self.attempts += 1;
        let start = match self.policy {
            CommitPolicy::Replay => 0,
            CommitPolicy::Resume => self.completed,
        };
        if start > 0 {
            tracing::debug!(
                transaction_id = %self.payment.transaction_id,
                resume_at = %COMMIT_ORDER[start.min(COMMIT_ORDER.len() - 1)],
                "Resuming commit"
            );
        }

        for (index, step) in COMMIT_ORDER.iter().copied().enumerate().skip(start) {
            if !self.execute(step).await? {
                tracing::info!(
                    transaction_id = %self.payment.transaction_id,
                    step = %step,
                    attempt = self.attempts,
                    "Commit step not confirmed"
                );
                return Ok(CommitOutcome::Incomplete(step));
            }
            self.completed = self.completed.max(index + 1);
        }

        tracing::info!(
            transaction_id = %self.payment.transaction_id,
            order_code = self.order_code,
            role = %self.role,
            tier_id = %self.payment.tier_id,
            "Subscription committed"
        );
        Ok(CommitOutcome::Committed)
    }

    async fn execute(&self, step: CommitStep) -> Result<bool> {
        match step {
            CommitStep::AcceptHistory => {
                self.api.accept_history(&self.payment.transaction_id).await?;
                Ok(true)
            }
            CommitStep::CreateSubscription => {
                let request = SubscriptionRequest::from(&self.payment);
                self.api.create_subscription(self.role, &request).await
            }
            CommitStep::UpgradeTier => {
                let request = UpgradeTierRequest {
                    user_id: self.payment.user_id.clone(),
                    order_code: self.order_code,
                    is_teacher: self.role.is_teacher(),
                    tier_id: self.payment.tier_id.clone(),
                };
                self.api.upgrade_tier(&request).await
            }
        }
    }

    /// Attempts made so far
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Steps confirmed during this run
    pub fn completed_steps(&self) -> &'static [CommitStep] {
        &COMMIT_ORDER[..self.completed]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockCall, MockPlatformApi};

    fn sequence(api: &Arc<MockPlatformApi>, policy: CommitPolicy, role: Role) -> CommitSequence {
        let payment = PendingPayment::new("tx-9", 50_000, "user-9").with_tier("3");
        CommitSequence::new(api.clone(), policy, payment, role, 42)
    }

    #[tokio::test]
    async fn test_student_commit() {
        let api = Arc::new(MockPlatformApi::new());
        let mut commit = sequence(&api, CommitPolicy::Replay, Role::Student);

        assert_eq!(commit.run().await.unwrap(), CommitOutcome::Committed);
        assert_eq!(
            api.calls(),
            vec![
                MockCall::AcceptHistory,
                MockCall::CreateStudentSubscription,
                MockCall::UpgradeTier
            ]
        );
        assert!(api.is_accepted("tx-9"));
        let upgrades = api.upgrades();
        let upgrade = &upgrades[0];
        assert_eq!(upgrade.order_code, 42);
        assert_eq!(upgrade.tier_id, "3");
        assert!(!upgrade.is_teacher);
    }

    #[tokio::test]
    async fn test_teacher_uses_teacher_endpoint() {
        let api = Arc::new(MockPlatformApi::new());
        let mut commit = sequence(&api, CommitPolicy::Replay, Role::Teacher);

        assert_eq!(commit.run().await.unwrap(), CommitOutcome::Committed);
        assert_eq!(api.call_count(MockCall::CreateTeacherSubscription), 1);
        assert_eq!(api.call_count(MockCall::CreateStudentSubscription), 0);
        assert!(api.upgrades()[0].is_teacher);
    }

    #[tokio::test]
    async fn test_falsy_subscription_short_circuits() {
        let api = Arc::new(MockPlatformApi::new().with_subscription_result(false));
        let mut commit = sequence(&api, CommitPolicy::Replay, Role::Student);

        assert_eq!(
            commit.run().await.unwrap(),
            CommitOutcome::Incomplete(CommitStep::CreateSubscription)
        );
        assert_eq!(api.call_count(MockCall::UpgradeTier), 0);
        assert_eq!(commit.completed_steps(), &[CommitStep::AcceptHistory]);
    }

    #[tokio::test]
    async fn test_replay_reruns_every_step() {
        let api = Arc::new(MockPlatformApi::new().with_upgrade_results([false]));
        let mut commit = sequence(&api, CommitPolicy::Replay, Role::Student);

        assert_eq!(
            commit.run().await.unwrap(),
            CommitOutcome::Incomplete(CommitStep::UpgradeTier)
        );
        assert_eq!(commit.run().await.unwrap(), CommitOutcome::Committed);

        assert_eq!(api.call_count(MockCall::AcceptHistory), 2);
        assert_eq!(api.call_count(MockCall::CreateStudentSubscription), 2);
        assert_eq!(api.call_count(MockCall::UpgradeTier), 2);
        // platform dedupes by transaction id
        assert_eq!(api.subscriptions_created(), 1);
        assert_eq!(commit.attempts(), 2);
    }

    #[tokio::test]
    async fn test_resume_skips_confirmed_steps() {
        let api = Arc::new(MockPlatformApi::new().with_upgrade_results([false, false]));
        let mut commit = sequence(&api, CommitPolicy::Resume, Role::Student);

        for _ in 0..2 {
            assert_eq!(
                commit.run().await.unwrap(),
                CommitOutcome::Incomplete(CommitStep::UpgradeTier)
            );
        }
        assert_eq!(commit.run().await.unwrap(), CommitOutcome::Committed);

        assert_eq!(api.call_count(MockCall::AcceptHistory), 1);
        assert_eq!(api.call_count(MockCall::CreateStudentSubscription), 1);
        assert_eq!(api.call_count(MockCall::UpgradeTier), 3);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(CommitPolicy::parse("Resume").unwrap(), CommitPolicy::Resume);
        assert_eq!(CommitPolicy::parse("replay").unwrap(), CommitPolicy::Replay);
        assert!(CommitPolicy::parse("sometimes").is_err());
    }
}
