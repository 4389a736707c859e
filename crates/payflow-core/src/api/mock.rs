//! Mock Platform API
//!
//! In-memory platform for tests and local demos. Responses are scripted,
//! every call is recorded, and subscriptions are deduplicated by
//! transaction id the way the real backend does.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::PlatformApi;
use crate::error::{PaymentError, Result};
use crate::model::{
    CreatePaymentRequest, PaymentCheck, PaymentRequestResponse, Role, SubscriptionRequest,
    UpgradeTierRequest, UserProfile,
};

/// Operation recorded by the mock
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockCall {
    FetchProfile,
    CreatePaymentRequest,
    CheckPayment,
    AcceptHistory,
    CancelHistory,
    CreateStudentSubscription,
    CreateTeacherSubscription,
    UpgradeTier,
}

/// Scripted settlement answer
#[derive(Clone, Debug)]
enum Settlement {
    Status(String),
    TransportError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HistoryState {
    Accepted,
    Cancelled,
}

struct MockState {
    profile: Option<UserProfile>,
    checkout: Option<PaymentRequestResponse>,
    next_order_code: i64,
    settlements: VecDeque<Settlement>,
    settlement_default: String,
    settle_after: Option<u32>,
    subscription_result: bool,
    upgrade_results: VecDeque<bool>,
    cancel_errors: u32,
    calls: Vec<MockCall>,
    checked_orders: Vec<i64>,
    history: HashMap<String, HistoryState>,
    subscriptions: HashSet<String>,
    subscriptions_created: u32,
    upgrades: Vec<UpgradeTierRequest>,
}

/// Mock platform with scripted responses
pub struct MockPlatformApi {
    state: Mutex<MockState>,
}

impl Default for MockPlatformApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatformApi {
    /// Healthy platform that never settles on its own
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                profile: Some(UserProfile {
                    full_name: "Demo Buyer".into(),
                    email: None,
                }),
                checkout: None,
                next_order_code: 1000,
                settlements: VecDeque::new(),
                settlement_default: "PENDING".into(),
                settle_after: None,
                subscription_result: true,
                upgrade_results: VecDeque::new(),
                cancel_errors: 0,
                calls: Vec::new(),
                checked_orders: Vec::new(),
                history: HashMap::new(),
                subscriptions: HashSet::new(),
                subscriptions_created: 0,
                upgrades: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn without_profile(self) -> Self {
        self.lock().profile = None;
        self
    }

    /// Fixed gateway answer for payment requests
    #[must_use]
    pub fn with_checkout(self, response: PaymentRequestResponse) -> Self {
        self.lock().checkout = Some(response);
        self
    }

    /// Settlement answers consumed one per check, in order
    #[must_use]
    pub fn with_settlements<I, S>(self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock()
            .settlements
            .extend(statuses.into_iter().map(|s| Settlement::Status(s.into())));
        self
    }

    /// Answer once the script is exhausted
    #[must_use]
    pub fn with_settlement_default(self, status: impl Into<String>) -> Self {
        self.lock().settlement_default = status.into();
        self
    }

    /// Report `PAID` from the n-th check on
    #[must_use]
    pub fn with_settle_after(self, checks: u32) -> Self {
        self.lock().settle_after = Some(checks);
        self
    }

    #[must_use]
    pub fn with_subscription_result(self, result: bool) -> Self {
        self.lock().subscription_result = result;
        self
    }

    /// Upgrade answers consumed one per call; `true` once exhausted
    #[must_use]
    pub fn with_upgrade_results(self, results: impl IntoIterator<Item = bool>) -> Self {
        self.lock().upgrade_results.extend(results);
        self
    }

    /// Queue a transport failure for the next settlement check
    pub fn push_check_error(&self) {
        self.lock().settlements.push_back(Settlement::TransportError);
    }

    /// Fail the next cancel-history call with a transport error
    pub fn push_cancel_error(&self) {
        self.lock().cancel_errors += 1;
    }

    /// Queue a settlement answer
    pub fn push_settlement(&self, status: impl Into<String>) {
        self.lock().settlements.push_back(Settlement::Status(status.into()));
    }

    /// All recorded calls in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, call: MockCall) -> usize {
        self.lock().calls.iter().filter(|c| **c == call).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    /// Order codes passed to settlement checks
    pub fn checked_orders(&self) -> Vec<i64> {
        self.lock().checked_orders.clone()
    }

    /// Distinct subscriptions materialized
    pub fn subscriptions_created(&self) -> u32 {
        self.lock().subscriptions_created
    }

    pub fn upgrades(&self) -> Vec<UpgradeTierRequest> {
        self.lock().upgrades.clone()
    }

    pub fn is_accepted(&self, transaction_id: &str) -> bool {
        self.lock().history.get(transaction_id) == Some(&HistoryState::Accepted)
    }

    pub fn is_cancelled(&self, transaction_id: &str) -> bool {
        self.lock().history.get(transaction_id) == Some(&HistoryState::Cancelled)
    }

    fn subscribe(&self, call: MockCall, request: &SubscriptionRequest) -> bool {
        let mut state = self.lock();
        state.calls.push(call);
        if !state.subscription_result {
            return false;
        }
        if state.subscriptions.insert(request.transaction_id.clone()) {
            state.subscriptions_created += 1;
        }
        true
    }
}

#[async_trait]
impl PlatformApi for MockPlatformApi {
    async fn fetch_user_profile(&self, _user_id: &str, _role: Role) -> Result<Option<UserProfile>> {
        let mut state = self.lock();
        state.calls.push(MockCall::FetchProfile);
        Ok(state.profile.clone())
    }

    async fn create_payment_request(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<Option<PaymentRequestResponse>> {
        let mut state = self.lock();
        state.calls.push(MockCall::CreatePaymentRequest);
        if let Some(response) = state.checkout.clone() {
            return Ok(Some(response));
        }
        let order_code = state.next_order_code;
        state.next_order_code += 1;
        Ok(Some(PaymentRequestResponse {
            checkout_url: Some(format!(
                "https://pay.example/checkout/{}",
                request.transaction_id
            )),
            order_code: Some(order_code),
        }))
    }

    async fn check_payment(&self, order_code: i64) -> Result<PaymentCheck> {
        let mut state = self.lock();
        state.calls.push(MockCall::CheckPayment);
        state.checked_orders.push(order_code);

        if let Some(scripted) = state.settlements.pop_front() {
            return match scripted {
                Settlement::Status(status) => Ok(PaymentCheck::with_status(status)),
                Settlement::TransportError => {
                    Err(PaymentError::Transport("connection reset".into()))
                }
            };
        }

        let checks = u32::try_from(state.checked_orders.len()).unwrap_or(u32::MAX);
        if state.settle_after.is_some_and(|n| checks >= n) {
            return Ok(PaymentCheck::with_status("PAID"));
        }
        Ok(PaymentCheck::with_status(state.settlement_default.clone()))
    }

    async fn accept_history(&self, transaction_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::AcceptHistory);
        state.history.insert(transaction_id.to_string(), HistoryState::Accepted);
        Ok(())
    }

    async fn cancel_history(&self, transaction_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::CancelHistory);
        if state.cancel_errors > 0 {
            state.cancel_errors -= 1;
            return Err(PaymentError::Transport("history service unavailable".into()));
        }
        state.history.insert(transaction_id.to_string(), HistoryState::Cancelled);
        Ok(())
    }

    async fn create_student_subscription(&self, request: &SubscriptionRequest) -> Result<bool> {
        Ok(self.subscribe(MockCall::CreateStudentSubscription, request))
    }

    async fn create_teacher_subscription(&self, request: &SubscriptionRequest) -> Result<bool> {
        Ok(self.subscribe(MockCall::CreateTeacherSubscription, request))
    }

    async fn upgrade_tier(&self, request: &UpgradeTierRequest) -> Result<bool> {
        let mut state = self.lock();
        state.calls.push(MockCall::UpgradeTier);
        let result = state.upgrade_results.pop_front().unwrap_or(true);
        if result {
            state.upgrades.push(request.clone());
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "MockPlatform"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_scripted_settlements() {
        let api = MockPlatformApi::new().with_settlements(["PENDING", "PAID"]);
        api.push_check_error();

        assert_eq!(api.check_payment(7).await.unwrap().status.as_deref(), Some("PENDING"));
        assert_eq!(api.check_payment(7).await.unwrap().status.as_deref(), Some("PAID"));
        assert!(api.check_payment(7).await.is_err());
        assert_eq!(api.check_payment(7).await.unwrap().status.as_deref(), Some("PENDING"));
        assert_eq!(api.checked_orders(), vec![7, 7, 7, 7]);
    }

    #[tokio::test]
    async fn test_mock_dedupes_subscriptions() {
        let api = MockPlatformApi::new();
        let request = SubscriptionRequest {
            user_id: "u".into(),
            tier_id: "2".into(),
            transaction_id: "tx".into(),
            days: 30,
        };
        assert!(api.create_subscription(Role::Student, &request).await.unwrap());
        assert!(api.create_subscription(Role::Student, &request).await.unwrap());
        assert_eq!(api.subscriptions_created(), 1);
        assert_eq!(api.call_count(MockCall::CreateStudentSubscription), 2);
    }
}
