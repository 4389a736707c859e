//! Platform API
//!
//! Every remote operation the payment flow consumes, behind one trait so the
//! controller can run against the HTTP backend or the in-memory mock.

mod mock;

pub use mock::{MockCall, MockPlatformApi};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    CreatePaymentRequest, PaymentCheck, PaymentRequestResponse, Role, SubscriptionRequest,
    UpgradeTierRequest, UserProfile,
};

/// Platform client trait (Strategy pattern)
///
/// `bool` results carry the platform's truthy/falsy confirmation; an `Err`
/// is a transport or protocol failure.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Look up the buyer profile. `Ok(None)` when the user does not exist.
    async fn fetch_user_profile(&self, user_id: &str, role: Role) -> Result<Option<UserProfile>>;

    /// Ask the gateway for a checkout session
    async fn create_payment_request(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<Option<PaymentRequestResponse>>;

    /// Query settlement state of an order
    async fn check_payment(&self, order_code: i64) -> Result<PaymentCheck>;

    /// Mark the local transaction history entry as accepted
    async fn accept_history(&self, transaction_id: &str) -> Result<()>;

    /// Mark the local transaction history entry as cancelled
    async fn cancel_history(&self, transaction_id: &str) -> Result<()>;

    async fn create_student_subscription(&self, request: &SubscriptionRequest) -> Result<bool>;

    async fn create_teacher_subscription(&self, request: &SubscriptionRequest) -> Result<bool>;

    /// Dispatch to the subscription endpoint matching the payer role
    async fn create_subscription(&self, role: Role, request: &SubscriptionRequest) -> Result<bool> {
        match role {
            Role::Student => self.create_student_subscription(request).await,
            Role::Teacher => self.create_teacher_subscription(request).await,
        }
    }

    async fn upgrade_tier(&self, request: &UpgradeTierRequest) -> Result<bool>;

    /// Backend name for logs
    fn name(&self) -> &str;
}
