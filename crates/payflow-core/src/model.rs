//! Payment Flow Data Model
//!
//! Records exchanged between the controller, the pending-payment store and
//! the platform API.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PaymentError, Result};

/// Tier granted when the staged record does not name one
pub const DEFAULT_TIER_ID: &str = "2";

/// Subscription length when the staged record does not name one
pub const DEFAULT_DAYS: u32 = 30;

/// Platform role id that identifies a teacher account
pub const TEACHER_ROLE_ID: &str = "3";

/// Payment intent staged by the checkout-initiation flow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayment {
    /// Local transaction record to reconcile against the gateway
    #[serde(default)]
    pub transaction_id: String,

    /// Requested amount in whole currency units
    #[serde(default, deserialize_with = "amount_from_any")]
    pub amount: i64,

    /// Paying user
    #[serde(default)]
    pub user_id: String,

    /// Target subscription tier
    #[serde(default = "default_tier_id", deserialize_with = "tier_id_from_any")]
    pub tier_id: String,

    /// Subscription length in days
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_tier_id() -> String {
    DEFAULT_TIER_ID.into()
}

const fn default_days() -> u32 {
    DEFAULT_DAYS
}

/// Accepts `"2"`, `2` or `null` for the tier id.
fn tier_id_from_any<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => default_tier_id(),
    })
}

/// Accepts `50000` or `50000.0`; fractional amounts are rejected.
fn amount_from_any<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Number::deserialize(deserializer)?;
    if let Some(amount) = value.as_i64() {
        return Ok(amount);
    }
    match value.as_f64() {
        #[allow(clippy::cast_possible_truncation)]
        Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(f as i64),
        _ => Err(serde::de::Error::custom(format!(
            "amount must be a whole number, got {value}"
        ))),
    }
}

impl PendingPayment {
    pub fn new(
        transaction_id: impl Into<String>,
        amount: i64,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            amount,
            user_id: user_id.into(),
            tier_id: default_tier_id(),
            days: DEFAULT_DAYS,
        }
    }

    #[must_use]
    pub fn with_tier(mut self, tier_id: impl Into<String>) -> Self {
        self.tier_id = tier_id.into();
        self
    }

    #[must_use]
    pub const fn with_days(mut self, days: u32) -> Self {
        self.days = days;
        self
    }

    /// Parse and validate a stored record
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut payment: Self = serde_json::from_str(raw)
            .map_err(|e| PaymentError::MalformedRecord(e.to_string()))?;
        if payment.days == 0 {
            payment.days = DEFAULT_DAYS;
        }
        payment.validate()?;
        Ok(payment)
    }

    /// A record is usable only when every field needed downstream is present
    pub fn validate(&self) -> Result<()> {
        if self.transaction_id.trim().is_empty() {
            return Err(PaymentError::MalformedRecord("transactionId is empty".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(PaymentError::MalformedRecord("userId is empty".into()));
        }
        if self.amount <= 0 {
            return Err(PaymentError::MalformedRecord(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.days == 0 {
            return Err(PaymentError::MalformedRecord("days must be positive".into()));
        }
        Ok(())
    }
}

/// Payer role on the platform
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Teacher,
}

impl Role {
    /// Map a platform role id onto a payer role
    pub fn from_role_id(role_id: &str) -> Self {
        if role_id.trim() == TEACHER_ROLE_ID {
            Self::Teacher
        } else {
            Self::Student
        }
    }

    pub const fn is_teacher(self) -> bool {
        matches!(self, Self::Teacher)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checkout session created at the gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    /// Hosted payment page
    pub checkout_url: String,

    /// Gateway order used for settlement checks
    pub order_code: i64,
}

/// Raw gateway answer to a payment request. Either field may be missing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequestResponse {
    #[serde(default)]
    pub checkout_url: Option<String>,
    #[serde(default)]
    pub order_code: Option<i64>,
}

impl PaymentRequestResponse {
    /// A session exists only when both the URL and the order code are usable
    pub fn into_session(self) -> Option<CheckoutSession> {
        match (self.checkout_url, self.order_code) {
            (Some(checkout_url), Some(order_code))
                if !checkout_url.trim().is_empty() && order_code != 0 =>
            {
                Some(CheckoutSession { checkout_url, order_code })
            }
            _ => None,
        }
    }
}

/// Body of a checkout session request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub transaction_id: String,
    pub amount: i64,
    pub buyer_name: String,
}

/// Buyer profile as returned by the platform
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Settlement check answer
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCheck {
    #[serde(default)]
    pub status: Option<String>,
}

impl PaymentCheck {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self { status: Some(status.into()) }
    }

    pub fn settlement(&self) -> SettlementStatus {
        self.status.as_deref().map_or(SettlementStatus::Pending, SettlementStatus::parse)
    }
}

/// Settlement state reported by the gateway
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementStatus {
    Pending,
    Paid,
    Cancelled,
}

impl SettlementStatus {
    /// Unknown values are not terminal and count as pending
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "PAID" => Self::Paid,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Subscription creation body, shared by the student and teacher endpoints
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub user_id: String,
    pub tier_id: String,
    pub transaction_id: String,
    pub days: u32,
}

impl From<&PendingPayment> for SubscriptionRequest {
    fn from(payment: &PendingPayment) -> Self {
        Self {
            user_id: payment.user_id.clone(),
            tier_id: payment.tier_id.clone(),
            transaction_id: payment.transaction_id.clone(),
            days: payment.days,
        }
    }
}

/// Tier upgrade body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeTierRequest {
    pub user_id: String,
    pub order_code: i64,
    pub is_teacher: bool,
    pub tier_id: String,
}

/// Externally observable controller state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

impl ControllerStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Terminal states are absorbing
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(self, Self::Pending) && next.is_terminal()
    }
}

/// Why a run ended in `failed`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MissingRecord,
    MalformedRecord,
    ProfileUnavailable,
    SessionUnavailable,
    CancelledByPayer,
    PollingExhausted,
}

impl FailureReason {
    /// Classify a start-up or session error
    pub fn from_error(err: &PaymentError) -> Self {
        match err {
            PaymentError::MissingRecord => Self::MissingRecord,
            PaymentError::MalformedRecord(_) | PaymentError::Json(_) | PaymentError::Storage(_) => {
                Self::MalformedRecord
            }
            PaymentError::ProfileUnavailable(_) => Self::ProfileUnavailable,
            _ => Self::SessionUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_payment_defaults() {
        let payment =
            PendingPayment::from_json(r#"{"transactionId":"tx-1","amount":50000,"userId":"u-1"}"#)
                .unwrap();
        assert_eq!(payment.tier_id, "2");
        assert_eq!(payment.days, 30);
    }

    #[test]
    fn test_pending_payment_whole_float_amount() {
        let payment = PendingPayment::from_json(
            r#"{"transactionId":"tx-1","amount":50000.0,"userId":"u-1"}"#,
        )
        .unwrap();
        assert_eq!(payment.amount, 50_000);

        let err = PendingPayment::from_json(
            r#"{"transactionId":"tx-1","amount":500.5,"userId":"u-1"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PaymentError::MalformedRecord(_)));
    }

    #[test]
    fn test_pending_payment_numeric_tier() {
        let payment = PendingPayment::from_json(
            r#"{"transactionId":"tx-1","amount":99000,"userId":"u-1","tierId":3,"days":0}"#,
        )
        .unwrap();
        assert_eq!(payment.tier_id, "3");
        assert_eq!(payment.days, 30);
    }

    #[test]
    fn test_pending_payment_incomplete() {
        let missing_amount = PendingPayment::from_json(r#"{"transactionId":"tx-1","userId":"u-1"}"#);
        assert!(matches!(missing_amount, Err(PaymentError::MalformedRecord(_))));

        let garbage = PendingPayment::from_json("{not json");
        assert!(matches!(garbage, Err(PaymentError::MalformedRecord(_))));
    }

    #[test]
    fn test_settlement_parsing() {
        assert_eq!(SettlementStatus::parse("paid"), SettlementStatus::Paid);
        assert_eq!(SettlementStatus::parse(" CANCELLED "), SettlementStatus::Cancelled);
        assert_eq!(SettlementStatus::parse("PROCESSING"), SettlementStatus::Pending);
        assert_eq!(PaymentCheck::default().settlement(), SettlementStatus::Pending);
    }

    #[test]
    fn test_session_requires_both_fields() {
        let partial = PaymentRequestResponse {
            checkout_url: Some("https://pay/x".into()),
            order_code: None,
        };
        assert!(partial.into_session().is_none());

        let full = PaymentRequestResponse {
            checkout_url: Some("https://pay/x".into()),
            order_code: Some(42),
        };
        assert_eq!(full.into_session().map(|s| s.order_code), Some(42));
    }

    #[test]
    fn test_status_is_absorbing() {
        use ControllerStatus::{Failed, Pending, Succeeded};
        assert!(Pending.can_transition_to(Succeeded));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Pending));
        for terminal in [Succeeded, Failed] {
            for next in [Pending, Succeeded, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_role_from_id() {
        assert_eq!(Role::from_role_id("3"), Role::Teacher);
        assert_eq!(Role::from_role_id("2"), Role::Student);
        assert_eq!(Role::from_role_id(""), Role::Student);
    }
}
