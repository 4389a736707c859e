//! Payment Session Initiation
//!
//! Turns a staged [`PendingPayment`] plus the buyer profile into a checkout
//! session at the gateway. Not retried: a failure here ends the run.

use crate::api::PlatformApi;
use crate::error::{PaymentError, Result};
use crate::model::{CheckoutSession, CreatePaymentRequest, PendingPayment, Role};

/// Create a checkout session for the staged payment
pub async fn initiate_session(
    api: &dyn PlatformApi,
    payment: &PendingPayment,
    role: Role,
) -> Result<CheckoutSession> {
    let profile = api
        .fetch_user_profile(&payment.user_id, role)
        .await
        .map_err(|e| {
            tracing::warn!(user_id = %payment.user_id, error = %e, "Profile lookup failed");
            PaymentError::ProfileUnavailable(payment.user_id.clone())
        })?
        .ok_or_else(|| PaymentError::ProfileUnavailable(payment.user_id.clone()))?;

    let request = CreatePaymentRequest {
        transaction_id: payment.transaction_id.clone(),
        amount: payment.amount,
        buyer_name: profile.full_name,
    };

    let session = api
        .create_payment_request(&request)
        .await
        .map_err(|e| PaymentError::SessionUnavailable(e.to_string()))?
        .and_then(|response| response.into_session())
        .ok_or_else(|| {
            PaymentError::SessionUnavailable("gateway returned no checkout url or order code".into())
        })?;

    tracing::info!(
        transaction_id = %payment.transaction_id,
        order_code = session.order_code,
        backend = api.name(),
        "Created checkout session"
    );

    Ok(session)
}
