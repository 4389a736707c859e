//! Application State

use std::sync::Arc;

use tokio::sync::Mutex;

use payflow_core::{ControllerHandle, PaymentController, PendingPaymentStore, Role};

/// The payer's confirmation run and the role it was started for.
///
/// The role outlives the run: "Back" tears the run down, and a later retry
/// must still commit against the same role.
#[derive(Default)]
pub struct PayerSession {
    pub run: Option<ControllerHandle>,
    pub role: Role,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Controller wired to the platform backend and the store
    pub controller: Arc<PaymentController>,

    /// Where the checkout-initiation flow stages payments
    pub store: Arc<dyn PendingPaymentStore>,

    /// At most one run at a time; replacing it tears the old one down
    pub current: Arc<Mutex<PayerSession>>,

    /// Backend name, for health reporting
    pub platform: String,
}

impl AppState {
    pub fn new(
        controller: PaymentController,
        store: Arc<dyn PendingPaymentStore>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            controller: Arc::new(controller),
            store,
            current: Arc::new(Mutex::new(PayerSession::default())),
            platform: platform.into(),
        }
    }
}
