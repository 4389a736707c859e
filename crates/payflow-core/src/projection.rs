//! Status Projection
//!
//! Maps a [`PaymentSnapshot`] onto the three mutually exclusive views the
//! payer sees. Failure sub-cases are deliberately collapsed into one view.

use serde::{Deserialize, Serialize};

use crate::controller::PaymentSnapshot;
use crate::model::ControllerStatus;

/// Action the payer can take from a view
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAction {
    /// Open the hosted checkout page
    PayNow,
    /// Start a fresh checkout
    Retry,
    /// Leave the page
    Back,
}

/// User-visible payment view
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum PaymentView {
    InProgress {
        #[serde(rename = "checkoutUrl")]
        checkout_url: Option<String>,
    },
    Success {
        #[serde(rename = "redirectTo")]
        redirect_to: Option<String>,
    },
    Failure,
}

impl PaymentView {
    /// Actions offered in this view
    pub fn actions(&self) -> Vec<PaymentAction> {
        match self {
            Self::InProgress { checkout_url: Some(_) } => {
                vec![PaymentAction::PayNow, PaymentAction::Back]
            }
            Self::InProgress { checkout_url: None } | Self::Success { .. } => Vec::new(),
            Self::Failure => vec![PaymentAction::Retry, PaymentAction::Back],
        }
    }

    pub const fn status(&self) -> ControllerStatus {
        match self {
            Self::InProgress { .. } => ControllerStatus::Pending,
            Self::Success { .. } => ControllerStatus::Succeeded,
            Self::Failure => ControllerStatus::Failed,
        }
    }
}

impl From<&PaymentSnapshot> for PaymentView {
    fn from(snapshot: &PaymentSnapshot) -> Self {
        match snapshot.status {
            ControllerStatus::Pending => Self::InProgress {
                checkout_url: snapshot.checkout_url.clone(),
            },
            ControllerStatus::Succeeded => Self::Success {
                redirect_to: snapshot.redirect_to.clone(),
            },
            ControllerStatus::Failed => Self::Failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::RunId;
    use crate::model::FailureReason;

    fn snapshot(status: ControllerStatus) -> PaymentSnapshot {
        PaymentSnapshot {
            run_id: RunId::new(),
            status,
            transaction_id: Some("tx-1".into()),
            checkout_url: Some("https://pay/x".into()),
            order_code: Some(42),
            poll_attempts: 2,
            failure: None,
            redirect_to: None,
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_in_progress_offers_checkout() {
        let view = PaymentView::from(&snapshot(ControllerStatus::Pending));
        assert_eq!(view.actions(), vec![PaymentAction::PayNow, PaymentAction::Back]);
        assert_eq!(view.status(), ControllerStatus::Pending);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["view"], "in_progress");
        assert_eq!(json["checkoutUrl"], "https://pay/x");
    }

    #[test]
    fn test_failure_hides_reason() {
        let mut failed = snapshot(ControllerStatus::Failed);
        failed.failure = Some(FailureReason::CancelledByPayer);

        let view = PaymentView::from(&failed);
        assert_eq!(view, PaymentView::Failure);
        assert_eq!(view.actions(), vec![PaymentAction::Retry, PaymentAction::Back]);
        assert_eq!(serde_json::to_value(&view).unwrap(), serde_json::json!({"view": "failure"}));
    }

    #[test]
    fn test_success_carries_redirect() {
        let mut done = snapshot(ControllerStatus::Succeeded);
        assert_eq!(PaymentView::from(&done), PaymentView::Success { redirect_to: None });

        done.redirect_to = Some("/".into());
        let view = PaymentView::from(&done);
        assert_eq!(view, PaymentView::Success { redirect_to: Some("/".into()) });
        assert!(view.actions().is_empty());
    }
}
