//! # payflow-core
//!
//! Payment confirmation for the minigame platform's subscription tiers.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Pending    │──▶│   Checkout   │──▶│  Settlement  │──▶│    Commit    │
//! │   payment    │   │   session    │   │    poller    │   │   sequence   │
//! │   (store)    │   │  (gateway)   │   │ (every 4 s)  │   │ (3 mutations)│
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//!                                                                  │
//!                                       pending ─▶ succeeded ◀─────┘
//!                                               └▶ failed
//! ```
//!
//! The controller talks to the platform only through [`PlatformApi`] and to
//! the staged record only through [`PendingPaymentStore`], so both can be
//! swapped for in-memory versions in tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use payflow_core::{
//!     ControllerConfig, MemoryPendingPaymentStore, MockPlatformApi, PaymentController,
//!     PendingPayment, StartOptions,
//! };
//!
//! let store = Arc::new(MemoryPendingPaymentStore::with_payment(
//!     &PendingPayment::new("tx-1", 50_000, "user-1"),
//! )?);
//! let controller = PaymentController::new(
//!     Arc::new(MockPlatformApi::new().with_settle_after(2)),
//!     store,
//!     ControllerConfig::default(),
//! );
//!
//! let mut handle = controller.start(StartOptions::default());
//! let status = handle.wait_for_terminal().await;
//! ```

pub mod api;
pub mod commit;
pub mod controller;
pub mod error;
pub mod model;
pub mod poller;
pub mod projection;
pub mod session;
pub mod store;

pub use api::{MockCall, MockPlatformApi, PlatformApi};
pub use commit::{CommitOutcome, CommitPolicy, CommitSequence, CommitStep};
pub use controller::{
    ControllerConfig, ControllerHandle, PaymentController, PaymentSnapshot, RunId, StartOptions,
};
pub use error::{PaymentError, Result};
pub use model::{
    CheckoutSession, ControllerStatus, CreatePaymentRequest, FailureReason, PaymentCheck,
    PaymentRequestResponse, PendingPayment, Role, SettlementStatus, SubscriptionRequest,
    UpgradeTierRequest, UserProfile,
};
pub use poller::{PollerConfig, SettlementPoller};
pub use projection::{PaymentAction, PaymentView};
pub use session::initiate_session;
pub use store::{FilePendingPaymentStore, MemoryPendingPaymentStore, PendingPaymentStore};
