//! # payflow-runtime
//!
//! Runtime backends for the payflow controller.
//!
//! ## Backends
//!
//! - **HTTP** (default): the platform's REST API via `reqwest`
//! - **Mock**: [`payflow_core::MockPlatformApi`], in-memory, for development
//!
//! ## Usage
//!
//! ```rust,ignore
//! use payflow_runtime::HttpPlatformApi;
//!
//! let api = Arc::new(HttpPlatformApi::from_env()?);
//! let controller = PaymentController::new(api, store, ControllerConfig::from_env()?);
//! ```

pub mod http;

pub use http::{ApiConfig, HttpPlatformApi, is_truthy};

// Re-export core types for convenience
pub use payflow_core::{
    ControllerConfig, ControllerHandle, PaymentController, PaymentError, PlatformApi, Result,
};
