//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment flow errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// No pending payment has been staged
    #[error("No pending payment record")]
    MissingRecord,

    /// Stored pending payment could not be parsed or is incomplete
    #[error("Malformed pending payment: {0}")]
    MalformedRecord(String),

    /// Buyer profile lookup failed or returned nothing
    #[error("Profile unavailable for user {0}")]
    ProfileUnavailable(String),

    /// Gateway did not return a usable checkout session
    #[error("Checkout session unavailable: {0}")]
    SessionUnavailable(String),

    /// Platform API answered with a non-success status
    #[error("Platform API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure talking to the platform
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Storage(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            Self::MissingRecord => "No payment data was found.",
            Self::MalformedRecord(_) => "Payment data could not be read.",
            Self::ProfileUnavailable(_) => "Could not load your account information.",
            Self::SessionUnavailable(_) => "Payment could not be started. Please try again.",
            Self::Config(_) => "Service configuration error.",
            _ => "An error occurred processing your payment.",
        }
    }
}
