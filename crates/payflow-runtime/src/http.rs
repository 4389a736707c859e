//! HTTP Platform Backend
//!
//! Implementation of `PlatformApi` against the platform's REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use payflow_core::{
    error::{PaymentError, Result},
    model::{
        CreatePaymentRequest, PaymentCheck, PaymentRequestResponse, Role, SubscriptionRequest,
        UpgradeTierRequest, UserProfile,
    },
    PlatformApi,
};

/// Longest error body carried into a `PaymentError::Api`
const MAX_ERROR_BODY: usize = 256;

mod routes {
    use payflow_core::model::Role;

    pub const CREATE_PAYMENT: &str = "/api/Payment/create-payment-request";
    pub const STUDENT_SUBSCRIPTION: &str = "/api/StudentSubscription";
    pub const TEACHER_SUBSCRIPTION: &str = "/api/TeacherSubscription";
    pub const UPGRADE_TIER: &str = "/api/Account/upgrade-tier";

    pub fn profile(user_id: &str, role: Role) -> String {
        match role {
            Role::Student => format!("/api/Student/{user_id}"),
            Role::Teacher => format!("/api/Teacher/{user_id}"),
        }
    }

    pub fn check_payment(order_code: i64) -> String {
        format!("/api/Payment/check-payment/{order_code}")
    }

    pub fn accept_history(transaction_id: &str) -> String {
        format!("/api/History/accept/{transaction_id}")
    }

    pub fn cancel_history(transaction_id: &str) -> String {
        format!("/api/History/cancel/{transaction_id}")
    }
}

/// Platform API configuration
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://api.example.com`
    pub base_url: String,

    /// Bearer token sent with every request
    pub token: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".into(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    /// Create from environment variables. `PLATFORM_API_URL` is required.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("PLATFORM_API_URL")
            .map_err(|_| PaymentError::Config("PLATFORM_API_URL not set".into()))?;
        let token = std::env::var("PLATFORM_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        let timeout_secs = std::env::var("PLATFORM_API_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            base_url,
            token,
            timeout_secs,
        })
    }
}

/// Platform's JSON truthiness: `null`, `false`, `0`, `""` are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Cut `text` to at most `max` bytes without splitting a character
fn clip(text: &str, max: usize) -> String {
    let mut end = text.len().min(max);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Parse a response body; empty is `null`, non-JSON text is a string
fn parse_body(body: &str) -> Value {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value).map(Some).map_err(PaymentError::from)
}

fn transport(err: &reqwest::Error) -> PaymentError {
    PaymentError::Transport(err.to_string())
}

/// REST platform client
pub struct HttpPlatformApi {
    client: Client,
    config: ApiConfig,
}

impl HttpPlatformApi {
    /// Create from configuration
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaymentError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ApiConfig::from_env()?)
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and read the body without judging the status
    async fn execute(&self, builder: RequestBuilder) -> Result<(StatusCode, Value)> {
        let response = builder.send().await.map_err(|e| transport(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| transport(&e))?;
        Ok((status, parse_body(&body)))
    }

    /// Send and require a 2xx answer
    async fn call(&self, builder: RequestBuilder) -> Result<Value> {
        let (status, body) = self.execute(builder).await?;
        if !status.is_success() {
            let message = match &body {
                Value::String(s) => clip(s, MAX_ERROR_BODY),
                other => clip(&other.to_string(), MAX_ERROR_BODY),
            };
            tracing::debug!(status = status.as_u16(), body = %message, "Platform API error");
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl PlatformApi for HttpPlatformApi {
    async fn fetch_user_profile(&self, user_id: &str, role: Role) -> Result<Option<UserProfile>> {
        let builder = self.request(Method::GET, &routes::profile(user_id, role));
        let (status, body) = self.execute(builder).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message: format!("profile lookup for {user_id}"),
            });
        }
        decode(body)
    }

    async fn create_payment_request(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<Option<PaymentRequestResponse>> {
        let body = self
            .call(self.request(Method::POST, routes::CREATE_PAYMENT).json(request))
            .await?;
        decode(body)
    }

    async fn check_payment(&self, order_code: i64) -> Result<PaymentCheck> {
        let body = self
            .call(self.request(Method::GET, &routes::check_payment(order_code)))
            .await?;
        Ok(decode(body)?.unwrap_or_default())
    }

    async fn accept_history(&self, transaction_id: &str) -> Result<()> {
        self.call(self.request(Method::PUT, &routes::accept_history(transaction_id)))
            .await
            .map(drop)
    }

    async fn cancel_history(&self, transaction_id: &str) -> Result<()> {
        self.call(self.request(Method::PUT, &routes::cancel_history(transaction_id)))
            .await
            .map(drop)
    }

    async fn create_student_subscription(&self, request: &SubscriptionRequest) -> Result<bool> {
        let body = self
            .call(self.request(Method::POST, routes::STUDENT_SUBSCRIPTION).json(request))
            .await?;
        Ok(is_truthy(&body))
    }

    async fn create_teacher_subscription(&self, request: &SubscriptionRequest) -> Result<bool> {
        let body = self
            .call(self.request(Method::POST, routes::TEACHER_SUBSCRIPTION).json(request))
            .await?;
        Ok(is_truthy(&body))
    }

    async fn upgrade_tier(&self, request: &UpgradeTierRequest) -> Result<bool> {
        let body = self
            .call(self.request(Method::PUT, routes::UPGRADE_TIER).json(request))
            .await?;
        Ok(is_truthy(&body))
    }

    fn name(&self) -> &str {
        "PlatformHttp"
    }
}
