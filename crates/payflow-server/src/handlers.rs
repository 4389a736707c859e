//! HTTP Handlers

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use payflow_core::{
    ControllerStatus, PaymentAction, PaymentSnapshot, PaymentView, PendingPayment, Role, RunId,
    StartOptions,
};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub platform: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: code.into(),
        }),
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    /// Platform role id of the payer (`"3"` = teacher)
    #[serde(default)]
    pub role_id: Option<String>,

    /// Order code from the gateway's return redirect
    #[serde(default)]
    pub order_code: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    pub view: PaymentView,
    pub actions: Vec<PaymentAction>,
    pub run_id: RunId,
    pub transaction_id: Option<String>,
    pub poll_attempts: u32,
}

impl From<&PaymentSnapshot> for StatusResponse {
    fn from(snapshot: &PaymentSnapshot) -> Self {
        let view = PaymentView::from(snapshot);
        Self {
            actions: view.actions(),
            view,
            run_id: snapshot.run_id,
            transaction_id: snapshot.transaction_id.clone(),
            poll_attempts: snapshot.poll_attempts,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        platform: state.platform.clone(),
    })
}

/// Stage a pending payment (checkout initiation)
pub async fn stage_pending(
    State(state): State<AppState>,
    Json(payment): Json<PendingPayment>,
) -> Result<StatusCode, ApiError> {
    payment
        .validate()
        .map_err(|e| error(StatusCode::BAD_REQUEST, "INVALID_PAYMENT", e.to_string()))?;

    state.store.save(&payment).map_err(|e| {
        tracing::error!("Staging payment failed: {}", e);
        error(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.user_message())
    })?;

    tracing::info!(transaction_id = %payment.transaction_id, "Staged pending payment");
    Ok(StatusCode::NO_CONTENT)
}

/// Start a confirmation run, replacing any current one
pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmRequest>,
) -> Json<StatusResponse> {
    let role = payload
        .role_id
        .as_deref()
        .map_or(Role::Student, Role::from_role_id);

    let handle = state.controller.start(StartOptions {
        role,
        order_code: payload.order_code,
    });
    let response = StatusResponse::from(&handle.snapshot());

    let mut session = state.current.lock().await;
    session.role = role;
    if session.run.replace(handle).is_some() {
        tracing::debug!("Replaced previous payment run");
    }

    Json(response)
}

/// Current user-visible view
pub async fn payment_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let session = state.current.lock().await;
    let run = session
        .run
        .as_ref()
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "NO_PAYMENT_RUN", "No payment in progress"))?;

    Ok(Json(StatusResponse::from(&run.snapshot())))
}

/// Re-issue checkout after a failed or abandoned run, keeping the payer's role
pub async fn retry_payment(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let mut session = state.current.lock().await;

    if session
        .run
        .as_ref()
        .is_some_and(|run| run.status() != ControllerStatus::Failed)
    {
        return Err(error(
            StatusCode::CONFLICT,
            "RUN_NOT_FAILED",
            "Only a failed payment can be retried",
        ));
    }

    let role = session.role;
    let handle = state.controller.start(StartOptions {
        role,
        order_code: None,
    });
    let response = StatusResponse::from(&handle.snapshot());
    session.run = Some(handle);

    tracing::info!(run_id = %response.run_id, %role, "Retrying payment");
    Ok(Json(response))
}

/// "Back": tear down the current run
pub async fn abandon_payment(State(state): State<AppState>) -> StatusCode {
    if let Some(mut run) = state.current.lock().await.run.take() {
        run.shutdown();
        tracing::info!("Payment run abandoned");
    }
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Method, Request},
        Router,
    };
    use payflow_core::{
        ControllerConfig, MemoryPendingPaymentStore, MockCall, MockPlatformApi, PaymentController,
        PollerConfig,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    fn app(api: MockPlatformApi) -> Router {
        app_with(Arc::new(api))
    }

    fn app_with(api: Arc<MockPlatformApi>) -> Router {
        let store = Arc::new(MemoryPendingPaymentStore::new());
        let config = ControllerConfig {
            poller: PollerConfig {
                interval: Duration::from_millis(5),
                ..Default::default()
            },
            redirect_delay: Duration::from_millis(5),
            ..Default::default()
        };
        let controller = PaymentController::new(api, store.clone(), config);
        crate::router(AppState::new(controller, store, "MockPlatform"))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_status_without_run() {
        let app = app(MockPlatformApi::new());
        let (status, body) = send(&app, Method::GET, "/api/payments/status", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NO_PAYMENT_RUN");
    }

    #[tokio::test]
    async fn test_confirm_without_staged_payment_fails() {
        let app = app(MockPlatformApi::new());
        let (status, body) =
            send(&app, Method::POST, "/api/payments/confirm", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"], "failure");
        assert_eq!(body["actions"], json!(["retry", "back"]));
    }

    #[tokio::test]
    async fn test_rejects_incomplete_payment() {
        let app = app(MockPlatformApi::new());
        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/payments/pending",
            Some(json!({ "transactionId": "tx-1", "amount": 0, "userId": "u-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_PAYMENT");
    }

    #[tokio::test]
    async fn test_full_flow_reaches_success() {
        let app = app(MockPlatformApi::new().with_settle_after(2));

        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/payments/pending",
            Some(json!({ "transactionId": "tx-1", "amount": 50000, "userId": "u-1", "tierId": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(
            &app,
            Method::POST,
            "/api/payments/confirm",
            Some(json!({ "roleId": "3" })),
        )
        .await;
        assert_eq!(body["view"], "in_progress");

        let (status, _) = send(&app, Method::POST, "/api/payments/retry", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let mut last = Value::Null;
        for _ in 0..200 {
            let (_, body) = send(&app, Method::GET, "/api/payments/status", None).await;
            if body["redirectTo"] == "/" {
                last = body;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(last["view"], "success");
        assert_eq!(last["transactionId"], "tx-1");

        let (status, _) = send(&app, Method::DELETE, "/api/payments/current", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, "/api/payments/status", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    async fn wait_for_view(app: &Router, view: &str) -> Value {
        for _ in 0..200 {
            let (_, body) = send(app, Method::GET, "/api/payments/status", None).await;
            if body["view"] == view {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("payment never reached {view}");
    }

    #[tokio::test]
    async fn test_retry_after_back_keeps_teacher_role() {
        let api = Arc::new(
            MockPlatformApi::new()
                .with_settlements(["CANCELLED"])
                .with_settle_after(2),
        );
        let app = app_with(api.clone());

        send(
            &app,
            Method::PUT,
            "/api/payments/pending",
            Some(json!({ "transactionId": "tx-7", "amount": 50000, "userId": "t-1" })),
        )
        .await;
        send(&app, Method::POST, "/api/payments/confirm", Some(json!({ "roleId": "3" }))).await;
        wait_for_view(&app, "failure").await;

        let (status, _) = send(&app, Method::DELETE, "/api/payments/current", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::POST, "/api/payments/retry", None).await;
        assert_eq!(status, StatusCode::OK);
        wait_for_view(&app, "success").await;

        assert_eq!(api.call_count(MockCall::CreateTeacherSubscription), 1);
        assert_eq!(api.call_count(MockCall::CreateStudentSubscription), 0);
        let upgrades = api.upgrades();
        assert_eq!(upgrades.len(), 1);
        assert!(upgrades[0].is_teacher);
    }
}
