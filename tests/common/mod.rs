#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, Response, StatusCode},
    Router,
};
use hmac::{Hmac, Mac};
use sea_orm::EntityTrait;
use serde_json::Value;
use sha2::Sha256;
use tower::ServiceExt;
use uuid::Uuid;

use company_payments_api::{
    app,
    config::AppConfig,
    db,
    entities::{company_payment, CompanyPayment},
    errors::ServiceError,
    message_queue::{Message, MessageQueue, MessageQueueError},
    stripe::{CheckoutGateway, CheckoutSession, CheckoutSessionParams},
    AppState,
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_integration_test";

/// Gateway fake: records every call and returns a scripted session.
pub struct FakeGateway {
    calls: Mutex<Vec<CheckoutSessionParams>>,
    next_session: Mutex<CheckoutSession>,
    fail_next: Mutex<bool>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            next_session: Mutex::new(CheckoutSession {
                id: "cs_test_default".to_string(),
                url: "https://checkout.stripe.com/c/pay/cs_test_default".to_string(),
                payment_intent_id: None,
            }),
            fail_next: Mutex::new(false),
        })
    }

    pub fn set_next_session(&self, id: &str, payment_intent_id: Option<&str>) {
        *self.next_session.lock().unwrap() = CheckoutSession {
            id: id.to_string(),
            url: format!("https://checkout.stripe.com/c/pay/{}", id),
            payment_intent_id: payment_intent_id.map(|s| s.to_string()),
        };
    }

    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<CheckoutSessionParams> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CheckoutGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        params: CheckoutSessionParams,
    ) -> Result<CheckoutSession, ServiceError> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(ServiceError::GatewayError(
                "Stripe error (502): simulated outage".to_string(),
            ));
        }
        self.calls.lock().unwrap().push(params);
        Ok(self.next_session.lock().unwrap().clone())
    }
}

/// Bus fake: captures published notifications.
pub struct RecordingQueue {
    messages: Mutex<Vec<Message>>,
}

impl RecordingQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
        })
    }

    pub fn published(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageQueue for RecordingQueue {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }

    async fn subscribe(&self, _topic: &str) -> Result<Option<Message>, MessageQueueError> {
        Ok(None)
    }
}

/// Helper harness: application state backed by an in-memory SQLite database,
/// a fake gateway and a recording notification bus.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub queue: Arc<RecordingQueue>,
}

impl TestApp {
    /// Construct a test application with webhooks enabled.
    pub async fn new() -> Self {
        Self::new_with(|_| {}).await
    }

    /// Construct a test application with custom configuration tweaks.
    pub async fn new_with(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.stripe_webhook_secret = Some(TEST_WEBHOOK_SECRET.to_string());
        cfg.stripe_success_url = Some("https://shop.example.com/payments/success".to_string());
        cfg.stripe_cancel_url = Some("https://shop.example.com/payments/cancel".to_string());
        configure(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::bootstrap_schema(&pool)
            .await
            .expect("failed to bootstrap test schema");

        let gateway = FakeGateway::new();
        let queue = RecordingQueue::new();
        let state = AppState::new(
            Arc::new(pool),
            cfg,
            gateway.clone() as Arc<dyn CheckoutGateway>,
            queue.clone() as Arc<dyn MessageQueue>,
        );
        let router = app(state.clone());

        Self {
            router,
            state,
            gateway,
            queue,
        }
    }

    /// Issue a JSON request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response")
    }

    /// Post a raw webhook body, optionally carrying a signature header.
    pub async fn post_webhook(&self, body: &str, sig_header: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/stripe/webhook")
            .header("content-type", "application/json");
        if let Some(header) = sig_header {
            builder = builder.header("Stripe-Signature", header);
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(body.to_string())).expect("request"))
            .await
            .expect("response")
    }

    /// Post a webhook body signed with the test secret.
    pub async fn post_signed_webhook(&self, body: &str) -> Response<Body> {
        let header = sign_payload(body, TEST_WEBHOOK_SECRET);
        self.post_webhook(body, Some(&header)).await
    }

    pub async fn find_payment(&self, id: Uuid) -> Option<company_payment::Model> {
        CompanyPayment::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("query payment")
    }

    pub async fn all_payments(&self) -> Vec<company_payment::Model> {
        CompanyPayment::find()
            .all(&*self.state.db)
            .await
            .expect("query payments")
    }

    /// Create a payment through the API; the fake gateway hands out the given
    /// session id / payment-intent id. Returns the record id.
    pub async fn create_payment(
        &self,
        session_id: &str,
        payment_intent_id: Option<&str>,
    ) -> Uuid {
        self.gateway.set_next_session(session_id, payment_intent_id);
        let response = self
            .request(
                Method::POST,
                "/payments",
                Some(serde_json::json!({
                    "companyId": Uuid::new_v4(),
                    "amount": "29.99",
                    "currency": "USD",
                    "method": "CREDIT_CARD"
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response_json(response).await;
        body["data"]["id"]
            .as_str()
            .expect("created payment id")
            .parse()
            .expect("uuid")
    }
}

/// Build a `Stripe-Signature` header for a payload, mirroring the gateway's
/// `t=...,v1=...` scheme.
pub fn sign_payload(payload: &str, secret: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

/// Checkout-session webhook body with the given correlation fields.
pub fn checkout_session_event(
    event_type: &str,
    session_id: &str,
    payment_status: &str,
    payment_intent_id: Option<&str>,
) -> String {
    serde_json::json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "data": {
            "object": {
                "id": session_id,
                "object": "checkout.session",
                "payment_status": payment_status,
                "payment_intent": payment_intent_id,
                "client_reference_id": null,
                "metadata": {}
            }
        }
    })
    .to_string()
}
