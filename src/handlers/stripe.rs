use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::payments::CreateCheckoutInput;
use crate::stripe::webhook::{WebhookError, SIGNATURE_HEADER};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use utoipa::ToSchema;

/// Webhook intake for Stripe payment-status events.
///
/// Anything that would make Stripe redeliver forever (disabled secret,
/// unknown event type, unmatched record, unparseable-but-authentic body) is
/// acknowledged with 200; only an untrustworthy request is rejected.
#[utoipa::path(
    post,
    path = "/stripe/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event accepted (including no-op and ignored cases)"),
        (status = 400, description = "Missing signature header", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Stripe"
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let sig_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    let event = match state.stripe_webhooks.verify_event(&body, sig_header) {
        Ok(event) => event,
        Err(WebhookError::NotConfigured) => {
            warn!("stripe_webhook_secret not configured; ignoring webhook");
            return (StatusCode::OK, "ignored").into_response();
        }
        Err(err @ WebhookError::MissingSignature) => {
            return ServiceError::BadRequest(err.to_string()).into_response();
        }
        Err(err @ WebhookError::InvalidSignature) => {
            warn!("Invalid Stripe signature");
            return ServiceError::Unauthorized(err.to_string()).into_response();
        }
        Err(WebhookError::MalformedPayload(reason)) => {
            // Authentic but unusable; acknowledge so the gateway stops retrying.
            warn!("Dropping malformed Stripe payload: {}", reason);
            return (StatusCode::OK, "ok").into_response();
        }
    };

    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "Received Stripe event"
    );

    match state.stripe_webhooks.process_event(&event).await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "amount": "29.99",
    "currency": "USD",
    "successUrl": "https://shop.example.com/payments/success",
    "cancelUrl": "https://shop.example.com/payments/cancel",
    "description": "Annual subscription"
}))]
pub struct CreateCheckoutSessionRequest {
    /// Amount in major units, 2 decimal places
    pub amount: Decimal,
    /// ISO 4217 currency code
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub description: Option<String>,
    /// Accepted for contract parity with the record-creating path; the
    /// hosted page decides the actual instrument.
    pub method: Option<crate::entities::company_payment::PaymentMethod>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutSessionResponse {
    pub session_id: String,
    pub checkout_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
}

/// Creates a hosted checkout session for an external caller.
/// Does NOT persist a payment record; only the Stripe session is created.
#[utoipa::path(
    post,
    path = "/stripe/checkout-session",
    request_body = CreateCheckoutSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CreateCheckoutSessionResponse),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Stripe"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Json(request): Json<CreateCheckoutSessionRequest>,
) -> Result<Json<CreateCheckoutSessionResponse>, ServiceError> {
    let session = state
        .payments
        .create_checkout(CreateCheckoutInput {
            amount: request.amount,
            currency: request.currency,
            success_url: request.success_url,
            cancel_url: request.cancel_url,
            description: request.description,
            metadata: request.metadata,
        })
        .await?;

    Ok(Json(CreateCheckoutSessionResponse {
        session_id: session.id,
        checkout_url: session.url,
        payment_intent_id: session.payment_intent_id,
    }))
}

/// Stripe routes: webhook intake and hosted-session creation
pub fn stripe_routes() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(stripe_webhook))
        .route("/checkout-session", post(create_checkout_session))
}
