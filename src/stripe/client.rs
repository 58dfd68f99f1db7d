use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

const CHECKOUT_SESSIONS_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

/// Inputs for a hosted Checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSessionParams {
    /// Amount in major units; converted to minor units at this boundary.
    pub amount: Decimal,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Shown on the hosted page as the line-item name.
    pub description: String,
    /// Correlation id echoed back in webhook events.
    pub client_reference_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Handle for a created hosted Checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
    /// PaymentIntent id if Checkout created one immediately.
    pub payment_intent_id: Option<String>,
}

/// Seam to the hosted-checkout gateway.
///
/// The service owns an explicit client handle instead of a process-global
/// API key, so tests can substitute a fake.
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        params: CheckoutSessionParams,
    ) -> Result<CheckoutSession, ServiceError>;
}

/// Stripe REST client for hosted Checkout sessions.
#[derive(Clone)]
pub struct StripeClient {
    api_key: Option<String>,
    client: reqwest::Client,
}

impl StripeClient {
    /// Builds a client with a bounded request timeout. An absent API key is
    /// allowed at construction time; calls fail with a configuration error
    /// at first use.
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { api_key, client }
    }

    fn api_key(&self) -> Result<&str, ServiceError> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ServiceError::ConfigurationError(
                "stripe_api_key is not configured".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
    payment_intent: Option<serde_json::Value>,
}

#[async_trait]
impl CheckoutGateway for StripeClient {
    #[instrument(skip(self, params), fields(currency = %params.currency))]
    async fn create_checkout_session(
        &self,
        params: CheckoutSessionParams,
    ) -> Result<CheckoutSession, ServiceError> {
        let api_key = self.api_key()?;
        let unit_amount = super::to_minor_units(params.amount)?;
        let currency = params.currency.trim().to_lowercase();

        let mut form: HashMap<String, String> = HashMap::new();
        form.insert("mode".to_string(), "payment".to_string());
        form.insert("success_url".to_string(), params.success_url);
        form.insert("cancel_url".to_string(), params.cancel_url);
        form.insert("line_items[0][quantity]".to_string(), "1".to_string());
        form.insert(
            "line_items[0][price_data][currency]".to_string(),
            currency,
        );
        form.insert(
            "line_items[0][price_data][unit_amount]".to_string(),
            unit_amount.to_string(),
        );
        form.insert(
            "line_items[0][price_data][product_data][name]".to_string(),
            params.description,
        );
        if let Some(reference) = params
            .client_reference_id
            .filter(|r| !r.trim().is_empty())
        {
            form.insert("client_reference_id".to_string(), reference);
        }
        for (key, value) in params.metadata {
            form.insert(format!("metadata[{}]", key), value);
        }

        let response = self
            .client
            .post(CHECKOUT_SESSIONS_URL)
            .basic_auth(api_key, Some(""))
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!(%status, "Stripe checkout session creation failed: {}", error_text);
            return Err(ServiceError::GatewayError(format!(
                "Stripe error ({}): {}",
                status, error_text
            )));
        }

        let session: SessionResponse = response.json().await.map_err(|e| {
            ServiceError::GatewayError(format!("Failed to parse Stripe response: {}", e))
        })?;

        let url = session.url.ok_or_else(|| {
            ServiceError::GatewayError("Stripe session has no hosted URL".to_string())
        })?;

        info!(session_id = %session.id, "Checkout session created");
        Ok(CheckoutSession {
            id: session.id,
            url,
            payment_intent_id: payment_intent_id(session.payment_intent.as_ref()),
        })
    }
}

/// Stripe returns `payment_intent` as a bare id string, or as an expanded
/// object carrying its own `id`.
fn payment_intent_id(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
        serde_json::Value::Object(obj) => obj
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string()),
        _ => None,
    }
}
