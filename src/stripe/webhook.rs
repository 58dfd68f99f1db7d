use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the Stripe signature scheme: `t=<unix-ts>,v1=<hmac-hex>`.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Debug, Error)]
pub enum WebhookError {
    /// No shared secret configured. Callers treat the webhook as disabled
    /// and acknowledge the event rather than reject it.
    #[error("webhook secret not configured")]
    NotConfigured,

    #[error("missing Stripe-Signature header")]
    MissingSignature,

    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Body failed to parse after the signature checked out. Authentic but
    /// unusable; callers acknowledge and drop it.
    #[error("malformed event payload: {0}")]
    MalformedPayload(String),
}

/// Known webhook event families. Anything else is `Unrecognized` and must be
/// acknowledged without error so gateway-side additions never break intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutSessionCompleted,
    CheckoutSessionAsyncPaymentSucceeded,
    CheckoutSessionAsyncPaymentFailed,
    PaymentIntentSucceeded,
    PaymentIntentFailed,
    Unrecognized,
}

impl EventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "checkout.session.async_payment_succeeded" => {
                Self::CheckoutSessionAsyncPaymentSucceeded
            }
            "checkout.session.async_payment_failed" => Self::CheckoutSessionAsyncPaymentFailed,
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            "payment_intent.payment_failed" => Self::PaymentIntentFailed,
            _ => Self::Unrecognized,
        }
    }
}

/// A signature-verified webhook event.
#[derive(Debug, Clone)]
pub struct StripeEvent {
    /// Gateway-assigned event id (`evt_...`), usable for dedupe.
    pub id: String,
    pub event_type: String,
    payload: Value,
}

impl StripeEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::from_type(&self.event_type)
    }

    /// The `data.object` node carrying the session / payment-intent payload.
    pub fn data_object(&self) -> Option<&Value> {
        let obj = self.payload.get("data")?.get("object")?;
        if obj.is_null() {
            None
        } else {
            Some(obj)
        }
    }
}

/// Verifies the signature of a raw webhook body and parses it into a typed
/// event.
///
/// The signed payload is `"{t}.{body}"` per the gateway's documented scheme;
/// the timestamp must be within `tolerance_secs` of now to bound replay.
pub fn construct_event(
    payload: &[u8],
    sig_header: Option<&str>,
    secret: Option<&str>,
    tolerance_secs: u64,
) -> Result<StripeEvent, WebhookError> {
    let secret = match secret {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Err(WebhookError::NotConfigured),
    };
    let sig_header = match sig_header {
        Some(h) if !h.trim().is_empty() => h,
        _ => return Err(WebhookError::MissingSignature),
    };

    verify_signature(payload, sig_header, secret, tolerance_secs)?;

    let parsed: Value = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
    if !parsed.is_object() {
        return Err(WebhookError::MalformedPayload(
            "event payload is not a JSON object".to_string(),
        ));
    }

    let id = parsed
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let event_type = parsed
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WebhookError::MalformedPayload("event has no type field".to_string()))?
        .to_string();

    Ok(StripeEvent {
        id,
        event_type,
        payload: parsed,
    })
}

fn verify_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    tolerance_secs: u64,
) -> Result<(), WebhookError> {
    let mut timestamp = "";
    let mut candidates: Vec<&str> = Vec::new();
    for part in sig_header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => timestamp = val,
            (Some("v1"), Some(val)) => candidates.push(val),
            _ => {}
        }
    }
    if timestamp.is_empty() || candidates.is_empty() {
        return Err(WebhookError::InvalidSignature);
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| WebhookError::InvalidSignature)?;
    let now = chrono::Utc::now().timestamp();
    if (now - ts).unsigned_abs() > tolerance_secs {
        return Err(WebhookError::InvalidSignature);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    if candidates.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err(WebhookError::InvalidSignature)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
