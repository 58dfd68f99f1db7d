use crate::entities::company_payment::{self, PaymentStatus};
use crate::entities::CompanyPayment;
use crate::errors::ServiceError;
use crate::services::notifications::PaymentNotifier;
use crate::stripe::webhook::{self, EventKind, StripeEvent, WebhookError};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Reconciles verified Stripe webhook events against payment records.
#[derive(Clone)]
pub struct StripeWebhookService {
    db: Arc<DatabaseConnection>,
    notifier: PaymentNotifier,
    webhook_secret: Option<String>,
    tolerance_secs: u64,
}

impl StripeWebhookService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        notifier: PaymentNotifier,
        webhook_secret: Option<String>,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            db,
            notifier,
            webhook_secret,
            tolerance_secs,
        }
    }

    /// Authenticates a raw webhook body against the configured shared secret.
    pub fn verify_event(
        &self,
        payload: &[u8],
        sig_header: Option<&str>,
    ) -> Result<StripeEvent, WebhookError> {
        webhook::construct_event(
            payload,
            sig_header,
            self.webhook_secret.as_deref(),
            self.tolerance_secs,
        )
    }

    /// Routes a verified event to its handler. Unknown event types are
    /// acknowledged without error.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn process_event(&self, event: &StripeEvent) -> Result<(), ServiceError> {
        match event.kind() {
            EventKind::CheckoutSessionCompleted => {
                self.on_checkout_session(event, PaymentStatus::Successful, true)
                    .await
            }
            EventKind::CheckoutSessionAsyncPaymentSucceeded => {
                self.on_checkout_session(event, PaymentStatus::Successful, false)
                    .await
            }
            EventKind::CheckoutSessionAsyncPaymentFailed => {
                self.on_checkout_session(event, PaymentStatus::Failed, false)
                    .await
            }
            EventKind::PaymentIntentSucceeded => {
                self.on_payment_intent(event, PaymentStatus::Successful).await
            }
            EventKind::PaymentIntentFailed => {
                self.on_payment_intent(event, PaymentStatus::Failed).await
            }
            EventKind::Unrecognized => {
                debug!("Unhandled event type: {}", event.event_type);
                Ok(())
            }
        }
    }

    /// Checkout-session family: locate through the fallback chain, apply the
    /// target status. A completed session that is not yet paid is left alone
    /// (async payment methods complete the session before the money moves).
    async fn on_checkout_session(
        &self,
        event: &StripeEvent,
        target: PaymentStatus,
        require_paid: bool,
    ) -> Result<(), ServiceError> {
        let Some(info) = CheckoutSessionInfo::from_event(event) else {
            warn!("Missing data.object in Stripe payload");
            return Ok(());
        };

        if require_paid && !info.is_paid() {
            info!(
                session_id = ?info.session_id,
                payment_status = ?info.payment_status,
                "Session completed but not paid yet; skipping"
            );
            return Ok(());
        }

        let settlement_id = match target {
            PaymentStatus::Successful => info.payment_intent_id.clone(),
            _ => None,
        };

        let txn = self.db.begin().await?;
        let Some(record) = locate_payment(&txn, &info).await? else {
            txn.commit().await?;
            return Ok(());
        };
        let outcome = apply_transition(&txn, record, target, settlement_id.as_deref()).await?;
        txn.commit().await?;

        self.notify_if_changed(&outcome).await;
        Ok(())
    }

    /// PaymentIntent family: the fallback/legacy flow keyed directly on the
    /// intent id, with the latest charge as the settlement id.
    async fn on_payment_intent(
        &self,
        event: &StripeEvent,
        target: PaymentStatus,
    ) -> Result<(), ServiceError> {
        let Some(intent) = PaymentIntentInfo::from_event(event) else {
            warn!("Missing data.object in Stripe payload");
            return Ok(());
        };

        let settlement_id = match target {
            PaymentStatus::Successful => intent.latest_charge_id.clone(),
            _ => None,
        };

        let txn = self.db.begin().await?;
        let found = CompanyPayment::find()
            .filter(company_payment::Column::StripePaymentIntentId.eq(intent.id.as_str()))
            .one(&txn)
            .await?;
        let Some(record) = found else {
            txn.commit().await?;
            info!(intent_id = %intent.id, "No payment matches payment intent; dropping event");
            return Ok(());
        };
        let outcome = apply_transition(&txn, record, target, settlement_id.as_deref()).await?;
        txn.commit().await?;

        self.notify_if_changed(&outcome).await;
        Ok(())
    }

    async fn notify_if_changed(&self, outcome: &TransitionOutcome) {
        if outcome.changed {
            self.notifier
                .payment_status_changed(outcome.company_id, outcome.payment_id, outcome.status)
                .await;
        }
    }
}

/// Correlation fields of a checkout-session event, independent of how they
/// were extracted.
#[derive(Debug, Default, Clone)]
pub(crate) struct CheckoutSessionInfo {
    pub session_id: Option<String>,
    pub payment_status: Option<String>,
    pub payment_intent_id: Option<String>,
    pub client_reference_id: Option<String>,
    pub metadata_payment_id: Option<String>,
}

/// Typed shape of `data.object` for checkout-session events. Deserialization
/// fails when Stripe sends shapes this struct does not know (e.g. an
/// expanded `payment_intent` object from a newer API version); the raw
/// fallback below handles those.
#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: Option<String>,
    payment_status: Option<String>,
    payment_intent: Option<String>,
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl CheckoutSessionInfo {
    pub(crate) fn from_event(event: &StripeEvent) -> Option<Self> {
        let obj = event.data_object()?;

        if let Ok(session) = serde_json::from_value::<CheckoutSessionObject>(obj.clone()) {
            return Some(Self {
                session_id: non_blank(session.id),
                payment_status: non_blank(session.payment_status),
                payment_intent_id: non_blank(session.payment_intent),
                client_reference_id: non_blank(session.client_reference_id),
                metadata_payment_id: non_blank(session.metadata.get("paymentId").cloned()),
            });
        }

        // Raw fallback for payloads the typed shape cannot represent.
        Some(Self {
            session_id: text_field(obj, "id"),
            payment_status: text_field(obj, "payment_status"),
            payment_intent_id: id_field(obj.get("payment_intent")),
            client_reference_id: text_field(obj, "client_reference_id"),
            metadata_payment_id: obj
                .get("metadata")
                .and_then(|m| m.get("paymentId"))
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.to_string()),
        })
    }

    pub(crate) fn is_paid(&self) -> bool {
        self.payment_status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("paid"))
            .unwrap_or(false)
    }
}

#[derive(Debug)]
struct PaymentIntentInfo {
    id: String,
    latest_charge_id: Option<String>,
}

impl PaymentIntentInfo {
    fn from_event(event: &StripeEvent) -> Option<Self> {
        let obj = event.data_object()?;
        let id = text_field(obj, "id")?;
        Some(Self {
            id,
            latest_charge_id: id_field(obj.get("latest_charge")),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn text_field(obj: &Value, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
}

/// Reads a field that may be a bare id string or an expanded object with its
/// own `id`.
fn id_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Object(obj) => obj
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.to_string()),
        _ => None,
    }
}

/// Resolves a checkout-session event to its payment record.
///
/// The gateway ids are populated progressively across the payment lifecycle,
/// so no single field is reliable for every event; resolution short-circuits
/// on the first rule that matches:
/// 1. checkout session id
/// 2. payment intent id
/// 3. client reference id parsed as the record id
/// 4. `paymentId` metadata parsed as the record id
async fn locate_payment<C: ConnectionTrait>(
    conn: &C,
    info: &CheckoutSessionInfo,
) -> Result<Option<company_payment::Model>, ServiceError> {
    if let Some(session_id) = info.session_id.as_deref() {
        let found = CompanyPayment::find()
            .filter(company_payment::Column::StripeCheckoutSessionId.eq(session_id))
            .one(conn)
            .await?;
        if found.is_some() {
            return Ok(found);
        }
    }

    if let Some(intent_id) = info.payment_intent_id.as_deref() {
        let found = CompanyPayment::find()
            .filter(company_payment::Column::StripePaymentIntentId.eq(intent_id))
            .one(conn)
            .await?;
        if found.is_some() {
            return Ok(found);
        }
    }

    for candidate in [
        info.client_reference_id.as_deref(),
        info.metadata_payment_id.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        // A reference that is not a valid id is ignored, not an error.
        if let Ok(id) = Uuid::parse_str(candidate) {
            let found = CompanyPayment::find_by_id(id).one(conn).await?;
            if found.is_some() {
                return Ok(found);
            }
        }
    }

    warn!(
        session_id = ?info.session_id,
        payment_intent_id = ?info.payment_intent_id,
        "No matching payment found for checkout session"
    );
    Ok(None)
}

#[derive(Debug)]
struct TransitionOutcome {
    payment_id: Uuid,
    company_id: Uuid,
    status: PaymentStatus,
    changed: bool,
}

/// Applies the target status to a located record.
///
/// Re-applying the current status persists but changes nothing (idempotent
/// under duplicate delivery). A non-blank settlement id accompanying a
/// successful target overwrites any prior value, last writer wins.
async fn apply_transition<C: ConnectionTrait>(
    conn: &C,
    record: company_payment::Model,
    target: PaymentStatus,
    settlement_id: Option<&str>,
) -> Result<TransitionOutcome, ServiceError> {
    let payment_id = record.id;
    let company_id = record.company_id;
    let changed = record.status != target;
    let previous = record.status;

    let mut model: company_payment::ActiveModel = record.into();
    model.status = Set(target);
    if target == PaymentStatus::Successful {
        if let Some(settlement) = settlement_id.filter(|s| !s.trim().is_empty()) {
            model.payment_transaction_id = Set(Some(settlement.to_string()));
        }
    }
    model.update(conn).await?;

    if changed {
        info!(
            %payment_id,
            ?previous,
            ?target,
            "Payment status transition applied"
        );
    } else {
        debug!(%payment_id, ?target, "Payment already in target status; no-op");
    }

    Ok(TransitionOutcome {
        payment_id,
        company_id,
        status: target,
        changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_with_object(object: Value) -> StripeEvent {
        let body = json!({
            "id": "evt_test",
            "type": "checkout.session.completed",
            "data": { "object": object }
        })
        .to_string();
        let secret = "whsec_unit";
        let ts = chrono::Utc::now().timestamp();
        let header = {
            use hmac::{Hmac, Mac};
            let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
            mac.update(format!("{}.{}", ts, body).as_bytes());
            format!("t={},v1={}", ts, hex::encode(mac.finalize().into_bytes()))
        };
        webhook::construct_event(body.as_bytes(), Some(&header), Some(secret), 300).unwrap()
    }

    #[test]
    fn typed_extraction_reads_all_correlation_fields() {
        let event = event_with_object(json!({
            "id": "cs_test_123",
            "payment_status": "paid",
            "payment_intent": "pi_789",
            "client_reference_id": "ref-1",
            "metadata": { "paymentId": "meta-1", "companyId": "co-1" }
        }));

        let info = CheckoutSessionInfo::from_event(&event).unwrap();
        assert_eq!(info.session_id.as_deref(), Some("cs_test_123"));
        assert_eq!(info.payment_intent_id.as_deref(), Some("pi_789"));
        assert_eq!(info.client_reference_id.as_deref(), Some("ref-1"));
        assert_eq!(info.metadata_payment_id.as_deref(), Some("meta-1"));
        assert!(info.is_paid());
    }

    #[test]
    fn raw_fallback_handles_expanded_payment_intent() {
        // An expanded payment_intent object defeats the typed shape.
        let event = event_with_object(json!({
            "id": "cs_test_456",
            "payment_status": "unpaid",
            "payment_intent": { "id": "pi_expanded", "status": "processing" },
            "client_reference_id": null
        }));

        let info = CheckoutSessionInfo::from_event(&event).unwrap();
        assert_eq!(info.session_id.as_deref(), Some("cs_test_456"));
        assert_eq!(info.payment_intent_id.as_deref(), Some("pi_expanded"));
        assert!(info.client_reference_id.is_none());
        assert!(!info.is_paid());
    }

    #[test]
    fn blank_fields_are_dropped() {
        let event = event_with_object(json!({
            "id": "  ",
            "payment_status": "paid",
            "payment_intent": "",
            "client_reference_id": "not-a-uuid",
            "metadata": { "paymentId": "" }
        }));

        let info = CheckoutSessionInfo::from_event(&event).unwrap();
        assert!(info.session_id.is_none());
        assert!(info.payment_intent_id.is_none());
        assert_eq!(info.client_reference_id.as_deref(), Some("not-a-uuid"));
        assert!(info.metadata_payment_id.is_none());
    }

    #[test]
    fn payment_intent_info_reads_latest_charge_forms() {
        let event = event_with_object(json!({
            "id": "pi_1",
            "latest_charge": "ch_1"
        }));
        let intent = PaymentIntentInfo::from_event(&event).unwrap();
        assert_eq!(intent.id, "pi_1");
        assert_eq!(intent.latest_charge_id.as_deref(), Some("ch_1"));

        let event = event_with_object(json!({
            "id": "pi_2",
            "latest_charge": { "id": "ch_2", "amount": 500 }
        }));
        let intent = PaymentIntentInfo::from_event(&event).unwrap();
        assert_eq!(intent.latest_charge_id.as_deref(), Some("ch_2"));

        let event = event_with_object(json!({ "id": "pi_3" }));
        let intent = PaymentIntentInfo::from_event(&event).unwrap();
        assert!(intent.latest_charge_id.is_none());
    }
}
