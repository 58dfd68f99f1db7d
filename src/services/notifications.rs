use crate::entities::company_payment::PaymentStatus;
use crate::message_queue::{Message, MessageQueue};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Topic consumed by the billing service to mark subscriptions paid.
pub const SUBSCRIPTION_PAID_TOPIC: &str = "subscription-paid-notification";

/// Publishes payment status-change notifications to the message bus.
#[derive(Clone)]
pub struct PaymentNotifier {
    queue: Arc<dyn MessageQueue>,
}

impl PaymentNotifier {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self { queue }
    }

    /// Emits one notification for a status-changing transition.
    ///
    /// Emission shares no failure domain with the transition that triggered
    /// it: publish errors are logged and swallowed so the webhook caller
    /// still gets its acknowledgement.
    pub async fn payment_status_changed(
        &self,
        company_id: Uuid,
        transaction_id: Uuid,
        status: PaymentStatus,
    ) {
        info!(
            %company_id,
            %transaction_id,
            ?status,
            "Publishing subscription-paid notification"
        );

        let message = Message::new(
            SUBSCRIPTION_PAID_TOPIC,
            json!({
                "companyId": company_id,
                "transactionId": transaction_id,
                "status": status,
            }),
        );

        if let Err(e) = self.queue.publish(message).await {
            warn!(
                %company_id,
                %transaction_id,
                "Failed to publish subscription-paid notification: {}",
                e
            );
        }
    }
}
