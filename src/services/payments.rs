use crate::entities::company_payment::{self, PaymentMethod, PaymentStatus};
use crate::entities::CompanyPayment;
use crate::errors::ServiceError;
use crate::stripe::{CheckoutGateway, CheckoutSession, CheckoutSessionParams};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, ModelTrait, Set};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Metadata key carrying our payment id through the gateway round-trip.
const METADATA_PAYMENT_ID: &str = "paymentId";
const METADATA_COMPANY_ID: &str = "companyId";

const GATEWAY_STRIPE: &str = "stripe";

/// Inputs for creating a payment record plus its hosted checkout session.
#[derive(Debug, Clone)]
pub struct CreatePaymentInput {
    pub company_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub subscription_id: Option<Uuid>,
}

/// Inputs for creating a bare hosted checkout session (no record persisted).
#[derive(Debug, Clone)]
pub struct CreateCheckoutInput {
    pub amount: Decimal,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Partial update of a payment record.
#[derive(Debug, Clone, Default)]
pub struct UpdatePaymentInput {
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub method: Option<PaymentMethod>,
}

/// Result of the payment-creation path.
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub record: company_payment::Model,
    pub checkout_url: String,
}

/// Payment records: creation (with hosted checkout), queries and updates.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn CheckoutGateway>,
    success_url: Option<String>,
    cancel_url: Option<String>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn CheckoutGateway>,
        success_url: Option<String>,
        cancel_url: Option<String>,
    ) -> Self {
        Self {
            db,
            gateway,
            success_url,
            cancel_url,
        }
    }

    /// Creates a PENDING payment record seeded with the correlation ids of a
    /// freshly created hosted checkout session.
    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    pub async fn create_payment(
        &self,
        input: CreatePaymentInput,
    ) -> Result<CreatedPayment, ServiceError> {
        let success_url = self.redirect_url(self.success_url.as_deref(), "stripe_success_url")?;
        let cancel_url = self.redirect_url(self.cancel_url.as_deref(), "stripe_cancel_url")?;
        validate_checkout_input(input.amount, &input.currency, &success_url, &cancel_url)?;

        let payment_id = Uuid::new_v4();
        let mut metadata = HashMap::new();
        metadata.insert(METADATA_PAYMENT_ID.to_string(), payment_id.to_string());
        metadata.insert(METADATA_COMPANY_ID.to_string(), input.company_id.to_string());

        let session = self
            .gateway
            .create_checkout_session(CheckoutSessionParams {
                amount: input.amount,
                currency: input.currency.clone(),
                success_url,
                cancel_url,
                description: "Company payment".to_string(),
                client_reference_id: Some(payment_id.to_string()),
                metadata,
            })
            .await?;

        let model = company_payment::ActiveModel {
            id: Set(payment_id),
            company_id: Set(input.company_id),
            amount: Set(input.amount),
            currency: Set(input.currency),
            gateway: Set(GATEWAY_STRIPE.to_string()),
            method: Set(input.method),
            status: Set(PaymentStatus::Pending),
            stripe_checkout_session_id: Set(Some(session.id.clone())),
            stripe_payment_intent_id: Set(session
                .payment_intent_id
                .clone()
                .filter(|id| !id.trim().is_empty())),
            payment_transaction_id: Set(None),
            subscription_id: Set(input.subscription_id),
            purchased_at: Set(Utc::now()),
        };

        let record = model.insert(&*self.db).await?;
        info!(
            payment_id = %record.id,
            checkout_session_id = ?record.stripe_checkout_session_id,
            "Created PENDING company payment"
        );

        Ok(CreatedPayment {
            record,
            checkout_url: session.url,
        })
    }

    /// Creates a hosted checkout session for an external caller without
    /// persisting anything.
    #[instrument(skip(self, input))]
    pub async fn create_checkout(
        &self,
        input: CreateCheckoutInput,
    ) -> Result<CheckoutSession, ServiceError> {
        validate_checkout_input(
            input.amount,
            &input.currency,
            &input.success_url,
            &input.cancel_url,
        )?;

        let description = input
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| "Payment".to_string());

        let session = self
            .gateway
            .create_checkout_session(CheckoutSessionParams {
                amount: input.amount,
                currency: input.currency,
                success_url: input.success_url,
                cancel_url: input.cancel_url,
                description,
                client_reference_id: None,
                metadata: input.metadata,
            })
            .await?;

        info!(session_id = %session.id, "Checkout session created without record");
        Ok(session)
    }

    pub async fn get_payment(&self, id: Uuid) -> Result<company_payment::Model, ServiceError> {
        CompanyPayment::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", id)))
    }

    pub async fn list_payments(&self) -> Result<Vec<company_payment::Model>, ServiceError> {
        Ok(CompanyPayment::find().all(&*self.db).await?)
    }

    pub async fn update_payment(
        &self,
        id: Uuid,
        input: UpdatePaymentInput,
    ) -> Result<company_payment::Model, ServiceError> {
        let existing = self.get_payment(id).await?;

        let mut model: company_payment::ActiveModel = existing.into();
        if let Some(amount) = input.amount {
            if amount <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "amount must be greater than 0".to_string(),
                ));
            }
            model.amount = Set(amount);
        }
        if let Some(currency) = input.currency {
            if currency.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "currency must not be blank".to_string(),
                ));
            }
            model.currency = Set(currency);
        }
        if let Some(method) = input.method {
            model.method = Set(method);
        }

        let updated = model.update(&*self.db).await?;
        info!(payment_id = %updated.id, "Updated company payment");
        Ok(updated)
    }

    pub async fn delete_payment(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.get_payment(id).await?;
        existing.delete(&*self.db).await?;
        info!(payment_id = %id, "Deleted company payment");
        Ok(())
    }

    fn redirect_url(&self, value: Option<&str>, name: &str) -> Result<String, ServiceError> {
        match value {
            Some(url) if !url.trim().is_empty() => Ok(url.to_string()),
            _ => Err(ServiceError::ConfigurationError(format!(
                "{} is not configured",
                name
            ))),
        }
    }
}

/// Rejects bad inputs before any gateway call is attempted.
fn validate_checkout_input(
    amount: Decimal,
    currency: &str,
    success_url: &str,
    cancel_url: &str,
) -> Result<(), ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "amount must be greater than 0".to_string(),
        ));
    }
    if currency.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "currency must not be blank".to_string(),
        ));
    }
    if success_url.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "successUrl must not be blank".to_string(),
        ));
    }
    if cancel_url.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "cancelUrl must not be blank".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn checkout_input_validation() {
        assert!(validate_checkout_input(dec!(10), "USD", "https://s", "https://c").is_ok());
        assert!(validate_checkout_input(Decimal::ZERO, "USD", "https://s", "https://c").is_err());
        assert!(validate_checkout_input(dec!(-1), "USD", "https://s", "https://c").is_err());
        assert!(validate_checkout_input(dec!(10), "  ", "https://s", "https://c").is_err());
        assert!(validate_checkout_input(dec!(10), "USD", "", "https://c").is_err());
        assert!(validate_checkout_input(dec!(10), "USD", "https://s", " ").is_err());
    }
}
