use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Reconciliation status of a payment record.
///
/// `Pending -> Successful` and `Pending -> Failed` are the regular
/// transitions. A later gateway event of higher authority may overwrite one
/// terminal status with the other (Stripe can emit a fallback success after
/// an async failure signal); re-applying the current status is a no-op.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "SUCCESSFUL")]
    Successful,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

/// Payment instrument category selected by the paying company.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "CREDIT_CARD")]
    CreditCard,
    #[sea_orm(string_value = "VISA")]
    Visa,
    #[sea_orm(string_value = "E_WALLET")]
    EWallet,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "company_payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Uuid")]
    pub id: Uuid,

    #[sea_orm(column_type = "Uuid")]
    pub company_id: Uuid,

    pub amount: Decimal,
    pub currency: String,
    pub gateway: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,

    /// Stripe Checkout session id, set at creation for hosted-checkout flows.
    pub stripe_checkout_session_id: Option<String>,

    /// Stripe PaymentIntent id; may arrive at creation or later via webhook.
    pub stripe_payment_intent_id: Option<String>,

    /// Settlement/charge identifier, populated on success.
    pub payment_transaction_id: Option<String>,

    #[sea_orm(column_type = "Uuid", nullable)]
    pub subscription_id: Option<Uuid>,

    pub purchased_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
