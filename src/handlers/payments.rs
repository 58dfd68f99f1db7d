use crate::entities::company_payment::{self, PaymentMethod, PaymentStatus};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::payments::{CreatePaymentInput, UpdatePaymentInput};
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "companyId": "550e8400-e29b-41d4-a716-446655440000",
    "amount": "29.99",
    "currency": "USD",
    "method": "CREDIT_CARD"
}))]
pub struct CreatePaymentRequest {
    /// Owning tenant
    pub company_id: Uuid,
    /// Amount in major units
    #[validate(custom = "validate_positive_amount")]
    pub amount: Decimal,
    /// ISO 4217 currency code
    #[validate(length(min = 1))]
    pub currency: String,
    pub method: PaymentMethod,
    /// Optional link to a billing subscription
    pub subscription_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentRequest {
    #[validate(custom = "validate_positive_amount")]
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub method: Option<PaymentMethod>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub checkout_session_id: Option<String>,
    pub checkout_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: Uuid,
    pub company_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub gateway: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub payment_transaction_id: Option<String>,
    pub subscription_id: Option<Uuid>,
    pub purchased_at: DateTime<Utc>,
}

impl From<company_payment::Model> for PaymentResponse {
    fn from(model: company_payment::Model) -> Self {
        Self {
            id: model.id,
            company_id: model.company_id,
            amount: model.amount,
            currency: model.currency,
            gateway: model.gateway,
            method: model.method,
            status: model.status,
            checkout_session_id: model.stripe_checkout_session_id,
            payment_intent_id: model.stripe_payment_intent_id,
            payment_transaction_id: model.payment_transaction_id,
            subscription_id: model.subscription_id,
            purchased_at: model.purchased_at,
        }
    }
}

/// Create a payment record and its hosted checkout session
#[utoipa::path(
    post,
    path = "/payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment created with PENDING status", body = crate::ApiResponse<CreatePaymentResponse>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatePaymentResponse>>), ServiceError> {
    request.validate()?;

    let created = state
        .payments
        .create_payment(CreatePaymentInput {
            company_id: request.company_id,
            amount: request.amount,
            currency: request.currency,
            method: request.method,
            subscription_id: request.subscription_id,
        })
        .await?;

    let response = CreatePaymentResponse {
        id: created.record.id,
        status: created.record.status,
        checkout_session_id: created.record.stripe_checkout_session_id,
        checkout_url: created.checkout_url,
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Get payment by ID
#[utoipa::path(
    get,
    path = "/payments/:id",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment details", body = crate::ApiResponse<PaymentResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ServiceError> {
    let payment = state.payments.get_payment(id).await?;
    Ok(Json(ApiResponse::success(payment.into())))
}

/// List payment records
#[utoipa::path(
    get,
    path = "/payments",
    responses(
        (status = 200, description = "All payments", body = crate::ApiResponse<Vec<PaymentResponse>>)
    ),
    tag = "Payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<PaymentResponse>>>, ServiceError> {
    let payments = state.payments.list_payments().await?;
    Ok(Json(ApiResponse::success(
        payments.into_iter().map(PaymentResponse::from).collect(),
    )))
}

/// Partially update a payment record
#[utoipa::path(
    patch,
    path = "/payments/:id",
    params(("id" = Uuid, Path, description = "Payment ID")),
    request_body = UpdatePaymentRequest,
    responses(
        (status = 200, description = "Updated payment", body = crate::ApiResponse<PaymentResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn update_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePaymentRequest>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ServiceError> {
    request.validate()?;

    let updated = state
        .payments
        .update_payment(
            id,
            UpdatePaymentInput {
                amount: request.amount,
                currency: request.currency,
                method: request.method,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(updated.into())))
}

/// Delete a payment record
#[utoipa::path(
    delete,
    path = "/payments/:id",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn delete_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.payments.delete_payment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Payment-record routes
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_payment))
        .route("/", get(list_payments))
        .route("/:id", get(get_payment))
        .route("/:id", patch(update_payment))
        .route("/:id", delete(delete_payment))
}

fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        let mut err = ValidationError::new("positive_amount");
        err.message = Some("amount must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}
