use utoipa::OpenApi;

use crate::entities::company_payment::{PaymentMethod, PaymentStatus};
use crate::errors::ErrorResponse;
use crate::handlers;

/// OpenAPI document served at /api-docs/openapi.json (Swagger UI at /docs).
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Company Payments API",
        description = "Stripe hosted checkout sessions and webhook-driven payment reconciliation"
    ),
    paths(
        handlers::stripe::stripe_webhook,
        handlers::stripe::create_checkout_session,
        handlers::payments::create_payment,
        handlers::payments::get_payment,
        handlers::payments::list_payments,
        handlers::payments::update_payment,
        handlers::payments::delete_payment,
    ),
    components(schemas(
        ErrorResponse,
        PaymentStatus,
        PaymentMethod,
        handlers::stripe::CreateCheckoutSessionRequest,
        handlers::stripe::CreateCheckoutSessionResponse,
        handlers::payments::CreatePaymentRequest,
        handlers::payments::UpdatePaymentRequest,
        handlers::payments::CreatePaymentResponse,
        handlers::payments::PaymentResponse,
    )),
    tags(
        (name = "Stripe", description = "Webhook intake and hosted-session creation"),
        (name = "Payments", description = "Payment record management")
    )
)]
pub struct ApiDoc;
