//! Company Payments API Library
//!
//! Stripe hosted-checkout session creation and webhook-driven payment
//! reconciliation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod message_queue;
pub mod openapi;
pub mod services;
pub mod stripe;

use axum::{extract::State, response::Json, routing::get, Router};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::message_queue::MessageQueue;
use crate::services::{PaymentNotifier, PaymentService, StripeWebhookService};
use crate::stripe::CheckoutGateway;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub payments: Arc<PaymentService>,
    pub stripe_webhooks: Arc<StripeWebhookService>,
}

impl AppState {
    /// Wires the service layer from its external collaborators.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: AppConfig,
        gateway: Arc<dyn CheckoutGateway>,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            gateway,
            config.stripe_success_url.clone(),
            config.stripe_cancel_url.clone(),
        ));
        let notifier = PaymentNotifier::new(queue);
        let stripe_webhooks = Arc::new(StripeWebhookService::new(
            db.clone(),
            notifier,
            config.stripe_webhook_secret.clone(),
            config.stripe_webhook_tolerance_secs,
        ));

        Self {
            db,
            config,
            payments,
            stripe_webhooks,
        }
    }
}

// Common response wrapper
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Builds the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .nest("/stripe", handlers::stripe::stripe_routes())
        .nest("/payments", handlers::payments::payment_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "company-payments-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
