pub mod notifications;
pub mod payments;
pub mod stripe_webhooks;

pub use notifications::PaymentNotifier;
pub use payments::PaymentService;
pub use stripe_webhooks::StripeWebhookService;
