//! Stripe gateway boundary: hosted Checkout session creation and webhook
//! event verification.

pub mod client;
pub mod webhook;

pub use client::{CheckoutGateway, CheckoutSession, CheckoutSessionParams, StripeClient};
pub use webhook::{EventKind, StripeEvent, WebhookError};

use crate::errors::ServiceError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Converts a major-unit amount to the integer minor units Stripe expects.
///
/// Rounds half-up to exactly 2 decimal places before scaling by 100, so the
/// conversion is exact for any currency with a 2-decimal minor unit.
/// Zero- and three-decimal currencies are not supported.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "amount must be greater than 0".to_string(),
        ));
    }

    let scaled = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        * Decimal::from(100);
    scaled.to_i64().ok_or_else(|| {
        ServiceError::ValidationError(format!("amount {} out of range for minor units", amount))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn exact_two_decimal_amounts() {
        assert_eq!(to_minor_units(dec!(29.99)).unwrap(), 2999);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(to_minor_units(dec!(100)).unwrap(), 10000);
        assert_eq!(to_minor_units(dec!(1234.50)).unwrap(), 123450);
    }

    #[test]
    fn conversion_is_reversible_for_two_decimal_amounts() {
        for amount in [dec!(0.01), dec!(19.90), dec!(29.99), dec!(7600.00)] {
            let minor = to_minor_units(amount).unwrap();
            assert_eq!(Decimal::from(minor) / Decimal::from(100), amount.round_dp(2));
        }
    }

    #[test]
    fn half_up_rounding_beyond_two_decimals() {
        assert_eq!(to_minor_units(dec!(10.005)).unwrap(), 1001);
        assert_eq!(to_minor_units(dec!(10.004)).unwrap(), 1000);
    }

    #[test]
    fn rejects_zero_and_negative_amounts() {
        assert!(to_minor_units(Decimal::ZERO).is_err());
        assert!(to_minor_units(dec!(-5.00)).is_err());
    }
}
