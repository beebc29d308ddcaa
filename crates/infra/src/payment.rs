//! Payment authorization capability.
//!
//! Checkout never talks to a payment network. Quotes ask a
//! [`PaymentAuthorizer`] for an opaque reference that the client later echoes
//! back on order creation, where it acts as the double-submission guard.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use storefront_core::UserId;

use crate::error::CheckoutError;

/// Reference issued for a prospective payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentAuthorization {
    pub payment_reference: String,
    pub client_secret: String,
}

#[async_trait]
pub trait PaymentAuthorizer: Send + Sync {
    async fn authorize(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<PaymentAuthorization, CheckoutError>;
}

/// Stand-in that mints gateway-shaped references without contacting anyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderPaymentAuthorizer;

#[async_trait]
impl PaymentAuthorizer for PlaceholderPaymentAuthorizer {
    async fn authorize(
        &self,
        _user_id: UserId,
        _amount: Decimal,
    ) -> Result<PaymentAuthorization, CheckoutError> {
        let payment_reference = format!("pi_{}", &Uuid::new_v4().simple().to_string()[..24]);
        let client_secret = format!("{payment_reference}_secret");
        Ok(PaymentAuthorization {
            payment_reference,
            client_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_reference_has_gateway_shape() {
        let auth = PlaceholderPaymentAuthorizer
            .authorize(UserId::new(), Decimal::ONE)
            .await
            .unwrap();
        let hex = auth.payment_reference.strip_prefix("pi_").unwrap();
        assert_eq!(hex.len(), 24);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(auth.client_secret, format!("{}_secret", auth.payment_reference));
    }

    #[tokio::test]
    async fn references_are_unique() {
        let a = PlaceholderPaymentAuthorizer
            .authorize(UserId::new(), Decimal::ONE)
            .await
            .unwrap();
        let b = PlaceholderPaymentAuthorizer
            .authorize(UserId::new(), Decimal::ONE)
            .await
            .unwrap();
        assert_ne!(a.payment_reference, b.payment_reference);
    }
}
