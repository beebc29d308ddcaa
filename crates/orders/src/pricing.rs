//! Pricing engine: line pricing, shipping, tax and totals.
//!
//! Pure computation over product rows supplied by the caller. It never reads
//! or reserves stock, so a quote is advisory only.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use storefront_catalog::Product;
use storefront_core::{MAX_AMOUNT, ProductId, ValueObject, checked_money, to_money};

/// A buyer-supplied (product, quantity) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// A priced line using the product's current unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Monetary totals of an order or quote.
///
/// `total = subtotal + shipping + tax - discount` holds for every value built
/// through [`PriceBreakdown::try_new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl PriceBreakdown {
    /// Build totals from their components.
    ///
    /// Returns `None` when any component or the total falls outside the
    /// stored money range.
    pub fn try_new(
        subtotal: Decimal,
        discount: Decimal,
        shipping: Decimal,
        tax: Decimal,
    ) -> Option<Self> {
        let subtotal = checked_money(subtotal)?;
        let discount = checked_money(discount)?;
        let shipping = checked_money(shipping)?;
        let tax = checked_money(tax)?;
        let total = subtotal
            .checked_add(shipping)?
            .checked_add(tax)?
            .checked_sub(discount)?;
        Some(Self {
            subtotal,
            discount,
            shipping,
            tax,
            total: checked_money(total)?,
        })
    }

    /// All-zero totals of a not-yet-placed order.
    pub fn zero() -> Self {
        let zero = to_money(Decimal::ZERO);
        Self {
            subtotal: zero,
            discount: zero,
            shipping: zero,
            tax: zero,
            total: zero,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.subtotal
            .checked_add(self.shipping)
            .and_then(|sum| sum.checked_add(self.tax))
            .and_then(|sum| sum.checked_sub(self.discount))
            .is_some_and(|total| total == self.total)
    }
}

impl ValueObject for PriceBreakdown {}

/// Advisory price computation for a candidate set of line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub lines: Vec<PricedLine>,
    pub totals: PriceBreakdown,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("order must contain at least one item")]
    EmptyOrder,

    #[error("order has {actual} items; at most {max} are allowed")]
    TooManyLines { max: usize, actual: usize },

    #[error("quantity for product {product_id} must be positive (got {quantity})")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    #[error("product {0} not found")]
    UnknownProduct(ProductId),

    #[error("order amount exceeds the maximum of {max}")]
    AmountTooLarge { max: Decimal },
}

/// Flat-rate shipping and tax policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Tax as a fraction of the subtotal (0.08 = 8%).
    pub tax_rate: Decimal,
    /// Shipping charged below the free-shipping threshold.
    pub flat_shipping: Decimal,
    /// Subtotals at or above this amount ship free.
    pub free_shipping_threshold: Decimal,
    /// Maximum number of lines accepted per request.
    pub max_line_items: usize,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(8, 2),
            flat_shipping: Decimal::new(1000, 2),
            free_shipping_threshold: Decimal::new(10000, 2),
            max_line_items: 100,
        }
    }
}

impl PricingPolicy {
    /// Reject malformed requests before any product is looked up.
    pub fn validate_items(&self, items: &[LineItem]) -> Result<(), PricingError> {
        if items.is_empty() {
            return Err(PricingError::EmptyOrder);
        }
        if items.len() > self.max_line_items {
            return Err(PricingError::TooManyLines {
                max: self.max_line_items,
                actual: items.len(),
            });
        }
        if let Some(bad) = items.iter().find(|i| i.quantity <= 0) {
            return Err(PricingError::InvalidQuantity {
                product_id: bad.product_id,
                quantity: bad.quantity,
            });
        }
        Ok(())
    }

    pub fn shipping_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal < self.free_shipping_threshold {
            self.flat_shipping
        } else {
            Decimal::ZERO
        }
    }

    pub fn tax_for(&self, subtotal: Decimal) -> Option<Decimal> {
        subtotal.checked_mul(self.tax_rate).map(to_money)
    }

    /// Price `items` against `products`.
    ///
    /// Inactive or missing products are reported as unknown.
    pub fn quote(&self, items: &[LineItem], products: &[Product]) -> Result<Quote, PricingError> {
        self.validate_items(items)?;

        let by_id: HashMap<ProductId, &Product> =
            products.iter().map(|p| (p.id_typed(), p)).collect();

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = by_id
                .get(&item.product_id)
                .filter(|p| p.is_active())
                .ok_or(PricingError::UnknownProduct(item.product_id))?;

            let unit_price = to_money(product.unit_price());
            lines.push(PricedLine {
                product_id: item.product_id,
                name: product.name().to_string(),
                quantity: item.quantity,
                unit_price,
                line_total: unit_price
                    .checked_mul(Decimal::from(item.quantity))
                    .and_then(checked_money)
                    .ok_or_else(too_large)?,
            });
        }

        let subtotal = lines
            .iter()
            .try_fold(Decimal::ZERO, |sum, l| sum.checked_add(l.line_total))
            .ok_or_else(too_large)?;
        let tax = self.tax_for(subtotal).ok_or_else(too_large)?;
        let totals = PriceBreakdown::try_new(subtotal, Decimal::ZERO, self.shipping_for(subtotal), tax)
            .ok_or_else(too_large)?;

        Ok(Quote { lines, totals })
    }
}

fn too_large() -> PricingError {
    PricingError::AmountTooLarge { max: MAX_AMOUNT }
}
