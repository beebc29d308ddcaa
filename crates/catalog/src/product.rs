use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, ProductId};

/// Catalog product as seen by checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    price: Decimal,
    discount_price: Option<Decimal>,
    stock_quantity: i64,
    image_url: Option<String>,
    is_active: bool,
}

/// Input for registering (or replacing) a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    pub stock_quantity: i64,
    pub image_url: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Returned when a decrement would drive stock negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockShortfall {
    pub requested: i64,
    pub available: i64,
}

impl Product {
    /// Validate and build a product.
    pub fn new(input: NewProduct) -> Result<Self, DomainError> {
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if input.price <= Decimal::ZERO {
            return Err(DomainError::validation("price must be positive"));
        }
        if let Some(discount) = input.discount_price {
            if discount <= Decimal::ZERO {
                return Err(DomainError::validation("discount_price must be positive"));
            }
            if discount > input.price {
                return Err(DomainError::validation(
                    "discount_price cannot exceed price",
                ));
            }
        }
        if input.stock_quantity < 0 {
            return Err(DomainError::validation("stock_quantity cannot be negative"));
        }

        Ok(Self {
            id: input.id,
            name: input.name,
            price: input.price,
            discount_price: input.discount_price,
            stock_quantity: input.stock_quantity,
            image_url: input.image_url,
            is_active: input.is_active,
        })
    }

    /// Rebuild a product from trusted storage without re-validating.
    pub fn from_storage(input: NewProduct) -> Self {
        Self {
            id: input.id,
            name: input.name,
            price: input.price,
            discount_price: input.discount_price,
            stock_quantity: input.stock_quantity,
            image_url: input.image_url,
            is_active: input.is_active,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn discount_price(&self) -> Option<Decimal> {
        self.discount_price
    }

    pub fn stock_quantity(&self) -> i64 {
        self.stock_quantity
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Price charged per unit: the discount price when present, else the list price.
    pub fn unit_price(&self) -> Decimal {
        self.discount_price.unwrap_or(self.price)
    }

    pub fn has_stock_for(&self, quantity: i64) -> bool {
        self.stock_quantity >= quantity
    }

    /// Decrement stock by `quantity` if at least that much is available.
    pub fn decrement_stock(&mut self, quantity: i64) -> Result<i64, StockShortfall> {
        if quantity <= 0 || !self.has_stock_for(quantity) {
            return Err(StockShortfall {
                requested: quantity,
                available: self.stock_quantity,
            });
        }
        self.stock_quantity -= quantity;
        Ok(self.stock_quantity)
    }
}

impl From<&Product> for NewProduct {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            price: p.price,
            discount_price: p.discount_price,
            stock_quantity: p.stock_quantity,
            image_url: p.image_url.clone(),
            is_active: p.is_active,
        }
    }
}
