//! Checkout persistence: catalog rows, orders and their items.
//!
//! All mutations run inside a [`UnitOfWork`]. A unit of work that is dropped
//! without `commit` is discarded, so a cancelled request never leaves partial
//! state behind.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use storefront_catalog::{Product, StockShortfall};
use storefront_core::{ExpectedVersion, OrderId, ProductId, UserId};
use storefront_orders::{Order, OrderRecord, OrderStatus, PaymentReference};

use crate::error::StoreError;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryCheckoutStore;
pub use postgres::PostgresCheckoutStore;

/// Unique constraint on `orders.order_number`.
pub const ORDER_NUMBER_CONSTRAINT: &str = "orders_order_number_key";
/// Unique constraint on `orders.payment_reference`.
pub const PAYMENT_REFERENCE_CONSTRAINT: &str = "orders_payment_reference_key";

/// Outcome of the conditional "decrement by N if at least N" primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDecrement {
    Applied { remaining: i64 },
    Insufficient(StockShortfall),
}

/// Admin listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: u64,
}

/// Aggregate figures for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub total_orders: u64,
    /// Sum of `total_amount` over orders whose status counts as revenue.
    pub revenue: Decimal,
    pub by_status: Vec<StatusCount>,
}

impl OrderSummary {
    /// Build a summary from per-status `(count, total_amount)` figures.
    pub fn from_status_totals(totals: impl IntoIterator<Item = (OrderStatus, u64, Decimal)>) -> Self {
        let mut by_status: Vec<StatusCount> = OrderStatus::ALL
            .iter()
            .map(|&status| StatusCount { status, count: 0 })
            .collect();
        let mut total_orders = 0;
        let mut revenue = Decimal::ZERO;

        for (status, count, amount) in totals {
            total_orders += count;
            if status.counts_as_revenue() {
                revenue += amount;
            }
            if let Some(entry) = by_status.iter_mut().find(|c| c.status == status) {
                entry.count += count;
            }
        }

        Self {
            total_orders,
            revenue: storefront_core::to_money(revenue),
            by_status,
        }
    }
}

/// Store abstraction consumed by `CheckoutService`.
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    /// Start an isolated unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Insert or replace a catalog product.
    async fn save_product(&self, product: &Product) -> Result<(), StoreError>;

    /// Unlocked read of the given products; unknown ids are omitted.
    async fn find_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError>;

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Orders owned by `user_id`, newest first.
    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError>;

    /// All orders matching `query`, newest first.
    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>, StoreError>;

    async fn order_summary(&self) -> Result<OrderSummary, StoreError>;
}

/// Transactional scope spanning catalog stock and the order ledger.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read and lock the given products in ascending id order.
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError>;

    /// Decrement stock by `quantity` only if at least `quantity` is available.
    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<StockDecrement, StoreError>;

    async fn payment_reference_taken(
        &mut self,
        reference: &PaymentReference,
    ) -> Result<bool, StoreError>;

    /// Insert an order together with all of its items.
    async fn insert_order(&mut self, order: &OrderRecord) -> Result<(), StoreError>;

    /// Read and lock a single order for a read-modify-write.
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Persist the mutable surface of an order, guarded by its prior version.
    async fn save_order_state(
        &mut self,
        order: &OrderRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> CheckoutStore for Arc<S>
where
    S: CheckoutStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        (**self).begin().await
    }

    async fn save_product(&self, product: &Product) -> Result<(), StoreError> {
        (**self).save_product(product).await
    }

    async fn find_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        (**self).find_products(ids).await
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).find_order(order_id).await
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        (**self).list_orders_for_user(user_id).await
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>, StoreError> {
        (**self).list_orders(query).await
    }

    async fn order_summary(&self) -> Result<OrderSummary, StoreError> {
        (**self).order_summary().await
    }
}
