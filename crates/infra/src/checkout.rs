//! Checkout orchestration: quoting, atomic order creation, reads and the
//! admin status workflow.
//!
//! ```text
//! CreateOrder
//!   ↓
//! 1. Validate request (items, addresses, payment reference)
//!   ↓
//! 2. Begin unit of work, lock product rows (ascending id)
//!   ↓
//! 3. Check stock for every product, price from the locked rows
//!   ↓
//! 4. Handle PlaceOrder on a fresh aggregate (pure)
//!   ↓
//! 5. Payment-reference guard, conditional stock decrements
//!   ↓
//! 6. Insert order + items, commit
//! ```
//!
//! Any early return drops the unit of work, which discards every decrement.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, instrument, warn};

use storefront_catalog::{NewProduct, Product};
use storefront_core::{Aggregate, AggregateRoot, Event, ExpectedVersion, OrderId, OrderItemId, ProductId, UserId};
use storefront_orders::{
    Address, LineItem, Order, OrderCommand, OrderEvent, OrderItem, OrderNumber, OrderPatch, OrderStatus,
    PaymentReference, PlaceOrder, Quote, UpdateOrder,
};

use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, StoreError};
use crate::payment::{PaymentAuthorization, PaymentAuthorizer, PlaceholderPaymentAuthorizer};
use crate::store::{
    CheckoutStore, ORDER_NUMBER_CONSTRAINT, OrderQuery, OrderSummary,
    PAYMENT_REFERENCE_CONSTRAINT, StockDecrement,
};

/// Identity of the caller, as vouched for by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub is_privileged: bool,
}

impl Caller {
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id,
            is_privileged: false,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            is_privileged: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub items: Vec<LineItem>,
    pub shipping_address: JsonValue,
}

/// Advisory price plus a placeholder payment reference. Reserves nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutQuote {
    pub quote: Quote,
    pub payment: PaymentAuthorization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<LineItem>,
    pub shipping_address: JsonValue,
    #[serde(default)]
    pub billing_address: Option<JsonValue>,
    #[serde(default)]
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminOrderFilter {
    pub status: Option<OrderStatus>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// Validated creation request, reused verbatim across conflict retries.
#[derive(Debug, Clone)]
struct OrderDraft {
    user_id: UserId,
    items: Vec<LineItem>,
    /// Total quantity per product, ascending by id.
    requested: BTreeMap<ProductId, i64>,
    shipping_address: Address,
    billing_address: Option<Address>,
    payment_reference: Option<PaymentReference>,
    notes: Option<String>,
}

pub struct CheckoutService<S, P = PlaceholderPaymentAuthorizer> {
    store: S,
    payments: P,
    config: CheckoutConfig,
}

impl<S> CheckoutService<S, PlaceholderPaymentAuthorizer>
where
    S: CheckoutStore,
{
    pub fn new(store: S, config: CheckoutConfig) -> Self {
        Self::with_authorizer(store, PlaceholderPaymentAuthorizer, config)
    }
}

impl<S, P> CheckoutService<S, P>
where
    S: CheckoutStore,
    P: PaymentAuthorizer,
{
    pub fn with_authorizer(store: S, payments: P, config: CheckoutConfig) -> Self {
        Self {
            store,
            payments,
            config,
        }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Validate and insert (or replace) a catalog product.
    #[instrument(skip(self, input), fields(product_id = %input.id))]
    pub async fn register_product(&self, input: NewProduct) -> Result<Product, CheckoutError> {
        let product = Product::new(input)?;
        self.store.save_product(&product).await?;
        Ok(product)
    }

    /// Price a candidate basket without touching stock.
    #[instrument(skip(self, request), fields(user_id = %caller.user_id, item_count = request.items.len()))]
    pub async fn quote(
        &self,
        caller: &Caller,
        request: QuoteRequest,
    ) -> Result<CheckoutQuote, CheckoutError> {
        let result: Result<CheckoutQuote, CheckoutError> = async move {
            Address::parse(request.shipping_address)?;
            self.config.pricing.validate_items(&request.items)?;

            let ids = distinct_products(&request.items);
            let products = self.store.find_products(&ids).await?;
            let quote = self.config.pricing.quote(&request.items, &products)?;
            let payment = self
                .payments
                .authorize(caller.user_id, quote.totals.total)
                .await?;

            Ok(CheckoutQuote { quote, payment })
        }
        .await;

        result.inspect_err(|e| log_failure("quote", e))
    }

    /// Reserve stock and record a paid order, all or nothing.
    #[instrument(skip(self, request), fields(user_id = %caller.user_id, item_count = request.items.len()))]
    pub async fn create_order(
        &self,
        caller: &Caller,
        request: CreateOrderRequest,
    ) -> Result<Order, CheckoutError> {
        let result: Result<Order, CheckoutError> = async move {
            let draft = self.prepare(caller, request)?;
            let mut attempt = 0;
            loop {
                match self.try_place(&draft).await {
                    Err(CheckoutError::Conflict(reason))
                        if attempt < self.config.max_conflict_retries =>
                    {
                        attempt += 1;
                        warn!(attempt, reason = %reason, "order creation conflicted; retrying");
                    }
                    other => return other,
                }
            }
        }
        .await;

        result.inspect_err(|e| log_failure("create_order", e))
    }

    #[instrument(skip(self), fields(user_id = %caller.user_id, order_id = %order_id))]
    pub async fn get_order(&self, caller: &Caller, order_id: OrderId) -> Result<Order, CheckoutError> {
        // Someone else's order is indistinguishable from a missing one.
        self.store
            .find_order(order_id)
            .await?
            .filter(|order| order.is_owned_by(caller.user_id))
            .ok_or_else(|| CheckoutError::not_found(format!("order {order_id}")))
    }

    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn list_orders(&self, caller: &Caller) -> Result<Vec<Order>, CheckoutError> {
        Ok(self.store.list_orders_for_user(caller.user_id).await?)
    }

    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn admin_list_orders(
        &self,
        caller: &Caller,
        filter: AdminOrderFilter,
    ) -> Result<Vec<Order>, CheckoutError> {
        require_privileged(caller)?;

        let limit = filter.limit.unwrap_or(self.config.default_page_size);
        if limit == 0 || limit > self.config.max_page_size {
            return Err(CheckoutError::invalid_input(format!(
                "limit must be between 1 and {}",
                self.config.max_page_size
            )));
        }

        Ok(self
            .store
            .list_orders(OrderQuery {
                status: filter.status,
                offset: filter.offset.unwrap_or(0),
                limit,
            })
            .await?)
    }

    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn admin_order_summary(&self, caller: &Caller) -> Result<OrderSummary, CheckoutError> {
        require_privileged(caller)?;
        Ok(self.store.order_summary().await?)
    }

    /// Apply an operator patch (status, tracking number, notes) to an order.
    #[instrument(skip(self, patch), fields(user_id = %caller.user_id, order_id = %order_id))]
    pub async fn admin_update_order(
        &self,
        caller: &Caller,
        order_id: OrderId,
        patch: OrderPatch,
    ) -> Result<Order, CheckoutError> {
        let result: Result<Order, CheckoutError> = async move {
            require_privileged(caller)?;
            let mut attempt = 0;
            loop {
                match self.try_update(order_id, &patch).await {
                    Err(CheckoutError::Conflict(reason))
                        if attempt < self.config.max_conflict_retries =>
                    {
                        attempt += 1;
                        warn!(attempt, reason = %reason, "order update conflicted; retrying");
                    }
                    other => return other,
                }
            }
        }
        .await;

        result.inspect_err(|e| log_failure("admin_update_order", e))
    }

    fn prepare(&self, caller: &Caller, request: CreateOrderRequest) -> Result<OrderDraft, CheckoutError> {
        self.config.pricing.validate_items(&request.items)?;

        let mut requested: BTreeMap<ProductId, i64> = BTreeMap::new();
        for item in &request.items {
            let total = requested.entry(item.product_id).or_insert(0);
            *total = total.checked_add(item.quantity).ok_or_else(|| {
                CheckoutError::invalid_input(format!(
                    "quantity for product {} is too large",
                    item.product_id
                ))
            })?;
        }

        let shipping_address = Address::parse(request.shipping_address)?;
        let billing_address = request.billing_address.map(Address::parse).transpose()?;
        let payment_reference = request
            .payment_reference
            .map(PaymentReference::parse)
            .transpose()?;

        Ok(OrderDraft {
            user_id: caller.user_id,
            items: request.items,
            requested,
            shipping_address,
            billing_address,
            payment_reference,
            notes: request.notes,
        })
    }

    async fn try_place(&self, draft: &OrderDraft) -> Result<Order, CheckoutError> {
        let mut uow = self.store.begin().await?;

        let ids: Vec<ProductId> = draft.requested.keys().copied().collect();
        let products = uow.lock_products(&ids).await?;
        let by_id: HashMap<ProductId, &Product> =
            products.iter().map(|p| (p.id_typed(), p)).collect();

        // Every check runs before the first mutation.
        for (&product_id, &quantity) in &draft.requested {
            let product = by_id
                .get(&product_id)
                .filter(|p| p.is_active())
                .ok_or_else(|| CheckoutError::not_found(format!("product {product_id}")))?;
            if !product.has_stock_for(quantity) {
                return Err(CheckoutError::InsufficientStock {
                    product_id,
                    product_name: product.name().to_string(),
                    requested: quantity,
                    available: product.stock_quantity(),
                });
            }
        }

        let quote = self.config.pricing.quote(&draft.items, &products)?;
        let items: Vec<OrderItem> = quote
            .lines
            .iter()
            .map(|line| OrderItem {
                id: OrderItemId::new(),
                product_id: line.product_id,
                product_name: line.name.clone(),
                product_image: by_id
                    .get(&line.product_id)
                    .and_then(|p| p.image_url())
                    .map(str::to_string),
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();

        let now = Utc::now();
        let mut order = Order::empty(OrderId::new());
        let events = order.handle(&OrderCommand::PlaceOrder(PlaceOrder {
            order_id: order.id_typed(),
            user_id: draft.user_id,
            order_number: OrderNumber::generate(now),
            items,
            pricing: quote.totals,
            shipping_address: draft.shipping_address.clone(),
            billing_address: draft.billing_address.clone(),
            payment_reference: draft.payment_reference.clone(),
            notes: draft.notes.clone(),
            occurred_at: now,
        }))?;

        if let Some(reference) = &draft.payment_reference {
            if uow.payment_reference_taken(reference).await? {
                return Err(CheckoutError::DuplicatePayment {
                    reference: reference.to_string(),
                });
            }
        }

        for (&product_id, &quantity) in &draft.requested {
            if let StockDecrement::Insufficient(shortfall) =
                uow.decrement_stock(product_id, quantity).await?
            {
                return Err(CheckoutError::InsufficientStock {
                    product_id,
                    product_name: by_id
                        .get(&product_id)
                        .map(|p| p.name().to_string())
                        .unwrap_or_default(),
                    requested: shortfall.requested,
                    available: shortfall.available,
                });
            }
        }

        for event in &events {
            order.apply(event);
        }
        let record = order.to_record()?;

        uow.insert_order(&record)
            .await
            .map_err(|e| map_insert_error(e, draft.payment_reference.as_ref()))?;
        uow.commit().await?;

        log_applied(record.id, &events);
        info!(
            order_id = %record.id,
            order_number = %record.order_number,
            total = %record.pricing.total,
            "order placed"
        );
        Ok(order)
    }

    async fn try_update(&self, order_id: OrderId, patch: &OrderPatch) -> Result<Order, CheckoutError> {
        let mut uow = self.store.begin().await?;
        let mut order = uow
            .lock_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found(format!("order {order_id}")))?;

        if patch.is_empty() {
            uow.rollback().await?;
            return Ok(order);
        }

        let expected = ExpectedVersion::Exact(order.version());
        let events = order.execute(&OrderCommand::UpdateOrder(UpdateOrder {
            order_id,
            patch: patch.clone(),
            occurred_at: Utc::now(),
        }))?;

        uow.save_order_state(&order.to_record()?, expected).await?;
        uow.commit().await?;

        log_applied(order_id, &events);
        info!(
            order_id = %order_id,
            status = %order.status(),
            version = order.version(),
            "order updated"
        );
        Ok(order)
    }
}

fn distinct_products(items: &[LineItem]) -> Vec<ProductId> {
    let mut ids: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
    ids.sort();
    ids.dedup();
    ids
}

fn require_privileged(caller: &Caller) -> Result<(), CheckoutError> {
    if caller.is_privileged {
        Ok(())
    } else {
        Err(CheckoutError::Forbidden)
    }
}

fn map_insert_error(err: StoreError, reference: Option<&PaymentReference>) -> CheckoutError {
    if let Some(reference) = reference {
        if err.is_unique_violation(PAYMENT_REFERENCE_CONSTRAINT) {
            return CheckoutError::DuplicatePayment {
                reference: reference.to_string(),
            };
        }
    }
    // A fresh order number is drawn on retry.
    if err.is_unique_violation(ORDER_NUMBER_CONSTRAINT) {
        return CheckoutError::Conflict("order number collision".to_string());
    }
    err.into()
}

fn log_applied(order_id: OrderId, events: &[OrderEvent]) {
    for event in events {
        debug!(
            order_id = %order_id,
            event_type = event.event_type(),
            event_version = event.version(),
            occurred_at = %event.occurred_at(),
            "order event committed"
        );
    }
}

fn log_failure(operation: &'static str, err: &CheckoutError) {
    match err {
        CheckoutError::Internal(_) => error!(operation, error = %err, "checkout operation failed"),
        _ => warn!(operation, code = err.code(), error = %err, "checkout request rejected"),
    }
}
