use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use storefront_catalog::Product;
use storefront_core::{ExpectedVersion, OrderId, ProductId, UserId};
use storefront_orders::{Order, OrderNumber, OrderRecord, PaymentReference};

use super::{
    CheckoutStore, ORDER_NUMBER_CONSTRAINT, OrderQuery, OrderSummary,
    PAYMENT_REFERENCE_CONSTRAINT, StockDecrement, UnitOfWork,
};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct State {
    products: BTreeMap<ProductId, Product>,
    orders: HashMap<OrderId, OrderRecord>,
    // Unique indexes; both columns are immutable once an order exists.
    order_numbers: HashSet<OrderNumber>,
    payment_references: HashSet<PaymentReference>,
}

impl State {
    fn newest_first<'a>(orders: impl Iterator<Item = &'a OrderRecord>) -> Vec<Order> {
        let mut records: Vec<&OrderRecord> = orders.collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        records.into_iter().cloned().map(Order::restore).collect()
    }

    fn index(&mut self, order: &OrderRecord) {
        self.order_numbers.insert(order.order_number.clone());
        if let Some(reference) = &order.payment_reference {
            self.payment_references.insert(reference.clone());
        }
    }
}

/// In-memory checkout store for tests and local runs.
///
/// Units of work are fully serialised: `begin` holds the state lock until
/// commit or drop. Writes are staged on copies of the rows a unit touches and
/// merged on commit, so a unit costs O(rows touched) regardless of history.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckoutStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryCheckoutStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckoutStore for InMemoryCheckoutStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(InMemoryUnitOfWork {
            guard,
            products: BTreeMap::new(),
            orders: HashMap::new(),
        }))
    }

    async fn save_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.products.insert(product.id_typed(), product.clone());
        Ok(())
    }

    async fn find_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.orders.get(&order_id).cloned().map(Order::restore))
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(State::newest_first(
            state.orders.values().filter(|o| o.user_id == user_id),
        ))
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        let matching = State::newest_first(
            state
                .orders
                .values()
                .filter(|o| query.status.is_none_or(|s| o.status == s)),
        );
        Ok(matching
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
            .collect())
    }

    async fn order_summary(&self) -> Result<OrderSummary, StoreError> {
        let state = self.state.lock().await;
        Ok(OrderSummary::from_status_totals(
            state
                .orders
                .values()
                .map(|o| (o.status, 1, o.pricing.total)),
        ))
    }
}

/// Holds the store lock; `products` and `orders` are staged rows.
struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    products: BTreeMap<ProductId, Product>,
    orders: HashMap<OrderId, OrderRecord>,
}

impl InMemoryUnitOfWork {
    fn product(&self, id: &ProductId) -> Option<&Product> {
        self.products.get(id).or_else(|| self.guard.products.get(id))
    }

    fn order(&self, id: &OrderId) -> Option<&OrderRecord> {
        self.orders.get(id).or_else(|| self.guard.orders.get(id))
    }

    fn order_number_taken(&self, number: &OrderNumber) -> bool {
        self.guard.order_numbers.contains(number)
            || self.orders.values().any(|o| &o.order_number == number)
    }

    fn reference_taken(&self, reference: &PaymentReference) -> bool {
        self.guard.payment_references.contains(reference)
            || self
                .orders
                .values()
                .any(|o| o.payment_reference.as_ref() == Some(reference))
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids.iter().filter_map(|id| self.product(id).cloned()).collect())
    }

    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<StockDecrement, StoreError> {
        let product = match self.products.entry(product_id) {
            Entry::Occupied(staged) => staged.into_mut(),
            Entry::Vacant(slot) => {
                let current = self.guard.products.get(&product_id).cloned().ok_or_else(|| {
                    StoreError::Database(format!("product {product_id} does not exist"))
                })?;
                slot.insert(current)
            }
        };
        Ok(match product.decrement_stock(quantity) {
            Ok(remaining) => StockDecrement::Applied { remaining },
            Err(shortfall) => StockDecrement::Insufficient(shortfall),
        })
    }

    async fn payment_reference_taken(
        &mut self,
        reference: &PaymentReference,
    ) -> Result<bool, StoreError> {
        Ok(self.reference_taken(reference))
    }

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<(), StoreError> {
        if self.order(&order.id).is_some() {
            return Err(StoreError::UniqueViolation {
                constraint: "orders_pkey".to_string(),
            });
        }
        if self.order_number_taken(&order.order_number) {
            return Err(StoreError::UniqueViolation {
                constraint: ORDER_NUMBER_CONSTRAINT.to_string(),
            });
        }
        if let Some(reference) = &order.payment_reference {
            if self.reference_taken(reference) {
                return Err(StoreError::UniqueViolation {
                    constraint: PAYMENT_REFERENCE_CONSTRAINT.to_string(),
                });
            }
        }
        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.order(&order_id).cloned().map(Order::restore))
    }

    async fn save_order_state(
        &mut self,
        order: &OrderRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut stored = self
            .order(&order.id)
            .cloned()
            .ok_or_else(|| StoreError::Conflict(format!("order {} vanished", order.id)))?;
        if !expected.matches(stored.version) {
            return Err(StoreError::Conflict(format!(
                "expected version {expected}, found {}",
                stored.version
            )));
        }
        stored.status = order.status;
        stored.tracking_number = order.tracking_number.clone();
        stored.notes = order.notes.clone();
        stored.paid_at = order.paid_at;
        stored.shipped_at = order.shipped_at;
        stored.delivered_at = order.delivered_at;
        stored.updated_at = order.updated_at;
        stored.version = order.version;
        self.orders.insert(order.id, stored);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryUnitOfWork {
            mut guard,
            products,
            orders,
        } = *self;
        guard.products.extend(products);
        for (id, order) in orders {
            guard.index(&order);
            guard.orders.insert(id, order);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
