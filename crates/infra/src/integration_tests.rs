//! Integration tests for the checkout pipeline against the in-memory store.
//!
//! Tests: Request → CheckoutService → UnitOfWork → Store
//!
//! Verifies:
//! - Pricing matches the published policy
//! - Order creation is all-or-nothing and never oversells
//! - Payment references guard against double submission
//! - Status updates follow the transition table

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use storefront_catalog::{NewProduct, Product};
    use storefront_core::{AggregateRoot, OrderId, ProductId, UserId};
    use storefront_core::ExpectedVersion;
    use storefront_orders::{LineItem, Order, OrderPatch, OrderRecord, OrderStatus, PaymentReference};

    use crate::checkout::{AdminOrderFilter, Caller, CheckoutService, CreateOrderRequest, QuoteRequest};
    use crate::config::CheckoutConfig;
    use crate::error::{CheckoutError, StoreError};
    use crate::store::{
        CheckoutStore, InMemoryCheckoutStore, OrderQuery, OrderSummary, PAYMENT_REFERENCE_CONSTRAINT,
        StockDecrement, UnitOfWork,
    };

    type Service = CheckoutService<InMemoryCheckoutStore>;

    fn setup() -> (Arc<Service>, InMemoryCheckoutStore) {
        let store = InMemoryCheckoutStore::new();
        let service = Arc::new(CheckoutService::new(store.clone(), CheckoutConfig::default()));
        (service, store)
    }

    async fn seed<S: CheckoutStore>(
        service: &CheckoutService<S>,
        name: &str,
        price: Decimal,
        stock: i64,
    ) -> ProductId {
        let id = ProductId::new();
        service
            .register_product(NewProduct {
                id,
                name: name.to_string(),
                price,
                discount_price: None,
                stock_quantity: stock,
                image_url: Some(format!("/img/{id}.png")),
                is_active: true,
            })
            .await
            .unwrap();
        id
    }

    async fn stock_of(store: &InMemoryCheckoutStore, id: ProductId) -> i64 {
        store.find_products(&[id]).await.unwrap()[0].stock_quantity()
    }

    fn address() -> serde_json::Value {
        json!({"line1": "221B Baker Street", "city": "London", "postcode": "NW1 6XE"})
    }

    fn line(product_id: ProductId, quantity: i64) -> LineItem {
        LineItem {
            product_id,
            quantity,
        }
    }

    fn request(items: Vec<LineItem>) -> CreateOrderRequest {
        CreateOrderRequest {
            items,
            shipping_address: address(),
            billing_address: None,
            payment_reference: None,
            notes: None,
        }
    }

    fn status_patch(status: OrderStatus) -> OrderPatch {
        OrderPatch {
            status: Some(status),
            ..OrderPatch::default()
        }
    }

    #[tokio::test]
    async fn quote_prices_mixed_basket_with_free_shipping() {
        let (service, store) = setup();
        let a = seed(&service, "Teapot", dec!(50.00), 5).await;
        let b = seed(&service, "Kettle", dec!(60.00), 5).await;
        let buyer = Caller::customer(UserId::new());

        let quote = service
            .quote(
                &buyer,
                QuoteRequest {
                    items: vec![line(a, 1), line(b, 1)],
                    shipping_address: address(),
                },
            )
            .await
            .unwrap();

        assert_eq!(quote.quote.totals.subtotal, dec!(110.00));
        assert_eq!(quote.quote.totals.shipping, dec!(0.00));
        assert_eq!(quote.quote.totals.tax, dec!(8.80));
        assert_eq!(quote.quote.totals.total, dec!(118.80));
        assert!(quote.payment.payment_reference.starts_with("pi_"));
        assert_eq!(stock_of(&store, a).await, 5);
    }

    #[tokio::test]
    async fn quote_charges_flat_shipping_below_threshold() {
        let (service, _) = setup();
        let a = seed(&service, "Mug", dec!(30.00), 1).await;

        let quote = service
            .quote(
                &Caller::customer(UserId::new()),
                QuoteRequest {
                    items: vec![line(a, 1)],
                    shipping_address: address(),
                },
            )
            .await
            .unwrap();

        assert_eq!(quote.quote.totals.shipping, dec!(10.00));
        assert_eq!(quote.quote.totals.tax, dec!(2.40));
        assert_eq!(quote.quote.totals.total, dec!(42.40));
    }

    #[tokio::test]
    async fn quote_rejects_bad_input() {
        let (service, _) = setup();
        let a = seed(&service, "Mug", dec!(30.00), 1).await;
        let buyer = Caller::customer(UserId::new());

        let err = service
            .quote(
                &buyer,
                QuoteRequest {
                    items: vec![line(a, 0)],
                    shipping_address: address(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let err = service
            .quote(
                &buyer,
                QuoteRequest {
                    items: vec![line(ProductId::new(), 1)],
                    shipping_address: address(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");

        let err = service
            .quote(
                &buyer,
                QuoteRequest {
                    items: vec![line(a, 1)],
                    shipping_address: json!("nowhere"),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[tokio::test]
    async fn quote_with_extreme_quantities_is_invalid_input() {
        let (service, _) = setup();
        let a = seed(&service, "Grand Piano", dec!(99999999.99), 1).await;
        let buyer = Caller::customer(UserId::new());

        let err = service
            .quote(
                &buyer,
                QuoteRequest {
                    items: vec![line(a, i64::MAX); 100],
                    shipping_address: address(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[tokio::test]
    async fn create_order_decrements_stock_and_snapshots_items() {
        let (service, store) = setup();
        let a = seed(&service, "Teapot", dec!(50.00), 5).await;
        let b = seed(&service, "Kettle", dec!(60.00), 3).await;
        let buyer = Caller::customer(UserId::new());

        let order = service
            .create_order(&buyer, request(vec![line(a, 1), line(b, 2)]))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Paid);
        assert!(order.paid_at().is_some());
        assert!(order.order_number().unwrap().as_str().starts_with("ORD-"));
        assert_eq!(order.pricing().subtotal, dec!(170.00));
        assert_eq!(order.pricing().shipping, dec!(0.00));
        assert_eq!(order.pricing().tax, dec!(13.60));
        assert_eq!(order.total_amount(), dec!(183.60));
        assert_eq!(order.items().len(), 2);
        assert_eq!(order.billing_address(), order.shipping_address());
        assert_eq!(order.payment_method(), None);

        assert_eq!(stock_of(&store, a).await, 4);
        assert_eq!(stock_of(&store, b).await, 1);

        let fetched = service.get_order(&buyer, order.id_typed()).await.unwrap();
        assert_eq!(fetched, order);
    }

    #[tokio::test]
    async fn insufficient_stock_aborts_whole_order() {
        let (service, store) = setup();
        let a = seed(&service, "Teapot", dec!(50.00), 5).await;
        let b = seed(&service, "Kettle", dec!(60.00), 1).await;
        let buyer = Caller::customer(UserId::new());

        let err = service
            .create_order(&buyer, request(vec![line(a, 2), line(b, 2)]))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            CheckoutError::InsufficientStock {
                product_id: b,
                product_name: "Kettle".to_string(),
                requested: 2,
                available: 1,
            }
        );
        assert_eq!(stock_of(&store, a).await, 5);
        assert_eq!(stock_of(&store, b).await, 1);
        assert!(service.list_orders(&buyer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_lines_are_checked_against_combined_quantity() {
        let (service, store) = setup();
        let a = seed(&service, "Teapot", dec!(50.00), 3).await;
        let buyer = Caller::customer(UserId::new());

        let err = service
            .create_order(&buyer, request(vec![line(a, 2), line(a, 2)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InsufficientStock { requested: 4, available: 3, .. }
        ));
        assert_eq!(stock_of(&store, a).await, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_buyers_cannot_oversell_last_unit() {
        let (service, store) = setup();
        let a = seed(&service, "Last Lamp", dec!(80.00), 1).await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                let buyer = Caller::customer(UserId::new());
                service.create_order(&buyer, request(vec![line(a, 1)])).await
            }));
        }

        let mut placed = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => placed += 1,
                Err(CheckoutError::InsufficientStock { available: 0, .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!((placed, rejected), (1, 1));
        assert_eq!(stock_of(&store, a).await, 0);
    }

    #[tokio::test]
    async fn reused_payment_reference_is_rejected_without_stock_change() {
        let (service, store) = setup();
        let a = seed(&service, "Teapot", dec!(50.00), 5).await;
        let buyer = Caller::customer(UserId::new());

        let mut first = request(vec![line(a, 1)]);
        first.payment_reference = Some("pi_0123456789abcdef01234567".to_string());
        let order = service.create_order(&buyer, first.clone()).await.unwrap();
        assert_eq!(order.payment_method(), Some("card"));
        assert_eq!(stock_of(&store, a).await, 4);

        let err = service.create_order(&buyer, first).await.unwrap_err();
        assert_eq!(
            err,
            CheckoutError::DuplicatePayment {
                reference: "pi_0123456789abcdef01234567".to_string()
            }
        );
        assert_eq!(stock_of(&store, a).await, 4);
    }

    #[tokio::test]
    async fn unknown_or_inactive_products_are_not_found() {
        let (service, store) = setup();
        let buyer = Caller::customer(UserId::new());

        let err = service
            .create_order(&buyer, request(vec![line(ProductId::new(), 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");

        let retired = ProductId::new();
        service
            .register_product(NewProduct {
                id: retired,
                name: "Retired Vase".to_string(),
                price: dec!(15.00),
                discount_price: None,
                stock_quantity: 10,
                image_url: None,
                is_active: false,
            })
            .await
            .unwrap();
        let err = service
            .create_order(&buyer, request(vec![line(retired, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
        assert_eq!(stock_of(&store, retired).await, 10);
    }

    #[tokio::test]
    async fn invalid_requests_fail_before_any_mutation() {
        let (service, store) = setup();
        let a = seed(&service, "Teapot", dec!(50.00), 5).await;
        let buyer = Caller::customer(UserId::new());

        let err = service
            .create_order(&buyer, request(vec![line(a, -1)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let err = service.create_order(&buyer, request(vec![])).await.unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let mut bad_address = request(vec![line(a, 1)]);
        bad_address.shipping_address = json!({});
        let err = service.create_order(&buyer, bad_address).await.unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let mut long_notes = request(vec![line(a, 1)]);
        long_notes.notes = Some("x".repeat(2001));
        let err = service.create_order(&buyer, long_notes).await.unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        assert_eq!(stock_of(&store, a).await, 5);
    }

    #[tokio::test]
    async fn later_catalog_edits_do_not_change_history() {
        let (service, _) = setup();
        let a = seed(&service, "Teapot", dec!(50.00), 5).await;
        let buyer = Caller::customer(UserId::new());
        let order = service
            .create_order(&buyer, request(vec![line(a, 1)]))
            .await
            .unwrap();

        service
            .register_product(NewProduct {
                id: a,
                name: "Teapot (2027 edition)".to_string(),
                price: dec!(75.00),
                discount_price: None,
                stock_quantity: 4,
                image_url: None,
                is_active: true,
            })
            .await
            .unwrap();

        let fetched = service.get_order(&buyer, order.id_typed()).await.unwrap();
        let item = &fetched.items()[0];
        assert_eq!(item.product_name, "Teapot");
        assert_eq!(item.unit_price, dec!(50.00));
        assert_eq!(item.product_image, Some(format!("/img/{a}.png")));
    }

    #[tokio::test]
    async fn orders_are_scoped_to_their_owner() {
        let (service, _) = setup();
        let a = seed(&service, "Teapot", dec!(50.00), 5).await;
        let alice = Caller::customer(UserId::new());
        let bob = Caller::customer(UserId::new());

        let first = service
            .create_order(&alice, request(vec![line(a, 1)]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = service
            .create_order(&alice, request(vec![line(a, 1)]))
            .await
            .unwrap();

        let err = service.get_order(&bob, first.id_typed()).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
        let err = service.get_order(&alice, OrderId::new()).await.unwrap_err();
        assert_eq!(err.code(), "not_found");

        let mine: Vec<OrderId> = service
            .list_orders(&alice)
            .await
            .unwrap()
            .iter()
            .map(Order::id_typed)
            .collect();
        assert_eq!(mine, vec![second.id_typed(), first.id_typed()]);
        assert!(service.list_orders(&bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn shipping_timestamp_survives_reconfirmation() {
        let (service, _) = setup();
        let a = seed(&service, "Teapot", dec!(50.00), 5).await;
        let buyer = Caller::customer(UserId::new());
        let admin = Caller::admin(UserId::new());
        let order = service
            .create_order(&buyer, request(vec![line(a, 1)]))
            .await
            .unwrap();

        let shipped = service
            .admin_update_order(&admin, order.id_typed(), status_patch(OrderStatus::Shipped))
            .await
            .unwrap();
        let shipped_at = shipped.shipped_at();
        assert!(shipped_at.is_some());
        assert_eq!(shipped.status(), OrderStatus::Shipped);

        tokio::time::sleep(Duration::from_millis(2)).await;
        let again = service
            .admin_update_order(&admin, order.id_typed(), status_patch(OrderStatus::Shipped))
            .await
            .unwrap();
        assert_eq!(again.shipped_at(), shipped_at);
        assert!(again.version() > shipped.version());

        let delivered = service
            .admin_update_order(&admin, order.id_typed(), status_patch(OrderStatus::Delivered))
            .await
            .unwrap();
        assert!(delivered.delivered_at().is_some());

        let err = service
            .admin_update_order(&admin, order.id_typed(), status_patch(OrderStatus::Pending))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CheckoutError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Pending
            }
        );

        let current = service.get_order(&buyer, order.id_typed()).await.unwrap();
        assert_eq!(current, delivered);
    }

    #[tokio::test]
    async fn tracking_and_notes_update_without_status_change() {
        let (service, _) = setup();
        let a = seed(&service, "Teapot", dec!(50.00), 5).await;
        let buyer = Caller::customer(UserId::new());
        let admin = Caller::admin(UserId::new());
        let order = service
            .create_order(&buyer, request(vec![line(a, 1)]))
            .await
            .unwrap();

        let updated = service
            .admin_update_order(
                &admin,
                order.id_typed(),
                OrderPatch {
                    status: None,
                    tracking_number: Some("1Z999AA10123456784".to_string()),
                    notes: Some("fragile".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status(), OrderStatus::Paid);
        assert_eq!(updated.tracking_number(), Some("1Z999AA10123456784"));
        assert_eq!(updated.notes(), Some("fragile"));

        let unchanged = service
            .admin_update_order(&admin, order.id_typed(), OrderPatch::default())
            .await
            .unwrap();
        assert_eq!(unchanged, updated);

        let err = service
            .admin_update_order(
                &admin,
                order.id_typed(),
                OrderPatch {
                    tracking_number: Some("T".repeat(101)),
                    ..OrderPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[tokio::test]
    async fn admin_operations_require_privilege() {
        let (service, _) = setup();
        let buyer = Caller::customer(UserId::new());

        let err = service
            .admin_list_orders(&buyer, AdminOrderFilter::default())
            .await
            .unwrap_err();
        assert_eq!(err, CheckoutError::Forbidden);
        let err = service
            .admin_update_order(&buyer, OrderId::new(), status_patch(OrderStatus::Shipped))
            .await
            .unwrap_err();
        assert_eq!(err, CheckoutError::Forbidden);
        let err = service.admin_order_summary(&buyer).await.unwrap_err();
        assert_eq!(err, CheckoutError::Forbidden);

        let err = service
            .admin_update_order(
                &Caller::admin(UserId::new()),
                OrderId::new(),
                status_patch(OrderStatus::Shipped),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn admin_listing_filters_and_pages() {
        let (service, _) = setup();
        let a = seed(&service, "Teapot", dec!(50.00), 10).await;
        let admin = Caller::admin(UserId::new());

        let mut ids = Vec::new();
        for _ in 0..3 {
            let buyer = Caller::customer(UserId::new());
            let order = service
                .create_order(&buyer, request(vec![line(a, 1)]))
                .await
                .unwrap();
            ids.push(order.id_typed());
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        service
            .admin_update_order(&admin, ids[0], status_patch(OrderStatus::Cancelled))
            .await
            .unwrap();

        let page = service
            .admin_list_orders(
                &admin,
                AdminOrderFilter {
                    status: None,
                    offset: Some(1),
                    limit: Some(1),
                },
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id_typed(), ids[1]);

        let cancelled = service
            .admin_list_orders(
                &admin,
                AdminOrderFilter {
                    status: Some(OrderStatus::Cancelled),
                    ..AdminOrderFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id_typed(), ids[0]);

        for limit in [0, 101] {
            let err = service
                .admin_list_orders(
                    &admin,
                    AdminOrderFilter {
                        limit: Some(limit),
                        ..AdminOrderFilter::default()
                    },
                )
                .await
                .unwrap_err();
            assert_eq!(err.code(), "invalid_input");
        }

        let summary: OrderSummary = service.admin_order_summary(&admin).await.unwrap();
        assert_eq!(summary.total_orders, 3);
        // 50.00 + 10.00 shipping + 4.00 tax, twice; the cancelled order is excluded.
        assert_eq!(summary.revenue, dec!(128.00));
    }

    /// Store whose first `failures` units of work fail with a write conflict.
    struct FlakyStore {
        inner: InMemoryCheckoutStore,
        failures: AtomicU32,
    }

    #[async_trait]
    impl CheckoutStore for FlakyStore {
        async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Conflict("could not serialize access".to_string()));
            }
            self.inner.begin().await
        }

        async fn save_product(&self, product: &Product) -> Result<(), StoreError> {
            self.inner.save_product(product).await
        }

        async fn find_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
            self.inner.find_products(ids).await
        }

        async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.find_order(order_id).await
        }

        async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
            self.inner.list_orders_for_user(user_id).await
        }

        async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>, StoreError> {
            self.inner.list_orders(query).await
        }

        async fn order_summary(&self) -> Result<OrderSummary, StoreError> {
            self.inner.order_summary().await
        }
    }

    #[tokio::test]
    async fn transient_conflicts_are_retried_then_surfaced() {
        let inner = InMemoryCheckoutStore::new();
        let service = CheckoutService::new(
            FlakyStore {
                inner: inner.clone(),
                failures: AtomicU32::new(2),
            },
            CheckoutConfig::default(),
        );
        let a = seed(&service, "Teapot", dec!(50.00), 5).await;
        let buyer = Caller::customer(UserId::new());

        service
            .create_order(&buyer, request(vec![line(a, 1)]))
            .await
            .unwrap();
        assert_eq!(stock_of(&inner, a).await, 4);

        let service = CheckoutService::new(
            FlakyStore {
                inner: inner.clone(),
                failures: AtomicU32::new(10),
            },
            CheckoutConfig::default(),
        );
        let err = service
            .create_order(&buyer, request(vec![line(a, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert_eq!(stock_of(&inner, a).await, 4);
    }

    /// Store whose units of work fail on `insert_order`, after stock has
    /// already been decremented inside the same unit.
    struct FailingInsertStore {
        inner: InMemoryCheckoutStore,
        error: StoreError,
        decremented: Arc<AtomicU32>,
    }

    impl FailingInsertStore {
        fn new(inner: InMemoryCheckoutStore, error: StoreError) -> Self {
            Self {
                inner,
                error,
                decremented: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    struct FailingInsertUnit {
        inner: Box<dyn UnitOfWork>,
        error: StoreError,
        decremented: Arc<AtomicU32>,
    }

    #[async_trait]
    impl UnitOfWork for FailingInsertUnit {
        async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
            self.inner.lock_products(ids).await
        }

        async fn decrement_stock(
            &mut self,
            product_id: ProductId,
            quantity: i64,
        ) -> Result<StockDecrement, StoreError> {
            let outcome = self.inner.decrement_stock(product_id, quantity).await?;
            if matches!(outcome, StockDecrement::Applied { .. }) {
                self.decremented.fetch_add(1, Ordering::SeqCst);
            }
            Ok(outcome)
        }

        async fn payment_reference_taken(
            &mut self,
            reference: &PaymentReference,
        ) -> Result<bool, StoreError> {
            self.inner.payment_reference_taken(reference).await
        }

        async fn insert_order(&mut self, _order: &OrderRecord) -> Result<(), StoreError> {
            Err(self.error.clone())
        }

        async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.lock_order(order_id).await
        }

        async fn save_order_state(
            &mut self,
            order: &OrderRecord,
            expected: ExpectedVersion,
        ) -> Result<(), StoreError> {
            self.inner.save_order_state(order, expected).await
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            self.inner.commit().await
        }

        async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
            self.inner.rollback().await
        }
    }

    #[async_trait]
    impl CheckoutStore for FailingInsertStore {
        async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
            Ok(Box::new(FailingInsertUnit {
                inner: self.inner.begin().await?,
                error: self.error.clone(),
                decremented: self.decremented.clone(),
            }))
        }

        async fn save_product(&self, product: &Product) -> Result<(), StoreError> {
            self.inner.save_product(product).await
        }

        async fn find_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
            self.inner.find_products(ids).await
        }

        async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.find_order(order_id).await
        }

        async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
            self.inner.list_orders_for_user(user_id).await
        }

        async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>, StoreError> {
            self.inner.list_orders(query).await
        }

        async fn order_summary(&self) -> Result<OrderSummary, StoreError> {
            self.inner.order_summary().await
        }
    }

    #[tokio::test]
    async fn insert_failure_after_decrement_rolls_back_stock() {
        let inner = InMemoryCheckoutStore::new();
        let store = Arc::new(FailingInsertStore::new(
            inner.clone(),
            StoreError::Database("connection reset".to_string()),
        ));
        let service = CheckoutService::new(store.clone(), CheckoutConfig::default());
        let a = seed(&service, "Teapot", dec!(50.00), 5).await;
        let b = seed(&service, "Kettle", dec!(60.00), 2).await;
        let buyer = Caller::customer(UserId::new());

        let err = service
            .create_order(&buyer, request(vec![line(a, 2), line(b, 1)]))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Internal(_)), "got {err:?}");
        assert_eq!(store.decremented.load(Ordering::SeqCst), 2);
        assert_eq!(stock_of(&inner, a).await, 5);
        assert_eq!(stock_of(&inner, b).await, 2);
        assert!(service.list_orders(&buyer).await.unwrap().is_empty());
        assert_eq!(inner.order_summary().await.unwrap().total_orders, 0);
    }

    #[tokio::test]
    async fn racing_payment_reference_surfaces_as_duplicate_payment() {
        let inner = InMemoryCheckoutStore::new();
        let store = Arc::new(FailingInsertStore::new(
            inner.clone(),
            StoreError::UniqueViolation {
                constraint: PAYMENT_REFERENCE_CONSTRAINT.to_string(),
            },
        ));
        let service = CheckoutService::new(store.clone(), CheckoutConfig::default());
        let a = seed(&service, "Teapot", dec!(50.00), 5).await;
        let buyer = Caller::customer(UserId::new());

        let mut req = request(vec![line(a, 3)]);
        req.payment_reference = Some("pi_raced".to_string());
        let err = service.create_order(&buyer, req).await.unwrap_err();

        assert_eq!(
            err,
            CheckoutError::DuplicatePayment {
                reference: "pi_raced".to_string()
            }
        );
        assert_eq!(store.decremented.load(Ordering::SeqCst), 1);
        assert_eq!(stock_of(&inner, a).await, 5);
        assert!(service.list_orders(&buyer).await.unwrap().is_empty());
    }
}
