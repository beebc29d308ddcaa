//! Postgres-backed checkout store.
//!
//! Order creation runs at `REPEATABLE READ` and takes `FOR UPDATE` locks on the
//! product rows it reads, in ascending id order. Concurrent buyers of the same
//! product therefore serialise on the row lock; a writer that loses the race
//! after the snapshot was taken gets SQLSTATE `40001`, which surfaces as
//! [`StoreError::Conflict`] and is retried by the service with a fresh
//! transaction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use storefront_catalog::{NewProduct, Product, StockShortfall};
use storefront_core::{ExpectedVersion, OrderId, OrderItemId, ProductId, UserId};
use storefront_orders::{
    Address, Order, OrderItem, OrderNumber, OrderRecord, OrderStatus, PaymentReference,
    PriceBreakdown,
};

use super::{CheckoutStore, OrderQuery, OrderSummary, StockDecrement, UnitOfWork};
use crate::error::StoreError;

/// Idempotent schema for the checkout tables.
pub const SCHEMA: &str = include_str!("../../migrations/0001_checkout.sql");

const PRODUCT_COLUMNS: &str =
    "id, name, price, discount_price, stock_quantity, image_url, is_active";

const ORDER_COLUMNS: &str = "id, user_id, order_number, subtotal, discount_amount, tax_amount, \
     shipping_cost, total_amount, status, payment_method, payment_reference, shipping_address, \
     billing_address, notes, tracking_number, created_at, updated_at, paid_at, shipped_at, \
     delivered_at, version";

#[derive(Debug, Clone)]
pub struct PostgresCheckoutStore {
    pool: Arc<PgPool>,
}

impl PostgresCheckoutStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a connection pool.
    #[instrument(skip(url), err)]
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the checkout schema (idempotent).
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, StoreError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))
    }
}

#[async_trait]
impl CheckoutStore for PostgresCheckoutStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }

    #[instrument(skip(self, product), fields(product_id = %product.id_typed()), err)]
    async fn save_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price, discount_price, stock_quantity, image_url, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price = EXCLUDED.price,
                discount_price = EXCLUDED.discount_price,
                stock_quantity = EXCLUDED.stock_quantity,
                image_url = EXCLUDED.image_url,
                is_active = EXCLUDED.is_active,
                updated_at = now()
            "#,
        )
        .bind(*product.id_typed().as_uuid())
        .bind(product.name())
        .bind(product.price())
        .bind(product.discount_price())
        .bind(product.stock_quantity())
        .bind(product.image_url())
        .bind(product.is_active())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_product", e))?;
        Ok(())
    }

    async fn find_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let mut conn = self.acquire().await?;
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(*order_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("find_order", e))?;

        match row {
            Some(row) => Ok(hydrate_orders(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.acquire().await?;
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(*user_id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_orders_for_user", e))?;

        hydrate_orders(&mut conn, rows).await
    }

    #[instrument(skip(self), err)]
    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.acquire().await?;
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            OFFSET $2 LIMIT $3
            "#
        ))
        .bind(query.status.map(OrderStatus::as_str))
        .bind(to_i64(query.offset))
        .bind(to_i64(query.limit))
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        hydrate_orders(&mut conn, rows).await
    }

    #[instrument(skip(self), err)]
    async fn order_summary(&self) -> Result<OrderSummary, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS order_count, COALESCE(SUM(total_amount), 0) AS amount
            FROM orders
            GROUP BY status
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("order_summary", e))?;

        let mut totals = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.try_get("status").map_err(corrupt)?;
            let status: OrderStatus = status
                .parse()
                .map_err(|e| StoreError::corrupt(format!("orders.status: {e}")))?;
            let count: i64 = row.try_get("order_count").map_err(corrupt)?;
            let amount: Decimal = row.try_get("amount").map_err(corrupt)?;
            totals.push((status, to_u64(count)?, amount));
        }
        Ok(OrderSummary::from_status_totals(totals))
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    #[instrument(skip(self), err)]
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let mut ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        ids.sort();
        ids.dedup();

        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<StockDecrement, StoreError> {
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity - $2, updated_at = now()
            WHERE id = $1 AND stock_quantity >= $2 AND $2 > 0
            RETURNING stock_quantity
            "#,
        )
        .bind(*product_id.as_uuid())
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("decrement_stock", e))?;

        if let Some(remaining) = remaining {
            return Ok(StockDecrement::Applied { remaining });
        }

        let available: Option<i64> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
                .bind(*product_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("decrement_stock", e))?;

        match available {
            Some(available) => Ok(StockDecrement::Insufficient(StockShortfall {
                requested: quantity,
                available,
            })),
            None => Err(StoreError::Database(format!(
                "product {product_id} does not exist"
            ))),
        }
    }

    async fn payment_reference_taken(
        &mut self,
        reference: &PaymentReference,
    ) -> Result<bool, StoreError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE payment_reference = $1)")
            .bind(reference.as_str())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("payment_reference_taken", e))
    }

    #[instrument(
        skip(self, order),
        fields(order_id = %order.id, order_number = %order.order_number, item_count = order.items.len()),
        err
    )]
    async fn insert_order(&mut self, order: &OrderRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, order_number, subtotal, discount_amount, tax_amount,
                shipping_cost, total_amount, status, payment_method, payment_reference,
                shipping_address, billing_address, notes, tracking_number, created_at,
                updated_at, paid_at, shipped_at, delivered_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21)
            "#,
        )
        .bind(*order.id.as_uuid())
        .bind(*order.user_id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(order.pricing.subtotal)
        .bind(order.pricing.discount)
        .bind(order.pricing.tax)
        .bind(order.pricing.shipping)
        .bind(order.pricing.total)
        .bind(order.status.as_str())
        .bind(order.payment_method.as_deref())
        .bind(order.payment_reference.as_ref().map(PaymentReference::as_str))
        .bind(order.shipping_address.to_value())
        .bind(order.billing_address.to_value())
        .bind(order.notes.as_deref())
        .bind(order.tracking_number.as_deref())
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.paid_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(to_i64(order.version))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, product_id, product_name, product_image, quantity, unit_price
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(*item.id.as_uuid())
            .bind(*order.id.as_uuid())
            .bind(*item.product_id.as_uuid())
            .bind(item.product_name.as_str())
            .bind(item.product_image.as_deref())
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        }

        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(*order_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_order", e))?;

        match row {
            Some(row) => Ok(hydrate_orders(&mut self.tx, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, order), fields(order_id = %order.id, version = order.version), err)]
    async fn save_order_state(
        &mut self,
        order: &OrderRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let expected_version = match expected {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(v) => Some(to_i64(v)),
        };

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, tracking_number = $3, notes = $4, paid_at = $5,
                shipped_at = $6, delivered_at = $7, updated_at = $8, version = $9
            WHERE id = $1 AND ($10::bigint IS NULL OR version = $10)
            "#,
        )
        .bind(*order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.tracking_number.as_deref())
        .bind(order.notes.as_deref())
        .bind(order.paid_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.updated_at)
        .bind(to_i64(order.version))
        .bind(expected_version)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_order_state", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "order {} changed concurrently (expected version {expected})",
                order.id
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgUnitOfWork { tx } = *self;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgUnitOfWork { tx } = *self;
        tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Attach items to order rows, preserving row order.
async fn hydrate_orders(
    conn: &mut PgConnection,
    rows: Vec<PgRow>,
) -> Result<Vec<Order>, StoreError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids = rows
        .iter()
        .map(|row| row.try_get::<Uuid, _>("id").map_err(corrupt))
        .collect::<Result<Vec<_>, _>>()?;

    let item_rows = sqlx::query(
        r#"
        SELECT id, order_id, product_id, product_name, product_image, quantity, unit_price
        FROM order_items
        WHERE order_id = ANY($1)
        ORDER BY order_id, id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_order_items", e))?;

    let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in &item_rows {
        let order_id: Uuid = row.try_get("order_id").map_err(corrupt)?;
        items.entry(order_id).or_default().push(OrderItem {
            id: OrderItemId::from_uuid(row.try_get("id").map_err(corrupt)?),
            product_id: ProductId::from_uuid(row.try_get("product_id").map_err(corrupt)?),
            product_name: row.try_get("product_name").map_err(corrupt)?,
            product_image: row.try_get("product_image").map_err(corrupt)?,
            quantity: row.try_get("quantity").map_err(corrupt)?,
            unit_price: row.try_get("unit_price").map_err(corrupt)?,
        });
    }

    rows.iter()
        .zip(ids)
        .map(|(row, id)| {
            let record = order_record_from_row(row, items.remove(&id).unwrap_or_default())?;
            Ok(Order::restore(record))
        })
        .collect()
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product::from_storage(NewProduct {
        id: ProductId::from_uuid(row.try_get("id").map_err(corrupt)?),
        name: row.try_get("name").map_err(corrupt)?,
        price: row.try_get("price").map_err(corrupt)?,
        discount_price: row.try_get("discount_price").map_err(corrupt)?,
        stock_quantity: row.try_get("stock_quantity").map_err(corrupt)?,
        image_url: row.try_get("image_url").map_err(corrupt)?,
        is_active: row.try_get("is_active").map_err(corrupt)?,
    }))
}

fn order_record_from_row(row: &PgRow, items: Vec<OrderItem>) -> Result<OrderRecord, StoreError> {
    let status: String = row.try_get("status").map_err(corrupt)?;
    let payment_reference: Option<String> = row.try_get("payment_reference").map_err(corrupt)?;
    let shipping_address: JsonValue = row.try_get("shipping_address").map_err(corrupt)?;
    let billing_address: JsonValue = row.try_get("billing_address").map_err(corrupt)?;
    let version: i64 = row.try_get("version").map_err(corrupt)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(corrupt)?;

    Ok(OrderRecord {
        id: OrderId::from_uuid(row.try_get("id").map_err(corrupt)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(corrupt)?),
        order_number: OrderNumber::from_storage(row.try_get("order_number").map_err(corrupt)?),
        pricing: PriceBreakdown {
            subtotal: row.try_get("subtotal").map_err(corrupt)?,
            discount: row.try_get("discount_amount").map_err(corrupt)?,
            shipping: row.try_get("shipping_cost").map_err(corrupt)?,
            tax: row.try_get("tax_amount").map_err(corrupt)?,
            total: row.try_get("total_amount").map_err(corrupt)?,
        },
        status: status
            .parse()
            .map_err(|e| StoreError::corrupt(format!("orders.status: {e}")))?,
        payment_method: row.try_get("payment_method").map_err(corrupt)?,
        payment_reference: payment_reference
            .map(PaymentReference::parse)
            .transpose()
            .map_err(|e| StoreError::corrupt(format!("orders.payment_reference: {e}")))?,
        shipping_address: Address::parse(shipping_address)
            .map_err(|e| StoreError::corrupt(format!("orders.shipping_address: {e}")))?,
        billing_address: Address::parse(billing_address)
            .map_err(|e| StoreError::corrupt(format!("orders.billing_address: {e}")))?,
        notes: row.try_get("notes").map_err(corrupt)?,
        tracking_number: row.try_get("tracking_number").map_err(corrupt)?,
        created_at,
        updated_at: row.try_get("updated_at").map_err(corrupt)?,
        paid_at: row.try_get("paid_at").map_err(corrupt)?,
        shipped_at: row.try_get("shipped_at").map_err(corrupt)?,
        delivered_at: row.try_get("delivered_at").map_err(corrupt)?,
        version: to_u64(version)?,
        items,
    })
}

fn corrupt(err: sqlx::Error) -> StoreError {
    StoreError::corrupt(err.to_string())
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::corrupt(format!("negative counter: {value}")))
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation
                Some("23505") => StoreError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                },
                // Serialization failure / deadlock detected
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}
