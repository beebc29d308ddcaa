use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use storefront_core::{OrderId, OrderItemId, ProductId, UserId};
use storefront_infra::{CheckoutQuote, CreateOrderRequest, QuoteRequest};
use storefront_orders::{LineItem, Order, OrderItem, OrderPatch, OrderStatus, PricedLine};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LineItemBody {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl From<LineItemBody> for LineItem {
    fn from(body: LineItemBody) -> Self {
        LineItem {
            product_id: body.product_id,
            quantity: body.quantity,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteBody {
    pub items: Vec<LineItemBody>,
    pub shipping_address: JsonValue,
}

impl From<QuoteBody> for QuoteRequest {
    fn from(body: QuoteBody) -> Self {
        QuoteRequest {
            items: body.items.into_iter().map(LineItem::from).collect(),
            shipping_address: body.shipping_address,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    pub items: Vec<LineItemBody>,
    pub shipping_address: JsonValue,
    pub billing_address: Option<JsonValue>,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
}

impl From<CreateOrderBody> for CreateOrderRequest {
    fn from(body: CreateOrderBody) -> Self {
        CreateOrderRequest {
            items: body.items.into_iter().map(LineItem::from).collect(),
            shipping_address: body.shipping_address,
            billing_address: body.billing_address,
            payment_reference: body.payment_reference,
            notes: body.notes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderBody {
    pub status: Option<String>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
}

impl UpdateOrderBody {
    pub fn into_patch(self) -> Result<OrderPatch, String> {
        let status = self
            .status
            .map(|s| s.parse::<OrderStatus>())
            .transpose()
            .map_err(|e| e.to_string())?;
        Ok(OrderPatch {
            status,
            tracking_number: self.tracking_number,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    pub status: Option<String>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct QuoteLineResponse {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<&PricedLine> for QuoteLineResponse {
    fn from(line: &PricedLine) -> Self {
        Self {
            product_id: line.product_id,
            name: line.name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub payment_reference: String,
    pub client_secret: String,
    pub lines: Vec<QuoteLineResponse>,
}

impl From<CheckoutQuote> for QuoteResponse {
    fn from(q: CheckoutQuote) -> Self {
        let totals = q.quote.totals;
        Self {
            subtotal: totals.subtotal,
            discount: totals.discount,
            shipping: totals.shipping,
            tax: totals.tax,
            total: totals.total,
            payment_reference: q.payment.payment_reference,
            client_secret: q.payment.client_secret,
            lines: q.quote.lines.iter().map(QuoteLineResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_image: Option<String>,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub line_total: Option<Decimal>,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            product_image: item.product_image.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total().map(storefront_core::to_money),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub order_number: Option<String>,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub shipping_cost: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub shipping_address: Option<JsonValue>,
    pub billing_address: Option<JsonValue>,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItemResponse>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        let pricing = order.pricing();
        Self {
            id: order.id_typed(),
            user_id: order.user_id(),
            order_number: order.order_number().map(|n| n.as_str().to_string()),
            status: order.status(),
            subtotal: pricing.subtotal,
            discount_amount: pricing.discount,
            shipping_cost: pricing.shipping,
            tax_amount: pricing.tax,
            total_amount: pricing.total,
            payment_method: order.payment_method().map(str::to_string),
            payment_reference: order.payment_reference().map(|r| r.as_str().to_string()),
            shipping_address: order.shipping_address().map(|a| a.to_value()),
            billing_address: order.billing_address().map(|a| a.to_value()),
            notes: order.notes().map(str::to_string),
            tracking_number: order.tracking_number().map(str::to_string),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
            paid_at: order.paid_at(),
            shipped_at: order.shipped_at(),
            delivered_at: order.delivered_at(),
            items: order.items().iter().map(OrderItemResponse::from).collect(),
        }
    }
}
