use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storefront_core::{
    Aggregate, AggregateRoot, DomainError, Event, OrderId, OrderItemId, ProductId, UserId,
    ValueObject,
};

use crate::address::Address;
use crate::error::OrderError;
use crate::pricing::PriceBreakdown;
use crate::status::OrderStatus;

const MAX_TRACKING_NUMBER_LEN: usize = 100;
const MAX_NOTES_LEN: usize = 2000;
const MAX_PAYMENT_REFERENCE_LEN: usize = 255;

/// Human-facing order number: `ORD-<yyyymmdd>-<8 uppercase hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generate a fresh order number for the given UTC day.
    ///
    /// Collisions are unlikely but possible; the storage unique constraint is
    /// what guarantees uniqueness.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        Self(format!("ORD-{}-{}", now.format("%Y%m%d"), suffix))
    }

    pub fn from_storage(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token correlating an order with an external payment authorization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentReference(String);

impl PaymentReference {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("payment reference cannot be empty"));
        }
        if trimmed.len() > MAX_PAYMENT_REFERENCE_LEN {
            return Err(DomainError::validation(format!(
                "payment reference exceeds {MAX_PAYMENT_REFERENCE_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of a purchased product, frozen at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_image: Option<String>,
    pub quantity: i64,
    /// Unit price charged at purchase time.
    pub unit_price: Decimal,
}

impl OrderItem {
    /// `None` when the product of price and quantity does not fit a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Persisted order state, used to rehydrate the aggregate from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_number: OrderNumber,
    pub pricing: PriceBreakdown,
    pub status: OrderStatus,
    pub payment_method: Option<String>,
    pub payment_reference: Option<PaymentReference>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub items: Vec<OrderItem>,
}

/// Aggregate root: Order (with its exclusively-owned items).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    id: OrderId,
    user_id: Option<UserId>,
    order_number: Option<OrderNumber>,
    #[serde(flatten)]
    pricing: PriceBreakdown,
    status: OrderStatus,
    payment_method: Option<String>,
    payment_reference: Option<PaymentReference>,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    notes: Option<String>,
    tracking_number: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    items: Vec<OrderItem>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-placed aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            user_id: None,
            order_number: None,
            pricing: PriceBreakdown::zero(),
            status: OrderStatus::Pending,
            payment_method: None,
            payment_reference: None,
            shipping_address: None,
            billing_address: None,
            notes: None,
            tracking_number: None,
            created_at: None,
            updated_at: None,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            items: Vec::new(),
            version: 0,
            created: false,
        }
    }

    /// Rehydrate a placed order from its stored row.
    pub fn restore(record: OrderRecord) -> Self {
        Self {
            id: record.id,
            user_id: Some(record.user_id),
            order_number: Some(record.order_number),
            pricing: record.pricing,
            status: record.status,
            payment_method: record.payment_method,
            payment_reference: record.payment_reference,
            shipping_address: Some(record.shipping_address),
            billing_address: Some(record.billing_address),
            notes: record.notes,
            tracking_number: record.tracking_number,
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
            paid_at: record.paid_at,
            shipped_at: record.shipped_at,
            delivered_at: record.delivered_at,
            items: record.items,
            version: record.version,
            created: true,
        }
    }

    /// Snapshot the placed order for persistence.
    pub fn to_record(&self) -> Result<OrderRecord, DomainError> {
        let missing = || DomainError::invariant("order has not been placed");
        Ok(OrderRecord {
            id: self.id,
            user_id: self.user_id.ok_or_else(missing)?,
            order_number: self.order_number.clone().ok_or_else(missing)?,
            pricing: self.pricing,
            status: self.status,
            payment_method: self.payment_method.clone(),
            payment_reference: self.payment_reference.clone(),
            shipping_address: self.shipping_address.clone().ok_or_else(missing)?,
            billing_address: self.billing_address.clone().ok_or_else(missing)?,
            notes: self.notes.clone(),
            tracking_number: self.tracking_number.clone(),
            created_at: self.created_at.ok_or_else(missing)?,
            updated_at: self.updated_at.ok_or_else(missing)?,
            paid_at: self.paid_at,
            shipped_at: self.shipped_at,
            delivered_at: self.delivered_at,
            version: self.version,
            items: self.items.clone(),
        })
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn is_placed(&self) -> bool {
        self.created
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == Some(user_id)
    }

    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    pub fn pricing(&self) -> &PriceBreakdown {
        &self.pricing
    }

    pub fn total_amount(&self) -> Decimal {
        self.pricing.total
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_method(&self) -> Option<&str> {
        self.payment_method.as_deref()
    }

    pub fn payment_reference(&self) -> Option<&PaymentReference> {
        self.payment_reference.as_ref()
    }

    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref()
    }

    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.as_ref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
///
/// Items carry snapshots built from freshly-read product rows; pricing must
/// already be computed from those same rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub order_number: OrderNumber,
    pub items: Vec<OrderItem>,
    pub pricing: PriceBreakdown,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_reference: Option<PaymentReference>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Explicit set of fields an operator may change after placement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.tracking_number.is_none() && self.notes.is_none()
    }
}

impl ValueObject for OrderPatch {}

/// Command: UpdateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrder {
    pub order_id: OrderId,
    pub patch: OrderPatch,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    UpdateOrder(UpdateOrder),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub order_number: OrderNumber,
    pub items: Vec<OrderItem>,
    pub pricing: PriceBreakdown,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: Option<String>,
    pub payment_reference: Option<PaymentReference>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TrackingNumberSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingNumberSet {
    pub order_id: OrderId,
    pub tracking_number: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: NotesUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesUpdated {
    pub order_id: OrderId,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    StatusChanged(StatusChanged),
    TrackingNumberSet(TrackingNumberSet),
    NotesUpdated(NotesUpdated),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::StatusChanged(_) => "orders.order.status_changed",
            OrderEvent::TrackingNumberSet(_) => "orders.order.tracking_number_set",
            OrderEvent::NotesUpdated(_) => "orders.order.notes_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::StatusChanged(e) => e.occurred_at,
            OrderEvent::TrackingNumberSet(e) => e.occurred_at,
            OrderEvent::NotesUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = OrderError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.user_id = Some(e.user_id);
                self.order_number = Some(e.order_number.clone());
                self.items = e.items.clone();
                self.pricing = e.pricing;
                self.shipping_address = Some(e.shipping_address.clone());
                self.billing_address = Some(e.billing_address.clone());
                self.payment_method = e.payment_method.clone();
                self.payment_reference = e.payment_reference.clone();
                self.notes = e.notes.clone();
                // Payment is authorized before placement.
                self.status = OrderStatus::Paid;
                self.paid_at = Some(e.occurred_at);
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                // Milestones are set once and never overwritten.
                let milestone = match e.to {
                    OrderStatus::Paid => Some(&mut self.paid_at),
                    OrderStatus::Shipped => Some(&mut self.shipped_at),
                    OrderStatus::Delivered => Some(&mut self.delivered_at),
                    _ => None,
                };
                if let Some(slot) = milestone {
                    slot.get_or_insert(e.occurred_at);
                }
                self.updated_at = Some(e.occurred_at);
            }
            OrderEvent::TrackingNumberSet(e) => {
                self.tracking_number = Some(e.tracking_number.clone());
                self.updated_at = Some(e.occurred_at);
            }
            OrderEvent::NotesUpdated(e) => {
                self.notes = Some(e.notes.clone());
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::UpdateOrder(cmd) => self.handle_update(cmd),
        }
    }
}

impl Order {
    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), OrderError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch").into());
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, OrderError> {
        if self.created {
            return Err(DomainError::conflict("order already exists").into());
        }
        self.ensure_order_id(cmd.order_id)?;

        if cmd.items.is_empty() {
            return Err(OrderError::validation("order must contain at least one item"));
        }
        if let Some(item) = cmd.items.iter().find(|i| i.quantity <= 0) {
            return Err(OrderError::validation(format!(
                "quantity for product {} must be positive",
                item.product_id
            )));
        }
        if !cmd.pricing.is_consistent() {
            return Err(DomainError::invariant(
                "total must equal subtotal + shipping + tax - discount",
            )
            .into());
        }
        let items_total = cmd.items.iter().try_fold(Decimal::ZERO, |sum, item| {
            item.line_total().and_then(|line| sum.checked_add(line))
        });
        if items_total != Some(cmd.pricing.subtotal) {
            return Err(DomainError::invariant("subtotal does not match order items").into());
        }
        let notes = cmd.notes.as_deref().map(validate_notes).transpose()?;

        let payment_method = cmd.payment_reference.as_ref().map(|_| "card".to_string());

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            user_id: cmd.user_id,
            order_number: cmd.order_number.clone(),
            items: cmd.items.clone(),
            pricing: cmd.pricing,
            shipping_address: cmd.shipping_address.clone(),
            billing_address: cmd
                .billing_address
                .clone()
                .unwrap_or_else(|| cmd.shipping_address.clone()),
            payment_method,
            payment_reference: cmd.payment_reference.clone(),
            notes,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateOrder) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.created {
            return Err(DomainError::not_found(format!("order {}", cmd.order_id)).into());
        }
        self.ensure_order_id(cmd.order_id)?;

        let patch = &cmd.patch;
        let mut events = Vec::new();

        if let Some(to) = patch.status {
            if !self.status.can_transition_to(to) {
                return Err(OrderError::InvalidTransition {
                    from: self.status,
                    to,
                });
            }
            events.push(OrderEvent::StatusChanged(StatusChanged {
                order_id: cmd.order_id,
                from: self.status,
                to,
                occurred_at: cmd.occurred_at,
            }));
        }

        if let Some(tracking) = patch.tracking_number.as_deref() {
            let tracking = tracking.trim();
            if tracking.is_empty() {
                return Err(OrderError::validation("tracking_number cannot be blank"));
            }
            if tracking.chars().count() > MAX_TRACKING_NUMBER_LEN {
                return Err(OrderError::validation(format!(
                    "tracking_number exceeds {MAX_TRACKING_NUMBER_LEN} characters"
                )));
            }
            events.push(OrderEvent::TrackingNumberSet(TrackingNumberSet {
                order_id: cmd.order_id,
                tracking_number: tracking.to_string(),
                occurred_at: cmd.occurred_at,
            }));
        }

        if let Some(notes) = patch.notes.as_deref() {
            events.push(OrderEvent::NotesUpdated(NotesUpdated {
                order_id: cmd.order_id,
                notes: validate_notes(notes)?,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }
}

fn validate_notes(notes: &str) -> Result<String, OrderError> {
    if notes.chars().count() > MAX_NOTES_LEN {
        return Err(OrderError::validation(format!(
            "notes exceed {MAX_NOTES_LEN} characters"
        )));
    }
    Ok(notes.to_string())
}
