//! Orders domain module: pricing, the order aggregate, and its status lifecycle.
//!
//! This crate contains business rules only (no IO, no HTTP, no storage).
//! Persistence and transactions live in `storefront-infra`.

pub mod address;
pub mod error;
pub mod order;
pub mod pricing;
pub mod status;

pub use address::Address;
pub use error::OrderError;
pub use order::{
    NotesUpdated, Order, OrderCommand, OrderEvent, OrderItem, OrderNumber, OrderPatch,
    OrderPlaced, OrderRecord, PaymentReference, PlaceOrder, StatusChanged, TrackingNumberSet,
    UpdateOrder,
};
pub use pricing::{LineItem, PriceBreakdown, PricedLine, PricingError, PricingPolicy, Quote};
pub use status::OrderStatus;
