use chrono::{DateTime, Utc};

/// A domain event emitted by an aggregate.
///
/// Events are facts: immutable, versioned, and named with a stable
/// dotted identifier (e.g. "orders.order.status_changed").
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier.
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
