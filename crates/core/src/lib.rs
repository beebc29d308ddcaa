//! `storefront-core`: identifiers, errors, money and the aggregate traits
//! shared by the storefront domain crates. No I/O lives here.

pub mod aggregate;
pub mod error;
pub mod event;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use event::Event;
pub use id::{OrderId, OrderItemId, ProductId, UserId};
pub use money::{MAX_AMOUNT, checked_money, round_money, to_money};
pub use value_object::ValueObject;
