//! Infrastructure layer: persistence, configuration and checkout orchestration.

pub mod checkout;
pub mod config;
pub mod error;
pub mod payment;
pub mod store;

mod integration_tests;

pub use checkout::{AdminOrderFilter, Caller, CheckoutQuote, CheckoutService, CreateOrderRequest, QuoteRequest};
pub use config::{AppConfig, CheckoutConfig, ConfigError, DatabaseConfig, ServerConfig};
pub use error::{CheckoutError, StoreError};
pub use payment::{PaymentAuthorization, PaymentAuthorizer, PlaceholderPaymentAuthorizer};
pub use store::{
    CheckoutStore, InMemoryCheckoutStore, OrderQuery, OrderSummary, PostgresCheckoutStore,
    StatusCount, StockDecrement, UnitOfWork,
};
