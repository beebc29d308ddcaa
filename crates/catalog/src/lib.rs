//! Catalog collaborator surface consumed by checkout.
//!
//! The catalog owns products; checkout only reads price/name/image and
//! read-modifies the stock quantity through the rules in this crate.

pub mod product;

pub use product::{NewProduct, Product, StockShortfall};
