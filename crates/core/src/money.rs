//! Currency arithmetic helpers.
//!
//! Amounts are `Decimal` values in the store currency with two fractional
//! digits at rest.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits kept for stored amounts.
pub const MONEY_SCALE: u32 = 2;

/// Largest amount a `NUMERIC(10,2)` column holds: 99 999 999.99.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, MONEY_SCALE);

/// `amount` as money when it fits the stored range, `None` otherwise.
pub fn checked_money(amount: Decimal) -> Option<Decimal> {
    let money = to_money(amount);
    (money.abs() <= MAX_AMOUNT).then_some(money)
}

/// Round an amount to the currency scale (midpoint away from zero).
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Round and normalise the scale so `10` and `10.00` serialise identically.
pub fn to_money(amount: Decimal) -> Decimal {
    let mut rounded = round_money(amount);
    rounded.rescale(MONEY_SCALE);
    rounded
}
