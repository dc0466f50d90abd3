// Platform services (master database)
pub mod catalog;
pub mod tenants;
pub mod users;

// Store inventory
pub mod inventory;
pub mod pos_mappings;
pub mod products;
pub mod purchase_orders;

// Shelf counts
pub mod audits;

// Selling
pub mod campaigns;
pub mod customers;
pub mod orders;
pub mod sales;
pub mod shop;

// Purchasing and finance
pub mod expenses;
pub mod invoices;
pub mod reports;
pub mod vendors;

// Store configuration
pub mod settings;

// Supplier-side quoting workspace
pub mod supplier_quotes;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Rounds a money amount to cents
pub(crate) fn money(value: Decimal) -> Decimal {
    value.round_dp(2)
}

pub(crate) fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

pub(crate) fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

/// Percentage of `part` in `whole`, 0 when `whole` is 0
pub(crate) fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        (part / whole * Decimal::ONE_HUNDRED).round_dp(2)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn percent_of_handles_zero_base() {
        assert_eq!(percent_of(dec!(5), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(percent_of(dec!(25), dec!(200)), dec!(12.50));
    }
}
