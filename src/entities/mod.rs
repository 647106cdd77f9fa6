//! Domain entities stored by the repository

#[macro_use]
pub mod macros;

pub mod account;
pub mod transaction;

pub use account::{ACCOUNT_STATUSES, TradingAccount};
pub use transaction::{TRANSACTION_KINDS, TRANSACTION_STATUSES, Transaction};

use std::borrow::Cow;
use validator::ValidationError;

/// Currencies accounts and transactions may be denominated in
pub const CURRENCIES: &[&str] = &["USD", "EUR", "GBP", "JPY", "CHF", "AUD", "CAD"];

/// `Ok` when `value` is one of `allowed`, else an `enum` validation error
pub fn check_one_of(value: &str, allowed: &[&str]) -> Result<(), ValidationError> {
    if allowed.contains(&value) {
        return Ok(());
    }

    let mut error = ValidationError::new("enum");
    error.add_param(Cow::Borrowed("values"), &allowed);
    error.add_param(Cow::Borrowed("value"), &value);
    Err(error)
}
