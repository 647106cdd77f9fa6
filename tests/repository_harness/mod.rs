//! Shared test harness for repository testing against any document store
//!
//! Provides seed data helpers and the `repository_tests!` macro, which
//! generates the full repository contract suite for a store factory.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod repository_harness;
//! use repository_harness::*;
//!
//! repository_tests!(accounts: account_store(), transactions: transaction_store());
//! ```

#![allow(dead_code)]

#[macro_use]
pub mod contract_tests;

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use mongodb::bson::DateTime as BsonDateTime;
use mongodb::bson::oid::ObjectId;

use tradebook::core::repository::Repository;
use tradebook::entities::{TradingAccount, Transaction};
use tradebook::storage::DocumentStore;

/// Kinds cycled through by [`sample_transaction`]
pub const SAMPLE_KINDS: [&str; 3] = ["fee", "deposit", "withdrawal"];

/// Noon UTC on the given day
pub fn noon(year: i32, month: u32, day: u32) -> BsonDateTime {
    let millis = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .expect("valid calendar date");
    BsonDateTime::from_millis(millis)
}

/// The `n`-th sample transaction (1-based).
///
/// - `amount`: `n * 10`
/// - `kind`: `SAMPLE_KINDS[n % 3]`
/// - `status`: `completed` for even `n`, `pending` otherwise
/// - `reference`: `REF-00n`
/// - `createdAt`: noon on 2024-03-`n`, rolling into April past the 31st
pub fn sample_transaction(account: ObjectId, n: usize) -> Transaction {
    let created = NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date")
        + Duration::days(n as i64 - 1);
    let created_at = created
        .and_hms_opt(12, 0, 0)
        .map(|dt| BsonDateTime::from_millis(dt.and_utc().timestamp_millis()))
        .expect("valid time");

    Transaction::new(account, SAMPLE_KINDS[n % 3], n as f64 * 10.0, "USD")
        .with_status(if n % 2 == 0 { "completed" } else { "pending" })
        .with_reference(format!("REF-{:03}", n))
        .with_note(format!("note {}", n))
        .created_at(created_at)
}

/// Create transactions 1..=count for one account
pub async fn seed_transactions<S: DocumentStore>(
    repo: &Repository<Transaction, S>,
    count: usize,
) -> Result<Vec<Transaction>> {
    let account = ObjectId::new();
    let mut created = Vec::with_capacity(count);
    for n in 1..=count {
        created.push(repo.create(&sample_transaction(account, n)).await?);
    }
    Ok(created)
}

pub fn sample_account(login: &str) -> TradingAccount {
    TradingAccount::new(login, "Live-2", "Acme Markets", "USD")
        .with_password("correct-horse-battery")
        .with_balance(1_000.0)
}

pub fn amounts(transactions: &[Transaction]) -> Vec<f64> {
    transactions.iter().map(|t| t.amount).collect()
}
