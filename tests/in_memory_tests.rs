//! Integration tests for the repository over `InMemoryStore`.
//!
//! Invokes `repository_tests!` to validate the repository contract without a
//! database. The accounts store enforces a unique `login` the way the Mongo
//! collection's unique index does.

#[macro_use]
mod repository_harness;

use repository_harness::*;
use tradebook::storage::InMemoryStore;

repository_tests!(
    accounts: InMemoryStore::new("accounts").unique("login"),
    transactions: InMemoryStore::new("transactions"),
);
