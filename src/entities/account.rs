//! Trading accounts held at a broker

use mongodb::bson::DateTime as BsonDateTime;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::CURRENCIES;

pub const ACCOUNT_STATUSES: &[&str] = &["active", "suspended", "closed"];

crate::one_of_validator!(validate_currency, CURRENCIES);
crate::one_of_validator!(validate_status, ACCOUNT_STATUSES);

/// A trading account. The password is write-only: reads exclude it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TradingAccount {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[validate(length(min = 1, max = 32))]
    pub login: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,

    #[validate(length(min = 1, max = 64))]
    pub server: String,

    #[validate(length(min = 1, max = 64))]
    pub broker: String,

    #[validate(range(min = 0.0))]
    pub balance: f64,

    #[validate(custom(function = "validate_currency"))]
    pub currency: String,

    #[validate(custom(function = "validate_status"))]
    pub status: String,

    #[serde(default)]
    pub is_deleted: bool,

    pub created_at: BsonDateTime,
}

impl TradingAccount {
    /// A new active account with a zero balance
    pub fn new(
        login: impl Into<String>,
        server: impl Into<String>,
        broker: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: ObjectId::new(),
            login: login.into(),
            password: None,
            server: server.into(),
            broker: broker.into(),
            balance: 0.0,
            currency: currency.into(),
            status: "active".to_string(),
            is_deleted: false,
            created_at: BsonDateTime::now(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_balance(mut self, balance: f64) -> Self {
        self.balance = balance;
        self
    }
}

crate::impl_entity!(TradingAccount,
    collection: "accounts",
    name: "account",
    filterable: ["login", "server", "broker", "balance", "currency", "status", "createdAt"],
);
