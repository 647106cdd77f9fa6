//! Ledger transactions booked against a trading account
//!
//! A transaction here is a financial record, not a database transaction.

use mongodb::bson::DateTime as BsonDateTime;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::CURRENCIES;

pub const TRANSACTION_KINDS: &[&str] = &["deposit", "withdrawal", "transfer", "fee", "adjustment"];
pub const TRANSACTION_STATUSES: &[&str] = &["pending", "completed", "failed", "cancelled"];

crate::one_of_validator!(validate_kind, TRANSACTION_KINDS);
crate::one_of_validator!(validate_status, TRANSACTION_STATUSES);
crate::one_of_validator!(validate_currency, CURRENCIES);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// Owning trading account
    pub account: ObjectId,

    #[validate(custom(function = "validate_kind"))]
    pub kind: String,

    #[validate(range(min = 0.01))]
    pub amount: f64,

    #[validate(custom(function = "validate_currency"))]
    pub currency: String,

    #[validate(custom(function = "validate_status"))]
    pub status: String,

    /// External reference, e.g. a payment provider id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 64))]
    pub reference: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub note: Option<String>,

    #[serde(default)]
    pub is_deleted: bool,

    pub created_at: BsonDateTime,
}

impl Transaction {
    /// A pending transaction created now
    pub fn new(account: ObjectId, kind: impl Into<String>, amount: f64, currency: impl Into<String>) -> Self {
        Self {
            id: ObjectId::new(),
            account,
            kind: kind.into(),
            amount,
            currency: currency.into(),
            status: "pending".to_string(),
            reference: None,
            note: None,
            is_deleted: false,
            created_at: BsonDateTime::now(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn created_at(mut self, created_at: BsonDateTime) -> Self {
        self.created_at = created_at;
        self
    }
}

crate::impl_entity!(Transaction,
    collection: "transactions",
    name: "transaction",
    filterable: ["account", "kind", "amount", "currency", "status", "reference", "createdAt"],
    hidden: [],
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Entity;

    #[test]
    fn test_nothing_hidden() {
        assert!(Transaction::hidden_fields().is_empty());
        assert_eq!(Transaction::collection_name(), "transactions");
    }

    #[test]
    fn test_validation() {
        let valid = Transaction::new(ObjectId::new(), "deposit", 250.0, "EUR");
        assert!(valid.validate().is_ok());

        let invalid = Transaction::new(ObjectId::new(), "gift", 0.0, "EUR").with_status("done");
        let errors = invalid.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("kind"));
        assert!(fields.contains_key("amount"));
        assert!(fields.contains_key("status"));
        assert!(!fields.contains_key("currency"));
    }
}
