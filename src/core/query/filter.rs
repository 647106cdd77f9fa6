//! Filter expression decoding
//!
//! A filter arrives as quote-tolerant JSON with up to two top-level groups:
//!
//! ```text
//! {'and': {'status': 'settled', 'amount__gte': 100},
//!  'or':  [{'currency': 'USD'}, {'currency__in': ['EUR', 'GBP']}]}
//! ```
//!
//! Each key inside a group is `field` or `field__operator`. Decoding builds a
//! typed [`FilterExpr`] tree, then checks every referenced field against the
//! caller's allow-list. The tree renders to a BSON [`Document`] with
//! [`FilterExpr::to_document`].

use chrono::{DateTime, Datelike, NaiveDate};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, DateTime as BsonDateTime, Document, doc};
use serde_json::{Map, Value};

use super::parse_quote_tolerant;
use crate::core::error::QueryError;

/// How deep `and` / `or` groups may nest inside a top-level group.
const MAX_NESTING: usize = 1;

/// Comparison operator named by the `__op` suffix of a filter key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Like,
    In,
    Gt,
    Lt,
    Gte,
    Lte,
    Ne,
    Month,
    Day,
}

impl Operator {
    /// Every operator name accepted after `__`
    pub const NAMES: [&'static str; 10] = [
        "eq", "like", "in", "gt", "lt", "gte", "lte", "ne", "month", "day",
    ];

    pub fn parse(name: &str) -> Option<Self> {
        let op = match name {
            "eq" => Operator::Eq,
            "like" => Operator::Like,
            "in" => Operator::In,
            "gt" => Operator::Gt,
            "lt" => Operator::Lt,
            "gte" => Operator::Gte,
            "lte" => Operator::Lte,
            "ne" => Operator::Ne,
            "month" => Operator::Month,
            "day" => Operator::Day,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Like => "like",
            Operator::In => "in",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::Ne => "ne",
            Operator::Month => "month",
            Operator::Day => "day",
        }
    }
}

/// Logical connective joining the conditions of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "and" => Some(Connective::And),
            "or" => Some(Connective::Or),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Connective::And => "and",
            Connective::Or => "or",
        }
    }

    /// The query operator this connective renders to
    pub fn query_operator(&self) -> &'static str {
        match self {
            Connective::And => "$and",
            Connective::Or => "$or",
        }
    }
}

/// A coerced operand together with the comparison applied to it
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Bson),
    Ne(Bson),
    /// Case-insensitive substring match
    Like(String),
    In(Vec<Bson>),
    Gt(Bson),
    Lt(Bson),
    Gte(Bson),
    Lte(Bson),
    /// Half-open interval `[start, end)` produced by `day` and `month`
    Within {
        start: BsonDateTime,
        end: BsonDateTime,
    },
}

impl Predicate {
    fn to_bson(&self) -> Bson {
        match self {
            Predicate::Eq(value) => value.clone(),
            Predicate::Ne(value) => Bson::Document(doc! { "$ne": value.clone() }),
            Predicate::Like(text) => Bson::Document(doc! {
                "$regex": regex::escape(text),
                "$options": "i",
            }),
            Predicate::In(values) => Bson::Document(doc! { "$in": values.clone() }),
            Predicate::Gt(value) => Bson::Document(doc! { "$gt": value.clone() }),
            Predicate::Lt(value) => Bson::Document(doc! { "$lt": value.clone() }),
            Predicate::Gte(value) => Bson::Document(doc! { "$gte": value.clone() }),
            Predicate::Lte(value) => Bson::Document(doc! { "$lte": value.clone() }),
            Predicate::Within { start, end } => Bson::Document(doc! {
                "$gte": *start,
                "$lt": *end,
            }),
        }
    }
}

/// One `field__op: value` entry
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub field: String,
    pub operator: Operator,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Field(FieldCondition),
    Group(Group),
}

impl Condition {
    fn to_document(&self) -> Document {
        match self {
            Condition::Field(condition) => {
                let mut document = Document::new();
                document.insert(condition.field.clone(), condition.predicate.to_bson());
                document
            }
            Condition::Group(group) => group.to_document(),
        }
    }
}

/// Conditions joined by one connective
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub connective: Connective,
    pub conditions: Vec<Condition>,
}

impl Group {
    fn rendered_conditions(&self) -> Vec<Bson> {
        self.conditions
            .iter()
            .map(|c| Bson::Document(c.to_document()))
            .collect()
    }

    fn to_document(&self) -> Document {
        let mut document = Document::new();
        document.insert(self.connective.query_operator(), self.rendered_conditions());
        document
    }
}

/// Decoded filter: the top-level `and` and/or `or` groups
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExpr {
    pub groups: Vec<Group>,
}

impl FilterExpr {
    /// True when the filter matches everything
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.conditions.is_empty())
    }

    /// Every field referenced anywhere in the tree, in order of appearance
    pub fn fields(&self) -> Vec<&str> {
        fn walk<'a>(conditions: &'a [Condition], out: &mut Vec<&'a str>) {
            for condition in conditions {
                match condition {
                    Condition::Field(c) => {
                        if !out.contains(&c.field.as_str()) {
                            out.push(&c.field);
                        }
                    }
                    Condition::Group(g) => walk(&g.conditions, out),
                }
            }
        }

        let mut out = Vec::new();
        for group in &self.groups {
            walk(&group.conditions, &mut out);
        }
        out
    }

    /// Number of `field__op` entries across all groups
    pub fn condition_count(&self) -> usize {
        fn count(conditions: &[Condition]) -> usize {
            conditions
                .iter()
                .map(|c| match c {
                    Condition::Field(_) => 1,
                    Condition::Group(g) => count(&g.conditions),
                })
                .sum()
        }
        self.groups.iter().map(|g| count(&g.conditions)).sum()
    }

    /// Render as a query document with only the connectives actually present
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        for group in self.groups.iter().filter(|g| !g.conditions.is_empty()) {
            document.insert(group.connective.query_operator(), group.rendered_conditions());
        }
        document
    }

    fn ensure_filterable<S: AsRef<str>>(&self, allowed_fields: &[S]) -> Result<(), QueryError> {
        let rejected: Vec<String> = self
            .fields()
            .into_iter()
            .filter(|field| !allowed_fields.iter().any(|a| a.as_ref() == *field))
            .map(str::to_string)
            .collect();

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(QueryError::FieldNotFilterable { fields: rejected })
        }
    }
}

/// Decode a raw filter string against an allow-list of filterable fields.
///
/// An absent or blank filter decodes to an empty expression.
pub fn decode_filter<S: AsRef<str>>(
    raw: Option<&str>,
    allowed_fields: &[S],
) -> Result<FilterExpr, QueryError> {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(FilterExpr::default()),
    };

    let value: Value = parse_quote_tolerant(raw)
        .map_err(|e| QueryError::invalid_filter(e.to_string()))?;

    let Value::Object(top) = value else {
        return Err(QueryError::invalid_filter("expected a JSON object"));
    };

    let mut groups = Vec::with_capacity(top.len());
    for (key, body) in &top {
        let connective = Connective::parse(key).ok_or_else(|| {
            QueryError::invalid_filter(format!(
                "unsupported top-level key '{}', expected 'and' or 'or'",
                key
            ))
        })?;
        groups.push(parse_group(connective, body, 0)?);
    }

    let expr = FilterExpr { groups };
    expr.ensure_filterable(allowed_fields)?;
    Ok(expr)
}

fn parse_group(connective: Connective, body: &Value, depth: usize) -> Result<Group, QueryError> {
    let entries: Vec<&Map<String, Value>> = match body {
        Value::Object(map) => vec![map],
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_object().ok_or_else(|| {
                    QueryError::invalid_filter(format!(
                        "'{}' entries must be objects",
                        connective.name()
                    ))
                })
            })
            .collect::<Result<_, _>>()?,
        _ => {
            return Err(QueryError::invalid_filter(format!(
                "'{}' must be an object or an array of objects",
                connective.name()
            )));
        }
    };

    let mut conditions = Vec::new();
    for entry in entries {
        for (key, value) in entry {
            if let Some(nested) = Connective::parse(key) {
                if depth >= MAX_NESTING {
                    return Err(QueryError::invalid_filter(
                        "filter groups may only be nested one level deep",
                    ));
                }
                let group = parse_group(nested, value, depth + 1)?;
                if !group.conditions.is_empty() {
                    conditions.push(Condition::Group(group));
                }
            } else {
                conditions.push(Condition::Field(parse_condition(key, value)?));
            }
        }
    }

    Ok(Group {
        connective,
        conditions,
    })
}

fn parse_condition(key: &str, value: &Value) -> Result<FieldCondition, QueryError> {
    let (field, operator) = match key.rsplit_once("__") {
        Some((field, name)) => {
            let operator = Operator::parse(name).ok_or_else(|| QueryError::UnknownOperator {
                key: key.to_string(),
                operator: name.to_string(),
            })?;
            (field, operator)
        }
        None => (key, Operator::Eq),
    };

    if field.is_empty() {
        return Err(QueryError::invalid_filter(format!(
            "missing field name in '{}'",
            key
        )));
    }

    let predicate = match operator {
        Operator::Eq => Predicate::Eq(coerce(value)?),
        Operator::Ne => Predicate::Ne(coerce(value)?),
        Operator::Gt => Predicate::Gt(coerce(value)?),
        Operator::Lt => Predicate::Lt(coerce(value)?),
        Operator::Gte => Predicate::Gte(coerce(value)?),
        Operator::Lte => Predicate::Lte(coerce(value)?),
        Operator::Like => match value {
            Value::String(text) => Predicate::Like(text.clone()),
            Value::Null | Value::Array(_) | Value::Object(_) => {
                return Err(QueryError::invalid_filter(format!(
                    "'{}' expects a text value",
                    key
                )));
            }
            other => Predicate::Like(other.to_string()),
        },
        Operator::In => match value {
            Value::Array(items) => Predicate::In(items.iter().map(coerce).collect::<Result<_, _>>()?),
            single => Predicate::In(vec![coerce(single)?]),
        },
        Operator::Day => {
            let date = NaiveDate::parse_from_str(date_operand(key, value)?, "%Y-%m-%d")
                .map_err(|_| QueryError::invalid_filter(format!("'{}' expects YYYY-MM-DD", key)))?;
            let next = date
                .succ_opt()
                .ok_or_else(|| QueryError::invalid_filter(format!("'{}' is out of range", key)))?;
            Predicate::Within {
                start: midnight(date),
                end: midnight(next),
            }
        }
        Operator::Month => {
            let first = first_of_month(date_operand(key, value)?).ok_or_else(|| {
                QueryError::invalid_filter(format!("'{}' expects YYYY-MM or YYYY-MM-DD", key))
            })?;
            let next = if first.month() == 12 {
                NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
            }
            .ok_or_else(|| QueryError::invalid_filter(format!("'{}' is out of range", key)))?;
            Predicate::Within {
                start: midnight(first),
                end: midnight(next),
            }
        }
    };

    Ok(FieldCondition {
        field: field.to_string(),
        operator,
        predicate,
    })
}

fn date_operand<'a>(key: &str, value: &'a Value) -> Result<&'a str, QueryError> {
    value
        .as_str()
        .ok_or_else(|| QueryError::invalid_filter(format!("'{}' expects a date string", key)))
}

fn first_of_month(text: &str) -> Option<NaiveDate> {
    if text.len() == 7 {
        return NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d").ok();
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.with_day(1))
}

fn midnight(date: NaiveDate) -> BsonDateTime {
    let millis = date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default();
    BsonDateTime::from_millis(millis)
}

/// Coerce a JSON operand into the BSON value stored documents use.
///
/// Object-id shaped strings become object ids, date strings become UTC
/// instants, everything else passes through.
fn coerce(value: &Value) -> Result<Bson, QueryError> {
    match value {
        Value::String(text) => Ok(coerce_str(text)),
        other => mongodb::bson::to_bson(other).map_err(|e| QueryError::invalid_filter(e.to_string())),
    }
}

fn coerce_str(text: &str) -> Bson {
    if text.len() == 24
        && text.bytes().all(|b| b.is_ascii_hexdigit())
        && let Ok(oid) = ObjectId::parse_str(text)
    {
        return Bson::ObjectId(oid);
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Bson::DateTime(midnight(date));
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Bson::DateTime(BsonDateTime::from_millis(instant.timestamp_millis()));
    }

    Bson::String(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALLOWED: &[&str] = &["status", "amount", "createdAt", "account", "currency", "note"];

    fn instant(text: &str) -> BsonDateTime {
        let dt = DateTime::parse_from_rfc3339(text).unwrap();
        BsonDateTime::from_millis(dt.timestamp_millis())
    }

    #[test]
    fn test_absent_filter_is_empty() {
        assert!(decode_filter(None, ALLOWED).unwrap().is_empty());
        assert!(decode_filter(Some("   "), ALLOWED).unwrap().is_empty());
        assert_eq!(decode_filter(None, ALLOWED).unwrap().to_document(), doc! {});
    }

    #[test]
    fn test_single_quotes_are_tolerated() {
        let expr = decode_filter(Some("{'and':{'status':'settled'}}"), ALLOWED).unwrap();
        assert_eq!(expr.to_document(), doc! { "$and": [{ "status": "settled" }] });
    }

    #[test]
    fn test_operators_render() {
        let expr = decode_filter(
            Some(r#"{"and":{"amount__gte":100,"amount__lt":500,"status__ne":"void","note__like":"a.b"}}"#),
            ALLOWED,
        )
        .unwrap();
        assert_eq!(expr.condition_count(), 4);
        let rendered = expr.to_document();
        let conditions = rendered.get_array("$and").unwrap();
        assert!(conditions.contains(&Bson::Document(doc! { "amount": { "$gte": 100_i64 } })));
        assert!(conditions.contains(&Bson::Document(doc! { "amount": { "$lt": 500_i64 } })));
        assert!(conditions.contains(&Bson::Document(doc! { "status": { "$ne": "void" } })));
        assert!(conditions.contains(&Bson::Document(
            doc! { "note": { "$regex": "a\\.b", "$options": "i" } }
        )));
    }

    #[test]
    fn test_and_or_both_present() {
        let expr = decode_filter(
            Some("{'and':{'status':'open'},'or':[{'currency':'USD'},{'currency':'EUR'}]}"),
            ALLOWED,
        )
        .unwrap();
        assert_eq!(
            expr.to_document(),
            doc! {
                "$and": [{ "status": "open" }],
                "$or": [{ "currency": "USD" }, { "currency": "EUR" }],
            }
        );
    }

    #[test]
    fn test_object_id_coercion() {
        let expr = decode_filter(
            Some("{'and':{'account':'65f1c0ffee0000000000abcd'}}"),
            ALLOWED,
        )
        .unwrap();
        let oid = ObjectId::parse_str("65f1c0ffee0000000000abcd").unwrap();
        assert_eq!(expr.to_document(), doc! { "$and": [{ "account": oid }] });
    }

    #[test]
    fn test_in_coerces_each_member() {
        let expr = decode_filter(
            Some("{'and':{'account__in':['65f1c0ffee0000000000abcd','x']}}"),
            ALLOWED,
        )
        .unwrap();
        let oid = ObjectId::parse_str("65f1c0ffee0000000000abcd").unwrap();
        assert_eq!(
            expr.to_document(),
            doc! { "$and": [{ "account": { "$in": [oid, "x"] } }] }
        );
    }

    #[test]
    fn test_day_range_is_half_open() {
        let expr = decode_filter(Some(r#"{"and":{"createdAt__day":"2024-03-15"}}"#), ALLOWED).unwrap();
        assert_eq!(
            expr.to_document(),
            doc! { "$and": [{ "createdAt": {
                "$gte": instant("2024-03-15T00:00:00Z"),
                "$lt": instant("2024-03-16T00:00:00Z"),
            } }] }
        );
    }

    #[test]
    fn test_month_range_rolls_over_year() {
        let expr = decode_filter(Some(r#"{"and":{"createdAt__month":"2023-12"}}"#), ALLOWED).unwrap();
        assert_eq!(
            expr.to_document(),
            doc! { "$and": [{ "createdAt": {
                "$gte": instant("2023-12-01T00:00:00Z"),
                "$lt": instant("2024-01-01T00:00:00Z"),
            } }] }
        );
    }

    #[test]
    fn test_plain_date_is_coerced_to_instant() {
        let expr = decode_filter(Some(r#"{"and":{"createdAt__gt":"2024-01-31"}}"#), ALLOWED).unwrap();
        assert_eq!(
            expr.to_document(),
            doc! { "$and": [{ "createdAt": { "$gt": instant("2024-01-31T00:00:00Z") } }] }
        );
    }

    #[test]
    fn test_unknown_operator_fails() {
        let err = decode_filter(Some("{'and':{'amount__between':[1,2]}}"), ALLOWED).unwrap_err();
        assert_eq!(
            err,
            QueryError::UnknownOperator {
                key: "amount__between".to_string(),
                operator: "between".to_string(),
            }
        );
    }

    #[test]
    fn test_field_not_filterable() {
        let err = decode_filter(Some("{'and':{'password':'x'}}"), ALLOWED).unwrap_err();
        assert_eq!(
            err,
            QueryError::FieldNotFilterable {
                fields: vec!["password".to_string()]
            }
        );
    }

    #[test]
    fn test_nested_fields_are_checked() {
        let err = decode_filter(
            Some("{'and':{'status':'open','or':{'secret':'1','token__ne':'2'}}}"),
            ALLOWED,
        )
        .unwrap_err();
        let QueryError::FieldNotFilterable { fields } = err else {
            panic!("expected FieldNotFilterable");
        };
        assert_eq!(fields.len(), 2);
        assert!(fields.contains(&"secret".to_string()));
        assert!(fields.contains(&"token".to_string()));
    }

    #[test]
    fn test_nesting_is_limited() {
        let err = decode_filter(
            Some("{'and':{'or':{'and':{'status':'open'}}}}"),
            ALLOWED,
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilterFormat { .. }));
    }

    #[test]
    fn test_malformed_filters() {
        for raw in ["{and:", "[1,2]", "{'status':'open'}", "{'and':42}", "{'and':[1]}"] {
            let err = decode_filter(Some(raw), ALLOWED).unwrap_err();
            assert!(
                matches!(err, QueryError::InvalidFilterFormat { .. }),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_bad_day_operand() {
        let err = decode_filter(Some("{'and':{'createdAt__day':'yesterday'}}"), ALLOWED).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilterFormat { .. }));
    }
}
