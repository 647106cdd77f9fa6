//! Sort expression decoding
//!
//! A sort string is either one signed field token (`-createdAt`, `+name`,
//! `amount`) or a bracketed array of them (`['+name','-age']`). `+` sorts
//! ascending; `-` or no sign sorts descending.

use indexmap::IndexMap;
use mongodb::bson::Document;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use super::parse_quote_tolerant;
use crate::core::error::QueryError;

static FIELD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("valid field name pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// `1` or `-1`, as storage sort documents expect
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// Ordered mapping from field name to direction
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SortSpec(IndexMap<String, SortDirection>);

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-field descending order, the usual listing default
    pub fn descending(field: impl Into<String>) -> Self {
        Self::new().then(field, SortDirection::Descending)
    }

    pub fn then(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.0.insert(field.into(), direction);
        self
    }

    /// Append `field` as the final key, in the direction of the first key.
    ///
    /// No-op when empty or already ordered on `field`.
    pub fn with_tiebreaker(self, field: &str) -> Self {
        let leading = self.0.first().map(|(_, direction)| *direction);
        match leading {
            Some(direction) if !self.0.contains_key(field) => self.then(field, direction),
            _ => self,
        }
    }

    pub fn get(&self, field: &str) -> Option<SortDirection> {
        self.0.get(field).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SortDirection)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        for (field, direction) in &self.0 {
            document.insert(field.clone(), direction.as_i32());
        }
        document
    }
}

/// Decode a raw sort string.
///
/// Returns `Ok(None)` for absent or blank input so the caller can apply its
/// own default ordering.
pub fn decode_sort(raw: Option<&str>) -> Result<Option<SortSpec>, QueryError> {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(None),
    };

    let tokens: Vec<String> = if raw.starts_with('[') {
        parse_quote_tolerant(raw)
            .map_err(|e| QueryError::invalid_sort(e.to_string()))?
    } else {
        vec![raw.to_string()]
    };

    let mut spec = SortSpec::new();
    for token in &tokens {
        let (field, direction) = parse_token(token)?;
        spec = spec.then(field, direction);
    }

    Ok((!spec.is_empty()).then_some(spec))
}

fn parse_token(token: &str) -> Result<(&str, SortDirection), QueryError> {
    let token = token.trim();
    let (field, direction) = if let Some(field) = token.strip_prefix('+') {
        (field, SortDirection::Ascending)
    } else if let Some(field) = token.strip_prefix('-') {
        (field, SortDirection::Descending)
    } else {
        (token, SortDirection::Descending)
    };

    if !FIELD_NAME.is_match(field) {
        return Err(QueryError::invalid_sort(format!(
            "'{}' is not a valid sort field",
            token
        )));
    }

    Ok((field, direction))
}
