//! Evaluation of query documents and pipelines over in-memory documents
//!
//! Covers the subset of the query language the repository emits: logical
//! `$and` / `$or`, comparison operators, `$in`, `$regex`, and the
//! `$match` / `$sort` / `$skip` / `$limit` / `$project` / `$unset` / `$facet` /
//! `$count` stages.

use mongodb::bson::{Bson, Document};
use regex::RegexBuilder;
use std::cmp::Ordering;

use super::error::{StorageError, StorageResult};

/// Resolve a possibly dotted path inside a document.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

pub(crate) fn matches(document: &Document, filter: &Document) -> StorageResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => {
                return Err(StorageError::other(format!("unsupported query operator {}", op)));
            }
            field => field_matches(lookup(document, field), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(key: &str, condition: &'a Bson) -> StorageResult<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        return Err(StorageError::other(format!("{} expects an array", key)));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Ok(d),
            _ => Err(StorageError::other(format!("{} entries must be documents", key))),
        })
        .collect()
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> StorageResult<bool> {
    let Some(operators) = is_operator_document(condition) else {
        return Ok(equals(value, condition));
    };

    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            "$in" => match operand {
                Bson::Array(candidates) => candidates.iter().any(|c| equals(value, c)),
                _ => return Err(StorageError::other("$in expects an array")),
            },
            "$exists" => value.is_some() == operand.as_bool().unwrap_or(true),
            "$regex" => {
                let options = operators.get_str("$options").unwrap_or_default();
                regex_matches(value, operand, options)?
            }
            "$options" => true,
            other => {
                return Err(StorageError::other(format!("unsupported query operator {}", other)));
            }
        };

        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn regex_matches(value: Option<&Bson>, pattern: &Bson, options: &str) -> StorageResult<bool> {
    let (pattern, options) = match pattern {
        Bson::String(p) => (p.as_str(), options),
        Bson::RegularExpression(r) => (r.pattern.as_str(), r.options.as_str()),
        _ => return Err(StorageError::other("$regex expects a string")),
    };
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .build()
        .map_err(|e| StorageError::other(format!("invalid $regex: {}", e)))?;

    Ok(match value {
        Some(Bson::String(s)) => regex.is_match(s),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(s) if regex.is_match(s))),
        _ => false,
    })
}

fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|item| same_value(item, target))
        }
        Some(v) => same_value(v, target),
    }
}

fn same_value(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compares(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };
    if type_rank(value) != type_rank(operand) {
        return false;
    }
    accept(compare(value, operand))
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        _ => 12,
    }
}

/// Total order used for sorting; values of different types order by type.
pub(crate) fn compare(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

fn compare_paths(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (field, direction) in sort {
        let left = lookup(a, field).unwrap_or(&Bson::Null);
        let right = lookup(b, field).unwrap_or(&Bson::Null);
        let ordering = compare(left, right);
        let ordering = if as_number(direction).unwrap_or(1.0) < 0.0 {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

pub(crate) fn sort_documents(documents: &mut [Document], sort: &Document) {
    documents.sort_by(|a, b| compare_paths(a, b, sort));
}

/// Apply an inclusion or exclusion projection.
pub(crate) fn project(mut document: Document, projection: &Document) -> Document {
    let included = |v: &Bson| as_number(v).map(|n| n != 0.0).or(v.as_bool()).unwrap_or(true);

    let inclusive = projection
        .iter()
        .any(|(k, v)| k != "_id" && included(v));

    if inclusive {
        let keep_id = projection.get("_id").is_none_or(included);
        let mut out = Document::new();
        for (key, value) in document {
            if (key == "_id" && keep_id) || projection.get(&key).is_some_and(included) {
                out.insert(key, value);
            }
        }
        out
    } else {
        for (key, _) in projection.iter().filter(|(_, v)| !included(v)) {
            document.remove(key);
        }
        document
    }
}

fn as_count(stage: &str, value: &Bson) -> StorageResult<usize> {
    as_number(value)
        .filter(|n| *n >= 0.0)
        .map(|n| n as usize)
        .ok_or_else(|| StorageError::other(format!("{} expects a non-negative number", stage)))
}

fn as_document<'a>(stage: &str, value: &'a Bson) -> StorageResult<&'a Document> {
    value
        .as_document()
        .ok_or_else(|| StorageError::other(format!("{} expects a document", stage)))
}

/// Run an aggregation pipeline over `documents`.
pub(crate) fn run_pipeline(
    mut documents: Vec<Document>,
    pipeline: &[Document],
) -> StorageResult<Vec<Document>> {
    for stage in pipeline {
        let Some((name, spec)) = stage.iter().next() else {
            return Err(StorageError::other("empty pipeline stage"));
        };

        documents = match name.as_str() {
            "$match" => {
                let filter = as_document(name, spec)?;
                let mut kept = Vec::with_capacity(documents.len());
                for document in documents {
                    if matches(&document, filter)? {
                        kept.push(document);
                    }
                }
                kept
            }
            "$sort" => {
                sort_documents(&mut documents, as_document(name, spec)?);
                documents
            }
            "$skip" => documents.into_iter().skip(as_count(name, spec)?).collect(),
            "$limit" => documents.into_iter().take(as_count(name, spec)?).collect(),
            "$project" => {
                let projection = as_document(name, spec)?;
                documents
                    .into_iter()
                    .map(|d| project(d, projection))
                    .collect()
            }
            "$unset" => {
                let fields: Vec<&str> = match spec {
                    Bson::String(field) => vec![field.as_str()],
                    Bson::Array(items) => items.iter().filter_map(Bson::as_str).collect(),
                    _ => return Err(StorageError::other("$unset expects a field or fields")),
                };
                documents
                    .into_iter()
                    .map(|mut d| {
                        for field in &fields {
                            d.remove(*field);
                        }
                        d
                    })
                    .collect()
            }
            "$count" => {
                let field = spec
                    .as_str()
                    .ok_or_else(|| StorageError::other("$count expects a field name"))?;
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field, documents.len() as i32);
                    vec![out]
                }
            }
            "$facet" => {
                let mut out = Document::new();
                for (branch, stages) in as_document(name, spec)? {
                    let Bson::Array(stages) = stages else {
                        return Err(StorageError::other("$facet branches must be arrays"));
                    };
                    let stages = stages
                        .iter()
                        .map(|s| as_document(name, s).cloned())
                        .collect::<StorageResult<Vec<_>>>()?;
                    let results = run_pipeline(documents.clone(), &stages)?;
                    out.insert(
                        branch.clone(),
                        results.into_iter().map(Bson::Document).collect::<Vec<_>>(),
                    );
                }
                vec![out]
            }
            other => {
                return Err(StorageError::other(format!(
                    "unsupported pipeline stage {}",
                    other
                )));
            }
        };
    }
    Ok(documents)
}

/// Apply a `$set` / `$unset` update in place.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> StorageResult<()> {
    for (op, fields) in update {
        let fields = as_document(op, fields)?;
        match op.as_str() {
            "$set" => {
                for (key, value) in fields {
                    document.insert(key.clone(), value.clone());
                }
            }
            "$unset" => {
                for key in fields.keys() {
                    document.remove(key);
                }
            }
            other => {
                return Err(StorageError::other(format!(
                    "unsupported update operator {}",
                    other
                )));
            }
        }
    }
    Ok(())
}
