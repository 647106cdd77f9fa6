//! Field-level validation failures rendered as sentences

use serde_json::Value;
use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::storage::{FieldIssue, IssueKind};

/// One human-readable sentence for a failing field
pub fn describe_issue(issue: &FieldIssue) -> String {
    let field = &issue.field;
    match &issue.kind {
        IssueKind::Required => format!("{} is required", field),
        IssueKind::Enum { allowed } => {
            format!("{} must be one of: {}", field, allowed.join(", "))
        }
        IssueKind::MinLength { min } => {
            format!("{} must be at least {} characters long", field, min)
        }
        IssueKind::MaxLength { max } => {
            format!("{} must be at most {} characters long", field, max)
        }
        IssueKind::Min { min } => format!("{} must be at least {}", field, min),
        IssueKind::Max { max } => format!("{} must be at most {}", field, max),
        IssueKind::Unique => format!("{} must be unique", field),
        IssueKind::Other { .. } => issue
            .message
            .clone()
            .unwrap_or_else(|| format!("{} is invalid", field)),
    }
}

/// Flatten `validator` errors into field issues, nested fields dotted,
/// sorted by field name.
pub fn issues_from_validator(errors: &ValidationErrors) -> Vec<FieldIssue> {
    let mut issues = Vec::new();
    collect(errors, "", &mut issues);
    issues.sort_by(|a, b| a.field.cmp(&b.field));
    issues
}

fn collect(errors: &ValidationErrors, prefix: &str, issues: &mut Vec<FieldIssue>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                issues.extend(field_errors.iter().map(|e| to_issue(&path, e)));
            }
            ValidationErrorsKind::Struct(nested) => collect(nested, &path, issues),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect(nested, &format!("{}[{}]", path, index), issues);
                }
            }
        }
    }
}

fn to_issue(field: &str, error: &ValidationError) -> FieldIssue {
    let param = |name: &str| error.params.get(name);
    let value = param("value").cloned();

    let kind = match &*error.code {
        "required" => IssueKind::Required,
        "enum" => IssueKind::Enum {
            allowed: param("values")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                        .collect()
                })
                .unwrap_or_default(),
        },
        "length" => {
            let actual = value
                .as_ref()
                .and_then(Value::as_str)
                .map(|s| s.chars().count() as u64);
            match (param("min").and_then(Value::as_u64), param("max").and_then(Value::as_u64)) {
                (Some(min), max) if max.is_none() || actual.is_some_and(|n| n < min) => {
                    IssueKind::MinLength { min }
                }
                (_, Some(max)) => IssueKind::MaxLength { max },
                _ => IssueKind::Other {
                    code: error.code.to_string(),
                },
            }
        }
        "range" => {
            let actual = value.as_ref().and_then(Value::as_f64);
            match (param("min").and_then(Value::as_f64), param("max").and_then(Value::as_f64)) {
                (Some(min), max) if max.is_none() || actual.is_some_and(|n| n < min) => {
                    IssueKind::Min { min }
                }
                (_, Some(max)) => IssueKind::Max { max },
                _ => IssueKind::Other {
                    code: error.code.to_string(),
                },
            }
        }
        "unique" => IssueKind::Unique,
        other => IssueKind::Other {
            code: other.to_string(),
        },
    };

    let mut issue = FieldIssue::new(field, kind);
    if let Some(value) = value {
        issue = issue.with_value(value);
    }
    if let Some(message) = &error.message {
        issue = issue.with_message(message.to_string());
    }
    issue
}
