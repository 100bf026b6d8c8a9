//! Rule evaluation. Every field and every rule is checked; failures are collected, never short-circuited.

use crate::error::{AppError, ConfigError};
use crate::store::{Record, StoreTx};
use crate::validation::{FieldFailure, Rule, RuleKind, RuleSet, ValidationContract, ValidationErrors};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

/// Trim top-level strings and turn empty ones into null, so `""` counts as absent.
pub fn normalize_input(input: &Record) -> Record {
    input
        .iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => {
                    let trimmed = s.trim();
                    if trimmed.is_empty() {
                        Value::Null
                    } else {
                        Value::String(trimmed.to_string())
                    }
                }
                other => other.clone(),
            };
            (k.clone(), v)
        })
        .collect()
}

impl ValidationContract {
    pub async fn validate_store(&self, tx: &mut dyn StoreTx, input: &Record) -> Result<Record, AppError> {
        self.store.evaluate(tx, input).await
    }

    pub async fn validate_update(&self, tx: &mut dyn StoreTx, input: &Record) -> Result<Record, AppError> {
        self.update.evaluate(tx, input).await
    }
}

impl RuleSet {
    /// Returns the normalized values of the rule-set fields present in `input`, or every failure.
    /// Store errors raised by `exists` lookups propagate as-is.
    pub async fn evaluate(&self, tx: &mut dyn StoreTx, input: &Record) -> Result<Record, AppError> {
        let input = normalize_input(input);
        let mut out = Record::new();
        let mut errors = ValidationErrors::new();

        for fr in self.fields() {
            let value = input.get(fr.field).cloned().unwrap_or(Value::Null);
            if is_empty(&value) {
                if fr.rules.iter().any(|r| matches!(r, Rule::Required)) {
                    errors.push(fr.field, failure(fr.field, RuleKind::Required, Map::new()));
                } else if input.contains_key(fr.field) {
                    out.insert(fr.field.to_string(), value);
                }
                continue;
            }

            let mut value = value;
            let mut passed = true;
            for rule in &fr.rules {
                match apply(tx, fr.field, rule, &value).await? {
                    Ok(Some(normalized)) => value = normalized,
                    Ok(None) => {}
                    Err(f) => {
                        errors.push(fr.field, f);
                        passed = false;
                    }
                }
            }
            if passed {
                out.insert(fr.field.to_string(), value);
            }
        }

        if errors.is_empty() {
            Ok(out)
        } else {
            tracing::debug!(fields = ?errors.fields().collect::<Vec<_>>(), "validation failed");
            Err(AppError::Validation(errors))
        }
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// Outer `Result` is a store error; inner is pass (with optional normalized value) or the failure.
type RuleOutcome = Result<Option<Value>, FieldFailure>;

async fn apply(tx: &mut dyn StoreTx, field: &str, rule: &Rule, v: &Value) -> Result<RuleOutcome, AppError> {
    let outcome = match rule {
        Rule::Required => Ok(None),
        Rule::String => {
            if v.is_string() {
                Ok(None)
            } else {
                Err(failure(field, RuleKind::String, Map::new()))
            }
        }
        Rule::Max(max) => match v.as_str() {
            Some(s) if s.chars().count() > *max => Err(failure(
                field,
                RuleKind::Max,
                params(&[("max", Value::Number((*max as u64).into()))]),
            )),
            _ => Ok(None),
        },
        Rule::Boolean => match as_bool(v) {
            Some(b) => Ok(Some(Value::Bool(b))),
            None => Err(failure(field, RuleKind::Boolean, Map::new())),
        },
        Rule::Integer => match as_integer(v).and_then(|n| i32::try_from(n).ok()) {
            Some(n) => Ok(Some(Value::Number(n.into()))),
            None => Err(failure(field, RuleKind::Integer, Map::new())),
        },
        Rule::DateFormat(format) => {
            let re = format_regex(format)?;
            match scalar_string(v) {
                Some(s) if re.is_match(&s) => {
                    if *format == "Y" {
                        Ok(s.parse::<i64>().ok().map(|n| Value::Number(n.into())))
                    } else {
                        Ok(Some(Value::String(s)))
                    }
                }
                _ => Err(failure(
                    field,
                    RuleKind::DateFormat,
                    params(&[("format", Value::String((*format).to_string()))]),
                )),
            }
        }
        Rule::Array => {
            if v.is_array() {
                Ok(None)
            } else {
                Err(failure(field, RuleKind::Array, Map::new()))
            }
        }
        Rule::In(allowed) => match scalar_string(v) {
            Some(s) if allowed.contains(&s.as_str()) => Ok(Some(Value::String(s))),
            _ => Err(failure(field, RuleKind::In, Map::new())),
        },
        Rule::Exists(table) => {
            let exists_failure = || {
                failure(
                    field,
                    RuleKind::Exists,
                    params(&[("table", Value::String(table.name.to_string()))]),
                )
            };
            let Some(ids) = parse_ids(v) else {
                return Ok(Err(exists_failure()));
            };
            let wanted: HashSet<Uuid> = ids.iter().copied().collect();
            let found = tx.existing_ids(*table, &ids).await?;
            if wanted.is_subset(&found) {
                Ok(v.is_array().then(|| {
                    Value::Array(ids.iter().map(|u| Value::String(u.to_string())).collect())
                }))
            } else {
                Err(exists_failure())
            }
        }
    };
    Ok(outcome)
}

/// Ids from a single value or an array of values; `None` if any element is not a UUID string.
fn parse_ids(v: &Value) -> Option<Vec<Uuid>> {
    let parse = |e: &Value| e.as_str().and_then(|s| Uuid::parse_str(s).ok());
    match v {
        Value::Array(items) => items.iter().map(parse).collect(),
        other => parse(other).map(|u| vec![u]),
    }
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.as_str() {
            "0" => Some(false),
            "1" => Some(true),
            _ => None,
        },
        _ => None,
    }
}

fn as_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Anchored regex for a PHP-style date format (`Y`, `m`, `d`, `H`, `i`, `s`; other chars literal).
fn format_regex(format: &str) -> Result<Regex, AppError> {
    let mut pattern = String::from("^");
    for c in format.chars() {
        match c {
            'Y' => pattern.push_str(r"\d{4}"),
            'm' | 'd' | 'H' | 'i' | 's' => pattern.push_str(r"\d{2}"),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
        .map_err(|e| AppError::Config(ConfigError::Validation(format!("date format {}: {}", format, e))))
}

fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn failure(field: &str, rule: RuleKind, params: Map<String, Value>) -> FieldFailure {
    let attr = field.replace('_', " ");
    let message = match rule {
        RuleKind::Required => format!("The {} field is required.", attr),
        RuleKind::String => format!("The {} must be a string.", attr),
        RuleKind::Max => format!(
            "The {} must not be greater than {} characters.",
            attr,
            params.get("max").cloned().unwrap_or(Value::Null)
        ),
        RuleKind::Boolean => format!("The {} field must be true or false.", attr),
        RuleKind::Integer => format!("The {} must be an integer.", attr),
        RuleKind::DateFormat => format!(
            "The {} does not match the format {}.",
            attr,
            params.get("format").and_then(Value::as_str).unwrap_or_default()
        ),
        RuleKind::Array => format!("The {} must be an array.", attr),
        RuleKind::In | RuleKind::Exists => format!("The selected {} is invalid.", attr),
    };
    FieldFailure { rule, params, message }
}
