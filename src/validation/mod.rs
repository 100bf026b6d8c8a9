//! Declarative request validation: per-field rule sets, store/update contracts, and the
//! exhaustive failure map reported as 422.

mod validator;
pub use validator::normalize_input;

use crate::schema::TableDef;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Clone, Debug)]
pub enum Rule {
    Required,
    String,
    /// Maximum string length in characters.
    Max(usize),
    Boolean,
    /// Whole number that fits a 32-bit `integer` column.
    Integer,
    /// PHP-style date format, e.g. `Y` or `Y-m-d`.
    DateFormat(&'static str),
    Array,
    In(&'static [&'static str]),
    /// Every id in the value must name a live row of the table.
    Exists(&'static TableDef),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Required,
    String,
    Max,
    Boolean,
    Integer,
    DateFormat,
    Array,
    In,
    Exists,
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::Required => RuleKind::Required,
            Rule::String => RuleKind::String,
            Rule::Max(_) => RuleKind::Max,
            Rule::Boolean => RuleKind::Boolean,
            Rule::Integer => RuleKind::Integer,
            Rule::DateFormat(_) => RuleKind::DateFormat,
            Rule::Array => RuleKind::Array,
            Rule::In(_) => RuleKind::In,
            Rule::Exists(_) => RuleKind::Exists,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldRules {
    pub field: &'static str,
    pub rules: Vec<Rule>,
}

/// Ordered field rules. A field with no rules is still accepted (nullable, passed through).
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    fields: Vec<FieldRules>,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet { fields: Vec::new() }
    }

    pub fn field(mut self, field: &'static str, rules: Vec<Rule>) -> Self {
        self.fields.push(FieldRules { field, rules });
        self
    }

    pub fn fields(&self) -> &[FieldRules] {
        &self.fields
    }
}

/// Rules a resource applies on create and on update.
#[derive(Clone, Debug)]
pub struct ValidationContract {
    pub store: RuleSet,
    pub update: RuleSet,
}

impl ValidationContract {
    pub fn new(store: RuleSet, update: RuleSet) -> Self {
        ValidationContract { store, update }
    }

    /// Same rules for create and update.
    pub fn uniform(rules: RuleSet) -> Self {
        ValidationContract {
            update: rules.clone(),
            store: rules,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldFailure {
    pub rule: RuleKind,
    pub params: Map<String, Value>,
    pub message: String,
}

/// Every failing field with every failing rule, keyed by field name.
#[derive(Clone, Debug, Default, PartialEq, Error)]
#[error("The given data was invalid.")]
pub struct ValidationErrors {
    failures: BTreeMap<String, Vec<FieldFailure>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, failure: FieldFailure) {
        self.failures.entry(field.to_string()).or_default().push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failing fields.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.failures.keys().map(String::as_str)
    }

    pub fn get(&self, field: &str) -> &[FieldFailure] {
        self.failures.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, field: &str, kind: RuleKind) -> bool {
        self.get(field).iter().any(|f| f.rule == kind)
    }

    /// `details` payload of the 422 body: messages per field plus machine-readable failures.
    pub fn to_details(&self) -> Value {
        let mut errors = Map::new();
        let mut failures = Map::new();
        for (field, list) in &self.failures {
            errors.insert(
                field.clone(),
                Value::Array(list.iter().map(|f| Value::String(f.message.clone())).collect()),
            );
            failures.insert(
                field.clone(),
                Value::Array(
                    list.iter()
                        .map(|f| serde_json::json!({ "rule": f.rule, "params": f.params }))
                        .collect(),
                ),
            );
        }
        serde_json::json!({ "errors": errors, "failures": failures })
    }
}
