// Workflow Conditions - Field checks against the candidate document

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::services::templates::lookup;

/// Condition operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    In,
    NotIn,
    /// Array membership, or substring when both sides are strings
    Contains,
    NotContains,
    Exists,
    NotExists,
}

impl ConditionOperator {
    /// Operators that ignore `value`
    pub fn is_unary(&self) -> bool {
        matches!(self, Self::Exists | Self::NotExists)
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
        };
        f.write_str(name)
    }
}

/// A single condition to evaluate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// Dot path into the candidate document; `event.*` reads the event payload
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Condition {
    pub fn new(field: &str, operator: ConditionOperator, value: serde_json::Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }

    pub fn equals(field: &str, value: serde_json::Value) -> Self {
        Self::new(field, ConditionOperator::Equals, value)
    }

    pub fn contains(field: &str, value: serde_json::Value) -> Self {
        Self::new(field, ConditionOperator::Contains, value)
    }

    pub fn in_list(field: &str, values: Vec<serde_json::Value>) -> Self {
        Self::new(field, ConditionOperator::In, serde_json::Value::Array(values))
    }

    pub fn exists(field: &str) -> Self {
        Self::new(field, ConditionOperator::Exists, serde_json::Value::Null)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.field.trim().is_empty() {
            return Err("condition field must not be empty".to_string());
        }
        if matches!(self.operator, ConditionOperator::In | ConditionOperator::NotIn) && !self.value.is_array() {
            return Err(format!("'{}' on '{}' requires an array value", self.operator, self.field));
        }
        if !self.operator.is_unary() && self.value.is_null() {
            return Err(format!("'{}' on '{}' requires a value", self.operator, self.field));
        }
        Ok(())
    }

    /// Evaluate against a context document. Comparisons are exact and
    /// case-sensitive; a missing field only satisfies the negative operators.
    pub fn evaluate(&self, context: &serde_json::Value) -> bool {
        let field = lookup(context, &self.field).filter(|v| !v.is_null());

        match self.operator {
            ConditionOperator::Equals => field == Some(&self.value),
            ConditionOperator::NotEquals => field != Some(&self.value),
            ConditionOperator::In => field.is_some_and(|v| in_list(v, &self.value)),
            ConditionOperator::NotIn => !field.is_some_and(|v| in_list(v, &self.value)),
            ConditionOperator::Contains => field.is_some_and(|v| contains(v, &self.value)),
            ConditionOperator::NotContains => !field.is_some_and(|v| contains(v, &self.value)),
            ConditionOperator::Exists => field.is_some(),
            ConditionOperator::NotExists => field.is_none(),
        }
    }
}

/// A scalar is in the list when the list holds it; an array field is in the
/// list when any of its elements is.
fn in_list(field: &serde_json::Value, list: &serde_json::Value) -> bool {
    let Some(list) = list.as_array() else {
        return false;
    };
    match field {
        serde_json::Value::Array(items) => items.iter().any(|item| list.contains(item)),
        scalar => list.contains(scalar),
    }
}

fn contains(field: &serde_json::Value, needle: &serde_json::Value) -> bool {
    match (field, needle) {
        (serde_json::Value::Array(items), needle) => items.contains(needle),
        (serde_json::Value::String(haystack), serde_json::Value::String(needle)) => haystack.contains(needle.as_str()),
        _ => false,
    }
}

/// All conditions must hold; an empty list always passes
pub fn evaluate_all(conditions: &[Condition], context: &serde_json::Value) -> bool {
    conditions.iter().all(|c| c.evaluate(context))
}
