//! Filter predicates and their evaluation against stored documents.
//!
//! A predicate maps a field path to a [`Condition`]. Paths may use dots to reach
//! into embedded documents (`location.state`). Matching follows document-store
//! semantics: a condition on an array field matches when any element matches,
//! and a missing field never satisfies a comparison.
use std::{cmp::Ordering, collections::BTreeMap, fmt, str::FromStr};

use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::{Map, Value};

use catalog::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    Gte,
    Gt,
    Lte,
    Lt,
    In,
}

impl Operator {
    pub fn token(&self) -> &'static str {
        match self {
            Operator::Gte => "gte",
            Operator::Gt => "gt",
            Operator::Lte => "lte",
            Operator::Lt => "lt",
            Operator::In => "in",
        }
    }

    /// Marker the operator carries in the rendered filter document.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Gte => "$gte",
            Operator::Gt => "$gt",
            Operator::Lte => "$lte",
            Operator::Lt => "$lt",
            Operator::In => "$in",
        }
    }

    fn accepts(&self, stored: &Value, operand: &Value) -> bool {
        match self {
            Operator::In => match operand {
                Value::Array(set) => set.iter().any(|candidate| loose_eq(stored, candidate)),
                single => loose_eq(stored, single),
            },
            Operator::Gte => matches!(
                compare_loose(stored, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Gt => compare_loose(stored, operand) == Some(Ordering::Greater),
            Operator::Lte => matches!(
                compare_loose(stored, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Lt => compare_loose(stored, operand) == Some(Ordering::Less),
        }
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "gte" => Ok(Operator::Gte),
            "gt" => Ok(Operator::Gt),
            "lte" => Ok(Operator::Lte),
            "lt" => Ok(Operator::Lt),
            "in" => Ok(Operator::In),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    Compare(BTreeMap<Operator, Value>),
}

impl Condition {
    pub fn matches(&self, stored: &Value) -> bool {
        match self {
            Condition::Equals(expected) => any_element(stored, |v| loose_eq(v, expected)),
            Condition::Compare(operators) => operators
                .iter()
                .all(|(operator, operand)| any_element(stored, |v| operator.accepts(v, operand))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPredicate {
    conditions: BTreeMap<String, Condition>,
}

impl FilterPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .insert(field.into(), Condition::Equals(value.into()));
        self
    }

    pub fn compare(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        let field = field.into();
        let value = value.into();

        match self.conditions.get_mut(&field) {
            Some(Condition::Compare(operators)) => {
                operators.insert(operator, value);
            }
            _ => {
                self.conditions
                    .insert(field, Condition::Compare(BTreeMap::from([(operator, value)])));
            }
        }

        self
    }

    pub(crate) fn insert(&mut self, field: String, condition: Condition) {
        self.conditions.insert(field, condition);
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| match resolve_path(document, field) {
                Some(stored) => condition.matches(stored),
                None => matches!(condition, Condition::Equals(Value::Null)),
            })
    }
}

impl Serialize for FilterPredicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.conditions.len()))?;

        for (field, condition) in &self.conditions {
            match condition {
                Condition::Equals(value) => map.serialize_entry(field, value)?,
                Condition::Compare(operators) => {
                    let rendered: Map<String, Value> = operators
                        .iter()
                        .map(|(operator, value)| (operator.symbol().to_string(), value.clone()))
                        .collect();
                    map.serialize_entry(field, &rendered)?
                }
            }
        }

        map.end()
    }
}

impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(rendered) => f.write_str(&rendered),
            Err(_) => f.write_str("{?}"),
        }
    }
}

/// Resolves a dot-separated path. `None` when any segment is missing.
pub fn resolve_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }

    Some(current)
}

fn any_element(stored: &Value, predicate: impl Fn(&Value) -> bool) -> bool {
    match stored {
        Value::Array(items) => predicate(stored) || items.iter().any(predicate),
        single => predicate(single),
    }
}

/// Equality that tolerates query text meeting typed stored values, e.g. a stored
/// number `4` and the string `"4"`.
fn loose_eq(stored: &Value, expected: &Value) -> bool {
    if stored == expected {
        return true;
    }

    match (stored, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (Value::String(s), other) | (other, Value::String(s)) => match other {
            Value::Number(n) => s.parse::<f64>().ok() == n.as_f64(),
            Value::Bool(b) => s == if *b { "true" } else { "false" },
            _ => false,
        },
        _ => false,
    }
}

fn compare_loose(stored: &Value, operand: &Value) -> Option<Ordering> {
    match (stored, operand) {
        (Value::Number(a), Value::String(b)) => a.as_f64()?.partial_cmp(&b.parse::<f64>().ok()?),
        (Value::String(a), Value::Number(b)) => a.parse::<f64>().ok()?.partial_cmp(&b.as_f64()?),
        _ => compare_values(stored, operand),
    }
}

/// Orders two values of the same kind. Mismatched kinds are incomparable.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
