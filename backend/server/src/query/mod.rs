//! # Query Translation
//!
//! Turns a request's raw query string into a [`FilterPredicate`] plus the list
//! options (`select`, `sort`, `page`, `limit`) consumed by the result assembler.
//!
//! ## Keys
//! - `field=value`: equality. Repeating the key turns it into set membership.
//! - `field[op]=value` or `field.op=value`: comparison, `op` one of
//!   `gte`, `gt`, `lte`, `lt`, `in`.
//! - `field[in]=a,b`: membership, values split on commas and across repeats.
//!
//! Keys are parsed structurally. Operator words appearing inside values
//! (`name=intel`) are never treated as operators.
//!
//! ## Values
//! Query text is coerced before it reaches the filter: `true`/`false` become
//! booleans, numeric text becomes a number, everything else stays a string.
use std::collections::{BTreeMap, btree_map::Entry};

use serde_json::{Number, Value};

use crate::error::ValidationError;

pub mod filter;
pub mod options;

pub use filter::{Condition, FilterPredicate, Operator};
pub use options::{ListOptions, Projection, SortDirection, SortKey};

pub const SELECT: &str = "select";
pub const SORT: &str = "sort";
pub const LIMIT: &str = "limit";
pub const PAGE: &str = "page";

/// Keys that steer listing and never become filter fields.
pub const RESERVED_KEYS: [&str; 4] = [SELECT, SORT, LIMIT, PAGE];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    One(String),
    Many(Vec<String>),
}

impl ParamValue {
    pub fn first(&self) -> &str {
        match self {
            ParamValue::One(value) => value,
            ParamValue::Many(values) => values.first().map(String::as_str).unwrap_or_default(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            ParamValue::One(existing) => {
                *self = ParamValue::Many(vec![std::mem::take(existing), value]);
            }
            ParamValue::Many(values) => values.push(value),
        }
    }

    fn values(&self) -> impl Iterator<Item = &str> {
        let values: Vec<&str> = match self {
            ParamValue::One(value) => vec![value.as_str()],
            ParamValue::Many(values) => values.iter().map(String::as_str).collect(),
        };
        values.into_iter()
    }
}

/// Query parameters exactly as they arrived, repeated keys grouped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawParams {
    params: BTreeMap<String, ParamValue>,
}

impl RawParams {
    pub fn from_query(query: Option<&str>) -> Result<Self, ValidationError> {
        let pairs: Vec<(String, String)> = match query {
            Some(query) => serde_urlencoded::from_str(query)
                .map_err(|e| ValidationError::MalformedQuery(e.to_string()))?,
            None => Vec::new(),
        };

        Ok(Self::from_pairs(pairs))
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut params: BTreeMap<String, ParamValue> = BTreeMap::new();

        for (key, value) in pairs {
            match params.entry(key.into()) {
                Entry::Vacant(entry) => {
                    entry.insert(ParamValue::One(value.into()));
                }
                Entry::Occupied(mut entry) => entry.get_mut().push(value.into()),
            }
        }

        Self { params }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    /// First value of a key, treating an empty value as absent.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).map(ParamValue::first).filter(|v| !v.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }
}

enum Target<'a> {
    Field(&'a str),
    Operator(&'a str, Operator),
}

pub fn translate(params: &RawParams) -> Result<FilterPredicate, ValidationError> {
    let mut equalities: BTreeMap<String, Condition> = BTreeMap::new();
    let mut comparisons: BTreeMap<String, BTreeMap<Operator, Value>> = BTreeMap::new();

    for (key, value) in params
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(key))
    {
        match parse_key(key)? {
            Target::Field(field) => {
                let condition = match value {
                    ParamValue::One(text) => Condition::Equals(coerce(text)),
                    ParamValue::Many(_) => Condition::Compare(BTreeMap::from([(
                        Operator::In,
                        Value::Array(value.values().map(coerce).collect()),
                    )])),
                };
                equalities.insert(field.to_string(), condition);
            }
            Target::Operator(field, operator) => {
                let operand = operand(field, operator, value)?;
                comparisons
                    .entry(field.to_string())
                    .or_default()
                    .insert(operator, operand);
            }
        }
    }

    let mut filter = FilterPredicate::new();

    for (field, condition) in equalities {
        if comparisons.contains_key(&field) {
            return Err(ValidationError::ConflictingConditions(field));
        }
        filter.insert(field, condition);
    }

    for (field, operators) in comparisons {
        filter.insert(field, Condition::Compare(operators));
    }

    Ok(filter)
}

fn parse_key(key: &str) -> Result<Target<'_>, ValidationError> {
    let malformed = || ValidationError::MalformedKey(key.to_string());

    if let Some(open) = key.find('[') {
        let field = &key[..open];
        let token = key[open + 1..].strip_suffix(']').ok_or_else(malformed)?;

        if field.is_empty() || token.contains(['[', ']']) || field.contains(']') {
            return Err(malformed());
        }

        return token
            .parse::<Operator>()
            .map(|operator| Target::Operator(field, operator))
            .map_err(|_| ValidationError::UnknownOperator {
                field: field.to_string(),
                operator: token.to_string(),
            });
    }

    if key.is_empty() || key.contains(']') {
        return Err(malformed());
    }

    if let Some((field, token)) = key.rsplit_once('.') {
        if let Ok(operator) = token.parse::<Operator>() {
            if field.is_empty() {
                return Err(malformed());
            }
            return Ok(Target::Operator(field, operator));
        }
    }

    Ok(Target::Field(key))
}

fn operand(field: &str, operator: Operator, value: &ParamValue) -> Result<Value, ValidationError> {
    if operator == Operator::In {
        let members: Vec<Value> = value
            .values()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(coerce)
            .collect();

        if members.is_empty() {
            return Err(ValidationError::EmptyValue {
                field: field.to_string(),
                operator: operator.to_string(),
            });
        }

        return Ok(Value::Array(members));
    }

    match value {
        ParamValue::Many(_) => Err(ValidationError::RepeatedOperator {
            field: field.to_string(),
            operator: operator.to_string(),
        }),
        ParamValue::One(text) if text.trim().is_empty() => Err(ValidationError::EmptyValue {
            field: field.to_string(),
            operator: operator.to_string(),
        }),
        ParamValue::One(text) => Ok(coerce(text)),
    }
}

/// Gives query text the type it most plausibly has.
pub fn coerce(text: &str) -> Value {
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(integer) = text.parse::<i64>() {
        return Value::Number(integer.into());
    }

    text.parse::<f64>()
        .ok()
        .filter(|_| text.bytes().all(|b| b.is_ascii_digit() || b"+-.eE".contains(&b)))
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(pairs: &[(&str, &str)]) -> RawParams {
        RawParams::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_bracket_operator() {
        let filter = translate(&params(&[("averageCost[gte]", "5")])).unwrap();

        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"averageCost": {"$gte": 5}})
        );
    }

    #[test]
    fn test_dot_operator() {
        let filter = translate(&params(&[("rating.lt", "3"), ("location.state", "MA")])).unwrap();

        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"rating": {"$lt": 3}, "location.state": "MA"})
        );
    }

    #[test]
    fn test_reserved_keys_dropped() {
        let filter = translate(&params(&[
            ("select", "name,description"),
            ("sort", "-name"),
            ("limit", "2"),
            ("page", "3"),
            ("housing", "true"),
        ]))
        .unwrap();

        assert_eq!(serde_json::to_value(&filter).unwrap(), json!({"housing": true}));
    }

    #[test]
    fn test_range_merges_operators() {
        let filter = translate(&params(&[("rating[gte]", "4"), ("rating[lte]", "9")])).unwrap();

        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"rating": {"$gte": 4, "$lte": 9}})
        );
    }

    #[test]
    fn test_in_splits_commas_and_repeats() {
        let filter = translate(&params(&[
            ("careers[in]", "Business,UI/UX"),
            ("careers[in]", "Other"),
        ]))
        .unwrap();

        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"careers": {"$in": ["Business", "UI/UX", "Other"]}})
        );
    }

    #[test]
    fn test_repeated_plain_key_is_membership() {
        let filter = translate(&params(&[("weeks", "4"), ("weeks", "8")])).unwrap();

        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"weeks": {"$in": [4, 8]}})
        );
    }

    #[test]
    fn test_operator_words_in_values_stay_literal() {
        let filter = translate(&params(&[("name", "gte"), ("title", "in progress")])).unwrap();

        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"name": "gte", "title": "in progress"})
        );
    }

    #[test]
    fn test_malformed_keys() {
        for key in ["rating[gte", "rating[gte][lt]", "[gte]", "rating]", ".gte"] {
            let err = translate(&params(&[(key, "1")])).unwrap_err();
            assert_eq!(err, ValidationError::MalformedKey(key.to_string()), "{key}");
        }
    }

    #[test]
    fn test_unknown_operator() {
        let err = translate(&params(&[("rating[ne]", "1")])).unwrap_err();

        assert_eq!(
            err,
            ValidationError::UnknownOperator {
                field: "rating".to_string(),
                operator: "ne".to_string(),
            }
        );
    }

    #[test]
    fn test_conflicting_and_repeated_conditions() {
        let conflict = translate(&params(&[("rating", "4"), ("rating[gt]", "2")])).unwrap_err();
        assert_eq!(
            conflict,
            ValidationError::ConflictingConditions("rating".to_string())
        );

        let repeated = translate(&params(&[("rating[gt]", "2"), ("rating[gt]", "3")])).unwrap_err();
        assert!(matches!(repeated, ValidationError::RepeatedOperator { .. }));

        let empty = translate(&params(&[("rating[gt]", "")])).unwrap_err();
        assert!(matches!(empty, ValidationError::EmptyValue { .. }));
    }

    #[test]
    fn test_from_query_decodes() {
        let raw = RawParams::from_query(Some("careers%5Bin%5D=UI%2FUX&name=Dev+Works&page=2"))
            .unwrap();

        assert_eq!(raw.first("page"), Some("2"));
        assert_eq!(raw.first("name"), Some("Dev Works"));
        assert_eq!(
            raw.get("careers[in]"),
            Some(&ParamValue::One("UI/UX".to_string()))
        );
        assert_eq!(RawParams::from_query(None).unwrap(), RawParams::default());
    }

    #[test]
    fn test_coerce() {
        assert_eq!(coerce("42"), json!(42));
        assert_eq!(coerce("-3.5"), json!(-3.5));
        assert_eq!(coerce("true"), json!(true));
        assert_eq!(coerce("02215"), json!(2215));
        assert_eq!(coerce("inf"), json!("inf"));
        assert_eq!(coerce("NaN"), json!("NaN"));
        assert_eq!(coerce("Boston"), json!("Boston"));
    }
}
