use std::cmp::Ordering;

use serde_json::{Map, Value};

use catalog::Document;

use super::{
    LIMIT, PAGE, RawParams, SELECT, SORT,
    filter::{compare_values, resolve_path},
};
use crate::error::ValidationError;

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT: &str = "createdAt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Only these fields, plus `_id`.
    Include(Vec<String>),
    /// Everything but these fields.
    Exclude(Vec<String>),
}

impl Projection {
    /// Parses a comma or space separated field list, `-name` excluding a field.
    pub fn parse(raw: &str) -> Result<Option<Self>, ValidationError> {
        let fields: Vec<&str> = split_fields(raw).collect();

        if fields.is_empty() {
            return Ok(None);
        }

        let excluded = fields.iter().filter(|f| f.starts_with('-')).count();

        if excluded == 0 {
            Ok(Some(Projection::Include(
                fields.into_iter().map(str::to_string).collect(),
            )))
        } else if excluded == fields.len() {
            Ok(Some(Projection::Exclude(
                fields
                    .into_iter()
                    .map(|f| f.trim_start_matches('-').to_string())
                    .collect(),
            )))
        } else {
            Err(ValidationError::MixedProjection)
        }
    }

    pub fn apply(&self, document: Document) -> Document {
        match self {
            Projection::Include(fields) => {
                let mut projected = Map::new();

                if let Some(id) = document.get(ID_FIELD) {
                    projected.insert(ID_FIELD.to_string(), id.clone());
                }

                for field in fields {
                    if let Some(value) = resolve_path(&document, field) {
                        insert_path(&mut projected, field, value.clone());
                    }
                }

                projected
            }
            Projection::Exclude(fields) => {
                let mut document = document;

                for field in fields {
                    remove_path(&mut document, field);
                }

                document
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    /// `name,-createdAt` into keys in the order given.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        split_fields(raw)
            .map(|field| match field.strip_prefix('-') {
                Some(field) => SortKey::descending(field),
                None => SortKey::ascending(field.trim_start_matches('+')),
            })
            .filter(|key| !key.field.is_empty())
            .collect()
    }

    /// Newest first.
    pub fn default_order() -> Vec<Self> {
        vec![SortKey::descending(CREATED_AT)]
    }
}

/// Orders documents by the keys in turn, then by `_id`, so that equal keys
/// still give a stable order across identical queries.
pub fn compare_documents(a: &Document, b: &Document, keys: &[SortKey]) -> Ordering {
    keys.iter()
        .map(|key| {
            let ordering = compare_sort_values(resolve_path(a, &key.field), resolve_path(b, &key.field));
            match key.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or_else(|| compare_sort_values(a.get(ID_FIELD), b.get(ID_FIELD)))
}

/// Total order over values: missing/null, numbers, strings, objects, arrays, booleans.
fn compare_sort_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }

    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or_else(|| rank(Some(a)).cmp(&rank(Some(b)))),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// The list-shaping parameters of a request, with pagination left as raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub select: Option<Projection>,
    pub sort: Option<Vec<SortKey>>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListOptions {
    pub fn from_params(params: &RawParams) -> Result<Self, ValidationError> {
        let select = match params.first(SELECT) {
            Some(raw) => Projection::parse(raw)?,
            None => None,
        };

        let sort = params
            .first(SORT)
            .map(SortKey::parse_list)
            .filter(|keys| !keys.is_empty());

        Ok(Self {
            select,
            sort,
            page: params.first(PAGE).map(str::to_string),
            limit: params.first(LIMIT).map(str::to_string),
        })
    }

    pub fn sort_keys(&self) -> Vec<SortKey> {
        self.sort.clone().unwrap_or_else(SortKey::default_order)
    }
}

fn split_fields(raw: &str) -> impl Iterator<Item = &str> {
    raw.split([',', ' ']).map(str::trim).filter(|f| !f.is_empty())
}

fn insert_path(target: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            target.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));

            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

fn remove_path(target: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            target.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(child)) = target.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_include_keeps_id() {
        let projection = Projection::parse("name,description").unwrap().unwrap();
        let projected = projection.apply(doc(json!({
            "_id": "b1",
            "name": "Devworks",
            "description": "Web",
            "housing": true
        })));

        assert_eq!(
            Value::Object(projected),
            json!({"_id": "b1", "name": "Devworks", "description": "Web"})
        );
    }

    #[test]
    fn test_include_nested_and_unknown() {
        let projection = Projection::parse("location.city,nonexistent").unwrap().unwrap();
        let projected = projection.apply(doc(json!({
            "_id": "b1",
            "location": {"city": "Boston", "state": "MA"}
        })));

        assert_eq!(
            Value::Object(projected),
            json!({"_id": "b1", "location": {"city": "Boston"}})
        );
    }

    #[test]
    fn test_exclude() {
        let projection = Projection::parse("-housing,-location.state").unwrap().unwrap();
        let projected = projection.apply(doc(json!({
            "_id": "b1",
            "housing": true,
            "location": {"city": "Boston", "state": "MA"}
        })));

        assert_eq!(
            Value::Object(projected),
            json!({"_id": "b1", "location": {"city": "Boston"}})
        );
    }

    #[test]
    fn test_mixed_projection_rejected() {
        assert_eq!(
            Projection::parse("name,-housing"),
            Err(ValidationError::MixedProjection)
        );
        assert_eq!(Projection::parse(" , "), Ok(None));
    }

    #[test]
    fn test_parse_sort_list() {
        assert_eq!(
            SortKey::parse_list("name,-createdAt"),
            vec![SortKey::ascending("name"), SortKey::descending("createdAt")]
        );
        assert_eq!(SortKey::parse_list("-"), vec![]);
    }

    #[test]
    fn test_compare_documents_multi_key() {
        let keys = SortKey::parse_list("name,-createdAt");
        let older = doc(json!({"_id": "1", "name": "A", "createdAt": "2024-01-01T00:00:00.000Z"}));
        let newer = doc(json!({"_id": "2", "name": "A", "createdAt": "2024-06-01T00:00:00.000Z"}));
        let other = doc(json!({"_id": "3", "name": "B"}));

        assert_eq!(compare_documents(&newer, &older, &keys), Ordering::Less);
        assert_eq!(compare_documents(&older, &other, &keys), Ordering::Less);
    }

    #[test]
    fn test_missing_values_sort_first() {
        let keys = vec![SortKey::ascending("averageCost")];
        let missing = doc(json!({"_id": "1"}));
        let present = doc(json!({"_id": "2", "averageCost": 100}));

        assert_eq!(compare_documents(&missing, &present, &keys), Ordering::Less);
    }

    #[test]
    fn test_ties_fall_back_to_id() {
        let keys = vec![SortKey::ascending("housing")];
        let a = doc(json!({"_id": "a", "housing": false}));
        let b = doc(json!({"_id": "b", "housing": false}));

        assert_eq!(compare_documents(&a, &b, &keys), Ordering::Less);
        assert_eq!(compare_documents(&b, &a, &keys), Ordering::Greater);
    }

    #[test]
    fn test_list_options() {
        let params = RawParams::from_pairs([
            ("select", "name"),
            ("sort", "-averageCost"),
            ("page", "2"),
            ("limit", ""),
        ]);
        let options = ListOptions::from_params(&params).unwrap();

        assert_eq!(options.select, Some(Projection::Include(vec!["name".to_string()])));
        assert_eq!(options.sort_keys(), vec![SortKey::descending("averageCost")]);
        assert_eq!(options.page.as_deref(), Some("2"));
        assert_eq!(options.limit, None);

        let defaults = ListOptions::from_params(&RawParams::default()).unwrap();
        assert_eq!(defaults.sort_keys(), SortKey::default_order());
    }

    #[test]
    fn test_unknown_sort_field_falls_back_to_id() {
        let keys = SortKey::parse_list("nonexistent");
        let mut documents = vec![
            doc(json!({"_id": "c", "name": "A"})),
            doc(json!({"_id": "a", "name": "C"})),
            doc(json!({"_id": "b", "name": "B"})),
        ];

        documents.sort_by(|a, b| compare_documents(a, b, &keys));

        let ids: Vec<&str> = documents.iter().map(|d| d["_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
