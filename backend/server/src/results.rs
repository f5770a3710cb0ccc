//! # Advanced Results
//!
//! Shared listing for every collection route: filtering, projection, sorting,
//! pagination and relation expansion driven by the query string.
//!
//! Each list route owns an [`AdvancedResults`] built once at startup with the
//! collection it serves and how to expand its relations. Per request it:
//!
//! 1. Translates the query string into a filter (rejecting malformed keys before any read)
//! 2. Counts matching records and fetches the requested page concurrently
//! 3. Expands relations on the fetched page
//! 4. Returns an [`Envelope`] for the handler to send as-is
//!
//! The count behind `next`/`prev` is the number of records matching the filter,
//! so a filtered listing never advertises a page it cannot fill.
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use catalog::{Document, Resource};

use crate::{
    database::{DocumentStore, FindQuery, document_id},
    error::{AppError, DataAccessError},
    pagination::{PageWindow, Pagination},
    query::{FilterPredicate, ListOptions, Operator, Projection, RawParams, translate},
};

/// How to expand a relation on fetched records.
#[derive(Debug, Clone, PartialEq)]
pub enum Populate {
    /// `path` holds the `_id` of a record in `from`; replaced by that record.
    Reference {
        path: String,
        from: Resource,
        select: Option<Projection>,
    },
    /// Records in `from` whose `foreign_field` equals this record's `_id`,
    /// attached as a list under `path`.
    Virtual {
        path: String,
        from: Resource,
        foreign_field: String,
        select: Option<Projection>,
    },
}

impl Populate {
    pub fn reference(path: impl Into<String>, from: Resource) -> Self {
        Populate::Reference {
            path: path.into(),
            from,
            select: None,
        }
    }

    pub fn virtual_field(
        path: impl Into<String>,
        from: Resource,
        foreign_field: impl Into<String>,
    ) -> Self {
        Populate::Virtual {
            path: path.into(),
            from,
            foreign_field: foreign_field.into(),
            select: None,
        }
    }

    /// Keeps only `fields` (and `_id`) of the expanded records.
    pub fn fields(mut self, fields: &[&str]) -> Self {
        let projection = Some(Projection::Include(
            fields.iter().map(|f| f.to_string()).collect(),
        ));

        match &mut self {
            Populate::Reference { select, .. } | Populate::Virtual { select, .. } => {
                *select = projection
            }
        }

        self
    }
}

/// The resolved plan for one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub find: FindQuery,
    pub populate: Option<Populate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub count: usize,
    pub pagination: Pagination,
    pub data: Vec<Document>,
}

impl Envelope {
    pub fn new(data: Vec<Document>, pagination: Pagination) -> Self {
        Self {
            success: true,
            count: data.len(),
            pagination,
            data,
        }
    }
}

/// Fetches one page and expands its relations.
pub async fn assemble(
    store: &dyn DocumentStore,
    resource: Resource,
    descriptor: &QueryDescriptor,
) -> Result<Vec<Document>, DataAccessError> {
    let records = store.find(resource, &descriptor.find).await?;

    match &descriptor.populate {
        Some(relation) => populate(store, records, relation).await,
        None => Ok(records),
    }
}

pub async fn populate(
    store: &dyn DocumentStore,
    mut records: Vec<Document>,
    relation: &Populate,
) -> Result<Vec<Document>, DataAccessError> {
    match relation {
        Populate::Reference { path, from, select } => {
            let ids = unique(records.iter().filter_map(|r| r.get(path).and_then(Value::as_str)));

            if ids.is_empty() {
                return Ok(records);
            }

            let query = FindQuery::new(FilterPredicate::new().compare(
                "_id",
                Operator::In,
                Value::from(ids),
            ))
            .projection(select.clone());

            let related: HashMap<String, Document> = store
                .find(*from, &query)
                .await?
                .into_iter()
                .filter_map(|d| document_id(&d).map(str::to_string).map(|id| (id, d)))
                .collect();

            for record in &mut records {
                let Some(id) = record.get(path).and_then(Value::as_str) else {
                    continue;
                };

                let expanded = related
                    .get(id)
                    .cloned()
                    .map(Value::Object)
                    .unwrap_or(Value::Null);
                record.insert(path.clone(), expanded);
            }
        }
        Populate::Virtual {
            path,
            from,
            foreign_field,
            select,
        } => {
            let ids = unique(records.iter().filter_map(document_id));

            if ids.is_empty() {
                return Ok(records);
            }

            let query = FindQuery::new(FilterPredicate::new().compare(
                foreign_field.as_str(),
                Operator::In,
                Value::from(ids),
            ));

            let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
            for child in store.find(*from, &query).await? {
                let Some(owner) = child.get(foreign_field).and_then(Value::as_str) else {
                    continue;
                };
                let owner = owner.to_string();
                let child = match select {
                    Some(projection) => projection.apply(child),
                    None => child,
                };
                grouped.entry(owner).or_default().push(Value::Object(child));
            }

            for record in &mut records {
                let Some(id) = document_id(record).map(str::to_string) else {
                    continue;
                };

                let children = grouped.remove(&id).unwrap_or_default();
                record.insert(path.clone(), Value::Array(children));
            }
        }
    }

    Ok(records)
}

/// Expands relations on a single record.
pub async fn populate_one(
    store: &dyn DocumentStore,
    record: Document,
    relation: &Populate,
) -> Result<Document, DataAccessError> {
    let expanded = populate(store, vec![record], relation).await?;

    Ok(expanded.into_iter().next().unwrap_or_default())
}

/// Distinct ids in first-seen order.
fn unique<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();

    ids.filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Listing for one collection, shared by every request on its route.
#[derive(Clone)]
pub struct AdvancedResults {
    store: Arc<dyn DocumentStore>,
    resource: Resource,
    populate: Option<Populate>,
}

impl AdvancedResults {
    pub fn new(store: Arc<dyn DocumentStore>, resource: Resource) -> Self {
        Self {
            store,
            resource,
            populate: None,
        }
    }

    pub fn populate(mut self, populate: Populate) -> Self {
        self.populate = Some(populate);
        self
    }

    pub fn describe(&self, params: &RawParams) -> Result<(QueryDescriptor, PageWindow), AppError> {
        let filter = translate(params)?;
        let options = ListOptions::from_params(params)?;
        let window = PageWindow::from_params(options.page.as_deref(), options.limit.as_deref());

        debug!("{} filter: {filter}", self.resource);

        let find = FindQuery::new(filter)
            .projection(options.select.clone())
            .sort(options.sort_keys())
            .skip(window.skip)
            .limit(window.limit);

        Ok((
            QueryDescriptor {
                find,
                populate: self.populate.clone(),
            },
            window,
        ))
    }

    pub async fn run(&self, params: &RawParams) -> Result<Envelope, AppError> {
        let (descriptor, window) = self.describe(params)?;

        let (total, data) = tokio::try_join!(
            self.store
                .count_documents(self.resource, &descriptor.find.filter),
            assemble(self.store.as_ref(), self.resource, &descriptor),
        )?;

        Ok(Envelope::new(data, window.links(total)))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{
        database::MemoryStore,
        error::ValidationError,
        pagination::PageLink,
    };
    use catalog::Fixtures;

    fn docs(values: Value) -> Vec<Document> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn fixtures() -> Fixtures {
        Fixtures {
            bootcamps: docs(json!([
                {"_id": "b1", "name": "Devworks", "description": "Full stack", "averageCost": 10000, "createdAt": "2024-01-01T00:00:00.000Z"},
                {"_id": "b2", "name": "ModernTech", "description": "Mobile", "averageCost": 8000, "createdAt": "2024-02-01T00:00:00.000Z"},
                {"_id": "b3", "name": "Codemasters", "description": "Data", "averageCost": 12000, "createdAt": "2024-03-01T00:00:00.000Z"},
                {"_id": "b4", "name": "Devworks", "description": "Evening", "averageCost": 9000, "createdAt": "2024-04-01T00:00:00.000Z"}
            ])),
            courses: docs(json!([
                {"_id": "c1", "title": "Front End", "tuition": 8000, "bootcamp": "b1", "createdAt": "2024-01-02T00:00:00.000Z"},
                {"_id": "c2", "title": "Full Stack", "tuition": 10000, "bootcamp": "b1", "createdAt": "2024-01-03T00:00:00.000Z"},
                {"_id": "c3", "title": "Mobile", "tuition": 6000, "bootcamp": "b2", "createdAt": "2024-02-02T00:00:00.000Z"},
                {"_id": "c4", "title": "Orphan", "tuition": 100, "bootcamp": "gone", "createdAt": "2024-02-03T00:00:00.000Z"}
            ])),
            reviews: docs(json!([
                {"_id": "r1", "title": "Great", "rating": 9, "bootcamp": "b1", "createdAt": "2024-05-01T00:00:00.000Z"},
                {"_id": "r2", "title": "Okay", "rating": 5, "bootcamp": "b1", "createdAt": "2024-05-02T00:00:00.000Z"},
                {"_id": "r3", "title": "Poor", "rating": 2, "bootcamp": "b2", "createdAt": "2024-05-03T00:00:00.000Z"},
                {"_id": "r4", "title": "Perfect", "rating": 10, "bootcamp": "b3", "createdAt": "2024-05-04T00:00:00.000Z"},
                {"_id": "r5", "title": "Fine", "rating": 4, "bootcamp": "b3", "createdAt": "2024-05-05T00:00:00.000Z"}
            ])),
        }
    }

    fn listing(resource: Resource) -> AdvancedResults {
        AdvancedResults::new(Arc::new(MemoryStore::seeded(&fixtures())), resource)
    }

    fn params(pairs: &[(&str, &str)]) -> RawParams {
        RawParams::from_pairs(pairs.iter().copied())
    }

    fn ids(envelope: &Envelope) -> Vec<&str> {
        envelope.data.iter().filter_map(document_id).collect()
    }

    #[tokio::test]
    async fn test_default_sort_newest_first() {
        let envelope = listing(Resource::Bootcamps).run(&params(&[])).await.unwrap();

        assert!(envelope.success);
        assert_eq!(envelope.count, 4);
        assert_eq!(ids(&envelope), vec!["b4", "b3", "b2", "b1"]);
        assert_eq!(envelope.pagination, Pagination::default());
    }

    #[tokio::test]
    async fn test_explicit_sort_keys() {
        let envelope = listing(Resource::Bootcamps)
            .run(&params(&[("sort", "name,-createdAt")]))
            .await
            .unwrap();

        assert_eq!(ids(&envelope), vec!["b3", "b4", "b1", "b2"]);
    }

    #[tokio::test]
    async fn test_select_restricts_fields() {
        let envelope = listing(Resource::Bootcamps)
            .run(&params(&[("select", "name,description")]))
            .await
            .unwrap();

        for record in &envelope.data {
            let mut fields: Vec<&str> = record.keys().map(String::as_str).collect();
            fields.sort();
            assert_eq!(fields, vec!["_id", "description", "name"]);
        }
    }

    #[tokio::test]
    async fn test_rating_range_round_trip() {
        let envelope = listing(Resource::Reviews)
            .run(&params(&[("rating[gte]", "4"), ("rating[lte]", "9")]))
            .await
            .unwrap();

        let mut found = ids(&envelope);
        found.sort();
        assert_eq!(found, vec!["r1", "r2", "r5"]);
    }

    #[tokio::test]
    async fn test_pagination_uses_filtered_count() {
        let envelope = listing(Resource::Reviews)
            .run(&params(&[("rating[gte]", "5"), ("limit", "2")]))
            .await
            .unwrap();

        assert_eq!(ids(&envelope), vec!["r4", "r2"]);
        assert_eq!(envelope.pagination.next, Some(PageLink { page: 2, limit: 2 }));
        assert_eq!(envelope.pagination.prev, None);

        let last = listing(Resource::Reviews)
            .run(&params(&[("rating[gte]", "5"), ("limit", "2"), ("page", "2")]))
            .await
            .unwrap();

        assert_eq!(ids(&last), vec!["r1"]);
        assert_eq!(last.pagination.next, None);
        assert_eq!(last.pagination.prev, Some(PageLink { page: 1, limit: 2 }));
    }

    #[tokio::test]
    async fn test_page_past_end_is_empty() {
        let envelope = listing(Resource::Courses)
            .run(&params(&[("page", "9")]))
            .await
            .unwrap();

        assert_eq!(envelope.count, 0);
        assert!(envelope.data.is_empty());
        assert_eq!(envelope.pagination.prev, Some(PageLink { page: 8, limit: 10 }));
    }

    #[tokio::test]
    async fn test_idempotent() {
        let listing = listing(Resource::Courses);
        let query = params(&[("sort", "bootcamp"), ("limit", "3")]);

        let first = listing.run(&query).await.unwrap();
        let second = listing.run(&query).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_reference_populate() {
        let envelope = listing(Resource::Courses)
            .populate(Populate::reference("bootcamp", Resource::Bootcamps).fields(&["name", "description"]))
            .run(&params(&[("sort", "title")]))
            .await
            .unwrap();

        let front_end = &envelope.data[0];
        assert_eq!(
            front_end["bootcamp"],
            json!({"_id": "b1", "name": "Devworks", "description": "Full stack"})
        );

        let orphan = envelope.data.iter().find(|d| d["title"] == "Orphan").unwrap();
        assert_eq!(orphan["bootcamp"], Value::Null);
    }

    #[tokio::test]
    async fn test_virtual_populate() {
        let envelope = listing(Resource::Bootcamps)
            .populate(Populate::virtual_field("courses", Resource::Courses, "bootcamp").fields(&["title"]))
            .run(&params(&[("sort", "createdAt")]))
            .await
            .unwrap();

        assert_eq!(
            envelope.data[0]["courses"],
            json!([{"_id": "c1", "title": "Front End"}, {"_id": "c2", "title": "Full Stack"}])
        );
        assert_eq!(envelope.data[2]["courses"], json!([]));
    }

    struct FailingStore;

    fn failure() -> DataAccessError {
        DataAccessError::NotAnObject {
            collection: "broken".to_string(),
        }
    }

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn count_documents(&self, _: Resource, _: &FilterPredicate) -> Result<u64, DataAccessError> {
            Err(failure())
        }

        async fn find(&self, _: Resource, _: &FindQuery) -> Result<Vec<Document>, DataAccessError> {
            Err(failure())
        }

        async fn find_by_id(&self, _: Resource, _: &str) -> Result<Option<Document>, DataAccessError> {
            Err(failure())
        }

        async fn insert(&self, _: Resource, _: Document) -> Result<Document, DataAccessError> {
            Err(failure())
        }

        async fn update(&self, _: Resource, _: &str, _: Document) -> Result<Option<Document>, DataAccessError> {
            Err(failure())
        }

        async fn delete(&self, _: Resource, _: &str) -> Result<Option<Document>, DataAccessError> {
            Err(failure())
        }

        async fn delete_many(&self, _: Resource, _: &FilterPredicate) -> Result<u64, DataAccessError> {
            Err(failure())
        }
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let listing = AdvancedResults::new(Arc::new(FailingStore), Resource::Bootcamps);

        let err = listing.run(&params(&[])).await.unwrap_err();

        assert!(matches!(err, AppError::DataAccess(_)));
    }

    #[tokio::test]
    async fn test_validation_precedes_data_access() {
        let listing = AdvancedResults::new(Arc::new(FailingStore), Resource::Bootcamps);

        let err = listing
            .run(&params(&[("averageCost[between]", "1")]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Validation(ValidationError::UnknownOperator { .. })
        ));
    }

    #[test]
    fn test_unique_keeps_first_seen_order() {
        let ids = ["b2", "b1", "b2", "b3", "b1"];

        assert_eq!(unique(ids.into_iter()), vec!["b2", "b1", "b3"]);
    }
}
