//! # Document Store
//!
//! Records are schemaless JSON objects kept per collection. Every record has an
//! `_id` and a `createdAt` timestamp, assigned on insert when absent.
//!
//! ## Backends
//! - [`MemoryStore`]: process-local, used for tests and local runs seeded from fixtures.
//! - [`RedisStore`]: one Redis hash per collection, `_id` to serialized document.
//!
//! Neither backend can evaluate filters natively, so both load a collection and
//! run [`execute`] over it. Collections in this directory stay small (hundreds of
//! records), which keeps that affordable.
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use catalog::{Document, Resource};

use crate::{
    error::DataAccessError,
    query::{
        FilterPredicate, Projection, SortKey,
        options::{CREATED_AT, ID_FIELD, compare_documents},
    },
};

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Everything a store needs to produce one page of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: FilterPredicate,
    pub projection: Option<Projection>,
    pub sort: Vec<SortKey>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindQuery {
    pub fn new(filter: FilterPredicate) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn projection(mut self, projection: Option<Projection>) -> Self {
        self.projection = projection;
        self
    }

    pub fn sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn count_documents(
        &self,
        resource: Resource,
        filter: &FilterPredicate,
    ) -> Result<u64, DataAccessError>;

    async fn find(
        &self,
        resource: Resource,
        query: &FindQuery,
    ) -> Result<Vec<Document>, DataAccessError>;

    async fn find_by_id(
        &self,
        resource: Resource,
        id: &str,
    ) -> Result<Option<Document>, DataAccessError>;

    /// Stores a record, returning it with `_id` and `createdAt` filled in.
    async fn insert(
        &self,
        resource: Resource,
        document: Document,
    ) -> Result<Document, DataAccessError>;

    /// Shallow-merges `changes` into the record. `None` when no record has `id`.
    async fn update(
        &self,
        resource: Resource,
        id: &str,
        changes: Document,
    ) -> Result<Option<Document>, DataAccessError>;

    async fn delete(
        &self,
        resource: Resource,
        id: &str,
    ) -> Result<Option<Document>, DataAccessError>;

    async fn delete_many(
        &self,
        resource: Resource,
        filter: &FilterPredicate,
    ) -> Result<u64, DataAccessError>;
}

/// Filters, orders, windows and projects a loaded collection.
pub fn execute(documents: Vec<Document>, query: &FindQuery) -> Vec<Document> {
    let mut matched: Vec<Document> = documents
        .into_iter()
        .filter(|document| query.filter.matches(document))
        .collect();

    matched.sort_by(|a, b| compare_documents(a, b, &query.sort));

    let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
    let take = query
        .limit
        .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);

    matched
        .into_iter()
        .skip(skip)
        .take(take)
        .map(|document| match &query.projection {
            Some(projection) => projection.apply(document),
            None => document,
        })
        .collect()
}

pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn document_id(document: &Document) -> Option<&str> {
    document.get(ID_FIELD).and_then(Value::as_str)
}

/// Fills in `_id` and `createdAt` when the record does not carry them.
pub fn stamp(mut document: Document) -> Document {
    if document_id(&document).is_none() {
        document.insert(ID_FIELD.to_string(), Value::String(new_id()));
    }

    document
        .entry(CREATED_AT)
        .or_insert_with(|| Value::String(timestamp()));

    document
}

/// Applies an update. The identifier is never overwritten.
pub fn merge(mut existing: Document, changes: Document) -> Document {
    for (field, value) in changes {
        if field != ID_FIELD {
            existing.insert(field, value);
        }
    }

    existing
}
