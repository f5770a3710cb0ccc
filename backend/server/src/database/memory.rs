use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use catalog::{Document, Fixtures, Resource};

use super::{DocumentStore, FindQuery, document_id, execute, merge, stamp};
use crate::{error::DataAccessError, query::FilterPredicate};

/// Collections held in insertion order behind one lock.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Resource, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(fixtures: &Fixtures) -> Self {
        let collections: HashMap<Resource, Vec<Document>> = Resource::ALL
            .into_iter()
            .map(|resource| {
                let mut documents: Vec<Document> = Vec::new();
                for document in fixtures.get(resource) {
                    upsert(&mut documents, stamp(document.clone()));
                }
                (resource, documents)
            })
            .collect();

        Self {
            collections: RwLock::new(collections),
        }
    }

    async fn snapshot(&self, resource: Resource) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(&resource)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn count_documents(
        &self,
        resource: Resource,
        filter: &FilterPredicate,
    ) -> Result<u64, DataAccessError> {
        let collections = self.collections.read().await;
        let count = collections
            .get(&resource)
            .map(|documents| documents.iter().filter(|d| filter.matches(d)).count())
            .unwrap_or(0);

        Ok(count as u64)
    }

    async fn find(
        &self,
        resource: Resource,
        query: &FindQuery,
    ) -> Result<Vec<Document>, DataAccessError> {
        Ok(execute(self.snapshot(resource).await, query))
    }

    async fn find_by_id(
        &self,
        resource: Resource,
        id: &str,
    ) -> Result<Option<Document>, DataAccessError> {
        let collections = self.collections.read().await;

        Ok(collections.get(&resource).and_then(|documents| {
            documents
                .iter()
                .find(|d| document_id(d) == Some(id))
                .cloned()
        }))
    }

    async fn insert(
        &self,
        resource: Resource,
        document: Document,
    ) -> Result<Document, DataAccessError> {
        let document = stamp(document);

        upsert(
            self.collections.write().await.entry(resource).or_default(),
            document.clone(),
        );

        Ok(document)
    }

    async fn update(
        &self,
        resource: Resource,
        id: &str,
        changes: Document,
    ) -> Result<Option<Document>, DataAccessError> {
        let mut collections = self.collections.write().await;

        let Some(slot) = collections
            .get_mut(&resource)
            .and_then(|documents| documents.iter_mut().find(|d| document_id(d) == Some(id)))
        else {
            return Ok(None);
        };

        *slot = merge(std::mem::take(slot), changes);

        Ok(Some(slot.clone()))
    }

    async fn delete(
        &self,
        resource: Resource,
        id: &str,
    ) -> Result<Option<Document>, DataAccessError> {
        let mut collections = self.collections.write().await;

        let Some(documents) = collections.get_mut(&resource) else {
            return Ok(None);
        };

        Ok(documents
            .iter()
            .position(|d| document_id(d) == Some(id))
            .map(|index| documents.remove(index)))
    }

    async fn delete_many(
        &self,
        resource: Resource,
        filter: &FilterPredicate,
    ) -> Result<u64, DataAccessError> {
        let mut collections = self.collections.write().await;

        let Some(documents) = collections.get_mut(&resource) else {
            return Ok(0);
        };

        let before = documents.len();
        documents.retain(|d| !filter.matches(d));

        Ok((before - documents.len()) as u64)
    }
}

/// A record with the same `_id` is replaced in place, as an `HSET` would.
fn upsert(documents: &mut Vec<Document>, document: Document) {
    let id = document_id(&document);

    match documents.iter().position(|d| document_id(d) == id) {
        Some(index) => documents[index] = document,
        None => documents.push(document),
    }
}
