//! # Redis
//!
//! Persistent backend for the directory.
//!
//! ## Layout
//!
//! - One hash per collection: `devcamper:bootcamps`, `devcamper:courses`, `devcamper:reviews`
//! - Field is the record `_id`, value is the record serialized as JSON
//! - `HLEN` answers unfiltered counts without loading the collection
//! - Filtered reads load the hash with `HVALS` and evaluate in process
//!
//! ## Notes
//! - Updates are read-modify-write without a lock. Two concurrent updates to the
//!   same record can lose one of them.
use std::time::Duration;

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, RedisError,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde_json::Value;
use tracing::debug;

use catalog::{Document, Resource};

use super::{DocumentStore, FindQuery, document_id, execute, merge, stamp};
use crate::{error::DataAccessError, query::FilterPredicate};

const KEY_PREFIX: &str = "devcamper";

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, RedisError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;

    client.get_connection_manager_with_config(config).await
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, DataAccessError> {
        Ok(Self::new(init_redis(redis_url).await?))
    }

    fn key(resource: Resource) -> String {
        format!("{KEY_PREFIX}:{}", resource.collection())
    }

    async fn load(&self, resource: Resource) -> Result<Vec<Document>, DataAccessError> {
        let mut connection = self.connection.clone();
        let raw: Vec<String> = connection.hvals(Self::key(resource)).await?;

        debug!("Loaded {} records from {resource}", raw.len());

        raw.iter().map(|json| decode(resource, json)).collect()
    }

    async fn store(&self, resource: Resource, document: &Document) -> Result<(), DataAccessError> {
        let Some(id) = document_id(document) else {
            return Err(DataAccessError::MissingId {
                collection: resource.collection().to_string(),
            });
        };

        let json = serde_json::to_string(document)?;
        let mut connection = self.connection.clone();
        let _: () = connection.hset(Self::key(resource), id, json).await?;

        Ok(())
    }
}

fn decode(resource: Resource, json: &str) -> Result<Document, DataAccessError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(document) => Ok(document),
        _ => Err(DataAccessError::NotAnObject {
            collection: resource.collection().to_string(),
        }),
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn count_documents(
        &self,
        resource: Resource,
        filter: &FilterPredicate,
    ) -> Result<u64, DataAccessError> {
        if filter.is_empty() {
            let mut connection = self.connection.clone();
            let count: u64 = connection.hlen(Self::key(resource)).await?;
            return Ok(count);
        }

        let documents = self.load(resource).await?;
        Ok(documents.iter().filter(|d| filter.matches(d)).count() as u64)
    }

    async fn find(
        &self,
        resource: Resource,
        query: &FindQuery,
    ) -> Result<Vec<Document>, DataAccessError> {
        Ok(execute(self.load(resource).await?, query))
    }

    async fn find_by_id(
        &self,
        resource: Resource,
        id: &str,
    ) -> Result<Option<Document>, DataAccessError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.hget(Self::key(resource), id).await?;

        raw.map(|json| decode(resource, &json)).transpose()
    }

    async fn insert(
        &self,
        resource: Resource,
        document: Document,
    ) -> Result<Document, DataAccessError> {
        let document = stamp(document);
        self.store(resource, &document).await?;

        Ok(document)
    }

    async fn update(
        &self,
        resource: Resource,
        id: &str,
        changes: Document,
    ) -> Result<Option<Document>, DataAccessError> {
        let Some(existing) = self.find_by_id(resource, id).await? else {
            return Ok(None);
        };

        let updated = merge(existing, changes);
        self.store(resource, &updated).await?;

        Ok(Some(updated))
    }

    async fn delete(
        &self,
        resource: Resource,
        id: &str,
    ) -> Result<Option<Document>, DataAccessError> {
        let existing = self.find_by_id(resource, id).await?;

        if existing.is_some() {
            let mut connection = self.connection.clone();
            let _: u64 = connection.hdel(Self::key(resource), id).await?;
        }

        Ok(existing)
    }

    async fn delete_many(
        &self,
        resource: Resource,
        filter: &FilterPredicate,
    ) -> Result<u64, DataAccessError> {
        let mut connection = self.connection.clone();

        if filter.is_empty() {
            let count: u64 = connection.hlen(Self::key(resource)).await?;
            let _: () = connection.del(Self::key(resource)).await?;
            return Ok(count);
        }

        let ids: Vec<String> = self
            .load(resource)
            .await?
            .iter()
            .filter(|d| filter.matches(d))
            .filter_map(|d| document_id(d).map(str::to_string))
            .collect();

        if ids.is_empty() {
            return Ok(0);
        }

        let removed: u64 = connection.hdel(Self::key(resource), ids).await?;
        Ok(removed)
    }
}
