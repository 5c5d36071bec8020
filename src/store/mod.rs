//! Document persistence collaborator.
//!
//! The store deals in JSON objects keyed by `id` inside named collections.
//! Ownership scoping happens in the services, never here.

use std::{future::Future, marker::PhantomData, sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type Record = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(&'static str, Value),
    /// Inclusive on both ends; the field holds an RFC 3339 timestamp.
    Between {
        field: &'static str,
        from: Option<OffsetDateTime>,
        to: Option<OffsetDateTime>,
    },
}

impl Condition {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Condition::Eq(field, expected) => record.get(*field).unwrap_or(&Value::Null) == expected,
            Condition::Between { field, from, to } => {
                let Some(at) = record.get(*field).and_then(parse_timestamp) else {
                    return false;
                };
                from.map_or(true, |f| at >= f) && to.map_or(true, |t| at <= t)
            }
        }
    }
}

/// Conjunction of conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(pub Vec<Condition>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owned_by(user: Uuid) -> Self {
        Self::new().eq_id("user", user)
    }

    pub fn eq(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.0.push(Condition::Eq(field, value.into()));
        self
    }

    pub fn eq_id(self, field: &'static str, id: Uuid) -> Self {
        self.eq(field, id.to_string())
    }

    pub fn between(
        mut self,
        field: &'static str,
        from: Option<OffsetDateTime>,
        to: Option<OffsetDateTime>,
    ) -> Self {
        self.0.push(Condition::Between { field, from, to });
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.0.iter().all(|c| c.matches(record))
    }
}

/// Ordering by a timestamp field, ties broken by id in the same direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: &'static str,
    pub descending: bool,
}

impl Sort {
    pub const fn newest(field: &'static str) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

/// 1-based page number and positive page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u64,
    pub limit: u64,
}

impl Page {
    pub const DEFAULT_LIMIT: u64 = 10;

    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    /// Saturates rather than wrapping for absurd page numbers.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_LIMIT)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filter: Filter,
    pub sort: Option<Sort>,
    pub page: Option<Page>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn sorted(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn paged(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: &str, record: Record) -> anyhow::Result<Record>;
    async fn find_by_id(&self, collection: &str, id: Uuid) -> anyhow::Result<Option<Record>>;
    async fn find(&self, collection: &str, query: &Query) -> anyhow::Result<Vec<Record>>;
    /// Shallow-merges `patch` into the stored document in one atomic step.
    async fn update_by_id(
        &self,
        collection: &str,
        id: Uuid,
        patch: Record,
    ) -> anyhow::Result<Option<Record>>;
    async fn delete_by_id(&self, collection: &str, id: Uuid) -> anyhow::Result<bool>;
    async fn count(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64>;
}

/// A typed document living in one collection.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
    /// Human-readable name used in error messages.
    const LABEL: &'static str;

    fn id(&self) -> Uuid;
}

pub fn parse_timestamp(value: &Value) -> Option<OffsetDateTime> {
    value
        .as_str()
        .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
}

pub fn timestamp_value(at: OffsetDateTime) -> anyhow::Result<Value> {
    Ok(Value::String(at.format(&Rfc3339).context("format timestamp")?))
}

pub fn record_id(record: &Record) -> anyhow::Result<Uuid> {
    let raw = record
        .get("id")
        .and_then(Value::as_str)
        .context("document has no string id")?;
    Uuid::parse_str(raw).context("document id is not a uuid")
}

/// Serializes an input object into a merge patch. `None` fields must be
/// skipped by the input's serde attributes.
pub fn patch_of<T: Serialize>(input: &T) -> anyhow::Result<Record> {
    match serde_json::to_value(input).context("serialize patch")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("patch must be an object, got {other}"),
    }
}

pub fn to_record<E: Serialize>(entity: &E) -> anyhow::Result<Record> {
    patch_of(entity)
}

pub fn from_record<E: DeserializeOwned>(record: Record) -> anyhow::Result<E> {
    serde_json::from_value(Value::Object(record)).context("decode stored document")
}

/// Runs a store call under a deadline. Expiry surfaces as an ordinary error.
pub async fn bounded<T>(
    timeout: Duration,
    what: &str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => anyhow::bail!("{what} timed out after {timeout:?}"),
    }
}

/// Typed, deadline-bounded view over one collection.
pub struct Repo<E> {
    store: Arc<dyn DocumentStore>,
    timeout: Duration,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repo<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            timeout: self.timeout,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repo<E> {
    pub fn new(store: Arc<dyn DocumentStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            _entity: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn insert(&self, entity: &E) -> anyhow::Result<E> {
        let record = to_record(entity)?;
        let stored = bounded(
            self.timeout,
            "insert",
            self.store.insert(E::COLLECTION, record),
        )
        .await
        .with_context(|| format!("insert {}", E::LABEL))?;
        from_record(stored)
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<E>> {
        bounded(
            self.timeout,
            "find_by_id",
            self.store.find_by_id(E::COLLECTION, id),
        )
        .await
        .with_context(|| format!("find {} {id}", E::LABEL))?
        .map(from_record)
        .transpose()
    }

    pub async fn find(&self, query: &Query) -> anyhow::Result<Vec<E>> {
        bounded(self.timeout, "find", self.store.find(E::COLLECTION, query))
            .await
            .with_context(|| format!("list {}", E::LABEL))?
            .into_iter()
            .map(from_record)
            .collect()
    }

    pub async fn find_one(&self, filter: Filter) -> anyhow::Result<Option<E>> {
        let query = Query::new(filter).paged(Page::new(1, 1));
        Ok(self.find(&query).await?.into_iter().next())
    }

    pub async fn update(&self, id: Uuid, patch: Record) -> anyhow::Result<Option<E>> {
        bounded(
            self.timeout,
            "update_by_id",
            self.store.update_by_id(E::COLLECTION, id, patch),
        )
        .await
        .with_context(|| format!("update {} {id}", E::LABEL))?
        .map(from_record)
        .transpose()
    }

    pub async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        bounded(
            self.timeout,
            "delete_by_id",
            self.store.delete_by_id(E::COLLECTION, id),
        )
        .await
        .with_context(|| format!("delete {} {id}", E::LABEL))
    }

    pub async fn count(&self, filter: &Filter) -> anyhow::Result<u64> {
        bounded(self.timeout, "count", self.store.count(E::COLLECTION, filter))
            .await
            .with_context(|| format!("count {}", E::LABEL))
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Wraps a store and makes `update_by_id` fail for one collection while
    /// armed: either with an error, or by matching nothing.
    pub struct FailingUpdates {
        inner: Arc<dyn DocumentStore>,
        collection: &'static str,
        armed: AtomicBool,
        vanish: bool,
    }

    impl FailingUpdates {
        pub fn new(inner: Arc<dyn DocumentStore>, collection: &'static str) -> Self {
            Self {
                inner,
                collection,
                armed: AtomicBool::new(true),
                vanish: false,
            }
        }

        /// Updates report "no such document" even though it exists.
        pub fn vanishing(inner: Arc<dyn DocumentStore>, collection: &'static str) -> Self {
            Self {
                vanish: true,
                ..Self::new(inner, collection)
            }
        }

        pub fn disarm(&self) {
            self.armed.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DocumentStore for FailingUpdates {
        async fn insert(&self, collection: &str, record: Record) -> anyhow::Result<Record> {
            self.inner.insert(collection, record).await
        }
        async fn find_by_id(&self, collection: &str, id: Uuid) -> anyhow::Result<Option<Record>> {
            self.inner.find_by_id(collection, id).await
        }
        async fn find(&self, collection: &str, query: &Query) -> anyhow::Result<Vec<Record>> {
            self.inner.find(collection, query).await
        }
        async fn update_by_id(
            &self,
            collection: &str,
            id: Uuid,
            patch: Record,
        ) -> anyhow::Result<Option<Record>> {
            if collection == self.collection && self.armed.load(Ordering::SeqCst) {
                if self.vanish {
                    return Ok(None);
                }
                anyhow::bail!("simulated update failure on {collection}");
            }
            self.inner.update_by_id(collection, id, patch).await
        }
        async fn delete_by_id(&self, collection: &str, id: Uuid) -> anyhow::Result<bool> {
            self.inner.delete_by_id(collection, id).await
        }
        async fn count(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64> {
            self.inner.count(collection, filter).await
        }
    }

    /// Never answers; used to exercise deadlines.
    pub struct StalledStore;

    #[async_trait]
    impl DocumentStore for StalledStore {
        async fn insert(&self, _c: &str, _r: Record) -> anyhow::Result<Record> {
            std::future::pending().await
        }
        async fn find_by_id(&self, _c: &str, _id: Uuid) -> anyhow::Result<Option<Record>> {
            std::future::pending().await
        }
        async fn find(&self, _c: &str, _q: &Query) -> anyhow::Result<Vec<Record>> {
            std::future::pending().await
        }
        async fn update_by_id(&self, _c: &str, _id: Uuid, _p: Record) -> anyhow::Result<Option<Record>> {
            std::future::pending().await
        }
        async fn delete_by_id(&self, _c: &str, _id: Uuid) -> anyhow::Result<bool> {
            std::future::pending().await
        }
        async fn count(&self, _c: &str, _f: &Filter) -> anyhow::Result<u64> {
            std::future::pending().await
        }
    }
}
