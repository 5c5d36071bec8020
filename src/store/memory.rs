use std::{cmp::Ordering, collections::HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{parse_timestamp, record_id, DocumentStore, Filter, Query, Record, Sort};

/// Process-local store. Used by tests and when no database is configured.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<Uuid, Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare(a: &Record, b: &Record, sort: Sort) -> Ordering {
    let key = |r: &Record| r.get(sort.field).and_then(parse_timestamp);
    let ord = key(a)
        .cmp(&key(b))
        .then_with(|| record_id(a).ok().cmp(&record_id(b).ok()));
    if sort.descending {
        ord.reverse()
    } else {
        ord
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, record: Record) -> anyhow::Result<Record> {
        let id = record_id(&record)?;
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();
        anyhow::ensure!(!docs.contains_key(&id), "duplicate id {id} in {collection}");
        docs.insert(id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, collection: &str, id: Uuid) -> anyhow::Result<Option<Record>> {
        let guard = self.collections.read().await;
        Ok(guard.get(collection).and_then(|docs| docs.get(&id)).cloned())
    }

    async fn find(&self, collection: &str, query: &Query) -> anyhow::Result<Vec<Record>> {
        let guard = self.collections.read().await;
        let Some(docs) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<Record> = docs
            .values()
            .filter(|r| query.filter.matches(r))
            .cloned()
            .collect();
        let sort = query.sort.unwrap_or(Sort::newest("createdAt"));
        hits.sort_by(|a, b| compare(a, b, sort));
        Ok(match query.page {
            Some(page) => hits
                .into_iter()
                .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
                .take(usize::try_from(page.limit).unwrap_or(usize::MAX))
                .collect(),
            None => hits,
        })
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: Uuid,
        patch: Record,
    ) -> anyhow::Result<Option<Record>> {
        let mut guard = self.collections.write().await;
        let Some(doc) = guard.get_mut(collection).and_then(|docs| docs.get_mut(&id)) else {
            return Ok(None);
        };
        for (key, value) in patch {
            if key != "id" {
                doc.insert(key, value);
            }
        }
        Ok(Some(doc.clone()))
    }

    async fn delete_by_id(&self, collection: &str, id: Uuid) -> anyhow::Result<bool> {
        let mut guard = self.collections.write().await;
        Ok(guard
            .get_mut(collection)
            .map_or(false, |docs| docs.remove(&id).is_some()))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64> {
        let guard = self.collections.read().await;
        Ok(guard.get(collection).map_or(0, |docs| {
            docs.values().filter(|r| filter.matches(r)).count() as u64
        }))
    }
}

#[cfg(test)]
mod memory_tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::store::Page;

    fn doc(id: Uuid, user: &str, created: &str) -> Record {
        match json!({ "id": id.to_string(), "user": user, "createdAt": created }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    async fn seeded(n: usize) -> (MemoryStore, Vec<Uuid>) {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for i in 0..n {
            let id = Uuid::new_v4();
            let created = format!("2024-01-01T00:00:{:02}Z", i);
            store.insert("things", doc(id, "u1", &created)).await.unwrap();
            ids.push(id);
        }
        (store, ids)
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.insert("things", doc(id, "u1", "2024-01-01T00:00:00Z")).await.unwrap();
        assert!(store
            .insert("things", doc(id, "u1", "2024-01-01T00:00:00Z"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn pages_do_not_overlap_and_are_newest_first() {
        let (store, ids) = seeded(12).await;
        let filter = Filter::new().eq("user", "u1");
        let q = |p| Query::new(filter.clone()).paged(Page::new(p, 5));

        let first = store.find("things", &q(1)).await.unwrap();
        let second = store.find("things", &q(2)).await.unwrap();
        let third = store.find("things", &q(3)).await.unwrap();

        assert_eq!(first.len(), 5);
        assert_eq!(second.len(), 5);
        assert_eq!(third.len(), 2);
        assert_eq!(record_id(&first[0]).unwrap(), ids[11]);
        for r in &second {
            assert!(!first.contains(r));
        }
    }

    #[tokio::test]
    async fn pages_far_past_the_end_are_empty() {
        let (store, _) = seeded(3).await;
        let q = Query::new(Filter::new()).paged(Page::new(u64::MAX, 100));
        assert!(store.find("things", &q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_merges_shallowly_and_keeps_id() {
        let (store, ids) = seeded(1).await;
        let patch = match json!({ "name": "x", "id": "ignored" }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let updated = store.update_by_id("things", ids[0], patch).await.unwrap().unwrap();
        assert_eq!(updated["name"], "x");
        assert_eq!(updated["user"], "u1");
        assert_eq!(record_id(&updated).unwrap(), ids[0]);

        let missing = store
            .update_by_id("things", Uuid::new_v4(), Record::new())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let (store, ids) = seeded(2).await;
        assert!(store.delete_by_id("things", ids[0]).await.unwrap());
        assert!(!store.delete_by_id("things", ids[0]).await.unwrap());
        assert!(!store.delete_by_id("other", ids[1]).await.unwrap());
        assert_eq!(store.count("things", &Filter::new()).await.unwrap(), 1);
    }
}
