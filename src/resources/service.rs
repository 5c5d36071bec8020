use std::{marker::PhantomData, sync::Arc, time::Duration};

use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{guard, OwnedResource, Reference};
use crate::error::{AppError, AppResult};
use crate::store::{patch_of, timestamp_value, DocumentStore, Filter, Page, Query, Record, Repo};
use crate::validation::validate;

/// Create/read/update/delete for one owner-scoped entity type.
pub struct ResourceService<E> {
    repo: Repo<E>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for ResourceService<E> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: OwnedResource> ResourceService<E> {
    pub fn new(store: Arc<dyn DocumentStore>, timeout: Duration) -> Self {
        Self {
            repo: Repo::new(store, timeout),
            _entity: PhantomData,
        }
    }

    pub fn repo(&self) -> &Repo<E> {
        &self.repo
    }

    pub async fn ensure_references(&self, caller: Uuid, refs: &[Reference]) -> AppResult<()> {
        if refs.is_empty() {
            return Ok(());
        }
        guard::ensure_references(self.repo.store(), self.repo.timeout(), caller, refs).await
    }

    pub async fn create(&self, caller: Uuid, input: E::Create) -> AppResult<E> {
        validate(&input)?;
        self.ensure_references(caller, &E::create_refs(&input)).await?;
        let entity = E::build(Uuid::new_v4(), caller, OffsetDateTime::now_utc(), input);
        let stored = self.repo.insert(&entity).await?;
        info!(id = %stored.id(), user_id = %caller, kind = E::LABEL, "created");
        Ok(stored)
    }

    pub async fn get(&self, caller: Uuid, id: Uuid) -> AppResult<E> {
        guard::authorize(self.repo.get(id).await?, caller)
    }

    pub async fn update(&self, caller: Uuid, id: Uuid, input: E::Update) -> AppResult<E> {
        validate(&input)?;
        self.get(caller, id).await?;
        self.ensure_references(caller, &E::update_refs(&input)).await?;
        let mut patch = patch_of(&input)?;
        if let Some(Value::String(name)) = patch.get_mut("name") {
            *name = name.trim().to_string();
        }
        self.write_patch(id, patch).await
    }

    /// Applies a merge patch and refreshes `updatedAt`. Callers must have
    /// authorized access to `id` already.
    pub(crate) async fn write_patch(&self, id: Uuid, mut patch: Record) -> AppResult<E> {
        patch.insert(
            "updatedAt".into(),
            timestamp_value(OffsetDateTime::now_utc())?,
        );
        match self.repo.update(id, patch).await? {
            Some(updated) => {
                debug!(%id, kind = E::LABEL, "updated");
                Ok(updated)
            }
            None => {
                error!(%id, kind = E::LABEL, "update matched no document after authorization");
                Err(AppError::internal(format!("{} {id} vanished during update", E::LABEL)))
            }
        }
    }

    pub async fn delete(&self, caller: Uuid, id: Uuid) -> AppResult<bool> {
        self.get(caller, id).await?;
        let removed = self.repo.delete(id).await?;
        info!(%id, user_id = %caller, kind = E::LABEL, removed, "deleted");
        Ok(removed)
    }

    pub async fn list(&self, caller: Uuid, page: Page) -> AppResult<Vec<E>> {
        self.list_where(Filter::owned_by(caller), page).await
    }

    pub async fn count(&self, caller: Uuid) -> AppResult<u64> {
        self.count_where(&Filter::owned_by(caller)).await
    }

    pub async fn list_where(&self, filter: Filter, page: Page) -> AppResult<Vec<E>> {
        let query = Query::new(filter).sorted(E::ORDER).paged(page);
        Ok(self.repo.find(&query).await?)
    }

    pub async fn count_where(&self, filter: &Filter) -> AppResult<u64> {
        Ok(self.repo.count(filter).await?)
    }
}
