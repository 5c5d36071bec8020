use serde_json::Value;
use time::OffsetDateTime;
use tracing::error;
use uuid::Uuid;

use crate::auth::repo_types::User;
use crate::error::{AppError, AppResult};
use crate::store::{timestamp_value, Entity, Filter, Record, Repo};

impl Entity for User {
    const COLLECTION: &'static str = "users";
    const LABEL: &'static str = "user";

    fn id(&self) -> Uuid {
        self.id
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    /// Find a user by email, case-insensitively.
    pub async fn find_by_email(users: &Repo<User>, email: &str) -> anyhow::Result<Option<User>> {
        users
            .find_one(Filter::new().eq("email", normalize_email(email)))
            .await
    }

    /// Load a user that must exist.
    pub async fn load(users: &Repo<User>, id: Uuid) -> AppResult<User> {
        users.get(id).await?.ok_or(AppError::NotFound(User::LABEL))
    }

    /// Merge `patch` into the account and refresh `updatedAt`.
    pub async fn apply_patch(users: &Repo<User>, id: Uuid, mut patch: Record) -> AppResult<User> {
        patch.insert(
            "updatedAt".into(),
            timestamp_value(OffsetDateTime::now_utc())?,
        );
        match users.update(id, patch).await? {
            Some(user) => Ok(user),
            None => {
                error!(user_id = %id, "user update matched no document");
                Err(AppError::internal(format!("user {id} vanished during update")))
            }
        }
    }
}

/// Single-field patch.
pub fn set(field: &str, value: impl Into<Value>) -> Record {
    let mut patch = Record::new();
    patch.insert(field.into(), value.into());
    patch
}

#[cfg(test)]
mod repo_tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn emails_are_compared_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
    }

    #[tokio::test]
    async fn patching_an_account_that_is_gone_is_internal() {
        let users: Repo<User> = Repo::new(Arc::new(MemoryStore::new()), Duration::from_secs(5));
        let err = User::apply_patch(&users, Uuid::new_v4(), set("name", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)), "got {err:?}");
    }
}
