//! The single ownership check every resource read and write goes through.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{Owned, Reference};
use crate::error::{AppError, AppResult};
use crate::store::{bounded, DocumentStore};

pub fn is_owner(owner: Uuid, caller: Uuid) -> bool {
    owner == caller
}

/// Passes the resource through only when `caller` owns it. A foreign
/// resource is reported exactly like a missing one.
pub fn authorize<E: Owned>(resource: Option<E>, caller: Uuid) -> AppResult<E> {
    match resource {
        Some(r) if is_owner(r.owner(), caller) => Ok(r),
        Some(r) => {
            debug!(id = %r.id(), %caller, kind = E::LABEL, "ownership mismatch");
            Err(AppError::NotFound(E::LABEL))
        }
        None => Err(AppError::NotFound(E::LABEL)),
    }
}

/// Every reference must point at a document owned by `caller`.
pub async fn ensure_references(
    store: &Arc<dyn DocumentStore>,
    timeout: Duration,
    caller: Uuid,
    refs: &[Reference],
) -> AppResult<()> {
    let mut bad = Vec::new();
    for r in refs {
        let doc = bounded(
            timeout,
            "find_by_id",
            store.find_by_id(r.kind.collection(), r.id),
        )
        .await?;
        let owner = doc
            .as_ref()
            .and_then(|d| d.get("user"))
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());
        if !owner.is_some_and(|o| is_owner(o, caller)) {
            bad.push(format!("{}: {} does not exist", r.kind.field(), r.id));
        }
    }
    if bad.is_empty() {
        Ok(())
    } else {
        bad.sort();
        bad.dedup();
        Err(AppError::BadRequest(bad.join("; ")))
    }
}
