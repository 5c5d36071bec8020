use axum::{
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use super::{OwnedResource, ResourceService};
use crate::auth::extractors::AuthUser;
use crate::error::AppResult;
use crate::state::AppState;
use crate::validation::{JsonBody, PageQuery};

/// CRUD routes for one resource under `path`.
pub fn routes<E>(path: &str) -> Router<AppState>
where
    E: OwnedResource,
    ResourceService<E>: FromRef<AppState>,
{
    Router::new()
        .route(path, post(create::<E>).get(list::<E>))
        .route(&format!("{path}/count"), get(count::<E>))
        .route(
            &format!("{path}/:id"),
            get(get_one::<E>).patch(update::<E>).delete(remove::<E>),
        )
}

#[instrument(skip(svc, input), fields(kind = E::LABEL))]
async fn create<E: OwnedResource>(
    State(svc): State<ResourceService<E>>,
    AuthUser(user_id): AuthUser,
    JsonBody(input): JsonBody<E::Create>,
) -> AppResult<(StatusCode, Json<E>)> {
    let created = svc.create(user_id, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(svc), fields(kind = E::LABEL))]
async fn list<E: OwnedResource>(
    State(svc): State<ResourceService<E>>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<PageQuery>,
) -> AppResult<Json<Vec<E>>> {
    Ok(Json(svc.list(user_id, p.into_page()?).await?))
}

#[instrument(skip(svc), fields(kind = E::LABEL))]
async fn count<E: OwnedResource>(
    State(svc): State<ResourceService<E>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Value>> {
    let count = svc.count(user_id).await?;
    Ok(Json(json!({ "count": count })))
}

#[instrument(skip(svc), fields(kind = E::LABEL))]
async fn get_one<E: OwnedResource>(
    State(svc): State<ResourceService<E>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<E>> {
    Ok(Json(svc.get(user_id, id).await?))
}

#[instrument(skip(svc, input), fields(kind = E::LABEL))]
async fn update<E: OwnedResource>(
    State(svc): State<ResourceService<E>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    JsonBody(input): JsonBody<E::Update>,
) -> AppResult<Json<E>> {
    Ok(Json(svc.update(user_id, id, input).await?))
}

#[instrument(skip(svc), fields(kind = E::LABEL))]
async fn remove<E: OwnedResource>(
    State(svc): State<ResourceService<E>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let deleted = svc.delete(user_id, id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
