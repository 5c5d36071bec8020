use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use super::dto::{CreateTimeEntry, RangeQuery, RunningTimer, UpdateTimeEntry};
use super::engine::TimeEntryEngine;
use super::model::TimeEntry;
use crate::auth::extractors::AuthUser;
use crate::error::AppResult;
use crate::state::AppState;
use crate::validation::{JsonBody, PageQuery};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/time-entries", post(create).get(list))
        .route("/time-entries/count", get(count))
        .route("/time-entries/running", get(running))
        .route("/time-entries/range", get(by_range))
        .route("/time-entries/project/:project_id", get(by_project))
        .route("/time-entries/task/:task_id", get(by_task))
        .route(
            "/time-entries/:id",
            get(get_one).patch(update).delete(remove),
        )
        .route("/time-entries/:id/stop", post(stop))
}

#[instrument(skip(engine, input))]
async fn create(
    State(engine): State<TimeEntryEngine>,
    AuthUser(user_id): AuthUser,
    JsonBody(input): JsonBody<CreateTimeEntry>,
) -> AppResult<(StatusCode, Json<TimeEntry>)> {
    let entry = engine.create(user_id, input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[instrument(skip(engine))]
async fn list(
    State(engine): State<TimeEntryEngine>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<PageQuery>,
) -> AppResult<Json<Vec<TimeEntry>>> {
    Ok(Json(engine.list_by_user(user_id, p.into_page()?).await?))
}

#[instrument(skip(engine))]
async fn count(
    State(engine): State<TimeEntryEngine>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Value>> {
    let count = engine.count(user_id).await?;
    Ok(Json(json!({ "count": count })))
}

/// `null` when nothing is running.
#[instrument(skip(engine))]
async fn running(
    State(engine): State<TimeEntryEngine>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Option<RunningTimer>>> {
    let now = OffsetDateTime::now_utc();
    let running = engine.find_running_by_user(user_id).await?;
    Ok(Json(running.map(|e| RunningTimer::at(e, now))))
}

#[instrument(skip(engine))]
async fn by_range(
    State(engine): State<TimeEntryEngine>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<RangeQuery>,
) -> AppResult<Json<Vec<TimeEntry>>> {
    let page = PageQuery {
        page: q.page,
        limit: q.limit,
    }
    .into_page()?;
    Ok(Json(
        engine
            .list_by_date_range(user_id, q.start, q.end, page)
            .await?,
    ))
}

#[instrument(skip(engine))]
async fn by_project(
    State(engine): State<TimeEntryEngine>,
    AuthUser(user_id): AuthUser,
    Path(project_id): Path<Uuid>,
    Query(p): Query<PageQuery>,
) -> AppResult<Json<Vec<TimeEntry>>> {
    Ok(Json(
        engine
            .list_by_project(user_id, project_id, p.into_page()?)
            .await?,
    ))
}

#[instrument(skip(engine))]
async fn by_task(
    State(engine): State<TimeEntryEngine>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<Uuid>,
    Query(p): Query<PageQuery>,
) -> AppResult<Json<Vec<TimeEntry>>> {
    Ok(Json(
        engine
            .list_by_task(user_id, task_id, p.into_page()?)
            .await?,
    ))
}

#[instrument(skip(engine))]
async fn get_one(
    State(engine): State<TimeEntryEngine>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TimeEntry>> {
    Ok(Json(engine.get(user_id, id).await?))
}

#[instrument(skip(engine, input))]
async fn update(
    State(engine): State<TimeEntryEngine>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    JsonBody(input): JsonBody<UpdateTimeEntry>,
) -> AppResult<Json<TimeEntry>> {
    Ok(Json(engine.update(user_id, id, input).await?))
}

#[instrument(skip(engine))]
async fn stop(
    State(engine): State<TimeEntryEngine>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TimeEntry>> {
    Ok(Json(engine.stop(user_id, id).await?))
}

#[instrument(skip(engine))]
async fn remove(
    State(engine): State<TimeEntryEngine>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let deleted = engine.delete(user_id, id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
