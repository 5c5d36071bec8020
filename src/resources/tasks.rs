use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use super::{Owned, OwnedResource, RefKind, Reference, ResourceService};
use crate::auth::extractors::AuthUser;
use crate::error::AppResult;
use crate::state::AppState;
use crate::store::{Entity, Filter, Page};
use crate::validation::{not_blank, PageQuery};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub user: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub project: Uuid,
    pub status: TaskStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTask {
    #[validate(custom = "not_blank", length(max = 200))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
    pub project: Uuid,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom = "not_blank", length(max = 200))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl Entity for Task {
    const COLLECTION: &'static str = "tasks";
    const LABEL: &'static str = "task";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Owned for Task {
    fn owner(&self) -> Uuid {
        self.user
    }
}

impl OwnedResource for Task {
    type Create = CreateTask;
    type Update = UpdateTask;

    fn build(id: Uuid, user: Uuid, now: OffsetDateTime, input: CreateTask) -> Self {
        Self {
            id,
            user,
            name: input.name.trim().to_string(),
            description: input.description,
            project: input.project,
            status: input.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn create_refs(input: &CreateTask) -> Vec<Reference> {
        vec![Reference::new(RefKind::Project, input.project)]
    }

    fn update_refs(input: &UpdateTask) -> Vec<Reference> {
        input
            .project
            .map(|id| Reference::new(RefKind::Project, id))
            .into_iter()
            .collect()
    }
}

// Project-wide task queries are deliberately not scoped to the caller:
// any holder of a project id may read its tasks and their count.
impl ResourceService<Task> {
    pub async fn list_by_project(&self, project: Uuid, page: Page) -> AppResult<Vec<Task>> {
        self.list_where(Filter::new().eq_id("project", project), page)
            .await
    }

    pub async fn count_by_project(&self, project: Uuid) -> AppResult<u64> {
        self.count_where(&Filter::new().eq_id("project", project))
            .await
    }
}

pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks/project/:project_id", get(list_by_project))
        .route("/tasks/project/:project_id/count", get(count_by_project))
}

#[instrument(skip(svc))]
async fn list_by_project(
    State(svc): State<ResourceService<Task>>,
    AuthUser(_user_id): AuthUser,
    Path(project_id): Path<Uuid>,
    Query(p): Query<PageQuery>,
) -> AppResult<Json<Vec<Task>>> {
    Ok(Json(svc.list_by_project(project_id, p.into_page()?).await?))
}

#[instrument(skip(svc))]
async fn count_by_project(
    State(svc): State<ResourceService<Task>>,
    AuthUser(_user_id): AuthUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let count = svc.count_by_project(project_id).await?;
    Ok(Json(json!({ "count": count })))
}
