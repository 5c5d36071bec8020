//! Owner-scoped resources: clients, projects, tasks, tags and timer presets.
//!
//! Each entity only describes its shape, defaults and references; the CRUD
//! behaviour lives once in [`service::ResourceService`].

use axum::{extract::FromRef, Router};
use serde::{de::DeserializeOwned, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use crate::state::AppState;
use crate::store::{Entity, Sort};

pub mod clients;
pub mod guard;
pub mod handlers;
pub mod presets;
pub mod projects;
pub mod service;
pub mod tags;
pub mod tasks;

pub use service::ResourceService;

/// An entity carrying the id of the account that owns it.
pub trait Owned: Entity {
    fn owner(&self) -> Uuid;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Client,
    Project,
    Task,
    Tag,
    TimerPreset,
}

impl RefKind {
    pub fn collection(self) -> &'static str {
        match self {
            RefKind::Client => clients::Client::COLLECTION,
            RefKind::Project => projects::Project::COLLECTION,
            RefKind::Task => tasks::Task::COLLECTION,
            RefKind::Tag => tags::Tag::COLLECTION,
            RefKind::TimerPreset => presets::TimerPreset::COLLECTION,
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            RefKind::Client => "client",
            RefKind::Project => "project",
            RefKind::Task => "task",
            RefKind::Tag => "tags",
            RefKind::TimerPreset => "defaultTimerPreset",
        }
    }
}

/// A reference field value that must point at something the caller owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub kind: RefKind,
    pub id: Uuid,
}

impl Reference {
    pub fn new(kind: RefKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

pub trait OwnedResource: Owned {
    type Create: DeserializeOwned + Validate + Send + 'static;
    /// Serializes to a merge patch: omitted fields must be skipped.
    type Update: DeserializeOwned + Serialize + Validate + Send + 'static;

    const ORDER: Sort = Sort::newest("createdAt");

    fn build(id: Uuid, user: Uuid, now: OffsetDateTime, input: Self::Create) -> Self;

    fn create_refs(_input: &Self::Create) -> Vec<Reference> {
        Vec::new()
    }

    fn update_refs(_input: &Self::Update) -> Vec<Reference> {
        Vec::new()
    }
}

impl<E: OwnedResource> FromRef<AppState> for ResourceService<E> {
    fn from_ref(state: &AppState) -> Self {
        ResourceService::new(state.store.clone(), state.store_timeout())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::routes::<clients::Client>("/clients"))
        .merge(handlers::routes::<projects::Project>("/projects"))
        .merge(handlers::routes::<tasks::Task>("/tasks"))
        .merge(tasks::project_routes())
        .merge(handlers::routes::<tags::Tag>("/tags"))
        .merge(handlers::routes::<presets::TimerPreset>("/timer-presets"))
}
