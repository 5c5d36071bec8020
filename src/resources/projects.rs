use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use super::{Owned, OwnedResource, RefKind, Reference};
use crate::store::Entity;
use crate::validation::{hex_color, not_blank};

pub const DEFAULT_COLOR: &str = "#3b82f6";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub user: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub color: String,
    pub status: ProjectStatus,
    #[serde(default)]
    pub client: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProject {
    #[validate(custom = "not_blank", length(max = 120))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub description: String,
    #[validate(custom = "hex_color")]
    pub color: Option<String>,
    pub status: Option<ProjectStatus>,
    pub client: Option<Uuid>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProject {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom = "not_blank", length(max = 120))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom = "hex_color")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<Uuid>,
}

impl Entity for Project {
    const COLLECTION: &'static str = "projects";
    const LABEL: &'static str = "project";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Owned for Project {
    fn owner(&self) -> Uuid {
        self.user
    }
}

impl OwnedResource for Project {
    type Create = CreateProject;
    type Update = UpdateProject;

    fn build(id: Uuid, user: Uuid, now: OffsetDateTime, input: CreateProject) -> Self {
        Self {
            id,
            user,
            name: input.name.trim().to_string(),
            description: input.description,
            color: input.color.unwrap_or_else(|| DEFAULT_COLOR.into()),
            status: input.status.unwrap_or_default(),
            client: input.client,
            created_at: now,
            updated_at: now,
        }
    }

    fn create_refs(input: &CreateProject) -> Vec<Reference> {
        input
            .client
            .map(|id| Reference::new(RefKind::Client, id))
            .into_iter()
            .collect()
    }

    fn update_refs(input: &UpdateProject) -> Vec<Reference> {
        input
            .client
            .map(|id| Reference::new(RefKind::Client, id))
            .into_iter()
            .collect()
    }
}
