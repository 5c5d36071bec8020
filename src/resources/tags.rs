use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use super::{Owned, OwnedResource};
use crate::store::Entity;
use crate::validation::{hex_color, not_blank};

pub const DEFAULT_COLOR: &str = "#a855f7";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub user: Uuid,
    pub name: String,
    pub color: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTag {
    #[validate(custom = "not_blank", length(max = 60))]
    pub name: String,
    #[validate(custom = "hex_color")]
    pub color: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateTag {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom = "not_blank", length(max = 60))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom = "hex_color")]
    pub color: Option<String>,
}

impl Entity for Tag {
    const COLLECTION: &'static str = "tags";
    const LABEL: &'static str = "tag";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Owned for Tag {
    fn owner(&self) -> Uuid {
        self.user
    }
}

impl OwnedResource for Tag {
    type Create = CreateTag;
    type Update = UpdateTag;

    fn build(id: Uuid, user: Uuid, now: OffsetDateTime, input: CreateTag) -> Self {
        Self {
            id,
            user,
            name: input.name.trim().to_string(),
            color: input.color.unwrap_or_else(|| DEFAULT_COLOR.into()),
            created_at: now,
            updated_at: now,
        }
    }
}
