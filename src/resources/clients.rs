use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use super::{Owned, OwnedResource};
use crate::store::Entity;
use crate::validation::{hex_color, not_blank};

pub const DEFAULT_COLOR: &str = "#64748b";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Uuid,
    pub user: Uuid,
    pub name: String,
    #[serde(default)]
    pub contact_info: String,
    pub color: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClient {
    #[validate(custom = "not_blank", length(max = 120))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub contact_info: String,
    #[validate(custom = "hex_color")]
    pub color: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClient {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom = "not_blank", length(max = 120))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub contact_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom = "hex_color")]
    pub color: Option<String>,
}

impl Entity for Client {
    const COLLECTION: &'static str = "clients";
    const LABEL: &'static str = "client";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Owned for Client {
    fn owner(&self) -> Uuid {
        self.user
    }
}

impl OwnedResource for Client {
    type Create = CreateClient;
    type Update = UpdateClient;

    fn build(id: Uuid, user: Uuid, now: OffsetDateTime, input: CreateClient) -> Self {
        Self {
            id,
            user,
            name: input.name.trim().to_string(),
            contact_info: input.contact_info,
            color: input.color.unwrap_or_else(|| DEFAULT_COLOR.into()),
            created_at: now,
            updated_at: now,
        }
    }
}
