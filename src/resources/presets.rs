use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use super::{Owned, OwnedResource};
use crate::store::Entity;
use crate::validation::not_blank;

pub const DEFAULT_REPETITIONS: u32 = 4;

/// Work/break cycle. Durations are minutes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerPreset {
    pub id: Uuid,
    pub user: Uuid,
    pub name: String,
    pub work_duration: u32,
    pub break_duration: u32,
    pub repetitions: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimerPreset {
    #[validate(custom = "not_blank", length(max = 60))]
    pub name: String,
    #[validate(range(min = 1, max = 480, message = "must be between 1 and 480 minutes"))]
    pub work_duration: u32,
    #[validate(range(min = 1, max = 480, message = "must be between 1 and 480 minutes"))]
    pub break_duration: u32,
    #[validate(range(min = 1, max = 100, message = "must be between 1 and 100"))]
    pub repetitions: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTimerPreset {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom = "not_blank", length(max = 60))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 480, message = "must be between 1 and 480 minutes"))]
    pub work_duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 480, message = "must be between 1 and 480 minutes"))]
    pub break_duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 100, message = "must be between 1 and 100"))]
    pub repetitions: Option<u32>,
}

impl Entity for TimerPreset {
    const COLLECTION: &'static str = "timer_presets";
    const LABEL: &'static str = "timer preset";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Owned for TimerPreset {
    fn owner(&self) -> Uuid {
        self.user
    }
}

impl OwnedResource for TimerPreset {
    type Create = CreateTimerPreset;
    type Update = UpdateTimerPreset;

    fn build(id: Uuid, user: Uuid, now: OffsetDateTime, input: CreateTimerPreset) -> Self {
        Self {
            id,
            user,
            name: input.name.trim().to_string(),
            work_duration: input.work_duration,
            break_duration: input.break_duration,
            repetitions: input.repetitions.unwrap_or(DEFAULT_REPETITIONS),
            created_at: now,
            updated_at: now,
        }
    }
}
