//! Default records for a new account.
//!
//! `ensure_defaults` only creates what is missing, so it can run at
//! registration and again later to repair a partial setup.

use axum::extract::FromRef;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::repo::set;
use crate::auth::repo_types::User;
use crate::error::AppResult;
use crate::resources::presets::{CreateTimerPreset, TimerPreset};
use crate::resources::projects::{CreateProject, Project, ProjectStatus};
use crate::resources::ResourceService;
use crate::state::AppState;
use crate::store::{Filter, Repo};

pub const DEFAULT_PROJECT: &str = "Focus";
const DEFAULT_PROJECT_DESCRIPTION: &str = "Your first project. Rename it or start tracking right away.";
const DEFAULT_PROJECT_COLOR: &str = "#6366f1";

/// (name, work minutes, break minutes, repetitions). The first one becomes
/// the account default.
pub const DEFAULT_PRESETS: [(&str, u32, u32, u32); 2] =
    [("Pomodoro", 25, 5, 4), ("Deep Work", 52, 17, 4)];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionReport {
    pub project_created: bool,
    pub presets_created: u32,
    pub default_preset_set: bool,
}

#[derive(Clone)]
pub struct Provisioner {
    projects: ResourceService<Project>,
    presets: ResourceService<TimerPreset>,
    users: Repo<User>,
}

impl FromRef<AppState> for Provisioner {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            ResourceService::from_ref(state),
            ResourceService::from_ref(state),
            Repo::new(state.store.clone(), state.store_timeout()),
        )
    }
}

impl Provisioner {
    pub fn new(
        projects: ResourceService<Project>,
        presets: ResourceService<TimerPreset>,
        users: Repo<User>,
    ) -> Self {
        Self {
            projects,
            presets,
            users,
        }
    }

    /// Steps run in order: project, presets, then the default assignment,
    /// which needs a preset id.
    #[instrument(skip(self))]
    pub async fn ensure_defaults(&self, user_id: Uuid) -> AppResult<ProvisionReport> {
        let user = User::load(&self.users, user_id).await?;
        let mut report = ProvisionReport::default();

        let named = |name: &str| Filter::owned_by(user_id).eq("name", name);

        if self.projects.repo().find_one(named(DEFAULT_PROJECT)).await?.is_none() {
            self.projects
                .create(
                    user_id,
                    CreateProject {
                        name: DEFAULT_PROJECT.into(),
                        description: DEFAULT_PROJECT_DESCRIPTION.into(),
                        color: Some(DEFAULT_PROJECT_COLOR.into()),
                        status: Some(ProjectStatus::Active),
                        client: None,
                    },
                )
                .await?;
            report.project_created = true;
        }

        let mut preset_ids = Vec::with_capacity(DEFAULT_PRESETS.len());
        for (name, work, rest, reps) in DEFAULT_PRESETS {
            let preset = match self.presets.repo().find_one(named(name)).await? {
                Some(existing) => existing,
                None => {
                    report.presets_created += 1;
                    self.presets
                        .create(
                            user_id,
                            CreateTimerPreset {
                                name: name.into(),
                                work_duration: work,
                                break_duration: rest,
                                repetitions: Some(reps),
                            },
                        )
                        .await?
                }
            };
            preset_ids.push(preset.id);
        }

        if !self.has_usable_default(&user).await? {
            let first = preset_ids[0];
            User::apply_patch(
                &self.users,
                user_id,
                set("defaultTimerPreset", Value::String(first.to_string())),
            )
            .await?;
            report.default_preset_set = true;
        }

        info!(%user_id, ?report, "defaults ensured");
        Ok(report)
    }

    async fn has_usable_default(&self, user: &User) -> AppResult<bool> {
        let Some(id) = user.default_timer_preset else {
            return Ok(false);
        };
        Ok(self
            .presets
            .repo()
            .get(id)
            .await?
            .is_some_and(|p| p.user == user.id))
    }
}
