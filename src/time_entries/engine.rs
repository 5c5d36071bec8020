//! Running/stopped state machine for time entries.
//!
//! Every write for a user happens under that user's lock, so the
//! find-running / stop / create sequence cannot interleave with another
//! start for the same account.

use std::sync::Arc;

use axum::extract::FromRef;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{CreateTimeEntry, UpdateTimeEntry};
use super::model::{dedup_tags, derive_duration, millis_between, TimeEntry};
use crate::error::{AppError, AppResult};
use crate::locks::KeyedLocks;
use crate::resources::{tasks::Task, OwnedResource, ResourceService};
use crate::state::AppState;
use crate::store::{patch_of, timestamp_value, Filter, Page, Query, Record, Sort};
use crate::validation::validate;

#[derive(Clone)]
pub struct TimeEntryEngine {
    entries: ResourceService<TimeEntry>,
    tasks: ResourceService<Task>,
    locks: Arc<KeyedLocks>,
}

impl FromRef<AppState> for TimeEntryEngine {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            ResourceService::from_ref(state),
            ResourceService::from_ref(state),
            state.locks.clone(),
        )
    }
}

fn running_filter(user: Uuid) -> Filter {
    Filter::owned_by(user).eq("isRunning", true)
}

impl TimeEntryEngine {
    pub fn new(
        entries: ResourceService<TimeEntry>,
        tasks: ResourceService<Task>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            entries,
            tasks,
            locks,
        }
    }

    /// Creates a stopped or running entry. Starting a timer stops whatever
    /// was running for the caller at the new entry's start time.
    #[instrument(skip(self, input))]
    pub async fn create(&self, caller: Uuid, mut input: CreateTimeEntry) -> AppResult<TimeEntry> {
        validate(&input)?;
        if input.is_running && input.end_time.is_some() {
            return Err(AppError::bad_request(
                "endTime: must be omitted when isRunning is true",
            ));
        }
        // Checked up front so a bad reference never stops a running timer.
        self.entries
            .ensure_references(caller, &TimeEntry::create_refs(&input))
            .await?;
        self.check_task_project(caller, input.project, input.task)
            .await?;

        let _guard = self.locks.lock(caller).await;
        if input.is_running {
            let start = input.start_time.unwrap_or_else(OffsetDateTime::now_utc);
            input.start_time = Some(start);
            self.stop_all_running(caller, start).await?;
        }
        let entry = self.entries.create(caller, input).await?;
        if entry.is_running {
            info!(id = %entry.id, user_id = %caller, "timer started");
        }
        Ok(entry)
    }

    /// Running -> Stopped at the current instant.
    #[instrument(skip(self))]
    pub async fn stop(&self, caller: Uuid, id: Uuid) -> AppResult<TimeEntry> {
        let _guard = self.locks.lock(caller).await;
        let entry = self.entries.get(caller, id).await?;
        if !entry.is_running {
            return Err(AppError::bad_request("time entry is not running"));
        }
        let stopped = self
            .stop_entry(&entry, OffsetDateTime::now_utc())
            .await?;
        info!(%id, user_id = %caller, duration = stopped.duration, "timer stopped");
        Ok(stopped)
    }

    /// General edit. Duration is recomputed when either boundary changes,
    /// unless given explicitly.
    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        caller: Uuid,
        id: Uuid,
        input: UpdateTimeEntry,
    ) -> AppResult<TimeEntry> {
        validate(&input)?;
        let _guard = self.locks.lock(caller).await;
        let current = self.entries.get(caller, id).await?;
        self.entries
            .ensure_references(caller, &TimeEntry::update_refs(&input))
            .await?;

        let project = input.project.unwrap_or(current.project);
        let task = match input.task {
            Some(explicit) => explicit,
            None => current.task,
        };
        if input.project.is_some() || input.task.is_some() {
            self.check_task_project(caller, project, task).await?;
        }

        let start = input.start_time.unwrap_or(current.start_time);
        let end = input.end_time.or(current.end_time);
        let boundary_changed = input.start_time.is_some() || input.end_time.is_some();
        let duration = match input.duration {
            Some(d) => d,
            None if boundary_changed => {
                derive_duration(None, Some(start), end, current.duration)
            }
            None => current.duration,
        };
        let stops_timer = current.is_running && input.end_time.is_some();

        let mut patch = patch_of(&input)?;
        if let Some(tags) = input.tags {
            let tags = serde_json::to_value(dedup_tags(tags)).map_err(anyhow::Error::from)?;
            patch.insert("tags".into(), tags);
        }
        patch.insert("duration".into(), Value::from(duration));
        if stops_timer {
            patch.insert("isRunning".into(), Value::Bool(false));
        }
        let updated = self.entries.write_patch(id, patch).await?;
        if stops_timer {
            info!(%id, user_id = %caller, "timer stopped by edit");
        }
        Ok(updated)
    }

    pub async fn get(&self, caller: Uuid, id: Uuid) -> AppResult<TimeEntry> {
        self.entries.get(caller, id).await
    }

    pub async fn delete(&self, caller: Uuid, id: Uuid) -> AppResult<bool> {
        self.entries.delete(caller, id).await
    }

    pub async fn count(&self, caller: Uuid) -> AppResult<u64> {
        self.entries.count(caller).await
    }

    pub async fn list_by_user(&self, caller: Uuid, page: Page) -> AppResult<Vec<TimeEntry>> {
        self.entries.list(caller, page).await
    }

    pub async fn list_by_project(
        &self,
        caller: Uuid,
        project: Uuid,
        page: Page,
    ) -> AppResult<Vec<TimeEntry>> {
        self.entries
            .list_where(Filter::owned_by(caller).eq_id("project", project), page)
            .await
    }

    pub async fn list_by_task(
        &self,
        caller: Uuid,
        task: Uuid,
        page: Page,
    ) -> AppResult<Vec<TimeEntry>> {
        self.entries
            .list_where(Filter::owned_by(caller).eq_id("task", task), page)
            .await
    }

    /// Entries whose start lies in `[start, end]`, newest start first.
    pub async fn list_by_date_range(
        &self,
        caller: Uuid,
        start: OffsetDateTime,
        end: OffsetDateTime,
        page: Page,
    ) -> AppResult<Vec<TimeEntry>> {
        if start > end {
            return Err(AppError::bad_request("start: must not be after end"));
        }
        self.entries
            .list_where(
                Filter::owned_by(caller).between("startTime", Some(start), Some(end)),
                page,
            )
            .await
    }

    /// Most recently started running entry, if any.
    pub async fn find_running_by_user(&self, caller: Uuid) -> AppResult<Option<TimeEntry>> {
        let query = Query::new(running_filter(caller))
            .sorted(Sort::newest("startTime"))
            .paged(Page::new(1, 1));
        Ok(self.entries.repo().find(&query).await?.into_iter().next())
    }

    async fn stop_all_running(&self, caller: Uuid, at: OffsetDateTime) -> AppResult<()> {
        while let Some(running) = self.find_running_by_user(caller).await? {
            // Never stop before the entry began.
            let end = at.max(running.start_time);
            self.stop_entry(&running, end).await?;
            info!(id = %running.id, user_id = %caller, "running timer replaced");
        }
        Ok(())
    }

    async fn stop_entry(&self, entry: &TimeEntry, end: OffsetDateTime) -> AppResult<TimeEntry> {
        let mut patch = Record::new();
        patch.insert("endTime".into(), timestamp_value(end)?);
        patch.insert("isRunning".into(), Value::Bool(false));
        patch.insert(
            "duration".into(),
            Value::from(millis_between(entry.start_time, end)),
        );
        self.entries.write_patch(entry.id, patch).await
    }

    async fn check_task_project(
        &self,
        caller: Uuid,
        project: Uuid,
        task: Option<Uuid>,
    ) -> AppResult<()> {
        let Some(task_id) = task else {
            return Ok(());
        };
        let task = self.tasks.get(caller, task_id).await.map_err(|e| match e {
            AppError::NotFound(_) => AppError::bad_request(format!("task: {task_id} does not exist")),
            other => other,
        })?;
        if task.project != project {
            return Err(AppError::bad_request(
                "task: does not belong to the given project",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod engine_tests {
    use std::time::Duration;

    use time::macros::datetime;

    use super::*;
    use crate::resources::projects::{CreateProject, Project};
    use crate::resources::tags::{CreateTag, Tag};
    use crate::resources::tasks::CreateTask;
    use crate::store::{DocumentStore, MemoryStore};

    const T0: OffsetDateTime = datetime!(2024-05-01 09:00 UTC);

    struct Fixture {
        engine: TimeEntryEngine,
        projects: ResourceService<Project>,
        tasks: ResourceService<Task>,
        tags: ResourceService<Tag>,
        user: Uuid,
        project: Uuid,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let timeout = Duration::from_secs(5);
        let projects = ResourceService::<Project>::new(store.clone(), timeout);
        let tasks = ResourceService::<Task>::new(store.clone(), timeout);
        let tags = ResourceService::<Tag>::new(store.clone(), timeout);
        let engine = TimeEntryEngine::new(
            ResourceService::new(store, timeout),
            tasks.clone(),
            Arc::new(KeyedLocks::new()),
        );
        let user = Uuid::new_v4();
        let project = projects
            .create(user, new_project("Main"))
            .await
            .unwrap()
            .id;
        Fixture {
            engine,
            projects,
            tasks,
            tags,
            user,
            project,
        }
    }

    fn new_project(name: &str) -> CreateProject {
        CreateProject {
            name: name.into(),
            description: String::new(),
            color: None,
            status: None,
            client: None,
        }
    }

    fn entry(project: Uuid) -> CreateTimeEntry {
        CreateTimeEntry {
            project,
            task: None,
            tags: Vec::new(),
            start_time: None,
            end_time: None,
            duration: None,
            notes: None,
            is_running: false,
        }
    }

    fn running_at(project: Uuid, start: OffsetDateTime) -> CreateTimeEntry {
        CreateTimeEntry {
            start_time: Some(start),
            is_running: true,
            ..entry(project)
        }
    }

    #[tokio::test]
    async fn create_derives_duration_from_boundaries() {
        let f = fixture().await;
        let e = f
            .engine
            .create(
                f.user,
                CreateTimeEntry {
                    start_time: Some(T0),
                    end_time: Some(T0 + time::Duration::milliseconds(90_000)),
                    ..entry(f.project)
                },
            )
            .await
            .unwrap();
        assert_eq!(e.duration, 90_000);

        let explicit = f
            .engine
            .create(
                f.user,
                CreateTimeEntry {
                    start_time: Some(T0),
                    end_time: Some(T0 + time::Duration::milliseconds(90_000)),
                    duration: Some(5_000),
                    ..entry(f.project)
                },
            )
            .await
            .unwrap();
        assert_eq!(explicit.duration, 5_000);
    }

    #[tokio::test]
    async fn starting_a_timer_stops_the_previous_one() {
        let f = fixture().await;
        let first = f
            .engine
            .create(f.user, running_at(f.project, T0))
            .await
            .unwrap();
        let second = f
            .engine
            .create(f.user, running_at(f.project, T0 + time::Duration::minutes(30)))
            .await
            .unwrap();

        let first = f.engine.get(f.user, first.id).await.unwrap();
        assert!(!first.is_running);
        assert_eq!(first.end_time, Some(second.start_time));
        assert_eq!(first.duration, 30 * 60 * 1000);
        assert!(second.is_running);

        let running = f.engine.find_running_by_user(f.user).await.unwrap().unwrap();
        assert_eq!(running.id, second.id);
    }

    #[tokio::test]
    async fn earlier_start_never_yields_negative_replacement_duration() {
        let f = fixture().await;
        let first = f
            .engine
            .create(f.user, running_at(f.project, T0))
            .await
            .unwrap();
        f.engine
            .create(f.user, running_at(f.project, T0 - time::Duration::minutes(5)))
            .await
            .unwrap();
        let first = f.engine.get(f.user, first.id).await.unwrap();
        assert!(!first.is_running);
        assert!(first.duration >= 0);
    }

    #[tokio::test]
    async fn concurrent_starts_leave_exactly_one_timer_running() {
        let f = fixture().await;
        let mut handles = Vec::new();
        for i in 0..10 {
            let engine = f.engine.clone();
            let (user, project) = (f.user, f.project);
            handles.push(tokio::spawn(async move {
                engine
                    .create(user, running_at(project, T0 + time::Duration::seconds(i)))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let running = f
            .engine
            .entries
            .count_where(&running_filter(f.user))
            .await
            .unwrap();
        assert_eq!(running, 1);
        let all = f.engine.list_by_user(f.user, Page::new(1, 20)).await.unwrap();
        assert_eq!(all.len(), 10);
        assert!(all.iter().all(|e| e.duration >= 0));
    }

    #[tokio::test]
    async fn other_users_timers_are_untouched() {
        let f = fixture().await;
        let other = Uuid::new_v4();
        let other_project = f.projects.create(other, new_project("O")).await.unwrap().id;
        let theirs = f
            .engine
            .create(other, running_at(other_project, T0))
            .await
            .unwrap();
        f.engine
            .create(f.user, running_at(f.project, T0))
            .await
            .unwrap();
        assert!(f.engine.get(other, theirs.id).await.unwrap().is_running);
    }

    #[tokio::test]
    async fn running_entry_cannot_carry_an_end_time() {
        let f = fixture().await;
        let err = f
            .engine
            .create(
                f.user,
                CreateTimeEntry {
                    end_time: Some(T0),
                    ..running_at(f.project, T0)
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn stop_finalizes_a_running_entry() {
        let f = fixture().await;
        let start = OffsetDateTime::now_utc() - time::Duration::minutes(2);
        let e = f
            .engine
            .create(f.user, running_at(f.project, start))
            .await
            .unwrap();
        let stopped = f.engine.stop(f.user, e.id).await.unwrap();
        assert!(!stopped.is_running);
        assert!(stopped.end_time.is_some());
        assert!(stopped.duration >= 120_000);
        assert!(f.engine.find_running_by_user(f.user).await.unwrap().is_none());

        let again = f.engine.stop(f.user, e.id).await.unwrap_err();
        assert!(matches!(again, AppError::BadRequest(_)));

        let foreign = f.engine.stop(Uuid::new_v4(), e.id).await.unwrap_err();
        assert!(matches!(foreign, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_recomputes_duration_when_a_boundary_moves() {
        let f = fixture().await;
        let e = f
            .engine
            .create(
                f.user,
                CreateTimeEntry {
                    start_time: Some(T0),
                    end_time: Some(T0 + time::Duration::minutes(10)),
                    ..entry(f.project)
                },
            )
            .await
            .unwrap();

        let moved = f
            .engine
            .update(
                f.user,
                e.id,
                UpdateTimeEntry {
                    end_time: Some(T0 + time::Duration::minutes(25)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.duration, 25 * 60 * 1000);

        let noted = f
            .engine
            .update(
                f.user,
                e.id,
                UpdateTimeEntry {
                    notes: Some("reviewed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(noted.duration, 25 * 60 * 1000);
        assert_eq!(noted.notes, "reviewed");

        let explicit = f
            .engine
            .update(
                f.user,
                e.id,
                UpdateTimeEntry {
                    start_time: Some(T0),
                    duration: Some(1_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(explicit.duration, 1_000);
    }

    #[tokio::test]
    async fn setting_end_time_on_a_running_entry_stops_it() {
        let f = fixture().await;
        let e = f
            .engine
            .create(f.user, running_at(f.project, T0))
            .await
            .unwrap();
        let edited = f
            .engine
            .update(
                f.user,
                e.id,
                UpdateTimeEntry {
                    end_time: Some(T0 + time::Duration::hours(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!edited.is_running);
        assert_eq!(edited.duration, 3_600_000);
    }

    #[tokio::test]
    async fn references_are_checked() {
        let f = fixture().await;
        let other = Uuid::new_v4();
        let foreign_tag = f
            .tags
            .create(
                other,
                CreateTag {
                    name: "x".into(),
                    color: None,
                },
            )
            .await
            .unwrap();
        let err = f
            .engine
            .create(
                f.user,
                CreateTimeEntry {
                    tags: vec![foreign_tag.id],
                    ..entry(f.project)
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.starts_with("tags:")));

        let second_project = f.projects.create(f.user, new_project("Side")).await.unwrap();
        let task = f
            .tasks
            .create(
                f.user,
                CreateTask {
                    name: "t".into(),
                    description: String::new(),
                    project: second_project.id,
                    status: None,
                },
            )
            .await
            .unwrap();
        let mismatch = f
            .engine
            .create(
                f.user,
                CreateTimeEntry {
                    task: Some(task.id),
                    ..entry(f.project)
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(mismatch, AppError::BadRequest(_)));

        let ok = f
            .engine
            .create(
                f.user,
                CreateTimeEntry {
                    task: Some(task.id),
                    ..entry(second_project.id)
                },
            )
            .await
            .unwrap();
        assert_eq!(
            f.engine
                .list_by_task(f.user, task.id, Page::default())
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            f.engine
                .list_by_project(f.user, second_project.id, Page::default())
                .await
                .unwrap()[0]
                .id,
            ok.id
        );
    }

    #[tokio::test]
    async fn date_range_is_inclusive_and_newest_first() {
        let f = fixture().await;
        for h in 0..5 {
            f.engine
                .create(
                    f.user,
                    CreateTimeEntry {
                        start_time: Some(T0 + time::Duration::hours(h)),
                        end_time: Some(T0 + time::Duration::hours(h) + time::Duration::minutes(30)),
                        ..entry(f.project)
                    },
                )
                .await
                .unwrap();
        }
        let hits = f
            .engine
            .list_by_date_range(
                f.user,
                T0 + time::Duration::hours(1),
                T0 + time::Duration::hours(3),
                Page::default(),
            )
            .await
            .unwrap();
        let starts: Vec<_> = hits.iter().map(|e| e.start_time).collect();
        assert_eq!(
            starts,
            vec![
                T0 + time::Duration::hours(3),
                T0 + time::Duration::hours(2),
                T0 + time::Duration::hours(1),
            ]
        );

        let inverted = f
            .engine
            .list_by_date_range(f.user, T0 + time::Duration::hours(3), T0, Page::default())
            .await
            .unwrap_err();
        assert!(matches!(inverted, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn pagination_pages_are_disjoint() {
        let f = fixture().await;
        for m in 0..12 {
            f.engine
                .create(
                    f.user,
                    CreateTimeEntry {
                        start_time: Some(T0 + time::Duration::minutes(m)),
                        ..entry(f.project)
                    },
                )
                .await
                .unwrap();
        }
        let p1 = f.engine.list_by_user(f.user, Page::new(1, 5)).await.unwrap();
        let p2 = f.engine.list_by_user(f.user, Page::new(2, 5)).await.unwrap();
        assert_eq!(p1.len(), 5);
        assert_eq!(p2.len(), 5);
        assert!(p2.iter().all(|e| p1.iter().all(|o| o.id != e.id)));
        assert_eq!(f.engine.count(f.user).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn null_task_detaches_so_the_entry_can_move_projects() {
        let f = fixture().await;
        let task = f
            .tasks
            .create(
                f.user,
                CreateTask {
                    name: "t".into(),
                    description: String::new(),
                    project: f.project,
                    status: None,
                },
            )
            .await
            .unwrap();
        let e = f
            .engine
            .create(
                f.user,
                CreateTimeEntry {
                    task: Some(task.id),
                    ..entry(f.project)
                },
            )
            .await
            .unwrap();
        let other = f.projects.create(f.user, new_project("Other")).await.unwrap();

        let kept = f
            .engine
            .update(
                f.user,
                e.id,
                UpdateTimeEntry {
                    project: Some(other.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(kept, AppError::BadRequest(ref m) if m.starts_with("task:")));

        let moved = f
            .engine
            .update(
                f.user,
                e.id,
                UpdateTimeEntry {
                    project: Some(other.id),
                    task: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.project, other.id);
        assert_eq!(moved.task, None);
        assert_eq!(f.engine.get(f.user, e.id).await.unwrap().task, None);
    }

    #[tokio::test]
    async fn stop_matching_nothing_is_an_internal_error() {
        use crate::store::testing::FailingUpdates;

        let inner: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let timeout = Duration::from_secs(5);
        let user = Uuid::new_v4();
        let project = ResourceService::<Project>::new(inner.clone(), timeout)
            .create(user, new_project("Main"))
            .await
            .unwrap()
            .id;
        let engine_on = |store: Arc<dyn DocumentStore>| {
            TimeEntryEngine::new(
                ResourceService::new(store.clone(), timeout),
                ResourceService::new(store, timeout),
                Arc::new(KeyedLocks::new()),
            )
        };
        let running = engine_on(inner.clone())
            .create(user, running_at(project, T0))
            .await
            .unwrap();

        let lossy: Arc<dyn DocumentStore> =
            Arc::new(FailingUpdates::vanishing(inner, "time_entries"));
        let err = engine_on(lossy).stop(user, running.id).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)), "got {err:?}");
    }
}
