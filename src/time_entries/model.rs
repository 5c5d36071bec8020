use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::{CreateTimeEntry, UpdateTimeEntry};
use crate::resources::{Owned, OwnedResource, RefKind, Reference};
use crate::store::{Entity, Sort};

/// A tracked interval. While `is_running`, `end_time` is absent and
/// `duration` keeps its creation-time value; live elapsed time is
/// `now - start_time`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: Uuid,
    pub user: Uuid,
    pub project: Uuid,
    #[serde(default)]
    pub task: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    /// Milliseconds.
    pub duration: i64,
    #[serde(default)]
    pub notes: String,
    pub is_running: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TimeEntry {
    pub fn elapsed_ms(&self, now: OffsetDateTime) -> i64 {
        if self.is_running {
            millis_between(self.start_time, now)
        } else {
            self.duration
        }
    }
}

pub fn millis_between(start: OffsetDateTime, end: OffsetDateTime) -> i64 {
    (end - start).whole_milliseconds() as i64
}

/// Explicit duration wins; otherwise both boundaries give `end - start`
/// (never clamped); otherwise the fallback.
pub fn derive_duration(
    explicit: Option<i64>,
    start: Option<OffsetDateTime>,
    end: Option<OffsetDateTime>,
    fallback: i64,
) -> i64 {
    if let Some(d) = explicit {
        return d;
    }
    match (start, end) {
        (Some(s), Some(e)) => millis_between(s, e),
        _ => fallback,
    }
}

/// Tags form a set; first occurrence wins the position.
pub fn dedup_tags(tags: Vec<Uuid>) -> Vec<Uuid> {
    let mut out = Vec::with_capacity(tags.len());
    for t in tags {
        if !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

impl Entity for TimeEntry {
    const COLLECTION: &'static str = "time_entries";
    const LABEL: &'static str = "time entry";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Owned for TimeEntry {
    fn owner(&self) -> Uuid {
        self.user
    }
}

fn refs(project: Option<Uuid>, task: Option<Uuid>, tags: &[Uuid]) -> Vec<Reference> {
    project
        .map(|id| Reference::new(RefKind::Project, id))
        .into_iter()
        .chain(task.map(|id| Reference::new(RefKind::Task, id)))
        .chain(tags.iter().map(|id| Reference::new(RefKind::Tag, *id)))
        .collect()
}

impl OwnedResource for TimeEntry {
    type Create = CreateTimeEntry;
    type Update = UpdateTimeEntry;

    const ORDER: Sort = Sort::newest("startTime");

    fn build(id: Uuid, user: Uuid, now: OffsetDateTime, input: CreateTimeEntry) -> Self {
        let start_time = input.start_time.unwrap_or(now);
        let end_time = if input.is_running { None } else { input.end_time };
        Self {
            id,
            user,
            project: input.project,
            task: input.task,
            tags: dedup_tags(input.tags),
            start_time,
            end_time,
            duration: derive_duration(input.duration, Some(start_time), end_time, 0),
            notes: input.notes.unwrap_or_default(),
            is_running: input.is_running,
            created_at: now,
            updated_at: now,
        }
    }

    fn create_refs(input: &CreateTimeEntry) -> Vec<Reference> {
        refs(Some(input.project), input.task, &input.tags)
    }

    fn update_refs(input: &UpdateTimeEntry) -> Vec<Reference> {
        refs(
            input.project,
            input.task.flatten(),
            input.tags.as_deref().unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod model_tests {
    use time::macros::datetime;

    use super::*;

    const T0: OffsetDateTime = datetime!(2024-05-01 09:00 UTC);

    fn create(
        start: Option<OffsetDateTime>,
        end: Option<OffsetDateTime>,
        duration: Option<i64>,
        running: bool,
    ) -> CreateTimeEntry {
        CreateTimeEntry {
            project: Uuid::new_v4(),
            task: None,
            tags: Vec::new(),
            start_time: start,
            end_time: end,
            duration,
            notes: None,
            is_running: running,
        }
    }

    fn build(input: CreateTimeEntry) -> TimeEntry {
        TimeEntry::build(Uuid::new_v4(), Uuid::new_v4(), T0, input)
    }

    #[test]
    fn duration_comes_from_boundaries() {
        let e = build(create(
            Some(T0),
            Some(T0 + time::Duration::milliseconds(90_000)),
            None,
            false,
        ));
        assert_eq!(e.duration, 90_000);
        assert!(!e.is_running);
    }

    #[test]
    fn explicit_duration_wins() {
        let e = build(create(
            Some(T0),
            Some(T0 + time::Duration::milliseconds(90_000)),
            Some(5_000),
            false,
        ));
        assert_eq!(e.duration, 5_000);
    }

    #[test]
    fn inverted_range_is_kept_as_is() {
        let e = build(create(
            Some(T0),
            Some(T0 - time::Duration::seconds(10)),
            None,
            false,
        ));
        assert_eq!(e.duration, -10_000);
    }

    #[test]
    fn missing_boundaries_default_to_zero() {
        let e = build(create(None, None, None, false));
        assert_eq!(e.duration, 0);
        assert_eq!(e.start_time, T0);
    }

    #[test]
    fn running_entries_have_no_end() {
        let e = build(create(Some(T0), None, None, true));
        assert!(e.is_running);
        assert_eq!(e.end_time, None);
        assert_eq!(e.duration, 0);
        assert_eq!(e.elapsed_ms(T0 + time::Duration::minutes(1)), 60_000);
    }

    #[test]
    fn tags_are_deduplicated() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedup_tags(vec![a, b, a]), vec![a, b]);
    }

    #[test]
    fn update_fallback_keeps_previous_duration() {
        assert_eq!(derive_duration(None, Some(T0), None, 1234), 1234);
    }
}
