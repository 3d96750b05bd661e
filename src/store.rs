//! In-process persistence: a single mutex-guarded state machine standing in
//! for the logical tables of §6 (teachers, rooms, subjects, groups,
//! time-slots, lessons, schedule_config, timetable_versions,
//! timetable_entries, substitutions). No database is involved; every
//! mutation happens inside one critical section so partial writes are never
//! observable.

use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use log::{info, warn};

use crate::config::{ScheduleConfig, ScheduleConfigInput};
use crate::domain::{
    Catalog, Entry, EntryId, Method, Substitution, SubstitutionId, SubstitutionStatus, TeacherId,
    TimeSlotId, Version, VersionId, VersionStatus,
};
use crate::error::{Error, Result};

struct StoreState {
    catalog: Catalog,
    schedule_config: ScheduleConfig,
    versions: Vec<Version>,
    substitutions: Vec<Substitution>,
    next_version_id: VersionId,
    next_entry_id: EntryId,
    next_substitution_id: SubstitutionId,
}

pub struct Store {
    inner: Mutex<StoreState>,
}

impl Store {
    /// Seeds `catalog.time_slots` from `schedule_config.generate_time_slots()`
    /// whenever the caller didn't already supply a materialized set. Time
    /// slots are derived state (see `replace_entities`, which never touches
    /// them), so a catalog built from a bare `ScheduleConfig` without its own
    /// slots (e.g. `run_server`'s `Catalog::default()`) must not silently
    /// disagree with that config's period/day layout.
    pub fn new(mut catalog: Catalog, schedule_config: ScheduleConfig) -> Self {
        if catalog.time_slots.is_empty() {
            catalog.time_slots = schedule_config.generate_time_slots();
        }
        Self {
            inner: Mutex::new(StoreState {
                catalog,
                schedule_config,
                versions: Vec::new(),
                substitutions: Vec::new(),
                next_version_id: 1,
                next_entry_id: 1,
                next_substitution_id: 1,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A read-only snapshot of the catalog, safe to hand to a solver running
    /// off the async executor.
    pub fn snapshot_catalog(&self) -> Catalog {
        self.lock().catalog.clone()
    }

    pub fn schedule_config(&self) -> ScheduleConfig {
        self.lock().schedule_config.clone()
    }

    /// Replace the entity catalog (teachers/rooms/subjects/groups/lessons),
    /// enforcing the uniqueness constraints of §6 (`email` on teacher,
    /// `code` on subject, `name` on room/group). `time_slots` is left
    /// untouched — it is derived exclusively from `ScheduleConfig`, not from
    /// this entity snapshot.
    pub fn replace_entities(
        &self,
        teachers: Vec<crate::domain::Teacher>,
        rooms: Vec<crate::domain::Room>,
        subjects: Vec<crate::domain::Subject>,
        groups: Vec<crate::domain::Group>,
        lessons: Vec<crate::domain::Lesson>,
    ) -> Result<Catalog> {
        check_unique(&teachers, |t| &t.email, "teacher email")?;
        check_unique(&subjects, |s| &s.code, "subject code")?;
        check_unique(&rooms, |r| &r.name, "room name")?;
        check_unique(&groups, |g| &g.name, "group name")?;

        let mut state = self.lock();
        let time_slots = std::mem::take(&mut state.catalog.time_slots);
        state.catalog = Catalog {
            teachers,
            rooms,
            subjects,
            groups,
            time_slots,
            lessons,
        }
        .with_derived_fields();
        info!(
            "catalog replaced: {} teachers, {} rooms, {} subjects, {} groups, {} lessons",
            state.catalog.teachers.len(),
            state.catalog.rooms.len(),
            state.catalog.subjects.len(),
            state.catalog.groups.len(),
            state.catalog.lessons.len()
        );
        Ok(state.catalog.clone())
    }

    /// Regenerate `TimeSlots` from a new configuration and drop every
    /// existing Version (§5: config mutation invalidates derived state).
    pub fn update_schedule_config(&self, input: ScheduleConfigInput) -> Result<ScheduleConfig> {
        let config = ScheduleConfig::derive(input)?;
        let mut state = self.lock();
        state.catalog.time_slots = config.generate_time_slots();
        let dropped = state.versions.len();
        state.versions.clear();
        state.schedule_config = config.clone();
        warn!("schedule config updated; dropped {dropped} existing version(s), a fresh generate is required");
        Ok(config)
    }

    /// Reserve a Version row in `processing` status, to be completed later by
    /// `commit_version`.
    pub fn create_processing_version(&self, name: String, algorithm: Method) -> VersionId {
        let mut state = self.lock();
        let id = state.next_version_id;
        state.next_version_id += 1;
        state.versions.push(Version {
            id,
            name,
            algorithm,
            status: VersionStatus::Processing,
            is_valid: false,
            fitness_score: None,
            created_at: now(),
            entries: Vec::new(),
        });
        info!("version {id} created in processing status");
        id
    }

    /// One transaction: assign entry ids, attach them to the version, and
    /// transition it to its terminal status. Never leaves a partially
    /// written version visible — the version row is replaced atomically
    /// under the single lock.
    pub fn commit_version(
        &self,
        version_id: VersionId,
        raw_entries: Vec<(crate::domain::SubjectId, crate::domain::RoomId, crate::domain::GroupId, TeacherId, TimeSlotId)>,
        status: VersionStatus,
        fitness_score: Option<f64>,
    ) -> Result<Version> {
        let mut state = self.lock();
        let entries: Vec<Entry> = raw_entries
            .into_iter()
            .map(|(subject_id, room_id, group_id, teacher_id, time_slot_id)| {
                let id = state.next_entry_id;
                state.next_entry_id += 1;
                Entry {
                    id,
                    version_id,
                    time_slot_id,
                    subject_id,
                    room_id,
                    group_id,
                    teacher_id,
                }
            })
            .collect();

        let version = state
            .versions
            .iter_mut()
            .find(|v| v.id == version_id)
            .ok_or_else(|| Error::NotFound(format!("version {version_id}")))?;
        version.entries = entries;
        version.status = status;
        version.is_valid = status == VersionStatus::Active;
        version.fitness_score = fitness_score;
        info!("version {version_id} committed with status {status:?}, {} entries", version.entries.len());
        Ok(version.clone())
    }

    pub fn get_version(&self, id: VersionId) -> Result<Version> {
        self.lock()
            .versions
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("version {id}")))
    }

    /// Most recently created Version, `order by created_at desc`.
    pub fn latest_version(&self) -> Result<Version> {
        self.lock()
            .versions
            .iter()
            .max_by_key(|v| v.created_at)
            .cloned()
            .ok_or_else(|| Error::NotFound("no version exists".to_string()))
    }

    pub fn get_entry(&self, id: EntryId) -> Result<(Entry, VersionId)> {
        let state = self.lock();
        for version in &state.versions {
            if let Some(entry) = version.entries.iter().find(|e| e.id == id) {
                return Ok((*entry, version.id));
            }
        }
        Err(Error::NotFound(format!("entry {id}")))
    }

    /// Insert or replace the substitution keyed by `(date, entry_id)`
    /// (§4.7: manual overrides and re-runs of auto-assignment are
    /// idempotent upserts).
    pub fn upsert_substitution(
        &self,
        date: NaiveDate,
        entry_id: EntryId,
        original_teacher_id: TeacherId,
        substitute_teacher_id: Option<TeacherId>,
        status: SubstitutionStatus,
    ) -> Substitution {
        let mut state = self.lock();
        if let Some(existing) = state
            .substitutions
            .iter_mut()
            .find(|s| s.date == date && s.entry_id == entry_id)
        {
            existing.original_teacher_id = original_teacher_id;
            existing.substitute_teacher_id = substitute_teacher_id;
            existing.status = status;
            return existing.clone();
        }
        let id = state.next_substitution_id;
        state.next_substitution_id += 1;
        let substitution = Substitution {
            id,
            date,
            entry_id,
            original_teacher_id,
            substitute_teacher_id,
            status,
        };
        state.substitutions.push(substitution.clone());
        substitution
    }

    pub fn substitutions_for_date(&self, date: NaiveDate) -> Vec<Substitution> {
        self.lock().substitutions.iter().filter(|s| s.date == date).cloned().collect()
    }
}

/// `chrono::Utc::now()` is the one source of non-determinism the store
/// introduces; kept behind this seam so tests can be written against
/// fixed-order `created_at` without touching the system clock directly.
fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

fn check_unique<T, K, F>(items: &[T], key_fn: F, label: &str) -> Result<()>
where
    K: Eq + std::hash::Hash,
    F: Fn(&T) -> &K,
{
    let mut seen = std::collections::HashSet::new();
    for item in items {
        if !seen.insert(key_fn(item)) {
            return Err(Error::Conflict(format!("duplicate {label}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleConfig;

    fn store() -> Store {
        Store::new(Catalog::default(), ScheduleConfig::default())
    }

    #[test]
    fn commit_version_replaces_processing_row_atomically() {
        let store = store();
        let id = store.create_processing_version("v1".to_string(), Method::Csp);
        assert_eq!(store.get_version(id).unwrap().status, VersionStatus::Processing);

        let version = store
            .commit_version(id, vec![(1, 1, 1, 1, 1)], VersionStatus::Active, Some(12.0))
            .unwrap();
        assert_eq!(version.status, VersionStatus::Active);
        assert_eq!(version.entries.len(), 1);
        assert_eq!(version.entries[0].id, 1);
    }

    #[test]
    fn upsert_substitution_is_idempotent_by_date_and_entry() {
        let store = store();
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let first = store.upsert_substitution(date, 10, 1, Some(2), SubstitutionStatus::Confirmed);
        let second = store.upsert_substitution(date, 10, 1, Some(3), SubstitutionStatus::Confirmed);
        assert_eq!(first.id, second.id);
        assert_eq!(store.substitutions_for_date(date).len(), 1);
        assert_eq!(store.substitutions_for_date(date)[0].substitute_teacher_id, Some(3));
    }

    #[test]
    fn replace_entities_rejects_duplicate_teacher_email() {
        use crate::domain::Teacher;
        use std::collections::HashSet as Set;

        let store = store();
        let teacher = |id| Teacher {
            id,
            name: format!("T{id}"),
            email: "dup@example.com".to_string(),
            max_hours_per_week: 10,
            available_slots: Set::new(),
            taught_subjects: vec![],
        };
        let result = store.replace_entities(vec![teacher(1), teacher(2)], vec![], vec![], vec![], vec![]);
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[test]
    fn replace_entities_preserves_existing_time_slots() {
        let store = Store::new(Catalog::default(), ScheduleConfig::default());
        let before = store.snapshot_catalog().time_slots.len();
        assert!(before > 0);
        store.replace_entities(vec![], vec![], vec![], vec![], vec![]).unwrap();
        assert_eq!(store.snapshot_catalog().time_slots.len(), before);
    }

    #[test]
    fn update_schedule_config_drops_existing_versions() {
        let store = store();
        store.create_processing_version("v1".to_string(), Method::Csp);
        let input = ScheduleConfigInput {
            day_start_time: "09:00".to_string(),
            day_end_time: Some("15:00".to_string()),
            number_of_periods: Some(5),
            ..Default::default()
        };
        store.update_schedule_config(input).unwrap();
        assert!(store.latest_version().is_err());
    }
}
