//! Core value types shared by every component: the read-only catalog the
//! solvers consume, and the schedule/version/substitution types they produce.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

pub type TeacherId = u32;
pub type RoomId = u32;
pub type SubjectId = u32;
pub type GroupId = u32;
pub type TimeSlotId = u32;
pub type LessonId = u32;
pub type AssignmentId = u32;
pub type VersionId = u32;
pub type EntryId = u32;
pub type SubstitutionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    pub const WORKWEEK: [Weekday; 5] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ];
}

/// A teacher available for assignment. `available_slots` is an explicit
/// restriction: empty means "no restriction beyond what the schedule already
/// excludes" (i.e. available everywhere non-break); non-empty narrows the
/// teacher to exactly those slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: TeacherId,
    pub name: String,
    pub email: String,
    pub max_hours_per_week: u32,
    #[serde(default)]
    pub available_slots: HashSet<TimeSlotId>,
    /// Subjects this teacher is qualified to teach, used by substitute scoring.
    /// Populated from `Subject.teacher_id` at catalog build time.
    #[serde(default)]
    pub taught_subjects: Vec<SubjectId>,
}

impl Teacher {
    pub fn is_available_at(&self, slot: TimeSlotId) -> bool {
        self.available_slots.is_empty() || self.available_slots.contains(&slot)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub capacity: u32,
    pub room_type: String,
    #[serde(default)]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub is_lab: bool,
    pub credits: u32,
    pub required_room_type: String,
    #[serde(default = "one")]
    pub duration_slots: u32,
    #[serde(default)]
    pub teacher_id: Option<TeacherId>,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub student_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub id: TimeSlotId,
    pub day: Weekday,
    pub period: u32,
    pub start: NaiveTime,
    pub end: NaiveTime,
    #[serde(default)]
    pub is_break: bool,
}

/// A weekly teaching requirement before expansion: teachers × groups ×
/// subjects, each combination repeated `lessons_per_week` times.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: LessonId,
    pub teacher_ids: Vec<TeacherId>,
    pub group_ids: Vec<GroupId>,
    pub subject_ids: Vec<SubjectId>,
    pub lessons_per_week: u32,
    /// Informational; the authoritative duration for placement is
    /// `Subject.duration_slots` (see DESIGN.md).
    #[serde(default = "one")]
    pub length_per_lesson: u32,
}

/// One atomic scheduling obligation, materialized by `LessonExpander`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredAssignment {
    pub assignment_id: AssignmentId,
    pub group_id: GroupId,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub duration: u32,
    pub occurrence_idx: u32,
}

/// One placed assignment: a `RequiredAssignment` bound to a room and a
/// starting time slot. For multi-slot (lab) assignments the remaining
/// `duration - 1` slots are implied by consecutive periods on the same day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub assignment_id: AssignmentId,
    pub room_id: RoomId,
    pub start_slot_id: TimeSlotId,
}

/// Solver output prior to normalization by `ScheduleBuilder`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schedule {
    pub placements: Vec<Placement>,
}

/// One fully placed lesson occupying exactly one time slot. Lab blocks are
/// represented as `duration_slots` separate entries sharing everything but
/// `time_slot_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntryId,
    pub version_id: VersionId,
    pub time_slot_id: TimeSlotId,
    pub subject_id: SubjectId,
    pub room_id: RoomId,
    pub group_id: GroupId,
    pub teacher_id: TeacherId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Csp,
    Genetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Draft,
    Processing,
    Active,
    Failed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: VersionId,
    pub name: String,
    pub algorithm: Method,
    pub status: VersionStatus,
    pub is_valid: bool,
    pub fitness_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstitutionStatus {
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Substitution {
    pub id: SubstitutionId,
    pub date: NaiveDate,
    pub entry_id: EntryId,
    pub original_teacher_id: TeacherId,
    pub substitute_teacher_id: Option<TeacherId>,
    pub status: SubstitutionStatus,
}

/// The read-only snapshot every solve operates on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Catalog {
    pub teachers: Vec<Teacher>,
    pub rooms: Vec<Room>,
    pub subjects: Vec<Subject>,
    pub groups: Vec<Group>,
    pub time_slots: Vec<TimeSlot>,
    pub lessons: Vec<Lesson>,
}

impl Catalog {
    pub fn teacher_map(&self) -> HashMap<TeacherId, &Teacher> {
        self.teachers.iter().map(|t| (t.id, t)).collect()
    }

    pub fn room_map(&self) -> HashMap<RoomId, &Room> {
        self.rooms.iter().map(|r| (r.id, r)).collect()
    }

    pub fn subject_map(&self) -> HashMap<SubjectId, &Subject> {
        self.subjects.iter().map(|s| (s.id, s)).collect()
    }

    pub fn group_map(&self) -> HashMap<GroupId, &Group> {
        self.groups.iter().map(|g| (g.id, g)).collect()
    }

    pub fn time_slot_map(&self) -> HashMap<TimeSlotId, &TimeSlot> {
        self.time_slots.iter().map(|t| (t.id, t)).collect()
    }

    pub fn non_break_slots(&self) -> Vec<&TimeSlot> {
        self.time_slots.iter().filter(|t| !t.is_break).collect()
    }

    /// Distinct days that appear in the time-slot catalog, in weekday order.
    pub fn days(&self) -> Vec<Weekday> {
        let mut days: Vec<Weekday> = self.time_slots.iter().map(|t| t.day).collect();
        days.sort();
        days.dedup();
        days
    }

    /// Non-break slots of one day, ordered by period.
    pub fn day_slots(&self, day: Weekday) -> Vec<&TimeSlot> {
        let mut slots: Vec<&TimeSlot> = self
            .time_slots
            .iter()
            .filter(|t| !t.is_break && t.day == day)
            .collect();
        slots.sort_by_key(|t| t.period);
        slots
    }

    /// Populate `Teacher.taught_subjects` from `Subject.teacher_id`. Call
    /// once after loading a catalog from storage.
    pub fn with_derived_fields(mut self) -> Self {
        let mut by_teacher: HashMap<TeacherId, Vec<SubjectId>> = HashMap::new();
        for subject in &self.subjects {
            if let Some(teacher_id) = subject.teacher_id {
                by_teacher.entry(teacher_id).or_default().push(subject.id);
            }
        }
        for teacher in &mut self.teachers {
            if let Some(subjects) = by_teacher.remove(&teacher.id) {
                teacher.taught_subjects = subjects;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: TimeSlotId, day: Weekday, period: u32, is_break: bool) -> TimeSlot {
        TimeSlot {
            id,
            day,
            period,
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            is_break,
        }
    }

    #[test]
    fn day_slots_filters_and_sorts() {
        let catalog = Catalog {
            time_slots: vec![
                slot(3, Weekday::Mon, 3, false),
                slot(1, Weekday::Mon, 1, false),
                slot(2, Weekday::Mon, 2, true),
                slot(4, Weekday::Tue, 1, false),
            ],
            ..Default::default()
        };
        let monday = catalog.day_slots(Weekday::Mon);
        assert_eq!(monday.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn teacher_availability_empty_means_unrestricted() {
        let teacher = Teacher {
            id: 1,
            name: "A".into(),
            email: "a@example.com".into(),
            max_hours_per_week: 10,
            available_slots: HashSet::new(),
            taught_subjects: vec![],
        };
        assert!(teacher.is_available_at(99));
    }

    #[test]
    fn with_derived_fields_links_taught_subjects() {
        let catalog = Catalog {
            teachers: vec![Teacher {
                id: 1,
                name: "A".into(),
                email: "a@example.com".into(),
                max_hours_per_week: 10,
                available_slots: HashSet::new(),
                taught_subjects: vec![],
            }],
            subjects: vec![Subject {
                id: 10,
                name: "Math".into(),
                code: "M1".into(),
                is_lab: false,
                credits: 4,
                required_room_type: "Hall".into(),
                duration_slots: 1,
                teacher_id: Some(1),
            }],
            ..Default::default()
        }
        .with_derived_fields();
        assert_eq!(catalog.teachers[0].taught_subjects, vec![10]);
    }
}
