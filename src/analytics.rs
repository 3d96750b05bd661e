//! Per-teacher and per-room utilization plus the hard-constraint conflict
//! list for a Version (§4.8). Reuses the same predicates the solvers are
//! validated against, so a manually-edited Version is checked identically
//! to a freshly generated one.

use serde::Serialize;

use crate::constraints::hard;
use crate::domain::{RoomId, TeacherId, VersionId};
use crate::error::Result;
use crate::expander;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherUtilization {
    pub teacher_id: TeacherId,
    pub assigned_slots: u32,
    pub total_slots: u32,
    pub utilization_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUtilization {
    pub room_id: RoomId,
    pub assigned_slots: u32,
    pub total_slots: u32,
    pub utilization_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub version_id: VersionId,
    pub teachers: Vec<TeacherUtilization>,
    pub rooms: Vec<RoomUtilization>,
    pub conflicts: Vec<String>,
}

pub struct AnalyticsReporter<'a> {
    store: &'a Store,
}

impl<'a> AnalyticsReporter<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn report(&self, version_id: VersionId) -> Result<Report> {
        let version = self.store.get_version(version_id)?;
        let catalog = self.store.snapshot_catalog();
        let non_break_count = catalog.non_break_slots().len() as u32;

        let teachers = catalog
            .teachers
            .iter()
            .map(|t| {
                let assigned_slots = version.entries.iter().filter(|e| e.teacher_id == t.id).count() as u32;
                let total_slots = t.max_hours_per_week;
                TeacherUtilization {
                    teacher_id: t.id,
                    assigned_slots,
                    total_slots,
                    utilization_percentage: percentage(assigned_slots, total_slots),
                }
            })
            .collect();

        let rooms = catalog
            .rooms
            .iter()
            .map(|r| {
                let assigned_slots = version.entries.iter().filter(|e| e.room_id == r.id).count() as u32;
                RoomUtilization {
                    room_id: r.id,
                    assigned_slots,
                    total_slots: non_break_count,
                    utilization_percentage: percentage(assigned_slots, non_break_count),
                }
            })
            .collect();

        // Assignments are re-derived from the lessons still on file rather
        // than assumed from the version's own entries, so a manually edited
        // version is checked against the original requirement, not itself.
        let assignments = expander::expand(&catalog).unwrap_or_default();
        let conflicts = hard::all(&version.entries, &catalog, &assignments);

        Ok(Report {
            version_id,
            teachers,
            rooms,
            conflicts,
        })
    }
}

fn percentage(assigned: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        (assigned as f64 / total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleConfig;
    use crate::domain::{Catalog, Group, Method, Room, Subject, Teacher, TimeSlot, VersionStatus, Weekday};
    use chrono::NaiveTime;
    use std::collections::HashSet;

    fn catalog() -> Catalog {
        Catalog {
            teachers: vec![Teacher {
                id: 1,
                name: "T".into(),
                email: "t@example.com".into(),
                max_hours_per_week: 4,
                available_slots: HashSet::new(),
                taught_subjects: vec![1],
            }],
            rooms: vec![Room {
                id: 1,
                name: "R".into(),
                capacity: 40,
                room_type: "Hall".into(),
                resources: vec![],
            }],
            subjects: vec![Subject {
                id: 1,
                name: "X".into(),
                code: "X1".into(),
                is_lab: false,
                credits: 4,
                required_room_type: "Hall".into(),
                duration_slots: 1,
                teacher_id: Some(1),
            }],
            groups: vec![Group {
                id: 1,
                name: "G".into(),
                student_count: 30,
            }],
            time_slots: vec![
                TimeSlot {
                    id: 1,
                    day: Weekday::Mon,
                    period: 1,
                    start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                    end: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                    is_break: false,
                },
                TimeSlot {
                    id: 2,
                    day: Weekday::Mon,
                    period: 2,
                    start: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                    end: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                    is_break: false,
                },
            ],
            lessons: vec![],
        }
    }

    #[test]
    fn utilization_and_conflicts_computed_from_entries() {
        let store = Store::new(catalog(), ScheduleConfig::default());
        let version_id = store.create_processing_version("v1".to_string(), Method::Csp);
        store.commit_version(version_id, vec![(1, 1, 1, 1, 1)], VersionStatus::Active, None).unwrap();

        let report = AnalyticsReporter::new(&store).report(version_id).unwrap();
        assert_eq!(report.teachers[0].assigned_slots, 1);
        assert_eq!(report.teachers[0].utilization_percentage, 25.0);
        assert_eq!(report.rooms[0].total_slots, 2);
    }

    #[test]
    fn missing_version_is_not_found() {
        let store = Store::new(catalog(), ScheduleConfig::default());
        assert!(AnalyticsReporter::new(&store).report(999).is_err());
    }
}
