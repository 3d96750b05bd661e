//! Shared admissibility pre-filtering, used by both solver back-ends to
//! prune the search space before any decision variables or genes are
//! created — the same role the teacher's `is_assignment_possible` plays.

use crate::domain::{Catalog, RequiredAssignment, RoomId, TimeSlotId};

/// Given a starting slot and a duration, resolve the full run of
/// consecutive same-day slot ids it would occupy, or `None` if the day
/// doesn't have enough consecutive non-break periods left.
pub fn covered_slots(catalog: &Catalog, start_slot_id: TimeSlotId, duration: u32) -> Option<Vec<TimeSlotId>> {
    let slot_map = catalog.time_slot_map();
    let start = slot_map.get(&start_slot_id)?;
    if start.is_break {
        return None;
    }
    let day_slots = catalog.day_slots(start.day);
    let idx = day_slots.iter().position(|s| s.id == start_slot_id)?;
    let d = duration.max(1) as usize;
    if idx + d > day_slots.len() {
        return None;
    }
    let window = &day_slots[idx..idx + d];
    if !window.windows(2).all(|w| w[1].period == w[0].period + 1) {
        return None;
    }
    Some(window.iter().map(|s| s.id).collect())
}

/// Every `(room, start_slot, covered_slots)` triple a `RequiredAssignment`
/// could legally occupy: room type and capacity match, and the teacher is
/// available in every slot the placement would cover.
pub fn admissible_placements(
    catalog: &Catalog,
    assignment: &RequiredAssignment,
) -> Vec<(RoomId, TimeSlotId, Vec<TimeSlotId>)> {
    let subject_map = catalog.subject_map();
    let group_map = catalog.group_map();
    let teacher_map = catalog.teacher_map();

    let (Some(subject), Some(group), Some(teacher)) = (
        subject_map.get(&assignment.subject_id),
        group_map.get(&assignment.group_id),
        teacher_map.get(&assignment.teacher_id),
    ) else {
        return Vec::new();
    };

    let valid_rooms: Vec<RoomId> = catalog
        .rooms
        .iter()
        .filter(|r| r.room_type == subject.required_room_type && r.capacity >= group.student_count)
        .map(|r| r.id)
        .collect();
    if valid_rooms.is_empty() {
        return Vec::new();
    }

    let mut result = Vec::new();
    for day in catalog.days() {
        for slot in catalog.day_slots(day) {
            let Some(covered) = covered_slots(catalog, slot.id, assignment.duration) else {
                continue;
            };
            if !covered.iter().all(|&sid| teacher.is_available_at(sid)) {
                continue;
            }
            for &room_id in &valid_rooms {
                result.push((room_id, slot.id, covered.clone()));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Group, Room, Subject, Teacher, TimeSlot, Weekday};
    use chrono::NaiveTime;
    use std::collections::HashSet;

    fn slot(id: TimeSlotId, day: Weekday, period: u32) -> TimeSlot {
        TimeSlot {
            id,
            day,
            period,
            start: NaiveTime::from_hms_opt(8 + period, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(9 + period, 0, 0).unwrap(),
            is_break: false,
        }
    }

    fn base_catalog() -> Catalog {
        Catalog {
            teachers: vec![Teacher {
                id: 1,
                name: "T".into(),
                email: "t@example.com".into(),
                max_hours_per_week: 10,
                available_slots: HashSet::new(),
                taught_subjects: vec![],
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
            time_slots: vec![slot(1, Weekday::Mon, 1), slot(2, Weekday::Mon, 2), slot(3, Weekday::Mon, 3)],
            lessons: vec![],
        }
    }

    #[test]
    fn unit_duration_admits_every_non_break_slot() {
        let catalog = base_catalog();
        let assignment = RequiredAssignment {
            assignment_id: 1,
            group_id: 1,
            subject_id: 1,
            teacher_id: 1,
            duration: 1,
            occurrence_idx: 0,
        };
        let placements = admissible_placements(&catalog, &assignment);
        assert_eq!(placements.len(), 3);
    }

    #[test]
    fn lab_duration_only_admits_consecutive_windows() {
        let mut catalog = base_catalog();
        catalog.subjects[0].duration_slots = 2;
        catalog.subjects[0].is_lab = true;
        let assignment = RequiredAssignment {
            assignment_id: 1,
            group_id: 1,
            subject_id: 1,
            teacher_id: 1,
            duration: 2,
            occurrence_idx: 0,
        };
        let placements = admissible_placements(&catalog, &assignment);
        // windows starting at period 1 and period 2 both fit (3 slots total)
        assert_eq!(placements.len(), 2);
        for (_, start, covered) in &placements {
            assert_eq!(covered.len(), 2);
            assert_eq!(covered[0], *start);
        }
    }

    #[test]
    fn room_capacity_mismatch_excludes_room() {
        let mut catalog = base_catalog();
        catalog.groups[0].student_count = 100;
        let assignment = RequiredAssignment {
            assignment_id: 1,
            group_id: 1,
            subject_id: 1,
            teacher_id: 1,
            duration: 1,
            occurrence_idx: 0,
        };
        assert!(admissible_placements(&catalog, &assignment).is_empty());
    }
}
