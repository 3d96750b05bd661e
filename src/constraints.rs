//! Hard-constraint predicates and soft-penalty functions. Both solver
//! back-ends and `AnalyticsReporter` share this module so a schedule is
//! validated the same way no matter how it was produced.

use std::collections::HashMap;

use itertools::Itertools;

use crate::domain::{Catalog, Entry, RequiredAssignment};

/// Hard constraints: predicates that must hold with zero violations for a
/// version to be `active`. Each returns one human-readable description per
/// violation.
pub mod hard {
    use super::*;

    fn overlap_conflicts<K, F>(entries: &[Entry], key_fn: F, label: &str) -> Vec<String>
    where
        K: Eq + std::hash::Hash + std::fmt::Debug,
        F: Fn(&Entry) -> K,
    {
        let mut buckets: HashMap<K, Vec<&Entry>> = HashMap::new();
        for entry in entries {
            buckets.entry(key_fn(entry)).or_default().push(entry);
        }
        buckets
            .into_iter()
            .filter(|(_, v)| v.len() > 1)
            .map(|(key, v)| format!("{label} {key:?} has {} overlapping entries", v.len()))
            .collect()
    }

    pub fn teacher_overlap(entries: &[Entry]) -> Vec<String> {
        overlap_conflicts(entries, |e| (e.teacher_id, e.time_slot_id), "teacher/slot")
    }

    pub fn room_overlap(entries: &[Entry]) -> Vec<String> {
        overlap_conflicts(entries, |e| (e.room_id, e.time_slot_id), "room/slot")
    }

    pub fn group_overlap(entries: &[Entry]) -> Vec<String> {
        overlap_conflicts(entries, |e| (e.group_id, e.time_slot_id), "group/slot")
    }

    pub fn room_capacity(entries: &[Entry], catalog: &Catalog) -> Vec<String> {
        let rooms = catalog.room_map();
        let subjects = catalog.subject_map();
        let groups = catalog.group_map();
        let mut conflicts = Vec::new();
        for entry in entries {
            let (Some(room), Some(subject), Some(group)) = (
                rooms.get(&entry.room_id),
                subjects.get(&entry.subject_id),
                groups.get(&entry.group_id),
            ) else {
                continue;
            };
            if room.room_type != subject.required_room_type {
                conflicts.push(format!(
                    "room {} is type {} but subject {} requires {}",
                    room.id, room.room_type, subject.id, subject.required_room_type
                ));
            }
            if room.capacity < group.student_count {
                conflicts.push(format!(
                    "room {} (capacity {}) is too small for group {} ({} students)",
                    room.id, room.capacity, group.id, group.student_count
                ));
            }
        }
        conflicts
    }

    pub fn break_exclusion(entries: &[Entry], catalog: &Catalog) -> Vec<String> {
        let slots = catalog.time_slot_map();
        entries
            .iter()
            .filter(|e| slots.get(&e.time_slot_id).is_some_and(|s| s.is_break))
            .map(|e| format!("entry {} references break slot {}", e.id, e.time_slot_id))
            .collect()
    }

    /// Every lab occurrence (subject.is_lab && duration_slots > 1) must
    /// appear as a run of `duration_slots` consecutive same-day periods
    /// sharing room/teacher/group.
    pub fn lab_block(entries: &[Entry], catalog: &Catalog) -> Vec<String> {
        let subjects = catalog.subject_map();
        let slots = catalog.time_slot_map();
        let mut conflicts = Vec::new();

        let mut groups: HashMap<(u32, u32, u32, u32, crate::domain::Weekday), Vec<u32>> =
            HashMap::new();
        for entry in entries {
            let Some(subject) = subjects.get(&entry.subject_id) else {
                continue;
            };
            if !(subject.is_lab && subject.duration_slots > 1) {
                continue;
            }
            let Some(slot) = slots.get(&entry.time_slot_id) else {
                continue;
            };
            groups
                .entry((entry.subject_id, entry.room_id, entry.teacher_id, entry.group_id, slot.day))
                .or_default()
                .push(slot.period);
        }

        for ((subject_id, room_id, teacher_id, group_id, day), mut periods) in groups {
            periods.sort_unstable();
            let subject = subjects.get(&subject_id);
            let expected = subject.map(|s| s.duration_slots).unwrap_or(0);
            let contiguous = periods.len() as u32 == expected
                && periods
                    .windows(2)
                    .all(|w| w[1] == w[0] + 1);
            if !contiguous {
                conflicts.push(format!(
                    "lab block for subject {subject_id} (room {room_id}, teacher {teacher_id}, group {group_id}, {day:?}) is not {expected} consecutive periods: got {periods:?}"
                ));
            }
        }
        conflicts
    }

    /// Every `RequiredAssignment` must be satisfied exactly once (a lab
    /// block counts as one satisfaction regardless of how many entries it
    /// spans).
    pub fn requirement_coverage(entries: &[Entry], assignments: &[RequiredAssignment]) -> Vec<String> {
        let mut expected: HashMap<(u32, u32, u32), (u32, u32)> = HashMap::new();
        for a in assignments {
            let e = expected.entry((a.subject_id, a.teacher_id, a.group_id)).or_insert((0, a.duration));
            e.0 += 1;
        }

        let mut actual: HashMap<(u32, u32, u32), u32> = HashMap::new();
        for e in entries {
            *actual.entry((e.subject_id, e.teacher_id, e.group_id)).or_insert(0) += 1;
        }

        let mut conflicts = Vec::new();
        for (key, (occurrences, duration)) in expected {
            let expected_entries = occurrences * duration;
            let got = actual.get(&key).copied().unwrap_or(0);
            if got != expected_entries {
                conflicts.push(format!(
                    "requirement (subject {}, teacher {}, group {}) expected {expected_entries} entries, found {got}",
                    key.0, key.1, key.2
                ));
            }
        }
        conflicts
    }

    /// All hard-constraint descriptions for a schedule; empty iff valid.
    pub fn all(entries: &[Entry], catalog: &Catalog, assignments: &[RequiredAssignment]) -> Vec<String> {
        let mut conflicts = Vec::new();
        conflicts.extend(teacher_overlap(entries));
        conflicts.extend(room_overlap(entries));
        conflicts.extend(group_overlap(entries));
        conflicts.extend(room_capacity(entries, catalog));
        conflicts.extend(lab_block(entries, catalog));
        conflicts.extend(break_exclusion(entries, catalog));
        conflicts.extend(requirement_coverage(entries, assignments));
        conflicts
    }
}

/// Soft-constraint penalty weights. Defaults match §4.2; callers may
/// override any of them without touching the solvers.
#[derive(Debug, Clone, Copy)]
pub struct PenaltyWeights {
    pub gap: f64,
    pub balance: f64,
    pub consecutive: f64,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            gap: 10.0,
            balance: 5.0,
            consecutive: 8.0,
        }
    }
}

pub mod soft {
    use super::*;

    /// Per-teacher, per-day sorted periods of non-break entries.
    fn teacher_day_periods(entries: &[Entry], catalog: &Catalog) -> HashMap<(u32, crate::domain::Weekday), Vec<u32>> {
        let slots = catalog.time_slot_map();
        let mut map: HashMap<(u32, crate::domain::Weekday), Vec<u32>> = entries
            .iter()
            .filter_map(|entry| {
                let slot = slots.get(&entry.time_slot_id)?;
                (!slot.is_break).then_some(((entry.teacher_id, slot.day), slot.period))
            })
            .into_group_map();
        for periods in map.values_mut() {
            periods.sort_unstable();
        }
        map
    }

    pub fn gap_penalty(entries: &[Entry], catalog: &Catalog, weights: &PenaltyWeights) -> f64 {
        let mut penalty = 0.0;
        for periods in teacher_day_periods(entries, catalog).values() {
            if periods.len() <= 1 {
                continue;
            }
            let span = periods.last().unwrap() - periods.first().unwrap() + 1;
            let gaps = span as i64 - periods.len() as i64;
            penalty += gaps.max(0) as f64 * weights.gap;
        }
        penalty
    }

    pub fn balance_penalty(entries: &[Entry], catalog: &Catalog, weights: &PenaltyWeights) -> f64 {
        let mut loads: HashMap<u32, u32> = catalog.teachers.iter().map(|t| (t.id, 0)).collect();
        for entry in entries {
            *loads.entry(entry.teacher_id).or_insert(0) += 1;
        }
        if loads.is_empty() {
            return 0.0;
        }
        let values: Vec<f64> = loads.values().map(|&v| v as f64).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        variance.sqrt() * weights.balance
    }

    pub fn consecutive_penalty(entries: &[Entry], catalog: &Catalog, weights: &PenaltyWeights) -> f64 {
        let mut penalty = 0.0;
        for periods in teacher_day_periods(entries, catalog).values() {
            let mut longest = 1u32;
            let mut current = 1u32;
            for w in periods.windows(2) {
                if w[1] == w[0] + 1 {
                    current += 1;
                    longest = longest.max(current);
                } else {
                    current = 1;
                }
            }
            if periods.is_empty() {
                continue;
            }
            let excess = longest.saturating_sub(3);
            penalty += excess as f64 * weights.consecutive;
        }
        penalty
    }

    pub fn total_soft(entries: &[Entry], catalog: &Catalog, weights: &PenaltyWeights) -> f64 {
        gap_penalty(entries, catalog, weights)
            + balance_penalty(entries, catalog, weights)
            + consecutive_penalty(entries, catalog, weights)
    }
}
