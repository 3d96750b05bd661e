//! Substitute-teacher scoring ([`SubstituteScorer`]) and the auto-assignment
//! pipeline that applies it across every entry an absent teacher leaves
//! behind in a single transaction ([`AutoAssignmentEngine`]).

use std::collections::HashSet;

use chrono::NaiveDate;
use log::info;
use serde::Serialize;

use crate::domain::{Catalog, Entry, EntryId, SubjectId, SubstitutionStatus, TeacherId, TimeSlotId, Version};
use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub availability: f64,
    pub subject: f64,
    pub workload: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            availability: 100.0,
            subject: 80.0,
            workload: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub availability: f64,
    pub subject: f64,
    pub workload: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub teacher_id: TeacherId,
    pub score: f64,
    pub available: bool,
    pub breakdown: ScoreBreakdown,
    pub current_workload: u32,
    pub conflicting_slots: Vec<TimeSlotId>,
}

pub struct SubstituteScorer<'a> {
    catalog: &'a Catalog,
    version: &'a Version,
    weights: ScoreWeights,
}

impl<'a> SubstituteScorer<'a> {
    pub fn new(catalog: &'a Catalog, version: &'a Version, weights: ScoreWeights) -> Self {
        Self { catalog, version, weights }
    }

    /// Score one candidate against the required slots `required_slots` and
    /// required subject names `required_subjects` (§4.6).
    pub fn score(&self, candidate_id: TeacherId, required_slots: &HashSet<TimeSlotId>, required_subjects: &HashSet<String>) -> Candidate {
        let current_workload = self
            .version
            .entries
            .iter()
            .filter(|e| e.teacher_id == candidate_id)
            .count() as u32;

        let conflicting_slots: Vec<TimeSlotId> = self
            .version
            .entries
            .iter()
            .filter(|e| e.teacher_id == candidate_id && required_slots.contains(&e.time_slot_id))
            .map(|e| e.time_slot_id)
            .collect();

        if !conflicting_slots.is_empty() {
            return Candidate {
                teacher_id: candidate_id,
                score: 0.0,
                available: false,
                breakdown: ScoreBreakdown {
                    availability: 0.0,
                    subject: 0.0,
                    workload: 0.0,
                },
                current_workload,
                conflicting_slots,
            };
        }

        let subjects = self.catalog.subject_map();
        let taught_names: HashSet<String> = self
            .catalog
            .teacher_map()
            .get(&candidate_id)
            .map(|t| {
                t.taught_subjects
                    .iter()
                    .filter_map(|sid| subjects.get(sid).map(|s| s.name.to_ascii_lowercase()))
                    .collect()
            })
            .unwrap_or_default();
        let required_lower: HashSet<String> = required_subjects.iter().map(|s| s.to_ascii_lowercase()).collect();

        let subject_score = if taught_names.intersection(&required_lower).next().is_some() {
            self.weights.subject
        } else if taught_names
            .iter()
            .any(|t| required_lower.iter().any(|r| t.contains(r.as_str()) || r.contains(t.as_str())))
        {
            0.7 * self.weights.subject
        } else {
            0.0
        };

        let max_hours = self
            .catalog
            .teacher_map()
            .get(&candidate_id)
            .map(|t| t.max_hours_per_week)
            .unwrap_or(0);
        let workload_score = if max_hours == 0 {
            0.0
        } else {
            let utilization = current_workload as f64 / max_hours as f64;
            (self.weights.workload * (1.0 - utilization)).max(0.0)
        };

        Candidate {
            teacher_id: candidate_id,
            score: self.weights.availability + subject_score + workload_score,
            available: true,
            breakdown: ScoreBreakdown {
                availability: self.weights.availability,
                subject: subject_score,
                workload: workload_score,
            },
            current_workload,
            conflicting_slots,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentReport {
    pub success: bool,
    pub reason: Option<String>,
    pub substitute_teacher_id: Option<TeacherId>,
    pub affected_entries: Vec<EntryId>,
    pub alternatives: Vec<Candidate>,
}

pub struct AutoAssignmentEngine<'a> {
    store: &'a Store,
    weights: ScoreWeights,
}

impl<'a> AutoAssignmentEngine<'a> {
    pub fn new(store: &'a Store, weights: ScoreWeights) -> Self {
        Self { store, weights }
    }

    /// §4.7: score and commit substitutions for one absent teacher on one
    /// date. Bulk absence handling (one teacher at a time, isolated
    /// failures) is the caller's responsibility.
    pub fn auto_assign(&self, absent_teacher_id: TeacherId, date: NaiveDate, auto_notify: bool) -> Result<AssignmentReport> {
        let catalog = self.store.snapshot_catalog();
        let version = self.store.latest_version()?;

        let affected: Vec<&Entry> = version.entries.iter().filter(|e| e.teacher_id == absent_teacher_id).collect();
        if affected.is_empty() {
            return Ok(AssignmentReport {
                success: true,
                reason: Some("no affected classes".to_string()),
                substitute_teacher_id: None,
                affected_entries: Vec::new(),
                alternatives: Vec::new(),
            });
        }

        let required_slots: HashSet<TimeSlotId> = affected.iter().map(|e| e.time_slot_id).collect();
        let subjects = catalog.subject_map();
        let required_subjects: HashSet<String> = affected
            .iter()
            .filter_map(|e| subjects.get(&e.subject_id).map(|s| s.name.clone()))
            .collect();
        let affected_ids: Vec<EntryId> = affected.iter().map(|e| e.id).collect();

        let scorer = SubstituteScorer::new(&catalog, &version, self.weights);
        let mut candidates: Vec<Candidate> = catalog
            .teachers
            .iter()
            .filter(|t| t.id != absent_teacher_id)
            .map(|t| scorer.score(t.id, &required_slots, &required_subjects))
            .collect();
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then(a.teacher_id.cmp(&b.teacher_id)));

        let available: Vec<&Candidate> = candidates.iter().filter(|c| c.available).collect();

        if let Some(&winner) = available.first() {
            for entry_id in &affected_ids {
                self.store.upsert_substitution(date, *entry_id, absent_teacher_id, Some(winner.teacher_id), SubstitutionStatus::Confirmed);
            }
            if auto_notify {
                info!("notified substitute {} for {} affected classes on {date}", winner.teacher_id, affected_ids.len());
            }
            let alternatives = available.iter().skip(1).take(3).map(|&c| c.clone()).collect();
            Ok(AssignmentReport {
                success: true,
                reason: None,
                substitute_teacher_id: Some(winner.teacher_id),
                affected_entries: affected_ids,
                alternatives,
            })
        } else {
            for entry_id in &affected_ids {
                self.store.upsert_substitution(date, *entry_id, absent_teacher_id, None, SubstitutionStatus::Cancelled);
            }
            Ok(AssignmentReport {
                success: false,
                reason: Some("all potential substitutes are busy".to_string()),
                substitute_teacher_id: None,
                affected_entries: affected_ids,
                alternatives: Vec::new(),
            })
        }
    }

    /// §4.7: rank every other teacher (available or not) against a single
    /// entry's slot and subject.
    pub fn ranked_suggestions(&self, entry_id: EntryId, top_n: usize) -> Result<Vec<Candidate>> {
        let catalog = self.store.snapshot_catalog();
        let (entry, version_id) = self.store.get_entry(entry_id)?;
        let version = self.store.get_version(version_id)?;

        let required_slots: HashSet<TimeSlotId> = [entry.time_slot_id].into_iter().collect();
        let required_subjects: HashSet<String> = catalog
            .subject_map()
            .get(&entry.subject_id)
            .map(|s| s.name.clone())
            .into_iter()
            .collect();

        let scorer = SubstituteScorer::new(&catalog, &version, self.weights);
        let mut candidates: Vec<Candidate> = catalog
            .teachers
            .iter()
            .filter(|t| t.id != entry.teacher_id)
            .map(|t| scorer.score(t.id, &required_slots, &required_subjects))
            .collect();
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then(a.teacher_id.cmp(&b.teacher_id)));
        candidates.truncate(top_n);
        Ok(candidates)
    }

    /// §4.7: a human has already decided; bypass scoring and upsert directly.
    pub fn assign_substitute(&self, entry_id: EntryId, date: NaiveDate, substitute_teacher_id: TeacherId, original_teacher_id: TeacherId) -> Result<()> {
        self.store.get_entry(entry_id)?;
        self.store
            .upsert_substitution(date, entry_id, original_teacher_id, Some(substitute_teacher_id), SubstitutionStatus::Confirmed);
        Ok(())
    }

    pub fn cancel_class(&self, entry_id: EntryId, date: NaiveDate, original_teacher_id: TeacherId, reason: String) -> Result<()> {
        self.store.get_entry(entry_id)?;
        info!("class {entry_id} on {date} cancelled: {reason}");
        self.store.upsert_substitution(date, entry_id, original_teacher_id, None, SubstitutionStatus::Cancelled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleConfig;
    use crate::domain::{Group, Method, Room, Subject, Teacher, TimeSlot, Weekday};
    use chrono::NaiveTime;
    use std::collections::HashSet as Set;

    fn teacher(id: TeacherId, max_hours: u32, taught: Vec<SubjectId>) -> Teacher {
        Teacher {
            id,
            name: format!("T{id}"),
            email: format!("t{id}@example.com"),
            max_hours_per_week: max_hours,
            available_slots: Set::new(),
            taught_subjects: taught,
        }
    }

    fn slot(id: TimeSlotId) -> TimeSlot {
        TimeSlot {
            id,
            day: Weekday::Mon,
            period: id,
            start: NaiveTime::from_hms_opt(8 + id, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(9 + id, 0, 0).unwrap(),
            is_break: false,
        }
    }

    fn entry(id: EntryId, teacher_id: TeacherId, slot_id: TimeSlotId) -> Entry {
        Entry {
            id,
            version_id: 1,
            time_slot_id: slot_id,
            subject_id: 1,
            room_id: 1,
            group_id: 1,
            teacher_id,
        }
    }

    fn base_store() -> Store {
        let catalog = Catalog {
            teachers: vec![
                teacher(1, 10, vec![1]),
                teacher(2, 10, vec![1]),
                teacher(3, 10, vec![2]),
                teacher(4, 10, vec![1]),
            ],
            rooms: vec![Room {
                id: 1,
                name: "R".into(),
                capacity: 40,
                room_type: "Hall".into(),
                resources: vec![],
            }],
            subjects: vec![
                Subject {
                    id: 1,
                    name: "Math".into(),
                    code: "M1".into(),
                    is_lab: false,
                    credits: 4,
                    required_room_type: "Hall".into(),
                    duration_slots: 1,
                    teacher_id: Some(1),
                },
                Subject {
                    id: 2,
                    name: "History".into(),
                    code: "H1".into(),
                    is_lab: false,
                    credits: 4,
                    required_room_type: "Hall".into(),
                    duration_slots: 1,
                    teacher_id: Some(3),
                },
            ],
            groups: vec![Group {
                id: 1,
                name: "G".into(),
                student_count: 30,
            }],
            time_slots: vec![slot(1), slot(2)],
            lessons: vec![],
        };
        let store = Store::new(catalog, ScheduleConfig::default());
        let version_id = store.create_processing_version("v1".to_string(), Method::Csp);
        store
            .commit_version(
                version_id,
                vec![
                    (1, 1, 1, 1, 1), // T1 @ slot1
                    (1, 1, 1, 1, 2), // T1 @ slot2
                    (1, 1, 1, 4, 2), // T4 busy at slot2
                ],
                crate::domain::VersionStatus::Active,
                None,
            )
            .unwrap();
        store
    }

    #[test]
    fn s4_auto_assign_picks_same_subject_free_teacher() {
        let store = base_store();
        let report = AutoAssignmentEngine::new(&store, ScoreWeights::default())
            .auto_assign(1, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(), false)
            .unwrap();
        assert!(report.success);
        assert_eq!(report.substitute_teacher_id, Some(2));
        assert_eq!(report.affected_entries.len(), 2);
    }

    #[test]
    fn s5_auto_assign_cancels_when_all_busy() {
        let catalog = Catalog {
            teachers: vec![teacher(1, 10, vec![1]), teacher(2, 10, vec![1])],
            rooms: vec![Room {
                id: 1,
                name: "R".into(),
                capacity: 40,
                room_type: "Hall".into(),
                resources: vec![],
            }],
            subjects: vec![Subject {
                id: 1,
                name: "Math".into(),
                code: "M1".into(),
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
            time_slots: vec![slot(1)],
            lessons: vec![],
        };
        let store = Store::new(catalog, ScheduleConfig::default());
        let version_id = store.create_processing_version("v1".to_string(), Method::Csp);
        store
            .commit_version(version_id, vec![(1, 1, 1, 1, 1), (1, 1, 1, 2, 1)], crate::domain::VersionStatus::Active, None)
            .unwrap();

        let report = AutoAssignmentEngine::new(&store, ScoreWeights::default())
            .auto_assign(1, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(), false)
            .unwrap();
        assert!(!report.success);
        assert_eq!(report.reason, Some("all potential substitutes are busy".to_string()));
    }

    #[test]
    fn busy_candidate_scores_zero_and_unavailable() {
        let store = base_store();
        let catalog = store.snapshot_catalog();
        let version = store.latest_version().unwrap();
        let scorer = SubstituteScorer::new(&catalog, &version, ScoreWeights::default());
        let required_slots: Set<TimeSlotId> = [2].into_iter().collect();
        let candidate = scorer.score(4, &required_slots, &Set::new());
        assert!(!candidate.available);
        assert_eq!(candidate.score, 0.0);
    }

    #[test]
    fn lower_workload_never_scores_lower() {
        let store = base_store();
        let catalog = store.snapshot_catalog();
        let version = store.latest_version().unwrap();
        let scorer = SubstituteScorer::new(&catalog, &version, ScoreWeights::default());
        let required_slots: Set<TimeSlotId> = Set::new();
        let required_subjects: Set<String> = ["Math".to_string()].into_iter().collect();
        let lightly_loaded = scorer.score(2, &required_slots, &required_subjects);
        let heavily_loaded = scorer.score(1, &required_slots, &required_subjects);
        assert!(lightly_loaded.current_workload <= heavily_loaded.current_workload);
        assert!(lightly_loaded.score >= heavily_loaded.score);
    }
}
