//! Feasibility back-end: an ILP encoding solved with `good_lp`/HiGHs,
//! generalizing the teacher's single-room timetable model to rooms,
//! teachers, groups and multi-slot lab blocks.

use std::collections::HashMap;
use std::time::Duration;

use good_lp::{Expression, ProblemVariables, Solution, SolverModel, Variable, constraint, default_solver, variable};
use log::{debug, info, trace};

use crate::domain::{Catalog, Placement, RequiredAssignment, RoomId, Schedule, TimeSlotId};
use crate::feasible::admissible_placements;

use super::SolverError;

#[derive(Debug, Clone)]
pub struct CspParams {
    /// Wall-clock budget handed to the underlying LP solver (§4.3: default 60s).
    pub timeout: Duration,
}

impl Default for CspParams {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

/// One admissible (assignment, room, start-slot) decision variable, plus
/// the full run of slots it would occupy.
struct VarInfo {
    assignment_idx: usize,
    room_id: RoomId,
    start_slot: TimeSlotId,
    covered: Vec<TimeSlotId>,
}

pub struct CspSolver {
    params: CspParams,
}

impl CspSolver {
    pub fn new(params: CspParams) -> Self {
        Self { params }
    }

    /// Encode `assignments` as boolean decision variables over
    /// (assignment, room, start-slot) and solve for feasibility, breaking
    /// ties toward earlier slots for determinism (§4.3, §8 scenario S1).
    pub fn solve(&self, catalog: &Catalog, assignments: &[RequiredAssignment]) -> Result<Schedule, SolverError> {
        if assignments.is_empty() {
            return Err(SolverError::Fault("no required assignments to schedule".to_string()));
        }

        info!(
            "csp: encoding {} required assignments over {} rooms and {} time slots",
            assignments.len(),
            catalog.rooms.len(),
            catalog.time_slots.len()
        );

        let slot_map = catalog.time_slot_map();
        let mut problem = ProblemVariables::new();
        let mut var_infos: Vec<VarInfo> = Vec::new();
        let mut raw_vars: Vec<Variable> = Vec::new();

        for (idx, assignment) in assignments.iter().enumerate() {
            for (room_id, start_slot, covered) in admissible_placements(catalog, assignment) {
                let var = problem.add(variable().binary());
                raw_vars.push(var);
                var_infos.push(VarInfo {
                    assignment_idx: idx,
                    room_id,
                    start_slot,
                    covered,
                });
            }
        }

        if raw_vars.is_empty() {
            return Err(SolverError::Infeasible(
                "no admissible placements exist for any required assignment".to_string(),
            ));
        }
        trace!("csp: created {} decision variables", raw_vars.len());

        let mut by_assignment: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut by_room_slot: HashMap<(RoomId, TimeSlotId), Vec<usize>> = HashMap::new();
        let mut by_teacher_slot: HashMap<(u32, TimeSlotId), Vec<usize>> = HashMap::new();
        let mut by_group_slot: HashMap<(u32, TimeSlotId), Vec<usize>> = HashMap::new();

        for (i, info) in var_infos.iter().enumerate() {
            by_assignment.entry(info.assignment_idx).or_default().push(i);
            let assignment = &assignments[info.assignment_idx];
            for &slot in &info.covered {
                by_room_slot.entry((info.room_id, slot)).or_default().push(i);
                by_teacher_slot.entry((assignment.teacher_id, slot)).or_default().push(i);
                by_group_slot.entry((assignment.group_id, slot)).or_default().push(i);
            }
        }

        // Deterministic tie-break: prefer earlier slots so S1-style fully
        // symmetric problems always resolve to the first available period.
        let rank_of = |slot_id: TimeSlotId| -> f64 {
            slot_map
                .get(&slot_id)
                .map(|s| (s.day as i32 as f64) * 1000.0 + s.period as f64)
                .unwrap_or(0.0)
        };
        let objective: Expression = var_infos
            .iter()
            .zip(raw_vars.iter())
            .map(|(info, var)| rank_of(info.start_slot) * Expression::from(*var))
            .sum();

        let mut model = problem
            .minimise(objective)
            .using(default_solver)
            .set_option("threads", 1) // reproducible across runs
            .set_option("random_seed", 1234)
            .set_option("time_limit", self.params.timeout.as_secs_f64());

        info!("csp: adding {} coverage constraints", by_assignment.len());
        for idxs in by_assignment.values() {
            let sum: Expression = idxs.iter().map(|&i| raw_vars[i]).sum();
            model.add_constraint(constraint!(sum == 1));
        }

        info!("csp: adding {} room-exclusion constraints", by_room_slot.len());
        for idxs in by_room_slot.values() {
            let sum: Expression = idxs.iter().map(|&i| raw_vars[i]).sum();
            model.add_constraint(constraint!(sum <= 1));
        }

        info!("csp: adding {} teacher-exclusion constraints", by_teacher_slot.len());
        for idxs in by_teacher_slot.values() {
            let sum: Expression = idxs.iter().map(|&i| raw_vars[i]).sum();
            model.add_constraint(constraint!(sum <= 1));
        }

        info!("csp: adding {} group-exclusion constraints", by_group_slot.len());
        for idxs in by_group_slot.values() {
            let sum: Expression = idxs.iter().map(|&i| raw_vars[i]).sum();
            model.add_constraint(constraint!(sum <= 1));
        }

        debug!("csp: invoking HiGHs");
        let solution = model
            .solve()
            .map_err(|e| SolverError::Infeasible(format!("no feasible schedule: {e}")))?;

        let mut placements = Vec::new();
        for (info, var) in var_infos.iter().zip(raw_vars.iter()) {
            if solution.value(*var) > 0.9 {
                placements.push(Placement {
                    assignment_id: assignments[info.assignment_idx].assignment_id,
                    room_id: info.room_id,
                    start_slot_id: info.start_slot,
                });
            }
        }
        placements.sort_by_key(|p| p.assignment_id);
        info!("csp: solved with {} placements", placements.len());

        Ok(Schedule { placements })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Group, Lesson, Room, Subject, Teacher, TimeSlot, Weekday};
    use crate::expander::expand;
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

    fn s1_catalog() -> Catalog {
        Catalog {
            teachers: vec![Teacher {
                id: 1,
                name: "T".into(),
                email: "t@example.com".into(),
                max_hours_per_week: 5,
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
                code: "X".into(),
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
            lessons: vec![Lesson {
                id: 1,
                teacher_ids: vec![1],
                group_ids: vec![1],
                subject_ids: vec![1],
                lessons_per_week: 1,
                length_per_lesson: 1,
            }],
        }
    }

    #[test]
    fn s1_trivial_feasibility_picks_earliest_period() {
        let catalog = s1_catalog();
        let assignments = expand(&catalog).unwrap();
        let schedule = CspSolver::new(CspParams::default()).solve(&catalog, &assignments).unwrap();
        assert_eq!(schedule.placements.len(), 1);
        assert_eq!(schedule.placements[0].start_slot_id, 1);
    }

    #[test]
    fn s2_lab_block_occupies_two_consecutive_periods() {
        let mut catalog = s1_catalog();
        catalog.subjects[0].is_lab = true;
        catalog.subjects[0].duration_slots = 2;
        catalog.subjects[0].required_room_type = "Lab".into();
        catalog.rooms[0].room_type = "Lab".into();

        let assignments = expand(&catalog).unwrap();
        let schedule = CspSolver::new(CspParams::default()).solve(&catalog, &assignments).unwrap();
        assert_eq!(schedule.placements.len(), 1);
        let covered = crate::feasible::covered_slots(
            &catalog,
            schedule.placements[0].start_slot_id,
            2,
        )
        .unwrap();
        assert_eq!(covered, vec![1, 2]);
    }

    #[test]
    fn s3_teacher_collision_is_infeasible() {
        let mut catalog = s1_catalog();
        catalog.groups.push(Group {
            id: 2,
            name: "G2".into(),
            student_count: 30,
        });
        catalog.time_slots = vec![slot(1, Weekday::Mon, 1)];
        catalog.lessons = vec![Lesson {
            id: 1,
            teacher_ids: vec![1],
            group_ids: vec![1, 2],
            subject_ids: vec![1],
            lessons_per_week: 1,
            length_per_lesson: 1,
        }];

        let assignments = expand(&catalog).unwrap();
        let result = CspSolver::new(CspParams::default()).solve(&catalog, &assignments);
        assert!(matches!(result, Err(SolverError::Infeasible(_))));
    }
}
