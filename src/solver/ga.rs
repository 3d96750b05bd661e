//! Heuristic back-end: a genetic algorithm over random initial placements,
//! offered as a faster alternative to the ILP encoding in [`super::csp`]
//! when approximate, quickly-computed schedules are acceptable.

use std::time::Instant;

use log::{info, trace};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::constraints::{self, PenaltyWeights};
use crate::domain::{Catalog, Entry, RequiredAssignment, RoomId, Schedule, TimeSlotId};
use crate::feasible::admissible_placements;

use super::SolverError;

const BASE_FITNESS: f64 = 10_000.0;
const HARD_VIOLATION_PENALTY: f64 = 1_000.0;

#[derive(Debug, Clone)]
pub struct GaParams {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub tournament_size: usize,
    pub elitism: usize,
    /// Seed for `ChaCha8Rng`, so identical inputs always produce an
    /// identical schedule.
    pub seed: u64,
    pub penalty_weights: PenaltyWeights,
}

impl Default for GaParams {
    fn default() -> Self {
        Self {
            population_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            tournament_size: 3,
            elitism: 2,
            seed: 1234,
            penalty_weights: PenaltyWeights::default(),
        }
    }
}

/// One gene: the room and starting slot chosen for a given assignment.
/// Index into the genome matches index into the `assignments` slice passed
/// to `solve`.
#[derive(Debug, Clone, Copy)]
struct Gene {
    room_id: RoomId,
    start_slot: TimeSlotId,
}

type Genome = Vec<Gene>;

pub struct GaSolver {
    params: GaParams,
}

impl GaSolver {
    pub fn new(params: GaParams) -> Self {
        Self { params }
    }

    pub fn solve(&self, catalog: &Catalog, assignments: &[RequiredAssignment]) -> Result<Schedule, SolverError> {
        if assignments.is_empty() {
            return Err(SolverError::Fault("no required assignments to schedule".to_string()));
        }

        // Domain of legal (room, start_slot) choices per assignment, reusing
        // the same admissibility filter the ILP encoder uses.
        let domains: Vec<Vec<(RoomId, TimeSlotId)>> = assignments
            .iter()
            .map(|a| {
                admissible_placements(catalog, a)
                    .into_iter()
                    .map(|(room, start, _)| (room, start))
                    .collect::<Vec<_>>()
            })
            .collect();

        if let Some(idx) = domains.iter().position(|d| d.is_empty()) {
            return Err(SolverError::Infeasible(format!(
                "assignment {} has no admissible placement",
                assignments[idx].assignment_id
            )));
        }

        info!(
            "ga: evolving {} individuals over {} generations for {} assignments",
            self.params.population_size,
            self.params.generations,
            assignments.len()
        );

        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        let start = Instant::now();

        let mut population: Vec<Genome> = (0..self.params.population_size)
            .map(|_| random_genome(&domains, &mut rng))
            .collect();

        let mut best_fitness = f64::MIN;
        for gen in 0..self.params.generations {
            population.sort_by(|a, b| {
                fitness(a, assignments, catalog, &self.params.penalty_weights)
                    .partial_cmp(&fitness(b, assignments, catalog, &self.params.penalty_weights))
                    .unwrap()
                    .reverse()
            });

            best_fitness = fitness(&population[0], assignments, catalog, &self.params.penalty_weights);
            trace!("ga: generation {gen} best fitness {best_fitness:.2}");
            if best_fitness >= BASE_FITNESS {
                info!("ga: converged to a perfect individual at generation {gen}");
                break;
            }

            let mut next_gen: Vec<Genome> = population.iter().take(self.params.elitism).cloned().collect();
            while next_gen.len() < self.params.population_size {
                let parent1 = tournament_select(&population, assignments, catalog, &self.params.penalty_weights, self.params.tournament_size, &mut rng);
                let parent2 = tournament_select(&population, assignments, catalog, &self.params.penalty_weights, self.params.tournament_size, &mut rng);
                let mut child = crossover(parent1, parent2, &mut rng);
                if rng.gen::<f64>() < self.params.mutation_rate {
                    mutate(&mut child, &domains, &mut rng);
                }
                next_gen.push(child);
            }
            population = next_gen;
        }

        info!(
            "ga: finished in {:.2?} with best fitness {:.2}",
            start.elapsed(),
            best_fitness
        );

        let placements = population[0]
            .iter()
            .zip(assignments.iter())
            .map(|(gene, assignment)| crate::domain::Placement {
                assignment_id: assignment.assignment_id,
                room_id: gene.room_id,
                start_slot_id: gene.start_slot,
            })
            .collect();

        Ok(Schedule { placements })
    }
}

fn random_genome(domains: &[Vec<(RoomId, TimeSlotId)>], rng: &mut ChaCha8Rng) -> Genome {
    domains
        .iter()
        .map(|choices| {
            let &(room_id, start_slot) = choices.choose(rng).expect("domain checked non-empty before genome creation");
            Gene { room_id, start_slot }
        })
        .collect()
}

/// Expand a genome into `Entry` records (without ids, for scoring purposes
/// only) so the shared constraint predicates can evaluate it.
fn to_entries(genome: &Genome, assignments: &[RequiredAssignment], catalog: &Catalog) -> Vec<Entry> {
    let mut entries = Vec::new();
    for (gene, assignment) in genome.iter().zip(assignments.iter()) {
        let Some(covered) = crate::feasible::covered_slots(catalog, gene.start_slot, assignment.duration) else {
            continue;
        };
        for slot_id in covered {
            entries.push(Entry {
                id: 0,
                version_id: 0,
                time_slot_id: slot_id,
                subject_id: assignment.subject_id,
                room_id: gene.room_id,
                group_id: assignment.group_id,
                teacher_id: assignment.teacher_id,
            });
        }
    }
    entries
}

fn fitness(genome: &Genome, assignments: &[RequiredAssignment], catalog: &Catalog, weights: &PenaltyWeights) -> f64 {
    let entries = to_entries(genome, assignments, catalog);
    let hard_violations = constraints::hard::teacher_overlap(&entries).len()
        + constraints::hard::room_overlap(&entries).len()
        + constraints::hard::group_overlap(&entries).len()
        + constraints::hard::room_capacity(&entries, catalog).len()
        + constraints::hard::lab_block(&entries, catalog).len();

    let mut score = BASE_FITNESS;
    score -= hard_violations as f64 * HARD_VIOLATION_PENALTY;
    score -= constraints::soft::total_soft(&entries, catalog, weights);
    score.max(0.0)
}

fn tournament_select<'a>(
    population: &'a [Genome],
    assignments: &[RequiredAssignment],
    catalog: &Catalog,
    weights: &PenaltyWeights,
    size: usize,
    rng: &mut ChaCha8Rng,
) -> &'a Genome {
    population
        .choose_multiple(rng, size.max(1))
        .max_by(|a, b| {
            fitness(a, assignments, catalog, weights)
                .partial_cmp(&fitness(b, assignments, catalog, weights))
                .unwrap()
        })
        .expect("population is never empty")
}

fn crossover(p1: &Genome, p2: &Genome, rng: &mut ChaCha8Rng) -> Genome {
    if p1.len() <= 1 {
        return p1.clone();
    }
    let point = rng.gen_range(0..p1.len());
    let mut child = p1[..point].to_vec();
    child.extend_from_slice(&p2[point..]);
    child
}

fn mutate(genome: &mut Genome, domains: &[Vec<(RoomId, TimeSlotId)>], rng: &mut ChaCha8Rng) {
    let idx = rng.gen_range(0..genome.len());
    if let Some(&(room_id, start_slot)) = domains[idx].choose(rng) {
        genome[idx] = Gene { room_id, start_slot };
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

    fn catalog() -> Catalog {
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
            time_slots: vec![slot(1, Weekday::Mon, 1), slot(2, Weekday::Mon, 2)],
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
    fn ga_solves_trivial_problem_without_conflict() {
        let catalog = catalog();
        let assignments = expand(&catalog).unwrap();
        let schedule = GaSolver::new(GaParams {
            population_size: 10,
            generations: 20,
            ..GaParams::default()
        })
        .solve(&catalog, &assignments)
        .unwrap();
        assert_eq!(schedule.placements.len(), 1);
    }

    #[test]
    fn identical_seed_is_deterministic() {
        let catalog = catalog();
        let assignments = expand(&catalog).unwrap();
        let params = GaParams {
            population_size: 10,
            generations: 5,
            seed: 42,
            ..GaParams::default()
        };
        let a = GaSolver::new(params.clone()).solve(&catalog, &assignments).unwrap();
        let b = GaSolver::new(params).solve(&catalog, &assignments).unwrap();
        assert_eq!(a.placements, b.placements);
    }

    #[test]
    fn empty_domain_is_infeasible() {
        let mut catalog = catalog();
        catalog.rooms.clear();
        let assignments = vec![RequiredAssignment {
            assignment_id: 1,
            group_id: 1,
            subject_id: 1,
            teacher_id: 1,
            duration: 1,
            occurrence_idx: 0,
        }];
        let result = GaSolver::new(GaParams::default()).solve(&catalog, &assignments);
        assert!(matches!(result, Err(SolverError::Infeasible(_))));
    }

    #[test]
    fn s6_ga_prefers_the_contiguous_layout() {
        // 1 teacher, 4 occurrences of one subject, 5 non-break Monday periods:
        // with only 5 choose 4 placements, the two contiguous ones (missing
        // period 1 or period 5) have the lowest total_soft (gap_penalty=0,
        // consecutive excess=1 => 8) versus any placement with a one-period
        // split (gap_penalty=10, consecutive excess=0 => 10).
        let mut catalog = catalog();
        catalog.time_slots = (1..=5).map(|p| slot(p, Weekday::Mon, p)).collect();
        catalog.lessons[0].lessons_per_week = 4;

        let assignments = expand(&catalog).unwrap();
        let schedule = GaSolver::new(GaParams {
            population_size: 40,
            generations: 80,
            seed: 7,
            ..GaParams::default()
        })
        .solve(&catalog, &assignments)
        .unwrap();

        let mut periods: Vec<u32> = schedule.placements.iter().map(|p| p.start_slot_id).collect();
        periods.sort_unstable();
        assert_eq!(periods.len(), 4, "all four occurrences must be placed");
        assert!(
            periods == vec![1, 2, 3, 4] || periods == vec![2, 3, 4, 5],
            "expected a contiguous run of periods, got {periods:?}"
        );
    }
}
