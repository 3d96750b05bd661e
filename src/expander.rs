//! Materializes `Lesson` definitions into the ordered sequence of atomic
//! `RequiredAssignment` units the solvers place.

use log::info;

use crate::domain::{Catalog, RequiredAssignment};
use crate::error::Error;

/// Expand every lesson into teacher × group × subject × occurrence units,
/// in a stable order (lessons, then teachers, then groups, then subjects,
/// then occurrence index) so solver behavior is reproducible across runs
/// given identical input.
pub fn expand(catalog: &Catalog) -> Result<Vec<RequiredAssignment>, Error> {
    if catalog.lessons.is_empty() {
        return Err(Error::InsufficientData(
            "no lessons defined; nothing to schedule".to_string(),
        ));
    }

    let subject_map = catalog.subject_map();
    let mut assignments = Vec::new();
    let mut next_id: u32 = 1;

    for lesson in &catalog.lessons {
        for &teacher_id in &lesson.teacher_ids {
            for &group_id in &lesson.group_ids {
                for &subject_id in &lesson.subject_ids {
                    let duration = subject_map
                        .get(&subject_id)
                        .map(|s| s.duration_slots)
                        .unwrap_or(1);
                    for occurrence_idx in 0..lesson.lessons_per_week {
                        assignments.push(RequiredAssignment {
                            assignment_id: next_id,
                            group_id,
                            subject_id,
                            teacher_id,
                            duration,
                            occurrence_idx,
                        });
                        next_id += 1;
                    }
                }
            }
        }
    }

    info!(
        "expanded {} lessons into {} required assignments",
        catalog.lessons.len(),
        assignments.len()
    );
    Ok(assignments)
}
