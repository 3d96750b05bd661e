//! Normalizes a raw solver [`Schedule`] into committed [`Entry`] rows: lab
//! blocks are expanded into one entry per covered slot, the result is
//! written through the store in a single transaction, and the owning
//! Version is transitioned to its terminal status.

use std::sync::Arc;

use log::{error, info};

use crate::constraints::{self, PenaltyWeights};
use crate::domain::{Catalog, Method, RequiredAssignment, Schedule, Version, VersionStatus};
use crate::error::{Error, Result};
use crate::expander;
use crate::feasible::covered_slots;
use crate::solver::{self, SolveParams, SolverError};
use crate::store::Store;

/// Synchronous path: solve to completion and commit before returning. Used
/// by callers that are fine blocking on the solve (e.g. tests, or a small
/// catalog where the wall-clock budget is short).
pub fn generate_and_save(
    store: &Store,
    method: Method,
    name: String,
    params: &SolveParams,
    weights: &PenaltyWeights,
) -> Result<Version> {
    let catalog = store.snapshot_catalog();
    check_catalog_complete(&catalog)?;
    let assignments = expander::expand(&catalog)?;
    let version_id = store.create_processing_version(name, method);

    match solver::solve(method, &catalog, &assignments, params) {
        Ok(schedule) => commit_schedule(store, version_id, &catalog, &assignments, schedule, weights),
        Err(SolverError::Infeasible(reason)) => {
            info!("version {version_id} solve infeasible: {reason}");
            store.commit_version(version_id, Vec::new(), VersionStatus::Failed, None)?;
            Err(Error::Infeasible(reason))
        }
        Err(SolverError::Fault(reason)) => {
            error!("version {version_id} solve faulted: {reason}");
            store.commit_version(version_id, Vec::new(), VersionStatus::Error, None)?;
            Err(Error::Internal(reason))
        }
    }
}

/// Asynchronous path: the caller has already created a `processing` Version
/// (typically via the HTTP handler, so it can return immediately) and hands
/// off the solve to a background task. The CPU-bound solve runs via
/// `spawn_blocking` so it never stalls the async runtime's other requests.
pub async fn generate_in_background(store: Arc<Store>, version_id: crate::domain::VersionId, method: Method, params: SolveParams, weights: PenaltyWeights) {
    let catalog = store.snapshot_catalog();
    let result = tokio::task::spawn_blocking(move || {
        check_catalog_complete(&catalog)?;
        let assignments = expander::expand(&catalog)?;
        match solver::solve(method, &catalog, &assignments, &params) {
            Ok(schedule) => Ok((catalog, assignments, schedule)),
            Err(e) => Err(Error::from(e)),
        }
    })
    .await;

    match result {
        Ok(Ok((catalog, assignments, schedule))) => {
            if let Err(e) = commit_schedule(&store, version_id, &catalog, &assignments, schedule, &weights) {
                error!("version {version_id} background commit failed: {e}");
            }
        }
        Ok(Err(Error::Infeasible(reason))) => {
            info!("version {version_id} background solve infeasible: {reason}");
            let _ = store.commit_version(version_id, Vec::new(), VersionStatus::Failed, None);
        }
        Ok(Err(other)) => {
            error!("version {version_id} background solve failed: {other}");
            let _ = store.commit_version(version_id, Vec::new(), VersionStatus::Error, None);
        }
        Err(join_error) => {
            error!("version {version_id} background task panicked: {join_error}");
            let _ = store.commit_version(version_id, Vec::new(), VersionStatus::Error, None);
        }
    }
}

/// §6/§7: a solve needs every entity category the encoding reasons about,
/// not just a non-empty `lessons` list (`expander::expand`'s own guard).
/// A catalog missing teachers, rooms, subjects or groups can never yield an
/// admissible placement, so report it as `InsufficientData` (422) up front
/// rather than letting it fall through to the solver and come back
/// `Infeasible` (409).
fn check_catalog_complete(catalog: &Catalog) -> Result<()> {
    if catalog.teachers.is_empty() {
        return Err(Error::InsufficientData("no teachers defined; nothing to schedule".to_string()));
    }
    if catalog.rooms.is_empty() {
        return Err(Error::InsufficientData("no rooms defined; nothing to schedule".to_string()));
    }
    if catalog.subjects.is_empty() {
        return Err(Error::InsufficientData("no subjects defined; nothing to schedule".to_string()));
    }
    if catalog.groups.is_empty() {
        return Err(Error::InsufficientData("no groups defined; nothing to schedule".to_string()));
    }
    Ok(())
}

fn commit_schedule(
    store: &Store,
    version_id: crate::domain::VersionId,
    catalog: &Catalog,
    assignments: &[RequiredAssignment],
    schedule: Schedule,
    weights: &PenaltyWeights,
) -> Result<Version> {
    let assignment_map: std::collections::HashMap<_, _> = assignments.iter().map(|a| (a.assignment_id, a)).collect();

    let mut raw_entries = Vec::new();
    for placement in &schedule.placements {
        let Some(assignment) = assignment_map.get(&placement.assignment_id) else {
            return Err(Error::Internal(format!(
                "solver referenced unknown assignment {}",
                placement.assignment_id
            )));
        };
        let Some(slots) = covered_slots(catalog, placement.start_slot_id, assignment.duration) else {
            return Err(Error::Internal(format!(
                "placement for assignment {} does not resolve to a valid slot run",
                placement.assignment_id
            )));
        };
        for slot_id in slots {
            raw_entries.push((assignment.subject_id, placement.room_id, assignment.group_id, assignment.teacher_id, slot_id));
        }
    }

    // Preview entries (id/version_id unset) purely to evaluate the penalty
    // functions before committing; the store assigns real ids on write.
    let preview: Vec<crate::domain::Entry> = raw_entries
        .iter()
        .map(|&(subject_id, room_id, group_id, teacher_id, time_slot_id)| crate::domain::Entry {
            id: 0,
            version_id,
            time_slot_id,
            subject_id,
            room_id,
            group_id,
            teacher_id,
        })
        .collect();
    let soft_penalty = constraints::soft::total_soft(&preview, catalog, weights);
    let conflicts = constraints::hard::all(&preview, catalog, assignments);
    if !conflicts.is_empty() {
        error!("version {version_id} committing with {} unexpected hard-constraint conflicts", conflicts.len());
    }

    let entry_count = raw_entries.len();
    // Displayed fitness is higher-is-better, so the non-negative penalty is negated.
    let version = store.commit_version(version_id, raw_entries, VersionStatus::Active, Some(-soft_penalty))?;

    info!("version {version_id} active with {entry_count} entries, fitness {:.2}", -soft_penalty);
    Ok(version)
}

impl From<SolverError> for Error {
    fn from(e: SolverError) -> Self {
        match e {
            SolverError::Infeasible(msg) => Error::Infeasible(msg),
            SolverError::Fault(msg) => Error::Internal(msg),
        }
    }
}
