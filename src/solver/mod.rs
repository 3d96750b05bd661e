//! Two interchangeable back-ends behind one `solve` operation (§9: "two
//! solvers behind one interface"). Selection is the tagged `Method`
//! parameter on `domain::Version.algorithm`, not a trait-object hierarchy.

pub mod csp;
pub mod ga;

use crate::domain::{Catalog, Method, RequiredAssignment, Schedule};

#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("infeasible: {0}")]
    Infeasible(String),
    #[error("solver fault: {0}")]
    Fault(String),
}

#[derive(Debug, Clone)]
pub struct SolveParams {
    pub csp: csp::CspParams,
    pub ga: ga::GaParams,
}

impl Default for SolveParams {
    fn default() -> Self {
        Self {
            csp: csp::CspParams::default(),
            ga: ga::GaParams::default(),
        }
    }
}

pub fn solve(
    method: Method,
    catalog: &Catalog,
    assignments: &[RequiredAssignment],
    params: &SolveParams,
) -> Result<Schedule, SolverError> {
    match method {
        Method::Csp => csp::CspSolver::new(params.csp.clone()).solve(catalog, assignments),
        Method::Genetic => ga::GaSolver::new(params.ga.clone()).solve(catalog, assignments),
    }
}
