//! MINLP solver interface.
//!
//! The mixed-integer nonlinear solver is an external collaborator. This
//! module defines the seam: the option set handed to the solver, the
//! widened status taxonomy it reports back (a failed solve distinguishes
//! infeasibility from iteration exhaustion from a crash, instead of one
//! boolean), and the [`MinlpBackend`] trait a concrete solver implements
//! against [`VvoProblem`]'s evaluation callbacks.
//!
//! [`SeedPointBackend`] is the shipped stand-in: it evaluates the
//! initialization point and accepts it when every constraint holds within
//! tolerance. Because the adjustment mechanism constructs the model to be
//! feasible at the seed, this backend completes the pipeline end-to-end
//! without a solver binary; a real backend (interior-point NLP with outer
//! approximation for the integers) plugs in behind the same trait.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::model::VvoProblem;

/// MINLP algorithm selector, passed through to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Outer approximation (NLP/MIP alternation).
    #[default]
    OuterApproximation,
    /// Nonlinear branch and bound.
    BranchAndBound,
    /// Hybrid outer-approximation / branch-and-bound.
    Hybrid,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::OuterApproximation => write!(f, "outer-approximation"),
            Algorithm::BranchAndBound => write!(f, "branch-and-bound"),
            Algorithm::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Options handed to the backend.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    pub max_iter: usize,
    pub integer_tolerance: f64,
    pub allowable_fraction_gap: f64,
    pub allowable_gap: f64,
    pub algorithm: Algorithm,
    /// Backend log file, if the backend writes one.
    pub log_file: Option<PathBuf>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            integer_tolerance: 1e-5,
            allowable_fraction_gap: 1e-5,
            allowable_gap: 1e-5,
            algorithm: Algorithm::default(),
            log_file: None,
        }
    }
}

/// Solve outcome taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Optimal (or acceptably converged) solution found.
    Optimal,
    /// The model is infeasible.
    Infeasible,
    /// Iteration limit reached before convergence.
    IterationLimit,
    /// Numerical difficulties stopped progress.
    NumericalError,
    /// The backend crashed or returned garbage.
    Crashed,
    /// Status could not be determined.
    Unknown,
}

impl SolveStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "optimal"),
            SolveStatus::Infeasible => write!(f, "infeasible"),
            SolveStatus::IterationLimit => write!(f, "iteration_limit"),
            SolveStatus::NumericalError => write!(f, "numerical_error"),
            SolveStatus::Crashed => write!(f, "crashed"),
            SolveStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Backend invocation failures (distinct from a clean non-optimal status).
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver invocation failed: {0}")]
    Invocation(String),

    #[error("solver protocol error: {0}")]
    Protocol(String),

    #[error("solver I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A finished solve.
#[derive(Debug, Clone)]
pub struct MinlpSolution {
    pub status: SolveStatus,
    pub objective: f64,
    /// Full decision vector, aligned with the problem's variable registry.
    pub values: Vec<f64>,
    pub iterations: usize,
}

/// The external MINLP solver seam.
pub trait MinlpBackend {
    fn name(&self) -> &str;

    fn solve(
        &self,
        problem: &VvoProblem,
        options: &SolverOptions,
    ) -> Result<MinlpSolution, SolverError>;
}

/// Accepts the initialization point when it is feasible.
///
/// Evaluates the seed vector against every constraint; returns `Optimal`
/// with that vector if the largest violation is within `feasibility_tol`,
/// `Infeasible` otherwise. Integers are already integral at the seed
/// (shunt steps start at 0, taps at their lower bound), so no rounding is
/// involved.
#[derive(Debug, Clone)]
pub struct SeedPointBackend {
    pub feasibility_tol: f64,
}

impl Default for SeedPointBackend {
    fn default() -> Self {
        Self {
            feasibility_tol: 1e-6,
        }
    }
}

impl MinlpBackend for SeedPointBackend {
    fn name(&self) -> &str {
        "seed-point"
    }

    fn solve(
        &self,
        problem: &VvoProblem,
        options: &SolverOptions,
    ) -> Result<MinlpSolution, SolverError> {
        let x0 = problem.initial_point();
        let (eq_viol, ineq_viol) = problem.max_violation(&x0);
        let feasible = eq_viol <= self.feasibility_tol && ineq_viol <= self.feasibility_tol;
        info!(
            backend = self.name(),
            algorithm = %options.algorithm,
            eq_viol,
            ineq_viol,
            feasible,
            "seed point evaluated"
        );
        if let Some(log) = &options.log_file {
            let line = format!(
                "seed-point backend: eq_viol={eq_viol:.3e} ineq_viol={ineq_viol:.3e} feasible={feasible}\n"
            );
            std::fs::write(log, line)?;
        }
        let status = if feasible {
            SolveStatus::Optimal
        } else {
            SolveStatus::Infeasible
        };
        let objective = problem.objective(&x0);
        Ok(MinlpSolution {
            status,
            objective,
            values: x0,
            iterations: 0,
        })
    }
}
