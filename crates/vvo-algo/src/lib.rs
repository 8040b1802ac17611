//! # vvo-algo: Multi-Period Volt/VAR Optimization Core
//!
//! This crate turns a power-network case into a parametrized mixed-integer
//! nonlinear program (MINLP) spanning 24 hourly periods, and drives the
//! build-solve-export pipeline around it.
//!
//! ## Pipeline
//!
//! ```text
//! Network case ──> extract ──> loadflow seeds ──> adjust ──> model ──> solve ──> export
//!                     │            (per period)      │          │
//!                     └── ward (multi-area) ─────────┴──────────┘
//! ```
//!
//! - [`extract`]: per-line admittance, thermal ratings, topology maps
//! - [`preset`]: per-system configuration (shunt buses, pilot nodes,
//!   areas, objective weights, load profile)
//! - [`loadflow`]: operating-point adapter seam; the external AC load-flow
//!   solver lives behind [`loadflow::OperatingPointSource`]
//! - [`ward`]: equivalent-network reducer seam for multi-area studies
//! - [`adjust`]: per-constraint correction terms that make the analytic AC
//!   equations hold exactly at the seeded operating point
//! - [`model`]: the optimization model builder (variables, nonlinear
//!   constraints, multi-period objective)
//! - [`solve`]: MINLP backend interface (options, status taxonomy)
//! - [`export`]: CSV serialization of solved variables and seed parameters
//! - [`study`]: the sequential batch driver tying it all together
//!
//! ## The adjustment mechanism
//!
//! The analytic line-flow and balance equations built from extracted
//! parameters do not exactly reproduce the load-flow solver's operating
//! point (simplified two-port line model, unit tap ratios, rounding). Every
//! constraint that must hold at the seed receives a correction term,
//! computed once per (constraint, period) and injected as a fixed
//! parameter, so the initialization point satisfies the model by
//! construction:
//!
//! ```text
//! analytic(seed) == reported(seed) + adjustment        (flow equations)
//! |injection(seed)| == |withdrawal(seed) + adjustment| (balances)
//! ```

pub mod adjust;
pub mod export;
pub mod extract;
pub mod flow;
pub mod loadflow;
pub mod model;
pub mod preset;
pub mod solve;
pub mod study;
pub mod ward;

pub use adjust::{compute_adjustments, AdjustConfig, AdjustError, AdjustmentSet};
pub use export::{write_init_csvs, write_solution_csvs, ExportError};
pub use extract::{extract, ExtractError, GridModel, LineParams};
pub use loadflow::{
    AdapterError, LineFlow, LoadProfile, OperatingPoint, OperatingPointSource,
    ScriptedOperatingPoints,
};
pub use model::{
    ConstraintKey, ConstraintKind, ModelBuilder, ModelConfig, ModelError, ModelLayout,
    ObjectiveBreakdown, ShuntRepr, VarDef, VarFamily, VarKey, VvoProblem,
};
pub use preset::{ObjectiveWeights, SystemPreset};
pub use solve::{
    Algorithm, MinlpBackend, MinlpSolution, SeedPointBackend, SolveStatus, SolverError,
    SolverOptions,
};
pub use study::{run_area_study, run_study, AreaSources, StudyError, StudyOutcome};
pub use ward::{
    validate_partition, AreaSpec, PartitionError, ScriptedWardReducer, WardEquivalent,
    WardInjection, WardReducer,
};
