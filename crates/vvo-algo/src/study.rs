//! The batch study driver.
//!
//! Strictly sequential pipeline: extract, seed every period from the
//! operating-point adapter, compute adjustments, build the model, solve,
//! export. The adapter and solver calls block; there is no retry. A
//! non-optimal solve skips export and is reported as a distinct status in
//! the outcome, not a bare boolean.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use vvo_core::{Horizon, Network, Period};

use crate::adjust::{compute_adjustments, AdjustConfig, AdjustError};
use crate::export::{write_init_csvs, write_solution_csvs, ExportError};
use crate::extract::{extract, ExtractError};
use crate::loadflow::{AdapterError, LoadProfile, OperatingPoint, OperatingPointSource};
use crate::model::{ModelBuilder, ModelConfig, ModelError, VvoProblem};
use crate::preset::SystemPreset;
use crate::solve::{MinlpBackend, SolveStatus, SolverError, SolverOptions};
use crate::ward::{validate_partition, AreaSpec, PartitionError, WardEquivalent, WardReducer};

/// Study pipeline failures. A clean non-optimal solve is *not* an error;
/// it is reported through [`StudyOutcome::status`].
#[derive(Debug, Error)]
pub enum StudyError {
    #[error("invalid case: {0}")]
    InvalidCase(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Adjust(#[from] AdjustError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error("multi-area study requested but preset {0} defines no areas")]
    NoAreas(String),

    #[error("no operating-point source for area {0}")]
    NoAreaSource(String),
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct StudyOutcome {
    pub status: SolveStatus,
    /// Objective value when the solve succeeded.
    pub objective: Option<f64>,
    pub iterations: usize,
    pub n_periods: usize,
    /// CSV files written (empty when the solve failed or export was off).
    pub exported: Vec<PathBuf>,
}

/// Per-area operating-point sources for multi-area runs.
pub trait AreaSources {
    fn for_area(&self, area: &str) -> Option<&dyn OperatingPointSource>;
}

impl<S: OperatingPointSource> AreaSources for std::collections::HashMap<String, S> {
    fn for_area(&self, area: &str) -> Option<&dyn OperatingPointSource> {
        self.get(area).map(|s| s as &dyn OperatingPointSource)
    }
}

fn collect_seeds(
    horizon: Horizon,
    profile: &LoadProfile,
    source: &dyn OperatingPointSource,
) -> Result<BTreeMap<Period, OperatingPoint>, StudyError> {
    let mut seeds = BTreeMap::new();
    for t in horizon.periods() {
        let scale = profile.scale(t)?;
        let op = source.operating_point(t, scale)?;
        seeds.insert(t, op);
    }
    Ok(seeds)
}

fn validate_case(net: &Network) -> Result<(), StudyError> {
    let mut diag = vvo_core::Diagnostics::new();
    net.validate_into(&mut diag);
    if diag.has_errors() {
        return Err(StudyError::InvalidCase(diag.to_string()));
    }
    Ok(())
}

fn build_problem(
    net: &Network,
    preset: &SystemPreset,
    cfg: ModelConfig,
    seeds: &BTreeMap<Period, OperatingPoint>,
    wards: Option<&BTreeMap<Period, WardEquivalent>>,
    shunt_override: Option<&[vvo_core::BusId]>,
) -> Result<VvoProblem, StudyError> {
    let grid = extract(net)?;
    info!(
        buses = grid.buses.len(),
        lines = grid.lines.len(),
        gens = grid.gens.len(),
        "network extracted"
    );

    let adjustments = compute_adjustments(&grid, seeds, wards, &AdjustConfig::for_model(&cfg))?;
    info!(
        flows = adjustments.line_p.len(),
        balances = adjustments.p_balance.len(),
        "adjustments computed"
    );

    let mut builder = ModelBuilder::new(grid, cfg);
    let shunt_buses = shunt_override.unwrap_or(&preset.shunt_buses);
    builder.declare_sets(shunt_buses, &preset.pilot_buses)?;
    builder.declare_variables(seeds)?;
    builder.declare_constraints(adjustments, seeds, wards)?;
    builder.declare_objective(preset.weights)?;
    Ok(builder.finish()?)
}

fn solve_and_export(
    problem: &VvoProblem,
    seeds: &BTreeMap<Period, OperatingPoint>,
    backend: &dyn MinlpBackend,
    options: &SolverOptions,
    out_dir: Option<&Path>,
    area: Option<&str>,
) -> Result<StudyOutcome, StudyError> {
    info!(
        backend = backend.name(),
        n_var = problem.n_var(),
        n_eq = problem.equalities.len(),
        n_ineq = problem.inequalities.len(),
        "solving"
    );
    let solution = backend.solve(problem, options)?;
    info!(status = %solution.status, objective = solution.objective, "solve finished");

    let mut exported = Vec::new();
    if solution.status.is_success() {
        if let Some(dir) = out_dir {
            exported.extend(write_init_csvs(problem, seeds, dir, area)?);
            exported.extend(write_solution_csvs(problem, &solution, dir, area)?);
        }
    } else {
        warn!(status = %solution.status, "solve did not succeed; skipping export");
    }

    Ok(StudyOutcome {
        status: solution.status,
        objective: solution.status.is_success().then_some(solution.objective),
        iterations: solution.iterations,
        n_periods: problem.layout.horizon.len(),
        exported,
    })
}

/// Run a single-system study over the full network.
pub fn run_study(
    net: &Network,
    preset: &SystemPreset,
    cfg: ModelConfig,
    source: &dyn OperatingPointSource,
    backend: &dyn MinlpBackend,
    options: &SolverOptions,
    out_dir: Option<&Path>,
) -> Result<StudyOutcome, StudyError> {
    info!(system = %preset.name, periods = cfg.horizon, "study started");
    validate_case(net)?;

    let horizon = Horizon::new(cfg.horizon);
    let seeds = collect_seeds(horizon, &preset.profile, source)?;
    let problem = build_problem(net, preset, cfg, &seeds, None, None)?;

    let out = out_dir.map(|d| d.join(&preset.name));
    solve_and_export(&problem, &seeds, backend, options, out.as_deref(), None)
}

/// Run the multi-area variant: one model per area over its reduced
/// network, with ward border injections in the balances.
///
/// Areas are processed independently and sequentially; a failed solve in
/// one area is recorded in its outcome and does not stop the others.
pub fn run_area_study(
    preset: &SystemPreset,
    cfg: ModelConfig,
    sources: &dyn AreaSources,
    reducer: &dyn WardReducer,
    backend: &dyn MinlpBackend,
    options: &SolverOptions,
    out_dir: Option<&Path>,
) -> Result<Vec<(String, StudyOutcome)>, StudyError> {
    if preset.areas.is_empty() {
        return Err(StudyError::NoAreas(preset.name.clone()));
    }
    validate_partition(&preset.areas)?;

    let profile = LoadProfile {
        hourly: preset.profile.hourly.clone(),
        multiplier: preset.area_multiplier,
    };
    let horizon = Horizon::new(cfg.horizon);
    let mut outcomes = Vec::new();

    for area in &preset.areas {
        info!(system = %preset.name, area = %area.name, "area study started");
        let source = sources
            .for_area(&area.name)
            .ok_or_else(|| StudyError::NoAreaSource(area.name.clone()))?;

        let net = reducer.reduced_network(area)?;
        validate_case(&net)?;

        let seeds = collect_seeds(horizon, &profile, source)?;
        let wards = collect_wards(horizon, &profile, reducer, area)?;

        // Shunt devices in an area model live on its border nodes only.
        let shunt_buses: Vec<_> = preset
            .shunt_buses
            .iter()
            .copied()
            .filter(|b| area.border.contains(b))
            .collect();

        let mut area_cfg = cfg.clone();
        area_cfg.multi_area = true;
        let problem = build_problem(
            &net,
            preset,
            area_cfg,
            &seeds,
            Some(&wards),
            Some(&shunt_buses),
        )?;

        let out = out_dir.map(|d| d.join(&preset.name));
        let outcome = solve_and_export(
            &problem,
            &seeds,
            backend,
            options,
            out.as_deref(),
            Some(&area.name),
        )?;
        outcomes.push((area.name.clone(), outcome));
    }

    Ok(outcomes)
}

fn collect_wards(
    horizon: Horizon,
    profile: &LoadProfile,
    reducer: &dyn WardReducer,
    area: &AreaSpec,
) -> Result<BTreeMap<Period, WardEquivalent>, StudyError> {
    let mut wards = BTreeMap::new();
    for t in horizon.periods() {
        let scale = profile.scale(t)?;
        wards.insert(t, reducer.injections(area, t, scale)?);
    }
    Ok(wards)
}
