//! The optimization model builder.
//!
//! One parametrized builder covers the model variants that used to be
//! near-duplicate classes: single-system vs multi-area, integer vs
//! boolean vs continuous shunt representation, taps on or off, elastic
//! demand on or off. [`ModelConfig`] enumerates the switches;
//! [`ModelBuilder`] walks the one-way build state machine
//!
//! ```text
//! Empty -> Sets -> Variables -> Constraints -> Objective -> (finish)
//! ```
//!
//! and produces a [`VvoProblem`]: the flat-vector NLP with evaluation
//! callbacks, bounds, integrality mask, and structured registries that
//! the solver interface and exporter consume. Re-entering an earlier
//! stage is not supported; the pipeline builds once and solves once.

mod constraints;
mod layout;
mod objective;

pub use constraints::{ConstraintKey, ConstraintKind};
pub use layout::{ModelLayout, VarDef, VarFamily, VarKey};
pub use objective::ObjectiveBreakdown;

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;
use vvo_core::{BusId, Period};

use crate::adjust::AdjustmentSet;
use crate::extract::GridModel;
use crate::loadflow::{AdapterError, OperatingPoint};
use crate::preset::ObjectiveWeights;
use crate::ward::WardEquivalent;

/// How the switched shunt devices enter the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShuntRepr {
    /// Integer step count in `[-max, max]`.
    IntegerSymmetric { max: u32 },
    /// Integer step count in `[0, max]`.
    IntegerUpward { max: u32 },
    /// On/off device: `{0, 1}`.
    Boolean,
    /// Continuous step in `[-max, max]`.
    Continuous { max: f64 },
}

impl ShuntRepr {
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            ShuntRepr::IntegerSymmetric { max } => (-(*max as f64), *max as f64),
            ShuntRepr::IntegerUpward { max } => (0.0, *max as f64),
            ShuntRepr::Boolean => (0.0, 1.0),
            ShuntRepr::Continuous { max } => (-max, *max),
        }
    }

    pub fn integer(&self) -> bool {
        !matches!(self, ShuntRepr::Continuous { .. })
    }

    /// Divisor turning the step count into a fractional susceptance:
    /// the reactive balance carries `V² · step / divisor`.
    pub fn step_divisor(&self) -> f64 {
        match self {
            ShuntRepr::IntegerSymmetric { max } | ShuntRepr::IntegerUpward { max } => *max as f64,
            ShuntRepr::Boolean => 1.0,
            ShuntRepr::Continuous { max } => *max,
        }
    }
}

/// Switches selecting a model variant.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Number of hourly periods.
    pub horizon: usize,
    /// Feasibility tolerance for balance and relaxed-flow constraints.
    pub epsilon: f64,
    /// Model tap ratios on transformer-equipped buses.
    pub transformer_taps: bool,
    /// Include elastic demand variables.
    pub elastic_demand: bool,
    /// Include ward border injections in the balances.
    pub multi_area: bool,
    pub shunt: ShuntRepr,
    /// Relax reactive flow equalities to |residual| <= epsilon.
    pub reactive_abs_tolerance: bool,
    /// Pin each directed flow to ±10% of its seed value.
    pub bracket_line_flows: bool,
    /// Headroom factor in the apparent-power adjustment.
    pub apparent_headroom: f64,
    /// Tap ratio bounds; the lower bound is also the initial value.
    pub tap_bounds: (f64, f64),
    pub tap_integer: bool,
    /// Elastic demand bounds (`None` = unbounded).
    pub elastic_bounds: Option<(f64, f64)>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            horizon: 24,
            epsilon: 1e-8,
            transformer_taps: true,
            elastic_demand: true,
            multi_area: false,
            shunt: ShuntRepr::IntegerSymmetric { max: 5 },
            reactive_abs_tolerance: false,
            bracket_line_flows: false,
            apparent_headroom: 1.2,
            tap_bounds: (1.0, 5.0),
            tap_integer: true,
            elastic_bounds: None,
        }
    }
}

/// Model construction failures.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("build stage error: expected {expected}, model is at {found}")]
    Stage { expected: &'static str, found: &'static str },

    #[error("model configuration error: {0}")]
    Config(String),

    #[error("no seed operating point for period {period}")]
    MissingSeed { period: Period },

    #[error("seed data error: {0}")]
    Seed(#[from] AdapterError),

    #[error("missing adjustment term for {0}")]
    MissingAdjustment(String),
}

/// Build state machine stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Empty,
    Sets,
    Variables,
    Constraints,
    Objective,
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Empty => "empty",
            Stage::Sets => "sets",
            Stage::Variables => "variables",
            Stage::Constraints => "constraints",
            Stage::Objective => "objective",
        }
    }
}

/// Fixed parameters consumed read-only by constraint evaluation.
#[derive(Debug, Clone, Default)]
pub struct ModelParams {
    /// Forecast demand per (bus, period), per-unit.
    pub pd: HashMap<(BusId, Period), f64>,
    pub qd: HashMap<(BusId, Period), f64>,
    /// Pilot voltage reference: the seed voltage magnitude.
    pub v_ref: HashMap<(BusId, Period), f64>,
    /// Ward border injections (multi-area only).
    pub ward_p: HashMap<(BusId, Period), f64>,
    pub ward_q: HashMap<(BusId, Period), f64>,
    pub adjustments: AdjustmentSet,
}

/// The model builder; see the module docs for the stage protocol.
pub struct ModelBuilder {
    grid: GridModel,
    cfg: ModelConfig,
    stage: Stage,
    shunt_buses: Vec<BusId>,
    pilot_buses: Vec<BusId>,
    layout: Option<ModelLayout>,
    equalities: Vec<ConstraintKey>,
    inequalities: Vec<ConstraintKey>,
    params: Option<ModelParams>,
    weights: Option<ObjectiveWeights>,
}

impl ModelBuilder {
    pub fn new(grid: GridModel, cfg: ModelConfig) -> Self {
        Self {
            grid,
            cfg,
            stage: Stage::Empty,
            shunt_buses: Vec::new(),
            pilot_buses: Vec::new(),
            layout: None,
            equalities: Vec::new(),
            inequalities: Vec::new(),
            params: None,
            weights: None,
        }
    }

    fn expect_stage(&self, expected: Stage, label: &'static str) -> Result<(), ModelError> {
        if self.stage != expected {
            return Err(ModelError::Stage {
                expected: label,
                found: self.stage.name(),
            });
        }
        Ok(())
    }

    /// Declare the index sets: shunt and pilot buses are filtered to those
    /// actually present in the grid (area models see only their own buses).
    pub fn declare_sets(
        &mut self,
        shunt_buses: &[BusId],
        pilot_buses: &[BusId],
    ) -> Result<(), ModelError> {
        self.expect_stage(Stage::Empty, "empty")?;
        self.shunt_buses = shunt_buses
            .iter()
            .copied()
            .filter(|b| self.grid.bus_index.contains_key(b))
            .collect();
        self.pilot_buses = pilot_buses
            .iter()
            .copied()
            .filter(|b| self.grid.bus_index.contains_key(b))
            .collect();
        debug!(
            shunt = self.shunt_buses.len(),
            pilot = self.pilot_buses.len(),
            "sets declared"
        );
        self.stage = Stage::Sets;
        Ok(())
    }

    /// Declare all variable families, seeded and bounded from the
    /// per-period operating points.
    pub fn declare_variables(
        &mut self,
        seeds: &BTreeMap<Period, OperatingPoint>,
    ) -> Result<(), ModelError> {
        self.expect_stage(Stage::Sets, "sets")?;
        let layout = ModelLayout::build(&self.grid, &self.cfg, &self.shunt_buses, seeds)?;
        debug!(n_var = layout.n_var, "variables declared");
        self.layout = Some(layout);
        self.stage = Stage::Variables;
        Ok(())
    }

    /// Declare the constraint system and bind its fixed parameters.
    ///
    /// Every constraint's adjustment term must be present in
    /// `adjustments`; a missing key is an error here, never a silent zero
    /// during evaluation.
    pub fn declare_constraints(
        &mut self,
        adjustments: AdjustmentSet,
        seeds: &BTreeMap<Period, OperatingPoint>,
        wards: Option<&BTreeMap<Period, WardEquivalent>>,
    ) -> Result<(), ModelError> {
        self.expect_stage(Stage::Variables, "variables")?;
        let layout = self.layout.as_ref().ok_or(ModelError::Stage {
            expected: "variables",
            found: "empty",
        })?;

        let mut params = ModelParams {
            adjustments,
            ..ModelParams::default()
        };

        for t in layout.horizon.periods() {
            let op = seeds.get(&t).ok_or(ModelError::MissingSeed { period: t })?;
            for (bus, (p, q)) in self.grid.bus_demand(op) {
                params.pd.insert((bus, t), p);
                params.qd.insert((bus, t), q);
            }
            for bus in &self.grid.buses {
                params.v_ref.insert((*bus, t), op.vm(*bus, t)?);
            }
            if let Some(wards) = wards {
                let eq = wards.get(&t).ok_or(ModelError::MissingSeed { period: t })?;
                for (bus, inj) in &eq.injections {
                    params.ward_p.insert((*bus, t), inj.p);
                    params.ward_q.insert((*bus, t), inj.q);
                }
            }
        }

        let mut equalities = Vec::new();
        let mut inequalities = Vec::new();

        for (pos, _) in self.grid.lines.iter().enumerate() {
            let fwd = self.grid.forward[pos];
            let rev = fwd.reversed();
            for t in layout.horizon.periods() {
                require_adj(params.adjustments.s_limit.contains_key(&(fwd, t)), || {
                    format!("apparent limit {fwd} at {t}")
                })?;
                inequalities.push(ConstraintKey::Apparent { branch: fwd, t });

                for br in [fwd, rev] {
                    require_adj(params.adjustments.line_p.contains_key(&(br, t)), || {
                        format!("active flow {br} at {t}")
                    })?;
                    require_adj(params.adjustments.line_q.contains_key(&(br, t)), || {
                        format!("reactive flow {br} at {t}")
                    })?;
                    equalities.push(ConstraintKey::ActiveFlow { branch: br, t });
                    if self.cfg.reactive_abs_tolerance {
                        inequalities.push(ConstraintKey::ReactiveFlow { branch: br, t });
                    } else {
                        equalities.push(ConstraintKey::ReactiveFlow { branch: br, t });
                    }
                }
            }
        }

        for bus in &self.grid.buses {
            for t in layout.horizon.periods() {
                require_adj(params.adjustments.p_balance.contains_key(&(*bus, t)), || {
                    format!("active balance at bus {bus}, {t}")
                })?;
                require_adj(params.adjustments.q_balance.contains_key(&(*bus, t)), || {
                    format!("reactive balance at bus {bus}, {t}")
                })?;
                inequalities.push(ConstraintKey::ActiveBalance { bus: *bus, t });
                inequalities.push(ConstraintKey::ReactiveBalance { bus: *bus, t });
            }
        }

        debug!(
            n_eq = equalities.len(),
            n_ineq = inequalities.len(),
            "constraints declared"
        );
        self.equalities = equalities;
        self.inequalities = inequalities;
        self.params = Some(params);
        self.stage = Stage::Constraints;
        Ok(())
    }

    /// Declare the multi-period objective.
    pub fn declare_objective(&mut self, weights: ObjectiveWeights) -> Result<(), ModelError> {
        self.expect_stage(Stage::Constraints, "constraints")?;
        self.weights = Some(weights);
        self.stage = Stage::Objective;
        Ok(())
    }

    /// Seal the model.
    pub fn finish(self) -> Result<VvoProblem, ModelError> {
        self.expect_stage(Stage::Objective, "objective")?;
        let layout = self.layout.ok_or(ModelError::Stage {
            expected: "objective",
            found: "empty",
        })?;
        let params = self.params.ok_or(ModelError::Stage {
            expected: "objective",
            found: "empty",
        })?;
        let weights = self.weights.ok_or(ModelError::Stage {
            expected: "objective",
            found: "empty",
        })?;
        Ok(VvoProblem {
            grid: self.grid,
            cfg: self.cfg,
            layout,
            equalities: self.equalities,
            inequalities: self.inequalities,
            params,
            weights,
            pilot_buses: self.pilot_buses,
        })
    }
}

fn require_adj(present: bool, what: impl FnOnce() -> String) -> Result<(), ModelError> {
    if present {
        Ok(())
    } else {
        Err(ModelError::MissingAdjustment(what()))
    }
}

/// The sealed optimization problem: variable registry, constraint
/// registries, fixed parameters, and evaluation callbacks.
pub struct VvoProblem {
    pub grid: GridModel,
    pub cfg: ModelConfig,
    pub layout: ModelLayout,
    pub equalities: Vec<ConstraintKey>,
    pub inequalities: Vec<ConstraintKey>,
    pub params: ModelParams,
    pub weights: ObjectiveWeights,
    pub pilot_buses: Vec<BusId>,
}

impl VvoProblem {
    pub fn n_var(&self) -> usize {
        self.layout.n_var
    }

    pub fn initial_point(&self) -> Vec<f64> {
        self.layout.initial_point()
    }

    pub fn variable_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        self.layout.bounds()
    }

    pub fn integrality(&self) -> Vec<bool> {
        self.layout.integrality()
    }

    /// Largest violation over equalities (|residual|) and inequalities
    /// (positive part), for feasibility reporting.
    pub fn max_violation(&self, x: &[f64]) -> (f64, f64) {
        let eq = self
            .equality_constraints(x)
            .iter()
            .fold(0.0_f64, |m, r| m.max(r.abs()));
        let ineq = self
            .inequality_constraints(x)
            .iter()
            .fold(0.0_f64, |m, h| m.max(*h));
        (eq, ineq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shunt_repr_bounds_and_divisor() {
        let sym = ShuntRepr::IntegerSymmetric { max: 5 };
        assert_eq!(sym.bounds(), (-5.0, 5.0));
        assert!(sym.integer());
        assert!((sym.step_divisor() - 5.0).abs() < 1e-12);

        let up = ShuntRepr::IntegerUpward { max: 3 };
        assert_eq!(up.bounds(), (0.0, 3.0));

        let boolean = ShuntRepr::Boolean;
        assert_eq!(boolean.bounds(), (0.0, 1.0));
        assert!((boolean.step_divisor() - 1.0).abs() < 1e-12);

        let cont = ShuntRepr::Continuous { max: 2.5 };
        assert!(!cont.integer());
        assert_eq!(cont.bounds(), (-2.5, 2.5));
    }

    #[test]
    fn test_default_config_is_day_ahead() {
        let cfg = ModelConfig::default();
        assert_eq!(cfg.horizon, 24);
        assert!(cfg.transformer_taps);
        assert!(!cfg.multi_area);
        assert!((cfg.tap_bounds.0 - 1.0).abs() < 1e-12);
        assert!((cfg.tap_bounds.1 - 5.0).abs() < 1e-12);
    }
}
