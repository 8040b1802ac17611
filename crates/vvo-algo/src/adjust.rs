//! Per-constraint correction terms.
//!
//! The analytic equations built from extracted line parameters do not
//! exactly reproduce the load-flow solver's operating point. Each
//! constraint that must hold at the seed gets a correction computed once
//! per (key, period) and injected as a fixed parameter:
//!
//! - **Apparent limit**: multiplicative, `headroom · |S0²/R²| · sign` —
//!   it scales the feasible region rather than shifting it. The sign flips
//!   to -1 only when `R²` and `S0²` disagree in sign, a degenerate case
//!   (both are squares) that is logged when it triggers.
//! - **Flow equations**: additive, `analytic(seed V, θ, tap_init) - reported`.
//! - **Balances**: additive, injection side minus withdrawal side, both
//!   evaluated at the seed with every variable at its initial value
//!   (shunt steps 0, elastic demand 0, Gs/Bs at their init).
//!
//! Computed with the same [`crate::flow`] equations and the same sum
//! structure the model constraints use, so the round-trip law
//! `analytic(seed) + adjustment == reported(seed)` holds by construction.

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::warn;
use vvo_core::{BusId, DirectedBranch, Period};

use crate::extract::GridModel;
use crate::flow::{branch_flow_forward, branch_flow_reverse};
use crate::loadflow::{AdapterError, OperatingPoint};
use crate::model::ModelConfig;
use crate::ward::WardEquivalent;

/// Initial value of the bus conductance slack `Gs`.
pub const SHUNT_G_INIT: f64 = 1.0;
/// Initial value of the bus susceptance slack `Bs`.
pub const SHUNT_B_INIT: f64 = 1.0;

/// Adjustment computation failures.
#[derive(Debug, Error)]
pub enum AdjustError {
    #[error("seed data error: {0}")]
    Seed(#[from] AdapterError),

    #[error("no seed operating point for period {0}")]
    MissingSeed(Period),

    #[error("branch {0} has zero thermal rating; apparent adjustment undefined")]
    DegenerateRating(DirectedBranch),
}

/// Knobs the calculator shares with the model variant.
#[derive(Debug, Clone, Copy)]
pub struct AdjustConfig {
    /// Headroom factor on the apparent-power adjustment.
    pub headroom: f64,
    /// Tap ratio at the initialization point.
    pub tap_init: f64,
    /// Whether tap-equipped buses carry a ratio in the flow equations.
    pub taps_enabled: bool,
    /// Whether ward border injections enter the balances.
    pub multi_area: bool,
}

impl Default for AdjustConfig {
    fn default() -> Self {
        Self {
            headroom: 1.2,
            tap_init: 1.0,
            taps_enabled: true,
            multi_area: false,
        }
    }
}

impl AdjustConfig {
    /// Derive from the model configuration so both sides agree on the
    /// initialization point.
    pub fn for_model(cfg: &ModelConfig) -> Self {
        Self {
            headroom: cfg.apparent_headroom,
            tap_init: cfg.tap_bounds.0,
            taps_enabled: cfg.transformer_taps,
            multi_area: cfg.multi_area,
        }
    }
}

/// The full adjustment table, keyed by structured identities.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentSet {
    /// Multiplicative apparent-power scaling, forward orientation keys.
    pub s_limit: HashMap<(DirectedBranch, Period), f64>,
    /// Additive active-flow corrections, both orientations.
    pub line_p: HashMap<(DirectedBranch, Period), f64>,
    /// Additive reactive-flow corrections, both orientations.
    pub line_q: HashMap<(DirectedBranch, Period), f64>,
    pub p_balance: HashMap<(BusId, Period), f64>,
    pub q_balance: HashMap<(BusId, Period), f64>,
}

/// Compute every adjustment for the horizon covered by `seeds`.
pub fn compute_adjustments(
    grid: &GridModel,
    seeds: &BTreeMap<Period, OperatingPoint>,
    wards: Option<&BTreeMap<Period, WardEquivalent>>,
    cfg: &AdjustConfig,
) -> Result<AdjustmentSet, AdjustError> {
    let mut set = AdjustmentSet::default();

    for (&t, op) in seeds {
        for (pos, line) in grid.lines.iter().enumerate() {
            let fwd = grid.forward[pos];
            let rev = fwd.reversed();
            let params = grid.admittance[&fwd];
            let fl = op.flow(*line, t)?;

            // Apparent-power scaling.
            let rating = grid.rating[&fwd];
            let r_sq = rating * rating;
            if r_sq == 0.0 {
                return Err(AdjustError::DegenerateRating(fwd));
            }
            let s_sq = fl.p_from * fl.p_from + fl.q_from * fl.q_from;
            let sign = if (r_sq > 0.0 && s_sq < 0.0) || (r_sq < 0.0 && s_sq > 0.0) {
                warn!(branch = %fwd, period = %t, "apparent adjustment sign flip triggered");
                -1.0
            } else {
                1.0
            };
            set.s_limit
                .insert((fwd, t), cfg.headroom * (s_sq / r_sq).abs() * sign);

            // Flow residuals: analytic at the seed minus the reported flow.
            let v_i = op.vm(fwd.from, t)?;
            let v_j = op.vm(fwd.to, t)?;
            let th_i = op.va(fwd.from, t)?;
            let th_j = op.va(fwd.to, t)?;
            let ratio_fwd = seed_ratio(grid, cfg, fwd.from);
            let ratio_rev = seed_ratio(grid, cfg, fwd.to);

            let (p_an, q_an) =
                branch_flow_forward(params.g, params.b, v_i, v_j, th_i, th_j, ratio_fwd);
            set.line_p.insert((fwd, t), p_an - fl.p_from);
            set.line_q.insert((fwd, t), q_an - fl.q_from);

            let (p_an, q_an) =
                branch_flow_reverse(params.g, params.b, v_i, v_j, th_i, th_j, ratio_rev);
            set.line_p.insert((rev, t), p_an - fl.p_to);
            set.line_q.insert((rev, t), q_an - fl.q_to);
        }

        // Balance residuals: injection minus withdrawal at the seed, with
        // every decision variable at its initialization value.
        let demand = grid.bus_demand(op);
        let ward = wards
            .map(|w| w.get(&t).ok_or(AdjustError::MissingSeed(t)))
            .transpose()?;

        for bus in &grid.buses {
            let (pd, qd) = demand.get(bus).copied().unwrap_or((0.0, 0.0));
            let (ward_p, ward_q) = match ward.and_then(|w| w.injections.get(bus)) {
                Some(inj) if cfg.multi_area => (inj.p, inj.q),
                _ => (0.0, 0.0),
            };

            let mut p_inj = -pd - ward_p;
            let mut q_inj = -qd - ward_q;
            for gen in grid.gens_at(*bus) {
                if grid.gen_status.get(&gen).copied().unwrap_or(false) {
                    p_inj += op.gen_p.get(&gen).copied().unwrap_or(0.0);
                    q_inj += op.gen_q.get(&gen).copied().unwrap_or(0.0);
                }
            }
            for slack in grid.slacks_at(*bus) {
                p_inj += op.slack_p.get(&slack).copied().unwrap_or(0.0);
                q_inj += op.slack_q.get(&slack).copied().unwrap_or(0.0);
            }

            let mut p_out = 0.0;
            let mut q_out = 0.0;
            if let Some(branches) = grid.out_forward.get(bus) {
                for br in branches {
                    let fl = op.flow(grid.line_of[br], t)?;
                    p_out += fl.p_from;
                    q_out += fl.q_from;
                }
            }
            if let Some(branches) = grid.out_reverse.get(bus) {
                for br in branches {
                    let fl = op.flow(grid.line_of[&br.reversed()], t)?;
                    p_out += fl.p_to;
                    q_out += fl.q_to;
                }
            }
            let vm = op.vm(*bus, t)?;
            let v_sq = vm * vm;
            p_out += v_sq * SHUNT_G_INIT;
            q_out -= v_sq * SHUNT_B_INIT;
            // Shunt steps start at zero; no compensation term at the seed.

            set.p_balance.insert((*bus, t), p_inj - p_out);
            set.q_balance.insert((*bus, t), q_inj - q_out);
        }
    }

    Ok(set)
}

fn seed_ratio(grid: &GridModel, cfg: &AdjustConfig, bus: BusId) -> f64 {
    if cfg.taps_enabled && grid.tap_buses.contains(&bus) {
        cfg.tap_init
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::loadflow::LineFlow;
    use vvo_core::{Bus, Gen, GenId, Line, LineId, Load, LoadId, Network};

    fn grid_and_seed() -> (GridModel, BTreeMap<Period, OperatingPoint>) {
        let mut net = Network::new(100.0);
        for i in 0..2 {
            net.add_bus(Bus {
                id: BusId::new(i),
                vn_kv: 230.0,
                ..Bus::default()
            });
        }
        net.add_line(Line {
            id: LineId::new(0),
            from_bus: BusId::new(0),
            to_bus: BusId::new(1),
            r_ohm_per_km: 0.02,
            x_ohm_per_km: 0.08,
            length_km: 10.0,
            max_i_ka: 0.6,
            ..Line::default()
        })
        .unwrap();
        net.add_gen(Gen {
            id: GenId::new(0),
            bus: BusId::new(0),
            min_q_mvar: -50.0,
            max_q_mvar: 50.0,
            ..Gen::default()
        });
        net.add_load(Load {
            id: LoadId::new(0),
            bus: BusId::new(1),
            ..Load::default()
        });
        let grid = extract(&net).unwrap();

        let mut op = OperatingPoint::default();
        op.bus_vm.insert(BusId::new(0), 1.02);
        op.bus_vm.insert(BusId::new(1), 0.99);
        op.bus_va_rad.insert(BusId::new(0), 0.0);
        op.bus_va_rad.insert(BusId::new(1), -0.04);
        op.line_flow.insert(
            LineId::new(0),
            LineFlow {
                p_from: 0.55,
                q_from: 0.12,
                p_to: -0.54,
                q_to: -0.10,
            },
        );
        op.gen_p.insert(GenId::new(0), 0.55);
        op.gen_q.insert(GenId::new(0), 0.12);
        op.load_p.insert(LoadId::new(0), 0.54);
        op.load_q.insert(LoadId::new(0), 0.10);

        let mut seeds = BTreeMap::new();
        seeds.insert(Period::new(1), op);
        (grid, seeds)
    }

    #[test]
    fn test_flow_adjustment_closes_residual() {
        let (grid, seeds) = grid_and_seed();
        let cfg = AdjustConfig::default();
        let set = compute_adjustments(&grid, &seeds, None, &cfg).unwrap();

        let t = Period::new(1);
        let fwd = grid.forward[0];
        let params = grid.admittance[&fwd];
        let op = &seeds[&t];
        let (p_an, q_an) = branch_flow_forward(
            params.g,
            params.b,
            op.bus_vm[&fwd.from],
            op.bus_vm[&fwd.to],
            op.bus_va_rad[&fwd.from],
            op.bus_va_rad[&fwd.to],
            1.0,
        );
        let fl = op.line_flow[&LineId::new(0)];
        // analytic(seed) == reported(seed) + adjustment
        assert!((p_an - (fl.p_from + set.line_p[&(fwd, t)])).abs() < 1e-12);
        assert!((q_an - (fl.q_from + set.line_q[&(fwd, t)])).abs() < 1e-12);
    }

    #[test]
    fn test_apparent_adjustment_scales_to_seed() {
        let (grid, seeds) = grid_and_seed();
        let cfg = AdjustConfig {
            headroom: 1.0,
            ..AdjustConfig::default()
        };
        let set = compute_adjustments(&grid, &seeds, None, &cfg).unwrap();
        let t = Period::new(1);
        let fwd = grid.forward[0];
        let fl = seeds[&t].line_flow[&LineId::new(0)];
        let s_sq = fl.p_from * fl.p_from + fl.q_from * fl.q_from;
        let r = grid.rating[&fwd];
        // With unit headroom the scaled rating equals the seed loading.
        assert!((r * r * set.s_limit[&(fwd, t)] - s_sq).abs() < 1e-12);
    }

    #[test]
    fn test_balance_adjustment_closes_gap() {
        let (grid, seeds) = grid_and_seed();
        let cfg = AdjustConfig::default();
        let set = compute_adjustments(&grid, &seeds, None, &cfg).unwrap();
        let t = Period::new(1);
        let op = &seeds[&t];

        // Recompute both sides at bus 1 (the load bus, reverse branch end).
        let bus = BusId::new(1);
        let fl = op.line_flow[&LineId::new(0)];
        let inj = -op.load_p[&LoadId::new(0)];
        let vm = op.bus_vm[&bus];
        let withdraw = fl.p_to + vm * vm * SHUNT_G_INIT + set.p_balance[&(bus, t)];
        assert!((inj.abs() - withdraw.abs()) < 1e-12);
        assert!((inj.abs() - withdraw.abs()).abs() < 1e-12);
    }

    #[test]
    fn test_missing_period_flow_errors() {
        let (grid, mut seeds) = grid_and_seed();
        seeds.get_mut(&Period::new(1)).unwrap().line_flow.clear();
        let err = compute_adjustments(&grid, &seeds, None, &AdjustConfig::default()).unwrap_err();
        assert!(matches!(err, AdjustError::Seed(_)));
    }
}
