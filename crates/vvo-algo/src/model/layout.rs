//! Decision-variable layout.
//!
//! All variable families live in one flat vector `x` with per-family
//! offsets, time-major within each element:
//!
//! ```text
//! x = [ P_ij | P_ji | Q_ij | Q_ji | V | θ | P_g | Q_g | P_s | Q_s
//!       | shunt | tap | Pd_el | Qd_el | Gs | Bs ]
//! ```
//!
//! Within a family, element `e` at period `t` sits at
//! `offset + e·T + (t-1)`. The [`VarDef`] registry records, for every
//! entry of `x`, its family, structured key, bounds, initial value, and
//! integrality — the single source of truth for the solver interface and
//! the exporter.

use std::collections::{BTreeMap, HashMap};
use vvo_core::{BusId, DirectedBranch, ExtGridId, GenId, Horizon, LoadId, Period};

use super::{ModelConfig, ModelError};
use crate::extract::GridModel;
use crate::loadflow::OperatingPoint;

/// Variable family tags, used for registry grouping and export file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarFamily {
    PLineFwd,
    PLineRev,
    QLineFwd,
    QLineRev,
    VBus,
    ThetaBus,
    PGen,
    QGen,
    PSlack,
    QSlack,
    ShuntStep,
    TapRatio,
    PdElastic,
    QdElastic,
    ShuntG,
    ShuntB,
}

impl VarFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            VarFamily::PLineFwd => "p_line_ij",
            VarFamily::PLineRev => "p_line_ji",
            VarFamily::QLineFwd => "q_line_ij",
            VarFamily::QLineRev => "q_line_ji",
            VarFamily::VBus => "v_bus",
            VarFamily::ThetaBus => "theta_bus",
            VarFamily::PGen => "p_gen",
            VarFamily::QGen => "q_gen",
            VarFamily::PSlack => "p_slack",
            VarFamily::QSlack => "q_slack",
            VarFamily::ShuntStep => "shunt_step",
            VarFamily::TapRatio => "tap_ratio",
            VarFamily::PdElastic => "pd_elastic",
            VarFamily::QdElastic => "qd_elastic",
            VarFamily::ShuntG => "shunt_g",
            VarFamily::ShuntB => "shunt_b",
        }
    }

    /// Every family, in layout order.
    pub fn all() -> &'static [VarFamily] {
        &[
            VarFamily::PLineFwd,
            VarFamily::PLineRev,
            VarFamily::QLineFwd,
            VarFamily::QLineRev,
            VarFamily::VBus,
            VarFamily::ThetaBus,
            VarFamily::PGen,
            VarFamily::QGen,
            VarFamily::PSlack,
            VarFamily::QSlack,
            VarFamily::ShuntStep,
            VarFamily::TapRatio,
            VarFamily::PdElastic,
            VarFamily::QdElastic,
            VarFamily::ShuntG,
            VarFamily::ShuntB,
        ]
    }
}

/// Structured variable index, replacing composite string keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKey {
    Branch { branch: DirectedBranch, t: Period },
    Bus { bus: BusId, t: Period },
    BusStatic { bus: BusId },
    Gen { gen: GenId, t: Period },
    Slack { slack: ExtGridId, t: Period },
    Bid { load: LoadId, bus: BusId },
    BidPeriod { load: LoadId, bus: BusId, t: Period },
}

impl VarKey {
    /// Export label, e.g. `"4-5,12"` for a branch at period 12.
    pub fn label(&self) -> String {
        match self {
            VarKey::Branch { branch, t } => format!("{branch},{t}"),
            VarKey::Bus { bus, t } => format!("{bus},{t}"),
            VarKey::BusStatic { bus } => format!("{bus}"),
            VarKey::Gen { gen, t } => format!("{gen},{t}"),
            VarKey::Slack { slack, t } => format!("{slack},{t}"),
            VarKey::Bid { load, bus } => format!("{load},{bus}"),
            VarKey::BidPeriod { load, bus, t } => format!("{load},{bus},{t}"),
        }
    }
}

/// One entry of the decision vector.
#[derive(Debug, Clone)]
pub struct VarDef {
    pub family: VarFamily,
    pub key: VarKey,
    pub lb: f64,
    pub ub: f64,
    pub init: f64,
    pub integer: bool,
}

/// Complete layout: registry plus offset arithmetic and position maps.
#[derive(Debug, Clone)]
pub struct ModelLayout {
    pub horizon: Horizon,
    pub n_var: usize,
    pub vars: Vec<VarDef>,

    off_p_fwd: usize,
    off_p_rev: usize,
    off_q_fwd: usize,
    off_q_rev: usize,
    off_v: usize,
    off_theta: usize,
    off_pg: usize,
    off_qg: usize,
    off_ps: usize,
    off_qs: usize,
    off_shunt: usize,
    off_tap: usize,
    off_pd_el: usize,
    off_qd_el: usize,
    off_gs: usize,
    off_bs: usize,

    pub forward_pos: HashMap<DirectedBranch, usize>,
    pub bus_pos: HashMap<BusId, usize>,
    pub gen_pos: HashMap<GenId, usize>,
    pub slack_pos: HashMap<ExtGridId, usize>,
    pub bid_pos: HashMap<LoadId, usize>,
    /// Shunt-equipped buses admitted to the model, in declaration order.
    pub shunt_buses: Vec<BusId>,
    pub shunt_pos: HashMap<BusId, usize>,
    /// Tap-equipped buses, in declaration order (empty when taps disabled).
    pub tap_buses: Vec<BusId>,
    pub tap_pos: HashMap<BusId, usize>,
}

impl ModelLayout {
    fn t0(&self, t: Period) -> usize {
        t.value() - 1
    }

    pub fn idx_p_fwd(&self, line_pos: usize, t: Period) -> usize {
        self.off_p_fwd + line_pos * self.horizon.len() + self.t0(t)
    }
    pub fn idx_p_rev(&self, line_pos: usize, t: Period) -> usize {
        self.off_p_rev + line_pos * self.horizon.len() + self.t0(t)
    }
    pub fn idx_q_fwd(&self, line_pos: usize, t: Period) -> usize {
        self.off_q_fwd + line_pos * self.horizon.len() + self.t0(t)
    }
    pub fn idx_q_rev(&self, line_pos: usize, t: Period) -> usize {
        self.off_q_rev + line_pos * self.horizon.len() + self.t0(t)
    }
    pub fn idx_v(&self, bus_pos: usize, t: Period) -> usize {
        self.off_v + bus_pos * self.horizon.len() + self.t0(t)
    }
    pub fn idx_theta(&self, bus_pos: usize, t: Period) -> usize {
        self.off_theta + bus_pos * self.horizon.len() + self.t0(t)
    }
    pub fn idx_pg(&self, gen_pos: usize, t: Period) -> usize {
        self.off_pg + gen_pos * self.horizon.len() + self.t0(t)
    }
    pub fn idx_qg(&self, gen_pos: usize, t: Period) -> usize {
        self.off_qg + gen_pos * self.horizon.len() + self.t0(t)
    }
    pub fn idx_ps(&self, slack_pos: usize, t: Period) -> usize {
        self.off_ps + slack_pos * self.horizon.len() + self.t0(t)
    }
    pub fn idx_qs(&self, slack_pos: usize, t: Period) -> usize {
        self.off_qs + slack_pos * self.horizon.len() + self.t0(t)
    }
    pub fn idx_shunt(&self, shunt_pos: usize, t: Period) -> usize {
        self.off_shunt + shunt_pos * self.horizon.len() + self.t0(t)
    }
    pub fn idx_tap(&self, tap_pos: usize, t: Period) -> usize {
        self.off_tap + tap_pos * self.horizon.len() + self.t0(t)
    }
    pub fn idx_pd_el(&self, bid_pos: usize) -> usize {
        self.off_pd_el + bid_pos
    }
    pub fn idx_qd_el(&self, bid_pos: usize, t: Period) -> usize {
        self.off_qd_el + bid_pos * self.horizon.len() + self.t0(t)
    }
    pub fn idx_gs(&self, bus_pos: usize) -> usize {
        self.off_gs + bus_pos
    }
    pub fn idx_bs(&self, bus_pos: usize, t: Period) -> usize {
        self.off_bs + bus_pos * self.horizon.len() + self.t0(t)
    }

    /// Build the full layout from the grid, configuration, admitted shunt
    /// buses, and the per-period seed operating points.
    ///
    /// Validation happens here: inverted generator bounds are a
    /// configuration error (never silently swapped), and every period of
    /// the horizon must have a seed.
    pub fn build(
        grid: &GridModel,
        cfg: &ModelConfig,
        shunt_buses: &[BusId],
        seeds: &BTreeMap<Period, OperatingPoint>,
    ) -> Result<Self, ModelError> {
        let horizon = Horizon::new(cfg.horizon);
        for t in horizon.periods() {
            if !seeds.contains_key(&t) {
                return Err(ModelError::MissingSeed { period: t });
            }
        }

        for gen in &grid.gens {
            let (qmin, qmax) = grid.gen_q_bounds[gen];
            if qmin > qmax {
                return Err(ModelError::Config(format!(
                    "gen {gen}: inverted reactive bounds [{qmin}, {qmax}]"
                )));
            }
            let (pmin, pmax) = grid.gen_p_bounds[gen];
            if pmin > pmax {
                return Err(ModelError::Config(format!(
                    "gen {gen}: inverted active bounds [{pmin}, {pmax}]"
                )));
            }
        }

        let t_len = horizon.len();
        let n_line = grid.lines.len();
        let n_bus = grid.buses.len();
        let n_gen = grid.gens.len();
        let n_slack = grid.slacks.len();
        let n_bid = grid.bids.len();
        let shunt_buses: Vec<BusId> = shunt_buses.to_vec();
        let n_shunt = shunt_buses.len();
        let tap_buses: Vec<BusId> = if cfg.transformer_taps {
            grid.tap_buses.iter().copied().collect()
        } else {
            Vec::new()
        };
        let n_tap = tap_buses.len();

        let off_p_fwd = 0;
        let off_p_rev = off_p_fwd + n_line * t_len;
        let off_q_fwd = off_p_rev + n_line * t_len;
        let off_q_rev = off_q_fwd + n_line * t_len;
        let off_v = off_q_rev + n_line * t_len;
        let off_theta = off_v + n_bus * t_len;
        let off_pg = off_theta + n_bus * t_len;
        let off_qg = off_pg + n_gen * t_len;
        let off_ps = off_qg + n_gen * t_len;
        let off_qs = off_ps + n_slack * t_len;
        let off_shunt = off_qs + n_slack * t_len;
        let off_tap = off_shunt + n_shunt * t_len;
        let off_pd_el = off_tap + n_tap * t_len;
        let off_qd_el = off_pd_el + n_bid;
        let off_gs = off_qd_el + n_bid * t_len;
        let off_bs = off_gs + n_bus;
        let n_var = off_bs + n_bus * t_len;

        let mut vars: Vec<VarDef> = Vec::with_capacity(n_var);
        let free = (f64::NEG_INFINITY, f64::INFINITY);

        // Directed line flows. Bounds are free unless the seed-bracketing
        // option is on, which pins each half-flow to ±10% of its seed value.
        let flow_bounds = |p0: f64| -> (f64, f64) {
            if cfg.bracket_line_flows {
                if p0 > 0.0 {
                    (0.9 * p0, 1.1 * p0)
                } else {
                    (1.1 * p0, 0.9 * p0)
                }
            } else {
                free
            }
        };

        for (pos, line) in grid.lines.iter().enumerate() {
            let branch = grid.forward[pos];
            for t in horizon.periods() {
                let fl = seeds[&t].flow(*line, t)?;
                let (lb, ub) = flow_bounds(fl.p_from);
                vars.push(VarDef {
                    family: VarFamily::PLineFwd,
                    key: VarKey::Branch { branch, t },
                    lb,
                    ub,
                    init: fl.p_from,
                    integer: false,
                });
            }
        }
        for (pos, line) in grid.lines.iter().enumerate() {
            let branch = grid.forward[pos].reversed();
            for t in horizon.periods() {
                let fl = seeds[&t].flow(*line, t)?;
                let (lb, ub) = flow_bounds(fl.p_to);
                vars.push(VarDef {
                    family: VarFamily::PLineRev,
                    key: VarKey::Branch { branch, t },
                    lb,
                    ub,
                    init: fl.p_to,
                    integer: false,
                });
            }
        }
        for (pos, line) in grid.lines.iter().enumerate() {
            let branch = grid.forward[pos];
            for t in horizon.periods() {
                let fl = seeds[&t].flow(*line, t)?;
                vars.push(VarDef {
                    family: VarFamily::QLineFwd,
                    key: VarKey::Branch { branch, t },
                    lb: free.0,
                    ub: free.1,
                    init: fl.q_from,
                    integer: false,
                });
            }
        }
        for (pos, line) in grid.lines.iter().enumerate() {
            let branch = grid.forward[pos].reversed();
            for t in horizon.periods() {
                let fl = seeds[&t].flow(*line, t)?;
                vars.push(VarDef {
                    family: VarFamily::QLineRev,
                    key: VarKey::Branch { branch, t },
                    lb: free.0,
                    ub: free.1,
                    init: fl.q_to,
                    integer: false,
                });
            }
        }

        for bus in &grid.buses {
            let (vmin, vmax) = grid.v_bounds[bus];
            for t in horizon.periods() {
                vars.push(VarDef {
                    family: VarFamily::VBus,
                    key: VarKey::Bus { bus: *bus, t },
                    lb: vmin,
                    ub: vmax,
                    init: seeds[&t].vm(*bus, t)?,
                    integer: false,
                });
            }
        }
        for bus in &grid.buses {
            for t in horizon.periods() {
                vars.push(VarDef {
                    family: VarFamily::ThetaBus,
                    key: VarKey::Bus { bus: *bus, t },
                    lb: free.0,
                    ub: free.1,
                    init: seeds[&t].va(*bus, t)?,
                    integer: false,
                });
            }
        }

        // Generator dispatch. Bounds widen to bracket the observed seed
        // point so the initialization is never outside its own box.
        for gen in &grid.gens {
            let (pmin, pmax) = grid.gen_p_bounds[gen];
            for t in horizon.periods() {
                let p0 = seeds[&t].gen_p.get(gen).copied().unwrap_or(0.0);
                vars.push(VarDef {
                    family: VarFamily::PGen,
                    key: VarKey::Gen { gen: *gen, t },
                    lb: pmin.min(p0),
                    ub: pmax.max(p0),
                    init: p0,
                    integer: false,
                });
            }
        }
        for gen in &grid.gens {
            let (qmin, qmax) = grid.gen_q_bounds[gen];
            for t in horizon.periods() {
                let q0 = seeds[&t].gen_q.get(gen).copied().unwrap_or(0.0);
                vars.push(VarDef {
                    family: VarFamily::QGen,
                    key: VarKey::Gen { gen: *gen, t },
                    lb: qmin.min(q0),
                    ub: qmax.max(q0),
                    init: q0,
                    integer: false,
                });
            }
        }

        // Slack dispatch stays unbounded; the ext-grid limits are kept in
        // the grid model for reporting only.
        for slack in &grid.slacks {
            for t in horizon.periods() {
                vars.push(VarDef {
                    family: VarFamily::PSlack,
                    key: VarKey::Slack { slack: *slack, t },
                    lb: free.0,
                    ub: free.1,
                    init: seeds[&t].slack_p.get(slack).copied().unwrap_or(0.0),
                    integer: false,
                });
            }
        }
        for slack in &grid.slacks {
            for t in horizon.periods() {
                vars.push(VarDef {
                    family: VarFamily::QSlack,
                    key: VarKey::Slack { slack: *slack, t },
                    lb: free.0,
                    ub: free.1,
                    init: seeds[&t].slack_q.get(slack).copied().unwrap_or(0.0),
                    integer: false,
                });
            }
        }

        let (sh_lb, sh_ub) = cfg.shunt.bounds();
        for bus in &shunt_buses {
            for t in horizon.periods() {
                vars.push(VarDef {
                    family: VarFamily::ShuntStep,
                    key: VarKey::Bus { bus: *bus, t },
                    lb: sh_lb,
                    ub: sh_ub,
                    init: 0.0,
                    integer: cfg.shunt.integer(),
                });
            }
        }

        for bus in &tap_buses {
            for t in horizon.periods() {
                vars.push(VarDef {
                    family: VarFamily::TapRatio,
                    key: VarKey::Bus { bus: *bus, t },
                    lb: cfg.tap_bounds.0,
                    ub: cfg.tap_bounds.1,
                    init: cfg.tap_bounds.0,
                    integer: cfg.tap_integer,
                });
            }
        }

        let (el_lb, el_ub) = cfg.elastic_bounds.unwrap_or(free);
        for (load, bus) in &grid.bids {
            vars.push(VarDef {
                family: VarFamily::PdElastic,
                key: VarKey::Bid { load: *load, bus: *bus },
                lb: el_lb,
                ub: el_ub,
                init: 0.0,
                integer: false,
            });
        }
        for (load, bus) in &grid.bids {
            for t in horizon.periods() {
                vars.push(VarDef {
                    family: VarFamily::QdElastic,
                    key: VarKey::BidPeriod { load: *load, bus: *bus, t },
                    lb: el_lb,
                    ub: el_ub,
                    init: 0.0,
                    integer: false,
                });
            }
        }

        // Bus shunt conductance/susceptance slack, initialized at the top
        // of their unit box. The adjustment calculator evaluates the seed
        // balances with the same initial values.
        for bus in &grid.buses {
            vars.push(VarDef {
                family: VarFamily::ShuntG,
                key: VarKey::BusStatic { bus: *bus },
                lb: 0.0,
                ub: 1.0,
                init: crate::adjust::SHUNT_G_INIT,
                integer: false,
            });
        }
        for bus in &grid.buses {
            for t in horizon.periods() {
                vars.push(VarDef {
                    family: VarFamily::ShuntB,
                    key: VarKey::Bus { bus: *bus, t },
                    lb: 0.0,
                    ub: 1.0,
                    init: crate::adjust::SHUNT_B_INIT,
                    integer: false,
                });
            }
        }

        debug_assert_eq!(vars.len(), n_var);

        let forward_pos = grid
            .forward
            .iter()
            .enumerate()
            .map(|(i, br)| (*br, i))
            .collect();
        let gen_pos = grid.gens.iter().enumerate().map(|(i, g)| (*g, i)).collect();
        let slack_pos = grid
            .slacks
            .iter()
            .enumerate()
            .map(|(i, s)| (*s, i))
            .collect();
        let bid_pos = grid
            .bids
            .iter()
            .enumerate()
            .map(|(i, (l, _))| (*l, i))
            .collect();
        let shunt_pos = shunt_buses
            .iter()
            .enumerate()
            .map(|(i, b)| (*b, i))
            .collect();
        let tap_pos = tap_buses.iter().enumerate().map(|(i, b)| (*b, i)).collect();

        Ok(Self {
            horizon,
            n_var,
            vars,
            off_p_fwd,
            off_p_rev,
            off_q_fwd,
            off_q_rev,
            off_v,
            off_theta,
            off_pg,
            off_qg,
            off_ps,
            off_qs,
            off_shunt,
            off_tap,
            off_pd_el,
            off_qd_el,
            off_gs,
            off_bs,
            forward_pos,
            bus_pos: grid.bus_index.clone(),
            gen_pos,
            slack_pos,
            bid_pos,
            shunt_buses,
            shunt_pos,
            tap_buses,
            tap_pos,
        })
    }

    /// Initial point assembled from the registry.
    pub fn initial_point(&self) -> Vec<f64> {
        self.vars.iter().map(|v| v.init).collect()
    }

    /// Box bounds `(lb, ub)` from the registry.
    pub fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        (
            self.vars.iter().map(|v| v.lb).collect(),
            self.vars.iter().map(|v| v.ub).collect(),
        )
    }

    /// Integrality mask from the registry.
    pub fn integrality(&self) -> Vec<bool> {
        self.vars.iter().map(|v| v.integer).collect()
    }
}
