//! Constraint evaluation.
//!
//! Residual conventions:
//! - **Equalities** return `analytic(x) - (flow_var + adjustment)`; a
//!   feasible point drives these to zero.
//! - **Inequalities** return `h(x)` with feasibility `h(x) <= 0`.
//!
//! Families:
//!
//! ```text
//! Apparent:        P_ij² + Q_ij² - Rating² · adj_S                  <= 0
//! ActiveFlow:      p_analytic(V,θ,tap) - (P + adj_P)                 = 0
//! ReactiveFlow:    q_analytic(V,θ,tap) - (Q + adj_Q)                 = 0
//!                  (or |·| - ε <= 0 when the relaxation is active)
//! ActiveBalance:   |injection| - |withdrawal + adj| - ε             <= 0
//! ReactiveBalance: symmetric, with V²·Bs and the shunt step term
//! ```
//!
//! The balances are tolerance gaps on absolute values rather than strict
//! equalities: the adjustment is an empirically fitted residual, not an
//! exact physical identity.

use std::fmt;
use vvo_core::{BusId, DirectedBranch, Period};

use super::VvoProblem;
use crate::flow::{branch_flow_forward, branch_flow_reverse};

/// Whether a constraint is an equality or a `<= 0` inequality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Equality,
    Inequality,
}

/// Structured constraint identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKey {
    /// Apparent-power cone on the forward orientation.
    Apparent { branch: DirectedBranch, t: Period },
    /// Active flow equation; orientation is carried by the branch key.
    ActiveFlow { branch: DirectedBranch, t: Period },
    /// Reactive flow equation (equality or relaxed, per config).
    ReactiveFlow { branch: DirectedBranch, t: Period },
    ActiveBalance { bus: BusId, t: Period },
    ReactiveBalance { bus: BusId, t: Period },
}

impl fmt::Display for ConstraintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKey::Apparent { branch, t } => write!(f, "s_limit[{branch},{t}]"),
            ConstraintKey::ActiveFlow { branch, t } => write!(f, "p_flow[{branch},{t}]"),
            ConstraintKey::ReactiveFlow { branch, t } => write!(f, "q_flow[{branch},{t}]"),
            ConstraintKey::ActiveBalance { bus, t } => write!(f, "p_balance[{bus},{t}]"),
            ConstraintKey::ReactiveBalance { bus, t } => write!(f, "q_balance[{bus},{t}]"),
        }
    }
}

/// Orientation of a directed branch relative to its physical line.
struct Orientation {
    line_pos: usize,
    forward: bool,
}

impl VvoProblem {
    fn orientation(&self, branch: &DirectedBranch) -> Orientation {
        if let Some(&pos) = self.layout.forward_pos.get(branch) {
            Orientation { line_pos: pos, forward: true }
        } else {
            let pos = self.layout.forward_pos[&branch.reversed()];
            Orientation { line_pos: pos, forward: false }
        }
    }

    /// Tap ratio entering a flow equation whose sending bus is `bus`.
    fn ratio_at(&self, x: &[f64], bus: BusId, t: Period) -> f64 {
        if !self.cfg.transformer_taps {
            return 1.0;
        }
        match self.layout.tap_pos.get(&bus) {
            Some(&pos) => x[self.layout.idx_tap(pos, t)],
            None => 1.0,
        }
    }

    /// Analytic directed flow `(p, q)` at the iterate `x`.
    fn analytic_flow(&self, x: &[f64], branch: &DirectedBranch, t: Period) -> (f64, f64) {
        let o = self.orientation(branch);
        let fwd = self.grid.forward[o.line_pos];
        let params = self.grid.admittance[&fwd];
        let pi = self.layout.bus_pos[&fwd.from];
        let pj = self.layout.bus_pos[&fwd.to];
        let v_i = x[self.layout.idx_v(pi, t)];
        let v_j = x[self.layout.idx_v(pj, t)];
        let th_i = x[self.layout.idx_theta(pi, t)];
        let th_j = x[self.layout.idx_theta(pj, t)];
        if o.forward {
            let ratio = self.ratio_at(x, fwd.from, t);
            branch_flow_forward(params.g, params.b, v_i, v_j, th_i, th_j, ratio)
        } else {
            let ratio = self.ratio_at(x, fwd.to, t);
            branch_flow_reverse(params.g, params.b, v_i, v_j, th_i, th_j, ratio)
        }
    }

    /// Flow variable value for a directed branch.
    fn flow_vars(&self, x: &[f64], branch: &DirectedBranch, t: Period) -> (f64, f64) {
        let o = self.orientation(branch);
        if o.forward {
            (
                x[self.layout.idx_p_fwd(o.line_pos, t)],
                x[self.layout.idx_q_fwd(o.line_pos, t)],
            )
        } else {
            (
                x[self.layout.idx_p_rev(o.line_pos, t)],
                x[self.layout.idx_q_rev(o.line_pos, t)],
            )
        }
    }

    /// Injection side of the active balance at `(bus, t)`.
    fn p_injection(&self, x: &[f64], bus: BusId, t: Period) -> f64 {
        let mut inj = 0.0;
        for gen in self.grid.gens_at(bus) {
            if self.grid.gen_status.get(&gen).copied().unwrap_or(false) {
                inj += x[self.layout.idx_pg(self.layout.gen_pos[&gen], t)];
            }
        }
        for slack in self.grid.slacks_at(bus) {
            inj += x[self.layout.idx_ps(self.layout.slack_pos[&slack], t)];
        }
        inj -= self.params.pd.get(&(bus, t)).copied().unwrap_or(0.0);
        if self.cfg.elastic_demand {
            for (load, _) in self.grid.bids_at(bus) {
                inj -= x[self.layout.idx_pd_el(self.layout.bid_pos[&load])];
            }
        }
        if self.cfg.multi_area {
            inj -= self.params.ward_p.get(&(bus, t)).copied().unwrap_or(0.0);
        }
        inj
    }

    /// Withdrawal side of the active balance, including the adjustment.
    fn p_withdrawal(&self, x: &[f64], bus: BusId, t: Period) -> f64 {
        let mut out = 0.0;
        if let Some(branches) = self.grid.out_forward.get(&bus) {
            for br in branches {
                out += x[self.layout.idx_p_fwd(self.layout.forward_pos[br], t)];
            }
        }
        if let Some(branches) = self.grid.out_reverse.get(&bus) {
            for br in branches {
                out += x[self.layout.idx_p_rev(self.layout.forward_pos[&br.reversed()], t)];
            }
        }
        let bp = self.layout.bus_pos[&bus];
        let v = x[self.layout.idx_v(bp, t)];
        out += v * v * x[self.layout.idx_gs(bp)];
        out += self.params.adjustments.p_balance[&(bus, t)];
        out
    }

    /// Injection side of the reactive balance.
    fn q_injection(&self, x: &[f64], bus: BusId, t: Period) -> f64 {
        let mut inj = 0.0;
        for gen in self.grid.gens_at(bus) {
            if self.grid.gen_status.get(&gen).copied().unwrap_or(false) {
                inj += x[self.layout.idx_qg(self.layout.gen_pos[&gen], t)];
            }
        }
        for slack in self.grid.slacks_at(bus) {
            inj += x[self.layout.idx_qs(self.layout.slack_pos[&slack], t)];
        }
        inj -= self.params.qd.get(&(bus, t)).copied().unwrap_or(0.0);
        if self.cfg.elastic_demand {
            for (load, _) in self.grid.bids_at(bus) {
                inj -= x[self.layout.idx_qd_el(self.layout.bid_pos[&load], t)];
            }
        }
        if self.cfg.multi_area {
            inj -= self.params.ward_q.get(&(bus, t)).copied().unwrap_or(0.0);
        }
        inj
    }

    /// Withdrawal side of the reactive balance: line flows minus the bus
    /// susceptance slack and the switched-shunt compensation.
    fn q_withdrawal(&self, x: &[f64], bus: BusId, t: Period) -> f64 {
        let mut out = 0.0;
        if let Some(branches) = self.grid.out_forward.get(&bus) {
            for br in branches {
                out += x[self.layout.idx_q_fwd(self.layout.forward_pos[br], t)];
            }
        }
        if let Some(branches) = self.grid.out_reverse.get(&bus) {
            for br in branches {
                out += x[self.layout.idx_q_rev(self.layout.forward_pos[&br.reversed()], t)];
            }
        }
        let bp = self.layout.bus_pos[&bus];
        let v = x[self.layout.idx_v(bp, t)];
        let v_sq = v * v;
        out -= v_sq * x[self.layout.idx_bs(bp, t)];
        if let Some(&pos) = self.layout.shunt_pos.get(&bus) {
            out -= v_sq * x[self.layout.idx_shunt(pos, t)] / self.cfg.shunt.step_divisor();
        }
        out += self.params.adjustments.q_balance[&(bus, t)];
        out
    }

    fn evaluate(&self, key: &ConstraintKey, x: &[f64]) -> f64 {
        match key {
            ConstraintKey::Apparent { branch, t } => {
                let (p, q) = self.flow_vars(x, branch, *t);
                let rating = self.grid.rating[branch];
                let adj = self.params.adjustments.s_limit[&(*branch, *t)];
                p * p + q * q - rating * rating * adj
            }
            ConstraintKey::ActiveFlow { branch, t } => {
                let (p_an, _) = self.analytic_flow(x, branch, *t);
                let (p, _) = self.flow_vars(x, branch, *t);
                p_an - (p + self.params.adjustments.line_p[&(*branch, *t)])
            }
            ConstraintKey::ReactiveFlow { branch, t } => {
                let (_, q_an) = self.analytic_flow(x, branch, *t);
                let (_, q) = self.flow_vars(x, branch, *t);
                let residual = q_an - (q + self.params.adjustments.line_q[&(*branch, *t)]);
                if self.cfg.reactive_abs_tolerance {
                    residual.abs() - self.cfg.epsilon
                } else {
                    residual
                }
            }
            ConstraintKey::ActiveBalance { bus, t } => {
                self.p_injection(x, *bus, *t).abs() - self.p_withdrawal(x, *bus, *t).abs()
                    - self.cfg.epsilon
            }
            ConstraintKey::ReactiveBalance { bus, t } => {
                self.q_injection(x, *bus, *t).abs() - self.q_withdrawal(x, *bus, *t).abs()
                    - self.cfg.epsilon
            }
        }
    }

    /// Equality residual vector, aligned with [`VvoProblem::equalities`].
    pub fn equality_constraints(&self, x: &[f64]) -> Vec<f64> {
        self.equalities.iter().map(|k| self.evaluate(k, x)).collect()
    }

    /// Inequality vector (`<= 0` feasible), aligned with
    /// [`VvoProblem::inequalities`].
    pub fn inequality_constraints(&self, x: &[f64]) -> Vec<f64> {
        self.inequalities.iter().map(|k| self.evaluate(k, x)).collect()
    }
}
