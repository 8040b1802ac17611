//! The multi-period objective.
//!
//! Minimized weighted sum of three terms:
//!
//! ```text
//! k1 · Σ_{shunt b, t>=2} (step[b,t] - step[b,t-1])²   switching wear
//! k2 · Σ_{pilot b, t}    (V[b,t] - V_ref[b,t])²        pilot anchoring
//! k3 · Σ_{g, t}          Q_gen[g,t]²                   reactive effort
//! ```
//!
//! The switching term is the only cross-period coupling in the model: it
//! reads `t-1` within the same model instance and nothing else carries
//! state between hours.

use serde::Serialize;
use vvo_core::Period;

use super::VvoProblem;

/// Per-term objective values, for logging and tests.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ObjectiveBreakdown {
    pub switching: f64,
    pub pilot_deviation: f64,
    pub reactive_effort: f64,
}

impl ObjectiveBreakdown {
    pub fn total(&self) -> f64 {
        self.switching + self.pilot_deviation + self.reactive_effort
    }
}

impl VvoProblem {
    /// Objective value at `x`.
    pub fn objective(&self, x: &[f64]) -> f64 {
        self.objective_breakdown(x).total()
    }

    /// Objective split into its weighted terms.
    pub fn objective_breakdown(&self, x: &[f64]) -> ObjectiveBreakdown {
        let w = &self.weights;
        let mut switching = 0.0;
        for (pos, _) in self.layout.shunt_buses.iter().enumerate() {
            for t in self.layout.horizon.periods() {
                if let Some(prev) = t.prev() {
                    let d = x[self.layout.idx_shunt(pos, t)] - x[self.layout.idx_shunt(pos, prev)];
                    switching += d * d;
                }
            }
        }

        let mut pilot = 0.0;
        for bus in &self.pilot_buses {
            let bp = self.layout.bus_pos[bus];
            for t in self.layout.horizon.periods() {
                let v_ref = self.params.v_ref.get(&(*bus, t)).copied().unwrap_or(1.0);
                let d = x[self.layout.idx_v(bp, t)] - v_ref;
                pilot += d * d;
            }
        }

        let mut reactive = 0.0;
        for (pos, _) in self.grid.gens.iter().enumerate() {
            for t in self.layout.horizon.periods() {
                let q = x[self.layout.idx_qg(pos, t)];
                reactive += q * q;
            }
        }

        ObjectiveBreakdown {
            switching: w.switching * switching,
            pilot_deviation: w.pilot_deviation * pilot,
            reactive_effort: w.reactive_effort * reactive,
        }
    }

    /// Gradient of the objective at `x`.
    pub fn objective_gradient(&self, x: &[f64]) -> Vec<f64> {
        let w = &self.weights;
        let mut grad = vec![0.0; self.layout.n_var];

        // Switching term: each difference (s[t] - s[t-1]) contributes
        // +2k1·d at t and -2k1·d at t-1.
        for (pos, _) in self.layout.shunt_buses.iter().enumerate() {
            for t in self.layout.horizon.periods() {
                if let Some(prev) = t.prev() {
                    let i_t = self.layout.idx_shunt(pos, t);
                    let i_p = self.layout.idx_shunt(pos, prev);
                    let d = x[i_t] - x[i_p];
                    grad[i_t] += 2.0 * w.switching * d;
                    grad[i_p] -= 2.0 * w.switching * d;
                }
            }
        }

        for bus in &self.pilot_buses {
            let bp = self.layout.bus_pos[bus];
            for t in self.layout.horizon.periods() {
                let v_ref = self.params.v_ref.get(&(*bus, t)).copied().unwrap_or(1.0);
                let i = self.layout.idx_v(bp, t);
                grad[i] += 2.0 * w.pilot_deviation * (x[i] - v_ref);
            }
        }

        for (pos, _) in self.grid.gens.iter().enumerate() {
            for t in self.layout.horizon.periods() {
                let i = self.layout.idx_qg(pos, t);
                grad[i] += 2.0 * w.reactive_effort * x[i];
            }
        }

        grad
    }

    /// Convenience: switching distance between consecutive steps of one
    /// shunt bus in a solved vector, for reporting.
    pub fn shunt_trajectory(&self, x: &[f64], pos: usize) -> Vec<(Period, f64)> {
        self.layout
            .horizon
            .periods()
            .map(|t| (t, x[self.layout.idx_shunt(pos, t)]))
            .collect()
    }
}
