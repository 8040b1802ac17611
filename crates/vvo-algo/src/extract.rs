//! Network extraction: case tables to optimization-ready parameters.
//!
//! Produces the per-line admittances, thermal ratings, and topology maps
//! the adjustment calculator and model builder consume. Extraction is a
//! pure function of the case: re-running it on an unmodified network
//! yields identical parameter maps.
//!
//! ## Conductance / susceptance
//!
//! From the per-kilometre line attributes:
//!
//! ```text
//! y = d / (r + jx)    =>    g = d·r/(r²+x²),  b = -d·x/(r²+x²)
//! ```
//!
//! A line reporting `r = 0` or `x = 0` per km falls back to the line
//! table's mean for that column. This is the documented degenerate-
//! attribute fallback: some case exports carry zeroed per-km values for
//! transformer-adjacent rows, and the raw value would divide by zero.
//!
//! ## Thermal rating
//!
//! ```text
//! rating_ij = √3 · Imax · Vbase(from) / Sbase     (per-unit apparent power)
//! ```
//!
//! ## Voltage bounds
//!
//! Bounds are pinned to `[0.9, 1.1]` pu for every bus regardless of the
//! source data. Explicit study-wide assumption, not a fallback.

use num_complex::Complex64;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use vvo_core::{BusId, DirectedBranch, ExtGridId, GenId, LineId, LoadId, Network};

/// Voltage band applied to every bus, overriding the case data.
pub const VM_MIN_PU: f64 = 0.9;
/// Upper edge of the pinned voltage band.
pub const VM_MAX_PU: f64 = 1.1;

/// Extraction failures. No partial grid is ever returned.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("case has no {0} records")]
    EmptyTable(&'static str),

    #[error("line {line} references unknown bus {bus}")]
    MissingBus { line: LineId, bus: BusId },

    #[error("device {device} references unknown bus {bus}")]
    MissingDeviceBus { device: String, bus: BusId },

    #[error("line table impedance is degenerate: mean {column} is zero")]
    DegenerateImpedance { column: &'static str },
}

/// Series admittance of one line (symmetric: shared by both orientations).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineParams {
    /// Series conductance (per-unit)
    pub g: f64,
    /// Series susceptance (per-unit)
    pub b: f64,
}

/// Optimization-ready view of the network.
///
/// Element orderings (`buses`, `lines`, `gens`, ...) are the canonical
/// index order for the model's variable layout; the maps are lookups
/// keyed by the typed ids.
#[derive(Debug, Clone)]
pub struct GridModel {
    pub sn_mva: f64,

    /// Buses in case order; `bus_index` maps id to position.
    pub buses: Vec<BusId>,
    pub bus_index: HashMap<BusId, usize>,
    /// Pinned voltage bounds, `[0.9, 1.1]` for every bus.
    pub v_bounds: HashMap<BusId, (f64, f64)>,

    /// Lines in case order, with their forward orientation.
    pub lines: Vec<LineId>,
    pub forward: Vec<DirectedBranch>,
    /// Line owning each forward orientation.
    pub line_of: HashMap<DirectedBranch, LineId>,
    /// Series admittance per directed branch (both orientations present).
    pub admittance: HashMap<DirectedBranch, LineParams>,
    /// Per-unit apparent-power rating, forward orientation keys.
    pub rating: HashMap<DirectedBranch, f64>,
    /// Forward branches leaving each bus (bus == branch.from).
    pub out_forward: HashMap<BusId, Vec<DirectedBranch>>,
    /// Reverse branches leaving each bus (bus == line.to_bus).
    pub out_reverse: HashMap<BusId, Vec<DirectedBranch>>,

    pub gens: Vec<GenId>,
    pub gen_bus: HashMap<GenId, BusId>,
    pub gen_status: HashMap<GenId, bool>,
    /// Nominal active bounds (per-unit).
    pub gen_p_bounds: HashMap<GenId, (f64, f64)>,
    /// Nominal reactive bounds (per-unit), before seed widening.
    pub gen_q_bounds: HashMap<GenId, (f64, f64)>,

    pub slacks: Vec<ExtGridId>,
    pub slack_bus: HashMap<ExtGridId, BusId>,
    /// Ext-grid bounds (per-unit), retained for reporting.
    pub slack_p_bounds: HashMap<ExtGridId, (f64, f64)>,
    pub slack_q_bounds: HashMap<ExtGridId, (f64, f64)>,

    /// Demand bids: one per load, with its connection bus.
    pub bids: Vec<(LoadId, BusId)>,

    /// Buses hosting a transformer high-voltage side (tap-equipped).
    pub tap_buses: BTreeSet<BusId>,
}

impl GridModel {
    /// Forecast demand per bus (per-unit), summed over attached loads.
    pub fn bus_demand(&self, op: &crate::loadflow::OperatingPoint) -> HashMap<BusId, (f64, f64)> {
        let mut demand: HashMap<BusId, (f64, f64)> = HashMap::new();
        for (load, bus) in &self.bids {
            let p = op.load_p.get(load).copied().unwrap_or(0.0);
            let q = op.load_q.get(load).copied().unwrap_or(0.0);
            let entry = demand.entry(*bus).or_insert((0.0, 0.0));
            entry.0 += p;
            entry.1 += q;
        }
        demand
    }

    /// Generators attached to `bus`, in canonical order.
    pub fn gens_at(&self, bus: BusId) -> impl Iterator<Item = GenId> + '_ {
        self.gens
            .iter()
            .copied()
            .filter(move |g| self.gen_bus.get(g) == Some(&bus))
    }

    /// Ext-grid units attached to `bus`, in canonical order.
    pub fn slacks_at(&self, bus: BusId) -> impl Iterator<Item = ExtGridId> + '_ {
        self.slacks
            .iter()
            .copied()
            .filter(move |s| self.slack_bus.get(s) == Some(&bus))
    }

    /// Demand bids attached to `bus`.
    pub fn bids_at(&self, bus: BusId) -> impl Iterator<Item = (LoadId, BusId)> + '_ {
        self.bids.iter().copied().filter(move |(_, b)| *b == bus)
    }
}

/// Run extraction. Fails fast on malformed cases.
pub fn extract(net: &Network) -> Result<GridModel, ExtractError> {
    let case_buses = net.buses();
    if case_buses.is_empty() {
        return Err(ExtractError::EmptyTable("bus"));
    }
    let case_lines: Vec<_> = net.lines().into_iter().filter(|l| l.in_service).collect();
    if case_lines.is_empty() {
        return Err(ExtractError::EmptyTable("line"));
    }

    let mut buses = Vec::with_capacity(case_buses.len());
    let mut bus_index = HashMap::new();
    let mut v_bounds = HashMap::new();
    let mut vn_kv = HashMap::new();
    for (i, bus) in case_buses.iter().enumerate() {
        buses.push(bus.id);
        bus_index.insert(bus.id, i);
        v_bounds.insert(bus.id, (VM_MIN_PU, VM_MAX_PU));
        vn_kv.insert(bus.id, bus.vn_kv);
    }

    // Column means for the zero-impedance fallback. Zero entries count
    // toward the mean, matching the source tables' column semantics.
    let n = case_lines.len() as f64;
    let mean_r: f64 = case_lines.iter().map(|l| l.r_ohm_per_km).sum::<f64>() / n;
    let mean_x: f64 = case_lines.iter().map(|l| l.x_ohm_per_km).sum::<f64>() / n;

    let mut lines = Vec::with_capacity(case_lines.len());
    let mut forward = Vec::with_capacity(case_lines.len());
    let mut line_of = HashMap::new();
    let mut admittance = HashMap::new();
    let mut rating = HashMap::new();
    let mut out_forward: HashMap<BusId, Vec<DirectedBranch>> = HashMap::new();
    let mut out_reverse: HashMap<BusId, Vec<DirectedBranch>> = HashMap::new();

    for line in &case_lines {
        for bus in [line.from_bus, line.to_bus] {
            if !bus_index.contains_key(&bus) {
                return Err(ExtractError::MissingBus { line: line.id, bus });
            }
        }

        let r = if line.r_ohm_per_km != 0.0 { line.r_ohm_per_km } else { mean_r };
        let x = if line.x_ohm_per_km != 0.0 { line.x_ohm_per_km } else { mean_x };
        if r == 0.0 {
            return Err(ExtractError::DegenerateImpedance { column: "r_ohm_per_km" });
        }
        if x == 0.0 {
            return Err(ExtractError::DegenerateImpedance { column: "x_ohm_per_km" });
        }

        let y = Complex64::new(r, x).inv() * line.length_km;
        let params = LineParams { g: y.re, b: y.im };

        let fwd = DirectedBranch::forward(line);
        let rev = fwd.reversed();
        lines.push(line.id);
        forward.push(fwd);
        line_of.insert(fwd, line.id);
        admittance.insert(fwd, params);
        admittance.insert(rev, params);

        let v_base = vn_kv.get(&line.from_bus).copied().unwrap_or(0.0);
        rating.insert(fwd, 3f64.sqrt() * line.max_i_ka * v_base / net.sn_mva);

        out_forward.entry(fwd.from).or_default().push(fwd);
        out_reverse.entry(rev.from).or_default().push(rev);
    }

    let sn = net.sn_mva;
    let mut gens = Vec::new();
    let mut gen_bus = HashMap::new();
    let mut gen_status = HashMap::new();
    let mut gen_p_bounds = HashMap::new();
    let mut gen_q_bounds = HashMap::new();
    for gen in net.generators() {
        if !bus_index.contains_key(&gen.bus) {
            return Err(ExtractError::MissingDeviceBus {
                device: format!("gen {}", gen.id),
                bus: gen.bus,
            });
        }
        gens.push(gen.id);
        gen_bus.insert(gen.id, gen.bus);
        gen_status.insert(gen.id, gen.in_service);
        gen_p_bounds.insert(gen.id, (gen.min_p_mw / sn, gen.max_p_mw / sn));
        gen_q_bounds.insert(gen.id, (gen.min_q_mvar / sn, gen.max_q_mvar / sn));
    }

    let mut slacks = Vec::new();
    let mut slack_bus = HashMap::new();
    let mut slack_p_bounds = HashMap::new();
    let mut slack_q_bounds = HashMap::new();
    for ext in net.ext_grids() {
        if !bus_index.contains_key(&ext.bus) {
            return Err(ExtractError::MissingDeviceBus {
                device: format!("ext_grid {}", ext.id),
                bus: ext.bus,
            });
        }
        slacks.push(ext.id);
        slack_bus.insert(ext.id, ext.bus);
        slack_p_bounds.insert(ext.id, (ext.min_p_mw / sn, ext.max_p_mw / sn));
        slack_q_bounds.insert(ext.id, (ext.min_q_mvar / sn, ext.max_q_mvar / sn));
    }

    let mut bids = Vec::new();
    for load in net.loads() {
        if !bus_index.contains_key(&load.bus) {
            return Err(ExtractError::MissingDeviceBus {
                device: format!("load {}", load.id),
                bus: load.bus,
            });
        }
        bids.push((load.id, load.bus));
    }

    let tap_buses: BTreeSet<BusId> = net.trafos().iter().map(|t| t.hv_bus).collect();

    Ok(GridModel {
        sn_mva: net.sn_mva,
        buses,
        bus_index,
        v_bounds,
        lines,
        forward,
        line_of,
        admittance,
        rating,
        out_forward,
        out_reverse,
        gens,
        gen_bus,
        gen_status,
        gen_p_bounds,
        gen_q_bounds,
        slacks,
        slack_bus,
        slack_p_bounds,
        slack_q_bounds,
        bids,
        tap_buses,
    })
}
