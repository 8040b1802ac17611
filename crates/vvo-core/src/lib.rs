//! # vvo-core: Power Network Data Model
//!
//! Fundamental data structures for multi-period Volt/VAR optimization studies.
//!
//! ## Design Philosophy
//!
//! Networks are modeled as **undirected multigraphs** where:
//! - **Nodes**: Buses, Generators, External grids (slack), Loads
//! - **Edges**: Lines and two-winding transformers
//!
//! The graph-based container gives:
//! - Fast topological queries (incident branches, attached devices)
//! - Type-safe element access with newtype IDs
//! - Support for parallel branches between the same pair of buses
//!
//! Element records carry the tabular attributes of the source case
//! (`r_ohm_per_km`, `max_i_ka`, `vn_kv`, ...) so the extraction layer can
//! compute per-unit admittances and ratings without reaching back into the
//! original data source.
//!
//! ## ID System
//!
//! Every element has a unique ID (newtype wrapper around `usize`):
//! - Bus IDs: Bus#0, Bus#1, ... (0-based, matching the source case index)
//! - Line IDs, Generator IDs, External-grid IDs, Load IDs, Trafo IDs
//!
//! IDs are the only cross-references between tables: a `Gen` names its bus
//! by `BusId`, never by position. This removes the class of errors the
//! composite string keys (`"4-5"`) caused in earlier tooling: multi-digit
//! bus ids can no longer collide with a separator.
//!
//! ## Modules
//!
//! - [`case`] - Serializable tabular case file and conversion to [`Network`]
//! - [`diagnostics`] - Validation and diagnostic reporting
//! - [`error`] - Unified error type for the workspace

use petgraph::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub mod case;
pub mod diagnostics;
pub mod error;

pub use case::CaseFile;
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{VvoError, VvoResult};
pub use petgraph::graph::NodeIndex;

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtGridId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafoId(usize);

macro_rules! impl_id {
    ($($ty:ident),*) => {$(
        impl $ty {
            #[inline]
            pub fn new(value: usize) -> Self {
                $ty(value)
            }
            #[inline]
            pub fn value(&self) -> usize {
                self.0
            }
        }
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    )*};
}

impl_id!(BusId, LineId, GenId, ExtGridId, LoadId, TrafoId);

/// One directed half of a physical line.
///
/// Lines are bidirectional but the flow model keeps two directed flow
/// variables per line, one per orientation. `DirectedBranch` is the
/// structured key for those half-flows: an ordered pair of bus ids.
/// The forward orientation matches the line's `from_bus -> to_bus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DirectedBranch {
    pub from: BusId,
    pub to: BusId,
}

impl DirectedBranch {
    pub fn new(from: BusId, to: BusId) -> Self {
        Self { from, to }
    }

    /// Forward orientation of a line (from_bus -> to_bus).
    pub fn forward(line: &Line) -> Self {
        Self::new(line.from_bus, line.to_bus)
    }

    /// Reverse orientation of a line (to_bus -> from_bus).
    pub fn reverse(line: &Line) -> Self {
        Self::new(line.to_bus, line.from_bus)
    }

    /// The same branch, opposite orientation.
    pub fn reversed(&self) -> Self {
        Self::new(self.to, self.from)
    }
}

impl fmt::Display for DirectedBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// 1-based hourly period index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(usize);

impl Period {
    #[inline]
    pub fn new(value: usize) -> Self {
        Period(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
    /// Previous hour, if any (period 1 has none).
    pub fn prev(&self) -> Option<Period> {
        (self.0 > 1).then(|| Period(self.0 - 1))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Iterator over the study horizon: periods `1..=n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    pub n_periods: usize,
}

impl Horizon {
    pub fn new(n_periods: usize) -> Self {
        Self { n_periods }
    }

    /// The standard 24-hour day-ahead horizon.
    pub fn day_ahead() -> Self {
        Self { n_periods: 24 }
    }

    pub fn periods(&self) -> impl Iterator<Item = Period> + '_ {
        (1..=self.n_periods).map(Period)
    }

    pub fn len(&self) -> usize {
        self.n_periods
    }

    pub fn is_empty(&self) -> bool {
        self.n_periods == 0
    }
}

// Basic component structs

/// Electrical node (substation bar).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    /// Nominal voltage in kilovolts (per-unit base for ratings)
    pub vn_kv: f64,
    /// Minimum voltage magnitude limit (per-unit)
    pub min_vm_pu: f64,
    /// Maximum voltage magnitude limit (per-unit)
    pub max_vm_pu: f64,
    pub in_service: bool,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            id: BusId(0),
            name: String::new(),
            vn_kv: 0.0,
            min_vm_pu: 0.9,
            max_vm_pu: 1.1,
            in_service: true,
        }
    }
}

/// Transmission line between two buses.
///
/// Impedance is carried per kilometre, as in the source case tables; the
/// extraction layer turns `(r, x, length)` into a series admittance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub id: LineId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// Series resistance (ohm per km)
    pub r_ohm_per_km: f64,
    /// Series reactance (ohm per km)
    pub x_ohm_per_km: f64,
    /// Line length (km)
    pub length_km: f64,
    /// Thermal current limit (kA)
    pub max_i_ka: f64,
    pub in_service: bool,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            id: LineId(0),
            name: String::new(),
            from_bus: BusId(0),
            to_bus: BusId(0),
            r_ohm_per_km: 0.0,
            x_ohm_per_km: 0.0,
            length_km: 1.0,
            max_i_ka: 0.0,
            in_service: true,
        }
    }
}

/// Dispatchable generating unit attached to one bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gen {
    pub id: GenId,
    pub name: String,
    pub bus: BusId,
    /// Scheduled active power setpoint (MW), scaled per period by the study
    pub p_mw: f64,
    pub min_p_mw: f64,
    pub max_p_mw: f64,
    pub min_q_mvar: f64,
    pub max_q_mvar: f64,
    pub in_service: bool,
}

impl Default for Gen {
    fn default() -> Self {
        Self {
            id: GenId(0),
            name: String::new(),
            bus: BusId(0),
            p_mw: 0.0,
            min_p_mw: 0.0,
            max_p_mw: 0.0,
            min_q_mvar: 0.0,
            max_q_mvar: 0.0,
            in_service: true,
        }
    }
}

/// External grid connection: the slack unit fixing the angle reference and
/// absorbing system imbalance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtGrid {
    pub id: ExtGridId,
    pub name: String,
    pub bus: BusId,
    /// Voltage setpoint at the connection bus (per-unit)
    pub vm_pu: f64,
    pub min_p_mw: f64,
    pub max_p_mw: f64,
    pub min_q_mvar: f64,
    pub max_q_mvar: f64,
}

impl Default for ExtGrid {
    fn default() -> Self {
        Self {
            id: ExtGridId(0),
            name: String::new(),
            bus: BusId(0),
            vm_pu: 1.0,
            min_p_mw: 0.0,
            max_p_mw: 0.0,
            min_q_mvar: 0.0,
            max_q_mvar: 0.0,
        }
    }
}

/// Fixed forecast demand at a bus.
///
/// Every load doubles as an elastic demand bid `(LoadId, BusId)` in the
/// optimization model, decoupled from the forecast `p_mw`/`q_mvar`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Load {
    pub id: LoadId,
    pub name: String,
    pub bus: BusId,
    pub p_mw: f64,
    pub q_mvar: f64,
}

impl Default for Load {
    fn default() -> Self {
        Self {
            id: LoadId(0),
            name: String::new(),
            bus: BusId(0),
            p_mw: 0.0,
            q_mvar: 0.0,
        }
    }
}

/// Two-winding transformer. Its presence marks the high-voltage bus as
/// tap-equipped for the optimization model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trafo {
    pub id: TrafoId,
    pub name: String,
    pub hv_bus: BusId,
    pub lv_bus: BusId,
}

impl Default for Trafo {
    fn default() -> Self {
        Self {
            id: TrafoId(0),
            name: String::new(),
            hv_bus: BusId(0),
            lv_bus: BusId(0),
        }
    }
}

/// Node variants of the network graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Bus(Bus),
    Gen(Gen),
    ExtGrid(ExtGrid),
    Load(Load),
}

/// Edge variants of the network graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Edge {
    Line(Line),
    Trafo(Trafo),
}

/// The main network container.
///
/// Wraps a petgraph undirected graph of [`Node`]/[`Edge`] plus the system
/// MVA base. Device nodes (Gen/ExtGrid/Load) are free-standing graph nodes
/// referencing their bus by ID; only buses participate in edges.
#[derive(Debug, Clone)]
pub struct Network {
    /// System apparent-power base (MVA), per-unit denominator everywhere
    pub sn_mva: f64,
    pub graph: Graph<Node, Edge, petgraph::Undirected>,
    bus_index: HashMap<BusId, NodeIndex>,
}

impl Network {
    pub fn new(sn_mva: f64) -> Self {
        Self {
            sn_mva,
            graph: Graph::new_undirected(),
            bus_index: HashMap::new(),
        }
    }

    /// Add a bus node and register it for edge attachment.
    pub fn add_bus(&mut self, bus: Bus) -> NodeIndex {
        let id = bus.id;
        let idx = self.graph.add_node(Node::Bus(bus));
        self.bus_index.insert(id, idx);
        idx
    }

    /// Graph index of a bus, if present.
    pub fn bus_node(&self, id: BusId) -> Option<NodeIndex> {
        self.bus_index.get(&id).copied()
    }

    /// Add a line edge between its two buses.
    ///
    /// Fails if either endpoint bus has not been added yet.
    pub fn add_line(&mut self, line: Line) -> VvoResult<()> {
        let from = self
            .bus_node(line.from_bus)
            .ok_or_else(|| VvoError::Network(format!("line {}: unknown from_bus {}", line.id, line.from_bus)))?;
        let to = self
            .bus_node(line.to_bus)
            .ok_or_else(|| VvoError::Network(format!("line {}: unknown to_bus {}", line.id, line.to_bus)))?;
        self.graph.add_edge(from, to, Edge::Line(line));
        Ok(())
    }

    /// Add a transformer edge between its two buses.
    pub fn add_trafo(&mut self, trafo: Trafo) -> VvoResult<()> {
        let hv = self
            .bus_node(trafo.hv_bus)
            .ok_or_else(|| VvoError::Network(format!("trafo {}: unknown hv_bus {}", trafo.id, trafo.hv_bus)))?;
        let lv = self
            .bus_node(trafo.lv_bus)
            .ok_or_else(|| VvoError::Network(format!("trafo {}: unknown lv_bus {}", trafo.id, trafo.lv_bus)))?;
        self.graph.add_edge(hv, lv, Edge::Trafo(trafo));
        Ok(())
    }

    pub fn add_gen(&mut self, gen: Gen) -> NodeIndex {
        self.graph.add_node(Node::Gen(gen))
    }

    pub fn add_ext_grid(&mut self, ext: ExtGrid) -> NodeIndex {
        self.graph.add_node(Node::ExtGrid(ext))
    }

    pub fn add_load(&mut self, load: Load) -> NodeIndex {
        self.graph.add_node(Node::Load(load))
    }

    /// All buses, in graph insertion order.
    pub fn buses(&self) -> Vec<&Bus> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Bus(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    /// All lines, in graph insertion order.
    pub fn lines(&self) -> Vec<&Line> {
        self.graph
            .edge_weights()
            .filter_map(|e| match e {
                Edge::Line(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn generators(&self) -> Vec<&Gen> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Gen(g) => Some(g),
                _ => None,
            })
            .collect()
    }

    pub fn ext_grids(&self) -> Vec<&ExtGrid> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::ExtGrid(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn loads(&self) -> Vec<&Load> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Load(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn trafos(&self) -> Vec<&Trafo> {
        self.graph
            .edge_weights()
            .filter_map(|e| match e {
                Edge::Trafo(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn bus(&self, id: BusId) -> Option<&Bus> {
        self.bus_node(id).and_then(|idx| match &self.graph[idx] {
            Node::Bus(b) => Some(b),
            _ => None,
        })
    }

    /// Generators attached to a bus.
    pub fn generators_at_bus(&self, bus: BusId) -> Vec<&Gen> {
        self.generators().into_iter().filter(|g| g.bus == bus).collect()
    }

    /// External grids attached to a bus.
    pub fn ext_grids_at_bus(&self, bus: BusId) -> Vec<&ExtGrid> {
        self.ext_grids().into_iter().filter(|e| e.bus == bus).collect()
    }

    /// Loads attached to a bus.
    pub fn loads_at_bus(&self, bus: BusId) -> Vec<&Load> {
        self.loads().into_iter().filter(|l| l.bus == bus).collect()
    }

    /// Total forecast demand (MW).
    pub fn total_load_mw(&self) -> f64 {
        self.loads().iter().map(|l| l.p_mw).sum()
    }

    /// Total scheduled generation (MW), in-service units only.
    pub fn total_generation_mw(&self) -> f64 {
        self.generators()
            .iter()
            .filter(|g| g.in_service)
            .map(|g| g.p_mw)
            .sum()
    }

    /// Summary counts for logging and quick sanity checks.
    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            n_bus: self.buses().len(),
            n_line: self.lines().len(),
            n_gen: self.generators().len(),
            n_ext_grid: self.ext_grids().len(),
            n_load: self.loads().len(),
            n_trafo: self.trafos().len(),
        }
    }

    /// Run structural validation, appending issues to `diag`.
    ///
    /// Collected rather than fail-fast so a case review reports every
    /// problem at once. Hard failures are raised by the consumers that
    /// cannot proceed (extraction, model build).
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        if self.sn_mva <= 0.0 {
            diag.error(format!("sn_mva must be positive, got {}", self.sn_mva));
        }
        if self.buses().is_empty() {
            diag.error("network has no buses".to_string());
        }
        for bus in self.buses() {
            if bus.min_vm_pu > bus.max_vm_pu {
                diag.error(format!(
                    "bus {}: inverted voltage bounds [{}, {}]",
                    bus.id, bus.min_vm_pu, bus.max_vm_pu
                ));
            }
            if bus.vn_kv <= 0.0 {
                diag.warning(format!("bus {}: non-positive vn_kv {}", bus.id, bus.vn_kv));
            }
        }
        for gen in self.generators() {
            if self.bus(gen.bus).is_none() {
                diag.error(format!("gen {}: unknown bus {}", gen.id, gen.bus));
            }
            if gen.min_q_mvar > gen.max_q_mvar {
                diag.error(format!(
                    "gen {}: inverted reactive bounds [{}, {}]",
                    gen.id, gen.min_q_mvar, gen.max_q_mvar
                ));
            }
            if gen.min_p_mw > gen.max_p_mw {
                diag.error(format!(
                    "gen {}: inverted active bounds [{}, {}]",
                    gen.id, gen.min_p_mw, gen.max_p_mw
                ));
            }
        }
        for ext in self.ext_grids() {
            if self.bus(ext.bus).is_none() {
                diag.error(format!("ext_grid {}: unknown bus {}", ext.id, ext.bus));
            }
        }
        for load in self.loads() {
            if self.bus(load.bus).is_none() {
                diag.error(format!("load {}: unknown bus {}", load.id, load.bus));
            }
        }
    }
}

/// Counts of each element family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub n_bus: usize,
    pub n_line: usize,
    pub n_gen: usize,
    pub n_ext_grid: usize,
    pub n_load: usize,
    pub n_trafo: usize,
}
