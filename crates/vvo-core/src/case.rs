//! Serializable tabular case representation.
//!
//! A [`CaseFile`] mirrors the flat element tables of the source data
//! (bus/line/gen/ext_grid/load/trafo) and converts into the graph-backed
//! [`Network`]. This is the on-disk JSON form consumed by the CLI; tests
//! and library users can also build a `Network` directly.

use crate::{Bus, ExtGrid, Gen, Line, Load, Network, Trafo, VvoError, VvoResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Flat tabular case, one vector per element family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseFile {
    /// System apparent-power base (MVA)
    pub sn_mva: f64,
    #[serde(default)]
    pub buses: Vec<Bus>,
    #[serde(default)]
    pub lines: Vec<Line>,
    #[serde(default)]
    pub gens: Vec<Gen>,
    #[serde(default)]
    pub ext_grids: Vec<ExtGrid>,
    #[serde(default)]
    pub loads: Vec<Load>,
    #[serde(default)]
    pub trafos: Vec<Trafo>,
}

impl CaseFile {
    /// Load a case from a JSON file.
    pub fn from_path(path: &Path) -> VvoResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| VvoError::Parse(format!("{}: {e}", path.display())))
    }

    /// Write the case to a JSON file.
    pub fn to_path(&self, path: &Path) -> VvoResult<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| VvoError::Parse(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Build the graph-backed network.
    ///
    /// Buses first, then edges and devices; a line or trafo referencing a
    /// bus missing from the bus table is a hard error (no partial network).
    pub fn into_network(self) -> VvoResult<Network> {
        if self.sn_mva <= 0.0 {
            return Err(VvoError::Validation(format!(
                "case sn_mva must be positive, got {}",
                self.sn_mva
            )));
        }
        let mut net = Network::new(self.sn_mva);
        for bus in self.buses {
            net.add_bus(bus);
        }
        for line in self.lines {
            net.add_line(line)?;
        }
        for trafo in self.trafos {
            net.add_trafo(trafo)?;
        }
        for gen in self.gens {
            net.add_gen(gen);
        }
        for ext in self.ext_grids {
            net.add_ext_grid(ext);
        }
        for load in self.loads {
            net.add_load(load);
        }
        Ok(net)
    }
}
