//! Equivalent-network reducer: the seam to the external Ward reduction.
//!
//! Multi-area studies split the system into named areas. Each area keeps
//! its border and internal buses and replaces the rest of the system with
//! equivalent injections at the border nodes (a Ward equivalent). The
//! numerical reduction itself is an external routine behind
//! [`WardReducer`]; this module defines the area partition, the injection
//! values, and a replay implementation for recorded reductions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use thiserror::Error;
use vvo_core::{BusId, CaseFile, Network, Period};

use crate::loadflow::AdapterError;

/// One area of the partition: border buses shared with neighbors, internal
/// buses kept, everything else reduced away.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaSpec {
    pub name: String,
    pub border: Vec<BusId>,
    pub internal: Vec<BusId>,
}

/// Partition validation failures.
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("area {area}: bus {bus} is both border and internal")]
    BorderInternalOverlap { area: String, bus: BusId },

    #[error("bus {bus} is internal to both {first} and {second}")]
    InternalOverlap { first: String, second: String, bus: BusId },

    #[error("area {area}: border bus {bus} is not shared with any other area")]
    UnsharedBorder { area: String, bus: BusId },
}

/// Check the partition invariant: internal sets are pairwise disjoint and
/// disjoint from their own border; with more than one area every border
/// bus is shared with at least one neighbor.
pub fn validate_partition(areas: &[AreaSpec]) -> Result<(), PartitionError> {
    let mut internal_owner: HashMap<BusId, &str> = HashMap::new();
    for area in areas {
        let border: HashSet<BusId> = area.border.iter().copied().collect();
        for bus in &area.internal {
            if border.contains(bus) {
                return Err(PartitionError::BorderInternalOverlap {
                    area: area.name.clone(),
                    bus: *bus,
                });
            }
            if let Some(first) = internal_owner.insert(*bus, &area.name) {
                return Err(PartitionError::InternalOverlap {
                    first: first.to_string(),
                    second: area.name.clone(),
                    bus: *bus,
                });
            }
        }
    }
    if areas.len() > 1 {
        for area in areas {
            for bus in &area.border {
                let shared = areas
                    .iter()
                    .filter(|other| other.name != area.name)
                    .any(|other| other.border.contains(bus));
                if !shared {
                    return Err(PartitionError::UnsharedBorder {
                        area: area.name.clone(),
                        bus: *bus,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Equivalent injection at one border bus (per-unit).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WardInjection {
    pub p: f64,
    pub q: f64,
}

/// Per-period equivalent: injections at each of the area's border buses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardEquivalent {
    pub injections: HashMap<BusId, WardInjection>,
}

/// External Ward-reduction routine.
pub trait WardReducer {
    /// The reduced network for an area: border and internal buses plus the
    /// equivalent elements, as produced by the external reduction.
    fn reduced_network(&self, area: &AreaSpec) -> Result<Network, AdapterError>;

    /// Border injections for an area at a given period and scale.
    fn injections(&self, area: &AreaSpec, period: Period, scale: f64)
        -> Result<WardEquivalent, AdapterError>;
}

/// Replay reducer: recorded reduced cases and injections keyed by area.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptedWardReducer {
    /// Reduced case per area name.
    pub cases: HashMap<String, CaseFile>,
    /// Injections per area name, per period.
    pub injections: HashMap<String, BTreeMap<Period, WardEquivalent>>,
}

impl ScriptedWardReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: &Path) -> Result<Self, AdapterError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| AdapterError::Parse(format!("{}: {e}", path.display())))
    }
}

impl WardReducer for ScriptedWardReducer {
    fn reduced_network(&self, area: &AreaSpec) -> Result<Network, AdapterError> {
        let case = self
            .cases
            .get(&area.name)
            .cloned()
            .ok_or_else(|| AdapterError::External(format!("no reduced case for area {}", area.name)))?;
        case.into_network()
            .map_err(|e| AdapterError::External(e.to_string()))
    }

    fn injections(
        &self,
        area: &AreaSpec,
        period: Period,
        _scale: f64,
    ) -> Result<WardEquivalent, AdapterError> {
        self.injections
            .get(&area.name)
            .and_then(|per_period| per_period.get(&period))
            .cloned()
            .ok_or_else(|| AdapterError::MissingArea {
                area: area.name.clone(),
                period,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(name: &str, border: &[usize], internal: &[usize]) -> AreaSpec {
        AreaSpec {
            name: name.to_string(),
            border: border.iter().map(|&b| BusId::new(b)).collect(),
            internal: internal.iter().map(|&b| BusId::new(b)).collect(),
        }
    }

    #[test]
    fn test_valid_partition() {
        let areas = vec![area("A1", &[6, 8], &[7]), area("A2", &[6, 8], &[5])];
        assert!(validate_partition(&areas).is_ok());
    }

    #[test]
    fn test_border_internal_overlap_rejected() {
        let areas = vec![area("A1", &[6, 8], &[6])];
        assert!(matches!(
            validate_partition(&areas),
            Err(PartitionError::BorderInternalOverlap { .. })
        ));
    }

    #[test]
    fn test_internal_overlap_rejected() {
        let areas = vec![area("A1", &[6], &[7]), area("A2", &[6], &[7])];
        assert!(matches!(
            validate_partition(&areas),
            Err(PartitionError::InternalOverlap { .. })
        ));
    }

    #[test]
    fn test_unshared_border_rejected() {
        let areas = vec![area("A1", &[6, 3], &[7]), area("A2", &[6], &[5])];
        assert!(matches!(
            validate_partition(&areas),
            Err(PartitionError::UnsharedBorder { .. })
        ));
    }

    #[test]
    fn test_scripted_injection_lookup() {
        let mut reducer = ScriptedWardReducer::new();
        let mut eq = WardEquivalent::default();
        eq.injections.insert(BusId::new(6), WardInjection { p: 0.2, q: -0.05 });
        reducer
            .injections
            .entry("A1".to_string())
            .or_default()
            .insert(Period::new(1), eq);

        let a1 = area("A1", &[6, 8], &[7]);
        let got = reducer.injections(&a1, Period::new(1), 1.0).unwrap();
        assert!((got.injections[&BusId::new(6)].p - 0.2).abs() < 1e-12);

        let err = reducer.injections(&a1, Period::new(2), 1.0).unwrap_err();
        assert!(matches!(err, AdapterError::MissingArea { .. }));
    }
}
