//! Per-system study configuration.
//!
//! Each supported test system carries a preset: which buses host switched
//! shunt compensation, which buses are pilot nodes (voltage anchored in
//! the objective), the area partition for multi-area runs, the objective
//! weights, and the load schedule. These were inline conditionals keyed by
//! system name in earlier tooling; here they are explicit records that can
//! be persisted and reviewed.

use serde::{Deserialize, Serialize};
use vvo_core::{BusId, VvoError, VvoResult};

use crate::loadflow::LoadProfile;
use crate::model::ModelConfig;
use crate::ward::AreaSpec;

/// Objective weights, tuned per system.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    /// k1: quadratic penalty on shunt step changes between consecutive hours
    pub switching: f64,
    /// k2: quadratic penalty on pilot-bus voltage deviation from the seed
    pub pilot_deviation: f64,
    /// k3: quadratic penalty on reactive generation
    pub reactive_effort: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            switching: 1e-2,
            pilot_deviation: 3e2,
            reactive_effort: 1e1,
        }
    }
}

/// Full per-system study preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPreset {
    pub name: String,
    /// Buses with switched shunt compensation devices.
    pub shunt_buses: Vec<BusId>,
    /// Pilot nodes whose voltage the objective anchors.
    pub pilot_buses: Vec<BusId>,
    /// Area partition for multi-area runs (empty if unsupported).
    pub areas: Vec<AreaSpec>,
    pub weights: ObjectiveWeights,
    /// Hourly schedule for single-system runs.
    pub profile: LoadProfile,
    /// Global multiplier override for multi-area runs.
    pub area_multiplier: f64,
    /// Feasibility tolerance for the balance and relaxed-flow constraints.
    pub epsilon: f64,
    /// Relax the reactive flow equalities to an absolute-difference
    /// tolerance. Numeric workaround for systems whose extracted line
    /// parameters are not exactly consistent with the discretized
    /// operating point.
    pub reactive_abs_tolerance: bool,
    /// Headroom factor applied to the apparent-power adjustment.
    pub apparent_headroom: f64,
}

impl SystemPreset {
    /// Look up a preset by system name.
    ///
    /// Unknown names fail fast with a configuration error instead of
    /// letting downstream stages trip over a missing network.
    pub fn by_name(name: &str) -> VvoResult<Self> {
        match name {
            "ieee9" => Ok(Self::ieee9()),
            "ieee39" => Ok(Self::ieee39()),
            "ieee57" => Ok(Self::ieee57()),
            "ieee118" => Ok(Self::ieee118()),
            other => Err(VvoError::Config(format!("unsupported system: {other}"))),
        }
    }

    /// Names accepted by [`SystemPreset::by_name`].
    pub fn supported() -> &'static [&'static str] {
        &["ieee9", "ieee39", "ieee57", "ieee118"]
    }

    pub fn ieee9() -> Self {
        Self {
            name: "ieee9".to_string(),
            shunt_buses: bus_ids(&[6, 8, 4]),
            pilot_buses: bus_ids(&[0, 1, 2, 3, 4, 5, 6, 7, 8]),
            areas: vec![
                AreaSpec {
                    name: "A1".to_string(),
                    border: bus_ids(&[6, 8]),
                    internal: bus_ids(&[7]),
                },
                AreaSpec {
                    name: "A2".to_string(),
                    border: bus_ids(&[6, 8]),
                    internal: bus_ids(&[5]),
                },
            ],
            weights: ObjectiveWeights::default(),
            profile: LoadProfile::day_curve(0.75),
            area_multiplier: 1.15,
            epsilon: 1e-8,
            reactive_abs_tolerance: false,
            apparent_headroom: 1.2,
        }
    }

    pub fn ieee39() -> Self {
        Self {
            name: "ieee39".to_string(),
            shunt_buses: bus_ids(&[14, 2, 22, 25]),
            pilot_buses: bus_ids(&[1, 25, 7, 5, 22, 18]),
            areas: vec![
                AreaSpec {
                    name: "A1".to_string(),
                    border: bus_ids(&[38, 2, 16]),
                    internal: bus_ids(&[25]),
                },
                AreaSpec {
                    name: "A2".to_string(),
                    border: bus_ids(&[38, 2, 13]),
                    internal: bus_ids(&[4]),
                },
                AreaSpec {
                    name: "A3".to_string(),
                    border: bus_ids(&[16, 13]),
                    internal: bus_ids(&[22]),
                },
            ],
            weights: ObjectiveWeights::default(),
            profile: LoadProfile::day_curve(0.75),
            area_multiplier: 1.15,
            epsilon: 1e-6,
            reactive_abs_tolerance: true,
            apparent_headroom: 1.2,
        }
    }

    pub fn ieee57() -> Self {
        Self {
            name: "ieee57".to_string(),
            shunt_buses: bus_ids(&[22, 34, 24, 52, 29, 30]),
            pilot_buses: bus_ids(&[0, 3, 9, 11, 12, 21, 28, 30, 35, 40, 47]),
            areas: Vec::new(),
            weights: ObjectiveWeights::default(),
            profile: LoadProfile::day_curve(0.75),
            area_multiplier: 1.15,
            epsilon: 1e-8,
            reactive_abs_tolerance: false,
            apparent_headroom: 1.2,
        }
    }

    pub fn ieee118() -> Self {
        Self {
            name: "ieee118".to_string(),
            shunt_buses: bus_ids(&[51, 50, 21, 56, 78]),
            pilot_buses: bus_ids(&[
                68, 4, 36, 55, 76, 65, 45, 22, 11, 69, 16, 62, 79, 7, 48, 31,
            ]),
            areas: Vec::new(),
            weights: ObjectiveWeights::default(),
            profile: LoadProfile::day_curve(0.75),
            area_multiplier: 1.15,
            epsilon: 1e-6,
            reactive_abs_tolerance: true,
            apparent_headroom: 1.2,
        }
    }

    /// Model configuration derived from the preset's tolerances.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            epsilon: self.epsilon,
            reactive_abs_tolerance: self.reactive_abs_tolerance,
            apparent_headroom: self.apparent_headroom,
            ..ModelConfig::default()
        }
    }
}

fn bus_ids(values: &[usize]) -> Vec<BusId> {
    values.iter().map(|&v| BusId::new(v)).collect()
}
