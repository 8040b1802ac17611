//! Operating-point adapter: the seam to the external AC load-flow solver.
//!
//! The optimization core never runs a power flow itself. It requires, for
//! each period, a feasible AC operating point (within solver tolerance)
//! to seed variable initialization and the adjustment terms. That point
//! comes from whatever implements [`OperatingPointSource`].
//!
//! The shipped implementation, [`ScriptedOperatingPoints`], replays
//! recorded load-flow results (a JSON fixture produced by an external
//! solver run). Tests and the CLI both use it; a live adapter wrapping an
//! actual load-flow library plugs in behind the same trait.
//!
//! ## Load scaling
//!
//! Per-period demand and scheduled generation are scaled multiplicatively:
//! a fixed hourly profile (24 known multipliers) times a global study
//! multiplier. [`LoadProfile::scale`] computes the factor handed to the
//! adapter; a live adapter applies it to the case before solving, a replay
//! adapter has it baked into the recorded results.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;
use vvo_core::{BusId, ExtGridId, GenId, LineId, LoadId, Period};

/// Adapter failures (load flow or ward reduction).
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no operating point recorded for period {0}")]
    MissingPeriod(Period),

    #[error("operating point for period {period} is missing {what}")]
    MissingValue { period: Period, what: String },

    #[error("no equivalent recorded for area {area} period {period}")]
    MissingArea { area: String, period: Period },

    #[error("scale factor requested for period {0} outside the profile")]
    PeriodOutOfProfile(Period),

    #[error("adapter I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("adapter parse error: {0}")]
    Parse(String),

    #[error("external solver failure: {0}")]
    External(String),
}

/// Four flow values of one physical line at the operating point (per-unit).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LineFlow {
    pub p_from: f64,
    pub q_from: f64,
    pub p_to: f64,
    pub q_to: f64,
}

/// One period's solved AC state, everything per-unit (angles in radians).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatingPoint {
    pub bus_vm: HashMap<BusId, f64>,
    pub bus_va_rad: HashMap<BusId, f64>,
    pub line_flow: HashMap<LineId, LineFlow>,
    pub gen_p: HashMap<GenId, f64>,
    pub gen_q: HashMap<GenId, f64>,
    pub slack_p: HashMap<ExtGridId, f64>,
    pub slack_q: HashMap<ExtGridId, f64>,
    /// Solved (scaled) demand per load record.
    pub load_p: HashMap<LoadId, f64>,
    pub load_q: HashMap<LoadId, f64>,
}

impl OperatingPoint {
    /// Voltage magnitude at a bus; missing buses are a data error upstream.
    pub fn vm(&self, bus: BusId, period: Period) -> Result<f64, AdapterError> {
        self.bus_vm.get(&bus).copied().ok_or_else(|| AdapterError::MissingValue {
            period,
            what: format!("vm at bus {bus}"),
        })
    }

    /// Voltage angle (radians) at a bus.
    pub fn va(&self, bus: BusId, period: Period) -> Result<f64, AdapterError> {
        self.bus_va_rad
            .get(&bus)
            .copied()
            .ok_or_else(|| AdapterError::MissingValue {
                period,
                what: format!("va at bus {bus}"),
            })
    }

    /// Flow record of a line.
    pub fn flow(&self, line: LineId, period: Period) -> Result<LineFlow, AdapterError> {
        self.line_flow
            .get(&line)
            .copied()
            .ok_or_else(|| AdapterError::MissingValue {
                period,
                what: format!("flow on line {line}"),
            })
    }
}

/// Source of per-period operating points. The external AC load-flow
/// solver sits behind this trait.
pub trait OperatingPointSource {
    /// Solved operating point for `period`, with demand and scheduled
    /// generation scaled by `scale`.
    fn operating_point(&self, period: Period, scale: f64) -> Result<OperatingPoint, AdapterError>;
}

/// Replay adapter: recorded load-flow results keyed by period.
///
/// The `scale` argument is ignored on replay; the recorded results were
/// produced under the same schedule the study requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptedOperatingPoints {
    pub points: BTreeMap<Period, OperatingPoint>,
}

impl ScriptedOperatingPoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, period: Period, op: OperatingPoint) {
        self.points.insert(period, op);
    }

    /// Load a recorded fixture from JSON.
    pub fn from_path(path: &Path) -> Result<Self, AdapterError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| AdapterError::Parse(format!("{}: {e}", path.display())))
    }

    pub fn to_path(&self, path: &Path) -> Result<(), AdapterError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| AdapterError::Parse(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

impl OperatingPointSource for ScriptedOperatingPoints {
    fn operating_point(&self, period: Period, _scale: f64) -> Result<OperatingPoint, AdapterError> {
        self.points
            .get(&period)
            .cloned()
            .ok_or(AdapterError::MissingPeriod(period))
    }
}

/// The multiplicative load schedule: 24 hourly multipliers and one global
/// study multiplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadProfile {
    /// Hourly multipliers, index 0 is period 1.
    pub hourly: Vec<f64>,
    /// Global multiplier applied on top of the hourly curve.
    pub multiplier: f64,
}

impl LoadProfile {
    /// The standard daily curve used across the supported systems.
    pub fn day_curve(multiplier: f64) -> Self {
        Self {
            hourly: vec![
                0.63, 0.62, 0.60, 0.58, 0.59, 0.65, 0.72, 0.85, 0.95, 0.99, 1.00, 0.99, 0.93,
                0.92, 0.90, 0.88, 0.90, 0.90, 0.96, 0.98, 0.96, 0.90, 0.80, 0.70,
            ],
            multiplier,
        }
    }

    /// Combined scale factor for a period.
    pub fn scale(&self, period: Period) -> Result<f64, AdapterError> {
        let idx = period.value().checked_sub(1).ok_or(AdapterError::PeriodOutOfProfile(period))?;
        self.hourly
            .get(idx)
            .map(|h| h * self.multiplier)
            .ok_or(AdapterError::PeriodOutOfProfile(period))
    }

    pub fn n_periods(&self) -> usize {
        self.hourly.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_scale_combines_curve_and_multiplier() {
        let profile = LoadProfile::day_curve(0.75);
        assert!((profile.scale(Period::new(1)).unwrap() - 0.63 * 0.75).abs() < 1e-12);
        assert!((profile.scale(Period::new(11)).unwrap() - 1.00 * 0.75).abs() < 1e-12);
        assert!((profile.scale(Period::new(24)).unwrap() - 0.70 * 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_profile_rejects_out_of_range_period() {
        let profile = LoadProfile::day_curve(1.0);
        assert!(profile.scale(Period::new(25)).is_err());
        assert!(profile.scale(Period::new(0)).is_err());
    }

    #[test]
    fn test_scripted_replay_and_missing_period() {
        let mut scripted = ScriptedOperatingPoints::new();
        let mut op = OperatingPoint::default();
        op.bus_vm.insert(BusId::new(0), 1.02);
        scripted.insert(Period::new(1), op);

        let got = scripted.operating_point(Period::new(1), 0.5).unwrap();
        assert!((got.bus_vm[&BusId::new(0)] - 1.02).abs() < 1e-12);

        let err = scripted.operating_point(Period::new(2), 0.5).unwrap_err();
        assert!(matches!(err, AdapterError::MissingPeriod(p) if p == Period::new(2)));
    }

    #[test]
    fn test_scripted_json_roundtrip() {
        let mut scripted = ScriptedOperatingPoints::new();
        let mut op = OperatingPoint::default();
        op.bus_vm.insert(BusId::new(3), 0.98);
        op.line_flow.insert(
            LineId::new(0),
            LineFlow {
                p_from: 0.4,
                q_from: 0.1,
                p_to: -0.39,
                q_to: -0.08,
            },
        );
        scripted.insert(Period::new(2), op);

        let text = serde_json::to_string(&scripted).unwrap();
        let back: ScriptedOperatingPoints = serde_json::from_str(&text).unwrap();
        let op = &back.points[&Period::new(2)];
        assert!((op.bus_vm[&BusId::new(3)] - 0.98).abs() < 1e-12);
        assert!((op.line_flow[&LineId::new(0)].p_to + 0.39).abs() < 1e-12);
    }
}
