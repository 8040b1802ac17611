//! End-to-end pipeline: case -> seeds -> adjustments -> model -> solve ->
//! CSV export, for the single-system and multi-area drivers.

use std::collections::{BTreeMap, HashMap};

use vvo_algo::{
    run_area_study, run_study, AreaSpec, LineFlow, LoadProfile, MinlpBackend, MinlpSolution,
    ModelConfig, ObjectiveWeights, OperatingPoint, ScriptedOperatingPoints, ScriptedWardReducer,
    SeedPointBackend, SolveStatus, SolverError, SolverOptions, SystemPreset, VvoProblem,
    WardEquivalent, WardInjection,
};
use vvo_core::{
    Bus, BusId, CaseFile, ExtGrid, ExtGridId, Gen, GenId, Line, LineId, Load, LoadId, Network,
    Period, Trafo, TrafoId,
};

const T: usize = 2;

fn test_case() -> CaseFile {
    CaseFile {
        sn_mva: 100.0,
        buses: (0..3)
            .map(|i| Bus {
                id: BusId::new(i),
                name: format!("b{i}"),
                vn_kv: 230.0,
                ..Bus::default()
            })
            .collect(),
        lines: vec![
            Line {
                id: LineId::new(0),
                from_bus: BusId::new(0),
                to_bus: BusId::new(1),
                r_ohm_per_km: 0.02,
                x_ohm_per_km: 0.08,
                length_km: 10.0,
                max_i_ka: 0.6,
                ..Line::default()
            },
            Line {
                id: LineId::new(1),
                from_bus: BusId::new(1),
                to_bus: BusId::new(2),
                r_ohm_per_km: 0.03,
                x_ohm_per_km: 0.11,
                length_km: 8.0,
                max_i_ka: 0.5,
                ..Line::default()
            },
        ],
        gens: vec![Gen {
            id: GenId::new(0),
            bus: BusId::new(0),
            min_p_mw: 0.0,
            max_p_mw: 200.0,
            min_q_mvar: -80.0,
            max_q_mvar: 80.0,
            ..Gen::default()
        }],
        ext_grids: vec![ExtGrid {
            id: ExtGridId::new(0),
            bus: BusId::new(2),
            ..ExtGrid::default()
        }],
        loads: vec![Load {
            id: LoadId::new(0),
            bus: BusId::new(1),
            p_mw: 60.0,
            q_mvar: 20.0,
            ..Load::default()
        }],
        trafos: vec![Trafo {
            id: TrafoId::new(0),
            hv_bus: BusId::new(1),
            lv_bus: BusId::new(2),
            ..Trafo::default()
        }],
    }
}

fn test_network() -> Network {
    test_case().into_network().unwrap()
}

fn scripted_source() -> ScriptedOperatingPoints {
    let mut source = ScriptedOperatingPoints::new();
    for t in 1..=T {
        let f = 1.0 + 0.03 * t as f64;
        let mut op = OperatingPoint::default();
        op.bus_vm.insert(BusId::new(0), 1.02);
        op.bus_vm.insert(BusId::new(1), 0.98);
        op.bus_vm.insert(BusId::new(2), 1.00);
        op.bus_va_rad.insert(BusId::new(0), 0.0);
        op.bus_va_rad.insert(BusId::new(1), -0.02 * f);
        op.bus_va_rad.insert(BusId::new(2), -0.04 * f);
        op.line_flow.insert(
            LineId::new(0),
            LineFlow {
                p_from: 0.40 * f,
                q_from: 0.10 * f,
                p_to: -0.39 * f,
                q_to: -0.09 * f,
            },
        );
        op.line_flow.insert(
            LineId::new(1),
            LineFlow {
                p_from: -0.21 * f,
                q_from: -0.06 * f,
                p_to: 0.22 * f,
                q_to: 0.07 * f,
            },
        );
        op.gen_p.insert(GenId::new(0), 0.40 * f);
        op.gen_q.insert(GenId::new(0), 0.10 * f);
        op.slack_p.insert(ExtGridId::new(0), 0.22 * f);
        op.slack_q.insert(ExtGridId::new(0), 0.07 * f);
        op.load_p.insert(LoadId::new(0), 0.60 * f);
        op.load_q.insert(LoadId::new(0), 0.20 * f);
        source.insert(Period::new(t), op);
    }
    source
}

fn test_preset() -> SystemPreset {
    SystemPreset {
        name: "testsys".to_string(),
        shunt_buses: vec![BusId::new(1)],
        pilot_buses: vec![BusId::new(0), BusId::new(1), BusId::new(2)],
        areas: vec![AreaSpec {
            name: "A1".to_string(),
            border: vec![BusId::new(0), BusId::new(2)],
            internal: vec![BusId::new(1)],
        }],
        weights: ObjectiveWeights::default(),
        profile: LoadProfile::day_curve(0.75),
        area_multiplier: 1.15,
        epsilon: 1e-8,
        reactive_abs_tolerance: false,
        apparent_headroom: 1.2,
    }
}

fn test_cfg() -> ModelConfig {
    ModelConfig {
        horizon: T,
        ..ModelConfig::default()
    }
}

#[test]
fn full_pipeline_exports_every_family() {
    let net = test_network();
    let preset = test_preset();
    let source = scripted_source();
    let backend = SeedPointBackend::default();
    let tmp = tempfile::tempdir().unwrap();

    let outcome = run_study(
        &net,
        &preset,
        test_cfg(),
        &source,
        &backend,
        &SolverOptions::default(),
        Some(tmp.path()),
    )
    .unwrap();

    assert_eq!(outcome.status, SolveStatus::Optimal);
    assert!(outcome.objective.is_some());
    assert_eq!(outcome.n_periods, T);
    assert!(!outcome.exported.is_empty());

    let dir = tmp.path().join("testsys");
    for family in ["v_bus", "theta_bus", "p_line_ij", "q_line_ji", "p_gen", "shunt_step"] {
        let path = dir.join(format!("{family}_res.csv"));
        assert!(path.exists(), "missing {family} result file");
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Var,Value"), "{family}: bad header");
        assert!(text.lines().count() > 1, "{family}: no rows");
    }
    for family in ["pd", "qd", "v_bus", "p_slack"] {
        let path = dir.join(format!("{family}_init.csv"));
        assert!(path.exists(), "missing {family} init file");
    }
}

#[test]
fn v_bus_rows_are_keyed_bus_comma_period() {
    let net = test_network();
    let preset = test_preset();
    let source = scripted_source();
    let backend = SeedPointBackend::default();
    let tmp = tempfile::tempdir().unwrap();

    run_study(
        &net,
        &preset,
        test_cfg(),
        &source,
        &backend,
        &SolverOptions::default(),
        Some(tmp.path()),
    )
    .unwrap();

    let text =
        std::fs::read_to_string(tmp.path().join("testsys").join("v_bus_res.csv")).unwrap();
    // 3 buses x 2 periods + header
    assert_eq!(text.lines().count(), 1 + 3 * T);
    assert!(text.contains("\"0,1\""), "expected composite key quoting");
}

struct StalledBackend;

impl MinlpBackend for StalledBackend {
    fn name(&self) -> &str {
        "stalled"
    }

    fn solve(
        &self,
        problem: &VvoProblem,
        _options: &SolverOptions,
    ) -> Result<MinlpSolution, SolverError> {
        Ok(MinlpSolution {
            status: SolveStatus::IterationLimit,
            objective: f64::NAN,
            values: problem.initial_point(),
            iterations: 1000,
        })
    }
}

#[test]
fn failed_solve_skips_export_and_reports_status() {
    let net = test_network();
    let preset = test_preset();
    let source = scripted_source();
    let tmp = tempfile::tempdir().unwrap();

    let outcome = run_study(
        &net,
        &preset,
        test_cfg(),
        &source,
        &StalledBackend,
        &SolverOptions::default(),
        Some(tmp.path()),
    )
    .unwrap();

    assert_eq!(outcome.status, SolveStatus::IterationLimit);
    assert!(outcome.objective.is_none());
    assert!(outcome.exported.is_empty());
    assert!(!tmp.path().join("testsys").join("v_bus_res.csv").exists());
}

#[test]
fn missing_operating_point_period_fails_the_study() {
    let net = test_network();
    let preset = test_preset();
    let mut source = scripted_source();
    source.points.remove(&Period::new(2));
    let backend = SeedPointBackend::default();

    let result = run_study(
        &net,
        &preset,
        test_cfg(),
        &source,
        &backend,
        &SolverOptions::default(),
        None,
    );
    assert!(result.is_err());
}

#[test]
fn area_study_runs_with_ward_injections() {
    let preset = test_preset();
    let backend = SeedPointBackend::default();
    let tmp = tempfile::tempdir().unwrap();

    // The reduced case for A1 is the full case here; what matters is the
    // ward injections entering the balances and the adjustments alike.
    let mut reducer = ScriptedWardReducer::new();
    reducer.cases.insert("A1".to_string(), test_case());
    let mut per_period = BTreeMap::new();
    for t in 1..=T {
        let mut eq = WardEquivalent::default();
        eq.injections
            .insert(BusId::new(0), WardInjection { p: 0.05, q: 0.01 });
        eq.injections
            .insert(BusId::new(2), WardInjection { p: -0.03, q: 0.02 });
        per_period.insert(Period::new(t), eq);
    }
    reducer.injections.insert("A1".to_string(), per_period);

    let mut sources: HashMap<String, ScriptedOperatingPoints> = HashMap::new();
    sources.insert("A1".to_string(), scripted_source());

    let outcomes = run_area_study(
        &preset,
        test_cfg(),
        &sources,
        &reducer,
        &backend,
        &SolverOptions::default(),
        Some(tmp.path()),
    )
    .unwrap();

    assert_eq!(outcomes.len(), 1);
    let (area, outcome) = &outcomes[0];
    assert_eq!(area, "A1");
    assert_eq!(outcome.status, SolveStatus::Optimal);

    let path = tmp.path().join("testsys").join("v_bus_area_A1_res.csv");
    assert!(path.exists(), "area-infixed result file expected");
}

#[test]
fn scaled_periods_keep_voltages_in_a_bounded_band() {
    // Adapter sanity: across the scaled hours, the recorded voltage
    // magnitudes stay within a bounded deviation of the first hour. A
    // replay whose voltages wander outside the band would poison the
    // adjustments.
    use vvo_algo::OperatingPointSource;

    let preset = test_preset();
    let source = scripted_source();
    let base = source
        .operating_point(Period::new(1), preset.profile.scale(Period::new(1)).unwrap())
        .unwrap();
    for t in 2..=T {
        let scale = preset.profile.scale(Period::new(t)).unwrap();
        let op = source.operating_point(Period::new(t), scale).unwrap();
        for (bus, vm) in &op.bus_vm {
            let dv = (vm - base.bus_vm[bus]).abs();
            assert!(dv < 0.1, "bus {bus} voltage drifted {dv} at hour {t}");
        }
    }
}

#[test]
fn area_study_without_areas_is_rejected() {
    let mut preset = test_preset();
    preset.areas.clear();
    let sources: HashMap<String, ScriptedOperatingPoints> = HashMap::new();
    let reducer = ScriptedWardReducer::new();
    let backend = SeedPointBackend::default();

    let result = run_area_study(
        &preset,
        test_cfg(),
        &sources,
        &reducer,
        &backend,
        &SolverOptions::default(),
        None,
    );
    assert!(matches!(result, Err(vvo_algo::StudyError::NoAreas(_))));
}
