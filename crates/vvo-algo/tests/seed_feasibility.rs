//! The central round-trip law: after the adjustment terms are installed,
//! the seeded operating point satisfies every model constraint within the
//! declared tolerance, and every initialized variable sits inside its
//! bounds.

use std::collections::BTreeMap;

use vvo_algo::{
    compute_adjustments, extract, AdjustConfig, LineFlow, ModelBuilder, ModelConfig, ModelError,
    ObjectiveWeights, OperatingPoint, ShuntRepr, VvoProblem,
};
use vvo_core::{
    Bus, BusId, ExtGrid, ExtGridId, Gen, GenId, Line, LineId, Load, LoadId, Network, Period,
    Trafo, TrafoId,
};

const T: usize = 2;

fn test_network() -> Network {
    let mut net = Network::new(100.0);
    for i in 0..3 {
        net.add_bus(Bus {
            id: BusId::new(i),
            name: format!("b{i}"),
            vn_kv: 230.0,
            ..Bus::default()
        });
    }
    net.add_line(Line {
        id: LineId::new(0),
        from_bus: BusId::new(0),
        to_bus: BusId::new(1),
        r_ohm_per_km: 0.02,
        x_ohm_per_km: 0.08,
        length_km: 10.0,
        max_i_ka: 0.6,
        ..Line::default()
    })
    .unwrap();
    net.add_line(Line {
        id: LineId::new(1),
        from_bus: BusId::new(1),
        to_bus: BusId::new(2),
        r_ohm_per_km: 0.03,
        x_ohm_per_km: 0.11,
        length_km: 8.0,
        max_i_ka: 0.5,
        ..Line::default()
    })
    .unwrap();
    net.add_trafo(Trafo {
        id: TrafoId::new(0),
        hv_bus: BusId::new(1),
        lv_bus: BusId::new(2),
        ..Trafo::default()
    })
    .unwrap();
    net.add_gen(Gen {
        id: GenId::new(0),
        bus: BusId::new(0),
        min_p_mw: 0.0,
        max_p_mw: 200.0,
        min_q_mvar: -10.0,
        max_q_mvar: 10.0,
        ..Gen::default()
    });
    net.add_ext_grid(ExtGrid {
        id: ExtGridId::new(0),
        bus: BusId::new(2),
        ..ExtGrid::default()
    });
    net.add_load(Load {
        id: LoadId::new(0),
        bus: BusId::new(1),
        p_mw: 60.0,
        q_mvar: 20.0,
        ..Load::default()
    });
    net.add_load(Load {
        id: LoadId::new(1),
        bus: BusId::new(2),
        p_mw: 40.0,
        q_mvar: 10.0,
        ..Load::default()
    });
    net
}

fn seed(t: usize) -> OperatingPoint {
    let f = 1.0 + 0.02 * t as f64;
    let mut op = OperatingPoint::default();
    op.bus_vm.insert(BusId::new(0), 1.03);
    op.bus_vm.insert(BusId::new(1), 0.99);
    op.bus_vm.insert(BusId::new(2), 1.01);
    op.bus_va_rad.insert(BusId::new(0), 0.0);
    op.bus_va_rad.insert(BusId::new(1), -0.03 * f);
    op.bus_va_rad.insert(BusId::new(2), -0.05 * f);
    op.line_flow.insert(
        LineId::new(0),
        LineFlow {
            p_from: 0.45 * f,
            q_from: 0.12 * f,
            p_to: -0.44 * f,
            q_to: -0.10 * f,
        },
    );
    op.line_flow.insert(
        LineId::new(1),
        LineFlow {
            p_from: -0.16 * f,
            q_from: -0.04 * f,
            p_to: 0.17 * f,
            q_to: 0.05 * f,
        },
    );
    op.gen_p.insert(GenId::new(0), 0.45 * f);
    // Deliberately outside the nominal [-0.1, 0.1] reactive band: the
    // bound widening must bracket it.
    op.gen_q.insert(GenId::new(0), 0.25);
    op.slack_p.insert(ExtGridId::new(0), 0.57 * f);
    op.slack_q.insert(ExtGridId::new(0), 0.15 * f);
    op.load_p.insert(LoadId::new(0), 0.60 * f);
    op.load_q.insert(LoadId::new(0), 0.20 * f);
    op.load_p.insert(LoadId::new(1), 0.40 * f);
    op.load_q.insert(LoadId::new(1), 0.10 * f);
    op
}

fn seeds() -> BTreeMap<Period, OperatingPoint> {
    (1..=T).map(|t| (Period::new(t), seed(t))).collect()
}

fn build_problem(cfg: ModelConfig) -> VvoProblem {
    let grid = extract(&test_network()).unwrap();
    let seeds = seeds();
    let adjustments =
        compute_adjustments(&grid, &seeds, None, &AdjustConfig::for_model(&cfg)).unwrap();
    let mut builder = ModelBuilder::new(grid, cfg);
    builder
        .declare_sets(&[BusId::new(1)], &[BusId::new(0), BusId::new(1), BusId::new(2)])
        .unwrap();
    builder.declare_variables(&seeds).unwrap();
    builder.declare_constraints(adjustments, &seeds, None).unwrap();
    builder.declare_objective(ObjectiveWeights::default()).unwrap();
    builder.finish().unwrap()
}

fn base_cfg() -> ModelConfig {
    ModelConfig {
        horizon: T,
        ..ModelConfig::default()
    }
}

#[test]
fn seed_point_satisfies_every_constraint() {
    let problem = build_problem(base_cfg());
    let x0 = problem.initial_point();

    let (eq_viol, ineq_viol) = problem.max_violation(&x0);
    assert!(
        eq_viol < 1e-9,
        "equality residual at the seed must vanish, got {eq_viol:e}"
    );
    assert!(
        ineq_viol <= 0.0,
        "inequalities must hold at the seed, worst {ineq_viol:e}"
    );
}

#[test]
fn seed_point_satisfies_relaxed_reactive_variant() {
    let cfg = ModelConfig {
        reactive_abs_tolerance: true,
        epsilon: 1e-6,
        ..base_cfg()
    };
    let problem = build_problem(cfg);
    let x0 = problem.initial_point();

    // The reactive flow rows move to the inequality set in this variant.
    let n_line = 2;
    assert_eq!(problem.equalities.len(), 2 * n_line * T);
    let (eq_viol, ineq_viol) = problem.max_violation(&x0);
    assert!(eq_viol < 1e-9);
    assert!(ineq_viol <= 0.0);
}

#[test]
fn every_initialized_variable_is_within_bounds() {
    let problem = build_problem(base_cfg());
    let x0 = problem.initial_point();
    let (lb, ub) = problem.variable_bounds();
    for (i, def) in problem.layout.vars.iter().enumerate() {
        assert!(
            lb[i] <= x0[i] && x0[i] <= ub[i],
            "{:?} {} initialized at {} outside [{}, {}]",
            def.family,
            def.key.label(),
            x0[i],
            lb[i],
            ub[i]
        );
    }
}

#[test]
fn reactive_bounds_widen_to_bracket_the_seed() {
    let problem = build_problem(base_cfg());
    // Nominal band is [-0.1, 0.1] pu but the observed dispatch is 0.25.
    let widened = problem
        .layout
        .vars
        .iter()
        .filter(|def| matches!(def.family, vvo_algo::VarFamily::QGen))
        .collect::<Vec<_>>();
    assert!(!widened.is_empty());
    for def in widened {
        assert!(def.ub >= 0.25, "widened upper bound must cover the seed");
        assert!((def.lb + 0.1).abs() < 1e-12, "untouched side keeps nominal");
        assert!(def.lb <= def.init && def.init <= def.ub);
    }
}

#[test]
fn apparent_cone_has_headroom_at_seed() {
    let problem = build_problem(base_cfg());
    let x0 = problem.initial_point();
    let values = problem.inequality_constraints(&x0);
    for (key, h) in problem.inequalities.iter().zip(&values) {
        if matches!(key, vvo_algo::ConstraintKey::Apparent { .. }) {
            // headroom 1.2 leaves the cone strictly satisfied
            assert!(*h < 0.0, "{key} should be slack at the seed, got {h}");
        }
    }
}

#[test]
fn inverted_reactive_bounds_are_a_configuration_error() {
    let mut net = test_network();
    net.add_gen(Gen {
        id: GenId::new(9),
        bus: BusId::new(0),
        min_q_mvar: 50.0,
        max_q_mvar: -50.0, // corrupted input
        ..Gen::default()
    });
    let grid = extract(&net).unwrap();
    let mut builder = ModelBuilder::new(grid, base_cfg());
    builder.declare_sets(&[], &[]).unwrap();
    let err = builder.declare_variables(&seeds()).unwrap_err();
    assert!(matches!(err, ModelError::Config(_)));
    assert!(err.to_string().contains("inverted reactive bounds"));
}

#[test]
fn build_stages_are_one_way() {
    let grid = extract(&test_network()).unwrap();
    let mut builder = ModelBuilder::new(grid, base_cfg());

    // Variables before sets is rejected.
    let err = builder.declare_variables(&seeds()).unwrap_err();
    assert!(matches!(err, ModelError::Stage { .. }));

    builder.declare_sets(&[], &[]).unwrap();
    // Re-declaring sets is rejected: transitions never go backwards.
    let err = builder.declare_sets(&[], &[]).unwrap_err();
    assert!(matches!(err, ModelError::Stage { .. }));

    // Objective before constraints is rejected.
    builder.declare_variables(&seeds()).unwrap();
    let err = builder.declare_objective(ObjectiveWeights::default()).unwrap_err();
    assert!(matches!(err, ModelError::Stage { .. }));
}

#[test]
fn missing_seed_period_is_rejected() {
    let grid = extract(&test_network()).unwrap();
    let mut builder = ModelBuilder::new(grid, base_cfg());
    builder.declare_sets(&[], &[]).unwrap();
    let mut partial = seeds();
    partial.remove(&Period::new(2));
    let err = builder.declare_variables(&partial).unwrap_err();
    assert!(matches!(err, ModelError::MissingSeed { .. }));
}

#[test]
fn objective_is_zero_effort_free_at_seed_except_reactive() {
    let problem = build_problem(base_cfg());
    let x0 = problem.initial_point();
    let breakdown = problem.objective_breakdown(&x0);

    // Shunt steps start flat at zero: no switching cost.
    assert!(breakdown.switching.abs() < 1e-15);
    // Pilot voltages start at their reference: no deviation cost.
    assert!(breakdown.pilot_deviation.abs() < 1e-15);
    // Reactive dispatch is nonzero at the seed.
    assert!(breakdown.reactive_effort > 0.0);
    assert!((problem.objective(&x0) - breakdown.total()).abs() < 1e-15);
}

#[test]
fn objective_gradient_matches_finite_differences() {
    let problem = build_problem(base_cfg());
    let mut x = problem.initial_point();
    // Move off the reference point so every term is active.
    for v in x.iter_mut() {
        *v += 0.013;
    }
    let grad = problem.objective_gradient(&x);
    let h = 1e-6;
    // Spot-check a handful of coordinates across families.
    for &i in &[0usize, x.len() / 3, x.len() / 2, x.len() - 1] {
        let mut xp = x.clone();
        xp[i] += h;
        let mut xm = x.clone();
        xm[i] -= h;
        let fd = (problem.objective(&xp) - problem.objective(&xm)) / (2.0 * h);
        assert!(
            (grad[i] - fd).abs() < 1e-5,
            "gradient mismatch at {i}: {} vs {}",
            grad[i],
            fd
        );
    }
}

#[test]
fn boolean_shunt_variant_builds_and_holds_at_seed() {
    let cfg = ModelConfig {
        shunt: ShuntRepr::Boolean,
        ..base_cfg()
    };
    let problem = build_problem(cfg);
    let x0 = problem.initial_point();
    let (eq_viol, ineq_viol) = problem.max_violation(&x0);
    assert!(eq_viol < 1e-9);
    assert!(ineq_viol <= 0.0);

    let n_int = problem.integrality().iter().filter(|b| **b).count();
    // One shunt bus over T periods plus one tap bus over T periods.
    assert_eq!(n_int, 2 * T);
}

#[test]
fn single_period_without_shunts_or_taps_accepts_the_seed() {
    // Minimal variant: one hour, no shunt devices declared, taps off.
    let cfg = ModelConfig {
        horizon: 1,
        transformer_taps: false,
        ..ModelConfig::default()
    };
    let grid = extract(&test_network()).unwrap();
    let seeds: BTreeMap<Period, OperatingPoint> =
        [(Period::new(1), seed(1))].into_iter().collect();
    let adjustments =
        compute_adjustments(&grid, &seeds, None, &AdjustConfig::for_model(&cfg)).unwrap();
    let mut builder = ModelBuilder::new(grid, cfg);
    builder.declare_sets(&[], &[]).unwrap();
    builder.declare_variables(&seeds).unwrap();
    builder.declare_constraints(adjustments, &seeds, None).unwrap();
    builder.declare_objective(ObjectiveWeights::default()).unwrap();
    let problem = builder.finish().unwrap();

    let x0 = problem.initial_point();
    let (eq_viol, ineq_viol) = problem.max_violation(&x0);
    assert!(eq_viol < 1e-9, "seed must satisfy the flow equations");
    assert!(ineq_viol <= 0.0, "seed must satisfy the cone and balances");
}

#[test]
fn taps_disabled_variant_holds_at_seed() {
    let cfg = ModelConfig {
        transformer_taps: false,
        ..base_cfg()
    };
    let problem = build_problem(cfg);
    let x0 = problem.initial_point();
    let (eq_viol, ineq_viol) = problem.max_violation(&x0);
    assert!(eq_viol < 1e-9);
    assert!(ineq_viol <= 0.0);
    assert!(problem.layout.tap_buses.is_empty());
}
