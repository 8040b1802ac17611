//! Directed branch-flow equations.
//!
//! The simplified two-port line model used throughout the crate. For a
//! line between buses i and j with series conductance `g` and susceptance
//! `b` (both symmetric), the two directed half-flows are:
//!
//! ```text
//! Forward (i -> j), tap ratio a on the sending bus:
//!   P_ij =  g·Vi²/a² - (Vi·Vj/a)·[g·cos(θi-θj) + b·sin(θi-θj)]
//!   Q_ij = -b·Vi²/a² - (Vi·Vj/a)·[g·sin(θi-θj) - b·cos(θi-θj)]
//!
//! Reverse (j -> i), roles swapped, no tap division on the self term:
//!   P_ji =  g·Vj² - (Vj·Vi/a)·[g·cos(θj-θi) + b·sin(θj-θi)]
//!   Q_ji = -b·Vj² - (Vj·Vi/a)·[g·sin(θj-θi) - b·cos(θj-θi)]
//! ```
//!
//! The same functions are used by the adjustment calculator (at the seed
//! point) and by the model's constraint evaluation (at the iterate), which
//! is what makes the seed-point residual vanish by construction.

/// Forward half-flow (sending end hosts the optional tap).
///
/// Returns `(p, q)` in per-unit. `ratio` is 1.0 for plain lines.
pub fn branch_flow_forward(
    g: f64,
    b: f64,
    v_i: f64,
    v_j: f64,
    theta_i: f64,
    theta_j: f64,
    ratio: f64,
) -> (f64, f64) {
    let d = theta_i - theta_j;
    let (sin_d, cos_d) = d.sin_cos();
    let self_term = v_i * v_i / (ratio * ratio);
    let cross = v_i * v_j / ratio;
    let p = g * self_term - cross * (g * cos_d + b * sin_d);
    let q = -b * self_term - cross * (g * sin_d - b * cos_d);
    (p, q)
}

/// Reverse half-flow (receiving end of the physical line sends).
///
/// The self term carries no tap division; the cross term is divided by the
/// tap of the reverse sending bus when it hosts one.
pub fn branch_flow_reverse(
    g: f64,
    b: f64,
    v_i: f64,
    v_j: f64,
    theta_i: f64,
    theta_j: f64,
    ratio: f64,
) -> (f64, f64) {
    let d = theta_j - theta_i;
    let (sin_d, cos_d) = d.sin_cos();
    let self_term = v_j * v_j;
    let cross = v_j * v_i / ratio;
    let p = g * self_term - cross * (g * cos_d + b * sin_d);
    let q = -b * self_term - cross * (g * sin_d - b * cos_d);
    (p, q)
}
