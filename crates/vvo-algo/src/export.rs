//! CSV serialization of solved variables and seed parameters.
//!
//! One file per variable family, columns `Var,Value`, with `Var` the
//! structured key rendered as `"key,period"`. Initialization parameters
//! (forecast demand, seed voltages/angles/flows/dispatch) get their own
//! `_init` files so a run's inputs and outputs sit side by side. Files
//! land under `<out_dir>/<system>/`, with an `_area_<name>` infix in
//! multi-area mode. Output order follows the variable registry, which is
//! deterministic.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use vvo_core::Period;

use crate::loadflow::OperatingPoint;
use crate::model::{VarFamily, VvoProblem};
use crate::solve::MinlpSolution;

/// Export failures.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("solution vector length {got} does not match the registry ({expected})")]
    LengthMismatch { got: usize, expected: usize },
}

fn family_path(dir: &Path, family: &str, area: Option<&str>, suffix: &str) -> PathBuf {
    match area {
        Some(a) => dir.join(format!("{family}_area_{a}_{suffix}.csv")),
        None => dir.join(format!("{family}_{suffix}.csv")),
    }
}

fn write_pairs(
    path: &Path,
    rows: impl Iterator<Item = (String, f64)>,
) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["Var", "Value"])?;
    for (key, value) in rows {
        wtr.write_record(&[key, value.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write one CSV per variable family from a solved vector.
///
/// Returns the written paths. The caller is responsible for only invoking
/// this on a successful solve.
pub fn write_solution_csvs(
    problem: &VvoProblem,
    solution: &MinlpSolution,
    out_dir: &Path,
    area: Option<&str>,
) -> Result<Vec<PathBuf>, ExportError> {
    if solution.values.len() != problem.n_var() {
        return Err(ExportError::LengthMismatch {
            got: solution.values.len(),
            expected: problem.n_var(),
        });
    }
    std::fs::create_dir_all(out_dir)?;

    let mut written = Vec::new();
    for family in VarFamily::all() {
        let rows: Vec<(String, f64)> = problem
            .layout
            .vars
            .iter()
            .zip(&solution.values)
            .filter(|(def, _)| def.family == *family)
            .map(|(def, value)| (def.key.label(), *value))
            .collect();
        if rows.is_empty() {
            continue; // family not present in this variant
        }
        let path = family_path(out_dir, family.as_str(), area, "res");
        write_pairs(&path, rows.into_iter())?;
        written.push(path);
    }
    info!(files = written.len(), dir = %out_dir.display(), "solution exported");
    Ok(written)
}

/// Write the initialization-parameter CSVs: forecast demand plus the seed
/// state every variable family was initialized from.
pub fn write_init_csvs(
    problem: &VvoProblem,
    seeds: &BTreeMap<Period, OperatingPoint>,
    out_dir: &Path,
    area: Option<&str>,
) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();

    // Forecast demand parameters, keyed (bus, period).
    let mut pd: Vec<(String, f64)> = problem
        .params
        .pd
        .iter()
        .map(|((bus, t), v)| (format!("{bus},{t}"), *v))
        .collect();
    pd.sort_by(|a, b| a.0.cmp(&b.0));
    let path = family_path(out_dir, "pd", area, "init");
    write_pairs(&path, pd.into_iter())?;
    written.push(path);

    let mut qd: Vec<(String, f64)> = problem
        .params
        .qd
        .iter()
        .map(|((bus, t), v)| (format!("{bus},{t}"), *v))
        .collect();
    qd.sort_by(|a, b| a.0.cmp(&b.0));
    let path = family_path(out_dir, "qd", area, "init");
    write_pairs(&path, qd.into_iter())?;
    written.push(path);

    // Seed state per variable family, straight from the registry inits.
    for family in [
        VarFamily::VBus,
        VarFamily::ThetaBus,
        VarFamily::PLineFwd,
        VarFamily::PLineRev,
        VarFamily::QLineFwd,
        VarFamily::QLineRev,
        VarFamily::PGen,
        VarFamily::QGen,
        VarFamily::PSlack,
        VarFamily::QSlack,
    ] {
        let rows: Vec<(String, f64)> = problem
            .layout
            .vars
            .iter()
            .filter(|def| def.family == family)
            .map(|def| (def.key.label(), def.init))
            .collect();
        if rows.is_empty() {
            continue;
        }
        let path = family_path(out_dir, family.as_str(), area, "init");
        write_pairs(&path, rows.into_iter())?;
        written.push(path);
    }

    // Keep the fixture count honest: every period the model was built on
    // must have contributed a seed.
    debug_assert!(seeds.len() >= problem.layout.horizon.len());

    info!(files = written.len(), dir = %out_dir.display(), "seed parameters exported");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_path_with_and_without_area() {
        let dir = Path::new("/tmp/results/ieee9");
        assert_eq!(
            family_path(dir, "v_bus", None, "res"),
            PathBuf::from("/tmp/results/ieee9/v_bus_res.csv")
        );
        assert_eq!(
            family_path(dir, "v_bus", Some("A1"), "res"),
            PathBuf::from("/tmp/results/ieee9/v_bus_area_A1_res.csv")
        );
    }

    #[test]
    fn test_write_pairs_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        write_pairs(
            &path,
            vec![("0-1,1".to_string(), 0.5), ("1-2,1".to_string(), -0.25)].into_iter(),
        )
        .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "Var,Value");
        assert_eq!(lines.next().unwrap(), "\"0-1,1\",0.5");
    }
}
