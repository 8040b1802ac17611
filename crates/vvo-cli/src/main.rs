//! `vvo` — batch driver for multi-period Volt/VAR optimization studies.
//!
//! Loads a case file and recorded load-flow results, builds the
//! multi-period model for the selected system, solves it, and writes the
//! result CSVs. The load-flow and Ward-reduction collaborators are
//! consumed as recorded JSON fixtures; the bundled backend accepts the
//! seeded operating point when it is feasible.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vvo_algo::{
    run_area_study, run_study, ScriptedOperatingPoints, ScriptedWardReducer, SeedPointBackend,
    SolverOptions, SystemPreset,
};
use vvo_core::CaseFile;

#[derive(Parser, Debug)]
#[command(name = "vvo", about = "Multi-period Volt/VAR optimization over IEEE test systems")]
struct Args {
    /// System preset: ieee9, ieee39, ieee57 or ieee118
    #[arg(long)]
    system: String,

    /// Case file (JSON tabular case)
    #[arg(long)]
    case: Option<PathBuf>,

    /// Recorded load-flow results (JSON), one operating point per period
    #[arg(long)]
    operating_points: Option<PathBuf>,

    /// Recorded Ward reductions (JSON) for multi-area runs
    #[arg(long)]
    wards: Option<PathBuf>,

    /// Run the multi-area decomposition instead of the full system
    #[arg(long)]
    multi_area: bool,

    /// Results directory
    #[arg(short, long, default_value = "results")]
    out: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let preset = SystemPreset::by_name(&args.system)?;
    let cfg = preset.model_config();
    let backend = SeedPointBackend::default();
    let options = SolverOptions {
        log_file: Some(args.out.join(format!("{}_solver.log", preset.name))),
        ..SolverOptions::default()
    };
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;

    if args.multi_area {
        let wards_path = args
            .wards
            .context("--wards is required for a multi-area run")?;
        let reducer = ScriptedWardReducer::from_path(&wards_path)
            .with_context(|| format!("loading ward fixture {}", wards_path.display()))?;

        let ops_path = args
            .operating_points
            .context("--operating-points is required")?;
        // One recorded fixture per area, keyed "<stem>_<area>.json" next to
        // the given path, or a single file reused for every area.
        let mut sources: HashMap<String, ScriptedOperatingPoints> = HashMap::new();
        for area in &preset.areas {
            let per_area = area_fixture_path(&ops_path, &area.name);
            let path = if per_area.exists() { per_area } else { ops_path.clone() };
            let source = ScriptedOperatingPoints::from_path(&path)
                .with_context(|| format!("loading operating points {}", path.display()))?;
            sources.insert(area.name.clone(), source);
        }

        let outcomes = run_area_study(
            &preset,
            cfg,
            &sources,
            &reducer,
            &backend,
            &options,
            Some(&args.out),
        )?;
        let mut failed = false;
        for (area, outcome) in &outcomes {
            info!(
                area = %area,
                status = %outcome.status,
                objective = ?outcome.objective,
                files = outcome.exported.len(),
                "area finished"
            );
            println!(
                "{}/{}: {} ({} files)",
                preset.name,
                area,
                outcome.status,
                outcome.exported.len()
            );
            failed |= !outcome.status.is_success();
        }
        if failed {
            bail!("one or more areas did not solve to optimality");
        }
    } else {
        let case_path = args.case.context("--case is required")?;
        let net = CaseFile::from_path(&case_path)
            .with_context(|| format!("loading case {}", case_path.display()))?
            .into_network()?;
        info!(system = %preset.name, stats = ?net.stats(), "case loaded");

        let ops_path = args
            .operating_points
            .context("--operating-points is required")?;
        let source = ScriptedOperatingPoints::from_path(&ops_path)
            .with_context(|| format!("loading operating points {}", ops_path.display()))?;

        let outcome = run_study(
            &net,
            &preset,
            cfg,
            &source,
            &backend,
            &options,
            Some(&args.out),
        )?;
        println!(
            "{}: {} ({} files)",
            preset.name,
            outcome.status,
            outcome.exported.len()
        );
        if !outcome.status.is_success() {
            bail!("solve finished with status {}", outcome.status);
        }
    }

    Ok(())
}

fn area_fixture_path(base: &PathBuf, area: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("operating_points");
    base.with_file_name(format!("{stem}_{area}.json"))
}
