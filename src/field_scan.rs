#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use std::path::PathBuf;
use anyhow::Context;
use serde::Serialize;
use avalanche_sim::{
    ModelConfig,
    RunOutput,
    excitation::ExcitationMode,
    params::{ PhysicalParameters, Scenario },
    run::linspace,
    sweep::{ CancelToken, SweepOutcome, field_scan, run_sweep },
};
use tracing_subscriber::EnvFilter;

const N: usize = 9;
const NT: usize = 61;
const B_MAX: f64 = 5.0; // T
const NB: usize = 11;

#[derive(Serialize)]
struct Output<'a> {
    runs: Vec<&'a RunOutput>,
}

fn load_config() -> anyhow::Result<ModelConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            ModelConfig::load(&path)
                .with_context(|| format!("failed to load config from {}", path))
        },
        None => Ok(ModelConfig::default()),
    }
}

fn print_table(
    scenario: Scenario,
    mode: ExcitationMode,
    outcomes: &[SweepOutcome],
) {
    println!("scenario {} / {:?}", scenario, mode);
    println!(
        "  {:>5}  {:>8}  {:>8}  {:>8}  {:>7}  {:>8}  {:>10}",
        "B (T)", "Ω/2π", "V/2π", "T_opt", "S", "detected", "SNR",
    );
    for outcome in outcomes.iter() {
        match outcome {
            SweepOutcome::Finished(Ok(out)) => {
                println!(
                    "  {:5.2}  {:8.4}  {:8.3}  {:8.3}  {:7.3}  {:>8}  {:10.3e}",
                    out.request.field,
                    out.couplings.omega / std::f64::consts::TAU,
                    out.couplings.v / std::f64::consts::TAU,
                    out.optimal_time,
                    out.summary.amplification,
                    out.summary.detected,
                    out.summary.snr,
                );
            },
            SweepOutcome::Finished(Err(err)) => {
                println!("  error: {}", err);
            },
            SweepOutcome::Cancelled => { println!("  cancelled"); },
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = load_config()?;
    let outdir = PathBuf::from("output");
    std::fs::create_dir_all(&outdir)?;

    let fields: Vec<f64> = linspace(B_MAX, NB);
    let cancel = CancelToken::new();
    let mut outcomes: Vec<SweepOutcome> = Vec::new();
    for scenario in [Scenario::A, Scenario::B] {
        // Ω(B) only decreases, so the strongest field has the latest gate time
        let t_last
            = PhysicalParameters::new(N, scenario, B_MAX, 4.0, &config)?
            .optimal_time();
        let grid = linspace(1.2 * t_last, NT);
        for mode in [ExcitationMode::Local, ExcitationMode::Collective] {
            let requests = field_scan(N, scenario, mode, &fields, &grid);
            let scan = run_sweep(requests, &config, &cancel);
            print_table(scenario, mode, &scan);
            outcomes.extend(scan);
        }
    }

    let output = Output {
        runs: outcomes.iter().filter_map(|o| o.output()).collect(),
    };
    let outfile = outdir.join("field_scan.toml");
    std::fs::write(&outfile, toml::to_string(&output)?)
        .with_context(|| format!("failed to write {}", outfile.display()))?;
    println!("wrote {}", outfile.display());
    Ok(())
}
