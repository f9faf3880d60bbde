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
    sweep::{ CancelToken, SweepOutcome, run_sweep, temperature_scan },
};
use tracing_subscriber::EnvFilter;

const N: usize = 9;
const NT: usize = 41;
const TEMPS: [f64; 7] = [0.1, 0.3, 1.0, 2.0, 4.0, 10.0, 20.0]; // K

#[derive(Serialize)]
struct Output<'a> {
    runs: Vec<&'a RunOutput>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            ModelConfig::load(&path)
                .with_context(|| format!("failed to load config from {}", path))?
        },
        None => ModelConfig::default(),
    };
    let outdir = PathBuf::from("output");
    std::fs::create_dir_all(&outdir)?;

    let cancel = CancelToken::new();
    let mut outcomes: Vec<SweepOutcome> = Vec::new();
    for scenario in [Scenario::A, Scenario::B] {
        let t_opt
            = PhysicalParameters::zero_field(N, scenario, &config)?
            .optimal_time();
        let grid = linspace(t_opt, NT);
        let requests
            = temperature_scan(
                N, scenario, ExcitationMode::Local, &TEMPS, &grid);
        let scan = run_sweep(requests, &config, &cancel);

        println!("scenario {}", scenario);
        println!(
            "  {:>6}  {:>10}  {:>10}  {:>7}  {:>10}",
            "T (K)", "Γ (Hz)", "dark", "S", "SNR",
        );
        for outcome in scan.iter() {
            match outcome {
                SweepOutcome::Finished(Ok(out)) => {
                    println!(
                        "  {:6.2}  {:10.3e}  {:10.3e}  {:7.3}  {:10.3e}",
                        out.request.temperature,
                        out.dark_rate,
                        out.summary.dark_counts,
                        out.summary.amplification,
                        out.summary.snr,
                    );
                },
                SweepOutcome::Finished(Err(err)) => {
                    println!("  error: {}", err);
                },
                SweepOutcome::Cancelled => { println!("  cancelled"); },
            }
        }
        outcomes.extend(scan);
    }

    let output = Output {
        runs: outcomes.iter().filter_map(|o| o.output()).collect(),
    };
    let outfile = outdir.join("temperature_scan.toml");
    std::fs::write(&outfile, toml::to_string(&output)?)
        .with_context(|| format!("failed to write {}", outfile.display()))?;
    println!("wrote {}", outfile.display());
    Ok(())
}
