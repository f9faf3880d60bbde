//! Parallel execution of independent runs.

use std::sync::{
    Arc,
    atomic::{ AtomicBool, AtomicUsize, Ordering },
};
use rayon::iter::{ IntoParallelIterator, ParallelIterator };
use crate::{
    config::ModelConfig,
    error::AvalancheResult,
    excitation::ExcitationMode,
    params::Scenario,
    run::{ RunOutput, RunRequest, simulate },
};

/// Shared flag for cooperative cancellation of a sweep.
///
/// Cancellation is checked once before each run starts; runs already in
/// flight finish normally.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a new, unset token.
    pub fn new() -> Self { Self::default() }

    /// Request cancellation.
    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }

    /// Return `true` if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

/// Outcome of one request in a sweep.
#[derive(Debug)]
pub enum SweepOutcome {
    /// The run was started and either completed or failed.
    Finished(AvalancheResult<RunOutput>),
    /// The sweep was cancelled before the run started.
    Cancelled,
}

impl SweepOutcome {
    /// Return `true` if the run was never started.
    pub fn is_cancelled(&self) -> bool { matches!(self, Self::Cancelled) }

    /// Return the output of a successful run.
    pub fn output(&self) -> Option<&RunOutput> {
        match self {
            Self::Finished(Ok(output)) => Some(output),
            _ => None,
        }
    }

    /// Return the result of a finished run.
    pub fn result(&self) -> Option<&AvalancheResult<RunOutput>> {
        match self {
            Self::Finished(res) => Some(res),
            Self::Cancelled => None,
        }
    }
}

/// Run all requests in parallel, returning their outcomes in request order.
///
/// Each run owns its parameters and Hamiltonian; a failure in one run has no
/// effect on the others.
pub fn run_sweep(
    requests: Vec<RunRequest>,
    config: &ModelConfig,
    cancel: &CancelToken,
) -> Vec<SweepOutcome>
{
    let total = requests.len();
    let done = AtomicUsize::new(0);
    tracing::debug!(runs = total, "starting sweep");
    let outcomes: Vec<SweepOutcome>
        = requests.into_par_iter()
        .map(|request| {
            if cancel.is_cancelled() { return SweepOutcome::Cancelled; }
            let res = simulate(request, config);
            if let Err(err) = &res {
                tracing::warn!(error = %err, "sweep run failed");
            }
            let k = done.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(done = k, total, "sweep progress");
            SweepOutcome::Finished(res)
        })
        .collect();
    let cancelled = outcomes.iter().filter(|o| o.is_cancelled()).count();
    if cancelled > 0 {
        tracing::info!(cancelled, total, "sweep cancelled");
    }
    outcomes
}

/// Build one request per magnetic field value.
pub fn field_scan(
    nsites: usize,
    scenario: Scenario,
    mode: ExcitationMode,
    fields: &[f64],
    time_grid: &[f64],
) -> Vec<RunRequest>
{
    fields.iter()
        .map(|b| {
            RunRequest::new(nsites, scenario, mode, time_grid.to_vec())
                .with_field(*b)
        })
        .collect()
}

/// Build one request per temperature.
pub fn temperature_scan(
    nsites: usize,
    scenario: Scenario,
    mode: ExcitationMode,
    temperatures: &[f64],
    time_grid: &[f64],
) -> Vec<RunRequest>
{
    temperatures.iter()
        .map(|temp| {
            RunRequest::new(nsites, scenario, mode, time_grid.to_vec())
                .with_temperature(*temp)
        })
        .collect()
}
