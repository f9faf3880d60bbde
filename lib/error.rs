//! Error type shared by every stage of a simulation run.
//!
//! Each variant carries the parameters that caused it so that a failed point
//! in a sweep can be identified without re-running anything.

use thiserror::Error;

/// Result alias for fallible operations in this crate.
pub type AvalancheResult<T> = Result<T, AvalancheError>;

/// Describes everything that can go wrong between receiving a request and
/// producing a signal.
#[derive(Debug, Error)]
pub enum AvalancheError {
    /// Input rejected before any computation is done.
    #[error("invalid configuration: {param} = {value}: {reason}")]
    Configuration {
        /// Name of the offending input.
        param: &'static str,
        /// The offending value, rendered for display.
        value: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The Hamiltonian could not be assembled into a valid operator.
    #[error("invalid Hamiltonian (term {term}): {reason}")]
    Construction {
        /// Label of the offending local term, or `"<assembled>"` when the
        /// defect is in the operator as a whole.
        term: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The state norm drifted during evolution.
    #[error(
        "state norm diverged at step {step} (t = {time}): \
        |psi| = {norm:.3e}, tolerance {tolerance:.1e}"
    )]
    NumericalDivergence {
        /// Index of the time grid point where the drift was detected.
        step: usize,
        /// Time coordinate of that grid point.
        time: f64,
        /// Norm of the state at that point.
        norm: f64,
        /// Allowed deviation of the norm from 1.
        tolerance: f64,
    },

    /// The request is too large to run safely.
    #[error(
        "capacity exceeded for N = {nsites}: {reason} \
        (estimate {required_bytes} B, budget {budget_bytes} B)"
    )]
    Capacity {
        /// Requested number of sites.
        nsites: usize,
        /// Estimated memory footprint of the run.
        required_bytes: u64,
        /// Configured memory budget.
        budget_bytes: u64,
        /// Which bound was hit.
        reason: String,
    },
}

impl AvalancheError {
    pub(crate) fn config<V>(param: &'static str, value: V, reason: &str)
        -> Self
    where V: std::fmt::Debug
    {
        Self::Configuration {
            param,
            value: format!("{:?}", value),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn construction<T>(term: T, reason: String) -> Self
    where T: Into<String>
    {
        Self::Construction { term: term.into(), reason }
    }

    /// Return `true` if the error was raised before any computation started.
    pub fn is_preflight(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Capacity { .. })
    }
}
