#![allow(dead_code, non_snake_case, non_upper_case_globals)]

//! Simulation of facilitated excitation avalanches in a chain of Rydberg
//! atoms, as used for single-photon detection.
//!
//! A run proceeds as
//! [`PhysicalParameters`][params::PhysicalParameters] →
//! [`HBuilderChain`][dynamics::HBuilderChain] →
//! [`Initializer`][excitation::Initializer] →
//! [`evolve`][evolve::evolve] →
//! [`Signal`][observables::Signal], and is wired together by
//! [`run::simulate`]. Independent runs are executed in parallel by
//! [`sweep::run_sweep`].

pub mod error;
pub mod config;
pub mod params;
pub mod hilbert;
pub mod excitation;
pub mod dynamics;
pub mod evolve;
pub mod observables;
pub mod run;
pub mod sweep;

pub use error::{ AvalancheError, AvalancheResult };
pub use config::ModelConfig;
pub use run::{ RunOutput, RunRequest, simulate };
