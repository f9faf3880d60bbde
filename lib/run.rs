//! A single simulation run, from request to detector summary.
//!
//! A [`Run`] moves through the stages
//! ```text
//! Init ──build──> Built ──evolve──> Evolving ──> Complete
//!   │               │                  │
//!   └───────────────┴──────────────────┴───────> Failed
//! ```
//! where `Init` is reached only once all inputs have been validated and the
//! memory footprint checked. `Failed` is terminal and the error that caused it
//! is returned to the caller.

use std::fmt;
use ndarray as nd;
use serde::{ Deserialize, Serialize };
use crate::{
    config::ModelConfig,
    dynamics::{ HBuilderChain, Hamiltonian },
    error::{ AvalancheError, AvalancheResult },
    evolve::{ self, check_capacity, check_time_grid },
    excitation::{ ExcitationMode, Initializer },
    observables::{ LinearFit, Signal },
    params::{ FacilitationWarning, PhysicalParameters, Scenario },
};

fn default_temperature() -> f64 { 4.0 }

/// Explicit values for the chain couplings, replacing those derived from the
/// scenario and field.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Couplings {
    /// Drive Ω (rad/μs).
    pub omega: f64,
    /// Detuning Δ (rad/μs).
    pub delta: f64,
    /// Interaction V (rad/μs).
    pub v: f64,
}

/// Description of a single run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Number of sites.
    #[serde(rename = "N")]
    pub nsites: usize,
    pub scenario: Scenario,
    pub excitation_mode: ExcitationMode,
    /// Magnetic field (T).
    #[serde(rename = "magnetic_field_T", default)]
    pub field: f64,
    /// Temperature (K).
    #[serde(rename = "temperature_K", default = "default_temperature")]
    pub temperature: f64,
    /// Recording times (μs), starting at 0.
    pub time_grid: Vec<f64>,
    /// Excited site for a local excitation; the central site if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<usize>,
    /// Coupling override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub couplings: Option<Couplings>,
}

impl RunRequest {
    /// Create a new zero-field request at 4 K.
    pub fn new(
        nsites: usize,
        scenario: Scenario,
        excitation_mode: ExcitationMode,
        time_grid: Vec<f64>,
    ) -> Self
    {
        Self {
            nsites,
            scenario,
            excitation_mode,
            field: 0.0,
            temperature: default_temperature(),
            time_grid,
            site: None,
            couplings: None,
        }
    }

    /// Set the magnetic field (T).
    pub fn with_field(mut self, field: f64) -> Self {
        self.field = field;
        self
    }

    /// Set the temperature (K).
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the excited site of a local excitation.
    pub fn with_site(mut self, site: usize) -> Self {
        self.site = Some(site);
        self
    }

    /// Replace the derived couplings by explicit values.
    pub fn with_couplings(mut self, omega: f64, delta: f64, v: f64) -> Self {
        self.couplings = Some(Couplings { omega, delta, v });
        self
    }

    /// Parse a request from a TOML string.
    pub fn from_toml_str(src: &str) -> AvalancheResult<Self> {
        toml::from_str(src)
            .map_err(|err| {
                AvalancheError::config("request", "<toml>", &err.to_string())
            })
    }

    /// Derive the physical parameters of the request.
    pub fn parameters(&self, config: &ModelConfig)
        -> AvalancheResult<PhysicalParameters>
    {
        let params
            = PhysicalParameters::new(
                self.nsites,
                self.scenario,
                self.field,
                self.temperature,
                config,
            )?;
        match self.couplings {
            Some(Couplings { omega, delta, v })
                => params.with_couplings(omega, delta, v),
            None => Ok(params),
        }
    }

    /// Return the initializer of the request.
    pub fn initializer(&self) -> Initializer {
        Initializer::new(self.excitation_mode, self.site)
    }
}

/// Return `npoints` evenly spaced times from 0 to `tmax`.
pub fn linspace(tmax: f64, npoints: usize) -> Vec<f64> {
    nd::Array1::linspace(0.0, tmax, npoints).to_vec()
}

/// Stage of a [`Run`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RunStage {
    /// Inputs validated.
    Init,
    /// Hamiltonian constructed and checked.
    Built,
    /// Stepping the time grid.
    Evolving,
    /// Trajectory and signal available.
    Complete,
    /// An invariant was violated.
    Failed,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Built => write!(f, "BUILT"),
            Self::Evolving => write!(f, "EVOLVING"),
            Self::Complete => write!(f, "COMPLETE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Readout of the detector at the gate time.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorSummary {
    /// Gate time T_opt (μs).
    pub gate_time: f64,
    /// Signal at the grid point nearest to the gate time.
    pub amplification: f64,
    /// Detection threshold.
    pub threshold: f64,
    /// `true` if the amplification exceeds the threshold.
    pub detected: bool,
    /// Expected thermal dark counts within the gate time.
    pub dark_counts: f64,
    /// Amplification over expected dark counts.
    pub snr: f64,
    /// Linear fit to the middle half of the signal.
    pub growth: Option<LinearFit>,
}

impl DetectorSummary {
    /// Evaluate the detector for a signal recorded under `params`.
    pub fn new(
        signal: &Signal,
        params: &PhysicalParameters,
        config: &ModelConfig,
    ) -> Self
    {
        let gate_time = params.optimal_time();
        let amplification = signal.value_at(gate_time).unwrap_or(f64::NAN);
        let threshold = config.detector.threshold;
        let dark_counts = params.dark_rate() * gate_time * 1e-6;
        Self {
            gate_time,
            amplification,
            threshold,
            detected: amplification > threshold,
            dark_counts,
            snr: amplification / dark_counts.max(1e-6),
            growth: signal.ballistic_fit(),
        }
    }
}

/// Result of a completed run.
#[derive(Clone, Debug, Serialize)]
pub struct RunOutput {
    pub request: RunRequest,
    #[serde(flatten)]
    pub signal: Signal,
    /// Δ + V (rad/μs).
    pub facilitation_residual: f64,
    /// T_opt (μs).
    pub optimal_time: f64,
    /// Thermal dark-excitation rate (Hz).
    pub dark_rate: f64,
    /// Couplings the chain was evolved under.
    pub couplings: Couplings,
    /// Laser detuning (rad/μs).
    pub laser_detuning: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<FacilitationWarning>,
    pub summary: DetectorSummary,
}

/// A single simulation run.
#[derive(Debug)]
pub struct Run<'c> {
    config: &'c ModelConfig,
    request: RunRequest,
    params: PhysicalParameters,
    times: nd::Array1<f64>,
    warning: Option<FacilitationWarning>,
    stage: RunStage,
    hamiltonian: Option<Hamiltonian>,
    output: Option<RunOutput>,
}

impl<'c> Run<'c> {
    /// Validate a request and estimate its footprint.
    ///
    /// Fails with a configuration or capacity error before anything is built.
    pub fn new(request: RunRequest, config: &'c ModelConfig)
        -> AvalancheResult<Self>
    {
        config.validate()?;
        check_time_grid(&request.time_grid)?;
        if request.nsites < 2 {
            return Err(AvalancheError::config(
                "N", request.nsites, "must be >= 2"));
        }
        check_capacity(
            request.nsites, request.time_grid.len(), &config.limits)?;
        let params = request.parameters(config)?;
        if let Some(site) = request.initializer().site(request.nsites) {
            if site >= request.nsites {
                return Err(AvalancheError::config(
                    "site",
                    site,
                    &format!("must be < N = {}", request.nsites),
                ));
            }
        }
        let warning
            = params.check_facilitation(config.tolerances.facilitation);
        let times = nd::Array1::from(request.time_grid.clone());
        tracing::debug!(
            nsites = request.nsites,
            scenario = %request.scenario,
            field = request.field,
            stage = %RunStage::Init,
            "run created",
        );
        Ok(Self {
            config,
            request,
            params,
            times,
            warning,
            stage: RunStage::Init,
            hamiltonian: None,
            output: None,
        })
    }

    /// Return the current stage.
    pub fn stage(&self) -> RunStage { self.stage }

    /// Return the physical parameters of the run.
    pub fn parameters(&self) -> &PhysicalParameters { &self.params }

    /// Return the facilitation warning, if any.
    pub fn warning(&self) -> Option<&FacilitationWarning> {
        self.warning.as_ref()
    }

    /// Return the Hamiltonian, once built.
    pub fn hamiltonian(&self) -> Option<&Hamiltonian> {
        self.hamiltonian.as_ref()
    }

    /// Return the output, once complete.
    pub fn output(&self) -> Option<&RunOutput> { self.output.as_ref() }

    fn transition(&mut self, to: RunStage) {
        tracing::debug!(
            nsites = self.request.nsites,
            field = self.request.field,
            from = %self.stage,
            to = %to,
            "run stage",
        );
        self.stage = to;
    }

    fn fail(&mut self, err: AvalancheError) -> AvalancheError {
        tracing::debug!(error = %err, "run failed");
        self.transition(RunStage::Failed);
        err
    }

    fn expect_stage(&self, expected: RunStage) -> AvalancheResult<()> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(AvalancheError::config(
                "stage",
                self.stage,
                &format!("operation requires stage {}", expected),
            ))
        }
    }

    /// Construct and check the Hamiltonian.
    pub fn build(&mut self) -> AvalancheResult<&Hamiltonian> {
        self.expect_stage(RunStage::Init)?;
        let built
            = HBuilderChain::new(&self.params)
            .build(&self.config.tolerances);
        match built {
            Ok(H) => {
                self.transition(RunStage::Built);
                Ok(self.hamiltonian.insert(H))
            },
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Evolve the initial state, extract the signal, and evaluate the
    /// detector.
    pub fn evolve(&mut self) -> AvalancheResult<&RunOutput> {
        self.expect_stage(RunStage::Built)?;
        self.transition(RunStage::Evolving);
        let evolved = self.do_evolve();
        match evolved {
            Ok(output) => {
                tracing::info!(
                    nsites = self.request.nsites,
                    field = self.request.field,
                    temperature = self.request.temperature,
                    amplification = output.summary.amplification,
                    detected = output.summary.detected,
                    "run complete",
                );
                self.transition(RunStage::Complete);
                Ok(self.output.insert(output))
            },
            Err(err) => Err(self.fail(err)),
        }
    }

    fn do_evolve(&self) -> AvalancheResult<RunOutput> {
        let H = self.hamiltonian.as_ref()
            .ok_or_else(|| {
                AvalancheError::construction(
                    crate::dynamics::ASSEMBLED,
                    "Hamiltonian missing".to_string(),
                )
            })?;
        let psi0
            = self.request.initializer()
            .into_array(self.params.basis())?;
        let traj = evolve::evolve(&psi0, H, &self.times, self.config)?;
        let signal
            = Signal::extract(&traj, self.params.basis())?;
        let summary = DetectorSummary::new(&signal, &self.params, self.config);
        Ok(RunOutput {
            request: self.request.clone(),
            signal,
            facilitation_residual: self.params.facilitation_residual(),
            optimal_time: self.params.optimal_time(),
            dark_rate: self.params.dark_rate(),
            couplings: Couplings {
                omega: self.params.omega(),
                delta: self.params.delta(),
                v: self.params.v(),
            },
            laser_detuning: self.params.laser_detuning(),
            warning: self.warning,
            summary,
        })
    }

    /// Run all remaining stages and return the output.
    pub fn execute(mut self) -> AvalancheResult<RunOutput> {
        if self.stage == RunStage::Init { self.build()?; }
        if self.stage == RunStage::Built { self.evolve()?; }
        self.output
            .ok_or_else(|| {
                AvalancheError::config(
                    "stage", self.stage, "run did not complete")
            })
    }
}

/// Run a single request to completion.
pub fn simulate(request: RunRequest, config: &ModelConfig)
    -> AvalancheResult<RunOutput>
{
    Run::new(request, config)?.execute()
}
