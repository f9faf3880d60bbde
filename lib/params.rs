//! Physical parameters of the detector chain and their magnetic field
//! dependence.
//!
//! All frequencies are angular frequencies in units of rad/μs (`2π × MHz`),
//! times are in μs, magnetic fields in T, and temperatures in K.

use std::{ f64::consts::TAU, fmt };
use serde::{ Deserialize, Serialize };
use crate::{
    config::{ FieldModel, ModelConfig, ThermalModel },
    error::{ AvalancheError, AvalancheResult },
    hilbert::ChainBasis,
};

/// Planck constant (J s).
pub const H_PLANCK: f64 = 6.62607015e-34;

/// Boltzmann constant (J/K).
pub const K_B: f64 = 1.380649e-23;

/// Bohr magneton over Planck constant (Hz/T).
pub const MU_B_OVER_H: f64 = 1.399624493e10;

/// Experimental scenario, fixing the Rydberg levels used for amplification.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scenario {
    /// 68S → 70P, microwave (54 GHz) demonstration.
    #[serde(rename = "a", alias = "A")]
    A,
    /// 45S → 70P, terahertz (1 THz) regime.
    #[serde(rename = "b", alias = "B")]
    B,
}

/// Zero-field constants of a [`Scenario`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScenarioConstants {
    /// Amplification drive Ω₀ (rad/μs).
    pub omega: f64,
    /// Laser detuning Δ₀ (rad/μs).
    pub delta: f64,
    /// Nearest-neighbor interaction V₀ (rad/μs).
    pub v: f64,
    /// Lattice spacing (μm).
    pub spacing: f64,
    /// Frequency of the detected transition (GHz).
    pub transition_freq: f64,
}

const SCENARIO_A: ScenarioConstants = ScenarioConstants {
    omega: TAU * 0.2,
    delta: -TAU * 12.5,
    v: TAU * 12.5,
    spacing: 6.0,
    transition_freq: 54.0,
};

const SCENARIO_B: ScenarioConstants = ScenarioConstants {
    omega: TAU * 0.2,
    delta: -TAU * 12.5,
    v: TAU * 12.5,
    spacing: 6.0,
    transition_freq: 1000.0,
};

impl Scenario {
    /// Return the zero-field constants for this scenario.
    pub fn constants(self) -> ScenarioConstants {
        match self {
            Self::A => SCENARIO_A,
            Self::B => SCENARIO_B,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "a"),
            Self::B => write!(f, "b"),
        }
    }
}

/// Compute the thermal dark-excitation rate Γ₀ exp(-h f / k_B T) in Hz for a
/// transition at `transition_freq` (GHz) and temperature `temperature` (K).
pub fn thermal_dark_rate(
    thermal: &ThermalModel,
    transition_freq: f64,
    temperature: f64,
) -> f64
{
    if temperature <= 0.0 { return 0.0; }
    let gap = H_PLANCK * transition_freq * 1e9;
    thermal.gamma0 * (-gap / (K_B * temperature)).exp()
}

/// Applies the empirical field model to zero-field couplings.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FieldModifier<'a> {
    model: &'a FieldModel,
    field: f64,
}

impl<'a> FieldModifier<'a> {
    /// Create a new `FieldModifier` for field strength `field` (T).
    ///
    /// Fails if the field is negative, not finite, or outside the validity
    /// range of the model.
    pub fn new(model: &'a FieldModel, field: f64) -> AvalancheResult<Self> {
        if !field.is_finite() || field < 0.0 {
            return Err(AvalancheError::config(
                "magnetic_field_T", field, "must be finite and >= 0"));
        }
        if field > model.b_max {
            return Err(AvalancheError::config(
                "magnetic_field_T",
                field,
                &format!(
                    "field model is only valid up to {} T",
                    model.b_max,
                ),
            ));
        }
        Ok(Self { model, field })
    }

    /// Return the field strength.
    pub fn field(&self) -> f64 { self.field }

    fn reduced_sq(&self) -> f64 { (self.field / self.model.b_ref).powi(2) }

    /// Interaction V(B) = V₀ max(1 - α (B/B₀)², floor), unmodified below the
    /// onset field.
    pub fn interaction(&self, v0: f64) -> f64 {
        if self.field < self.model.v_onset {
            v0
        } else {
            let scale = 1.0 - self.model.v_alpha * self.reduced_sq();
            v0 * scale.max(self.model.v_floor)
        }
    }

    /// Drive strength Ω(B), reduced by state mixing.
    pub fn drive(&self, omega0: f64) -> f64 {
        let scale = 1.0 - self.model.omega_alpha * self.reduced_sq();
        omega0 * scale.max(self.model.omega_floor)
    }

    /// Linear Zeeman shift (rad/μs) of a level with Landé factor `g`.
    pub fn zeeman_shift(&self, g: f64) -> f64 {
        TAU * MU_B_OVER_H * 1e-6 * g * self.field
    }

    /// Differential Zeeman shift (rad/μs) between the primary and secondary
    /// levels.
    pub fn differential_shift(&self) -> f64 {
        self.zeeman_shift(self.model.g_primary)
            - self.zeeman_shift(self.model.g_secondary)
    }

    /// Return the laser detuning that re-targets the facilitation condition
    /// for interaction `v`, and the effective detuning seen by the chain.
    ///
    /// The laser absorbs the fraction `zeeman_compensation` of the
    /// differential shift, so that Δ_eff + V = (1 - c) (δ_r - δ_e).
    pub fn detuning(&self, v: f64) -> (f64, f64) {
        let dz = self.differential_shift();
        let c = self.model.zeeman_compensation;
        let laser = -v - c * dz;
        let effective = -v + (1.0 - c) * dz;
        (laser, effective)
    }
}

/// Warning raised when a parameter set is away from the facilitation
/// condition.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacilitationWarning {
    /// Δ + V (rad/μs).
    pub residual: f64,
    /// Tolerance that was exceeded (rad/μs).
    pub tolerance: f64,
}

impl fmt::Display for FacilitationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "off facilitation: |Δ + V| = {:.3e} rad/μs exceeds {:.3e} rad/μs",
            self.residual.abs(),
            self.tolerance,
        )
    }
}

/// All physical couplings for a single run.
///
/// Built once per run or scan point and never modified afterwards; use
/// [`Self::with_couplings`] to derive a new set with explicit couplings.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PhysicalParameters {
    basis: ChainBasis,
    scenario: Scenario,
    omega: f64,
    delta: f64,
    v: f64,
    laser_detuning: f64,
    field: f64,
    temperature: f64,
    zeeman_primary: f64,
    zeeman_secondary: f64,
    dark_rate: f64,
}

impl PhysicalParameters {
    /// Derive the parameters of an `nsites`-site chain for `scenario` at
    /// magnetic field `field` (T) and temperature `temperature` (K).
    pub fn new(
        nsites: usize,
        scenario: Scenario,
        field: f64,
        temperature: f64,
        config: &ModelConfig,
    ) -> AvalancheResult<Self>
    {
        let basis = ChainBasis::new(nsites, &config.limits)?;
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(AvalancheError::config(
                "temperature_K", temperature, "must be finite and > 0"));
        }
        let base = scenario.constants();
        let modifier = FieldModifier::new(&config.field, field)?;
        let omega = modifier.drive(base.omega);
        let v = modifier.interaction(base.v);
        let (laser_detuning, delta) = modifier.detuning(v);
        let dark_rate
            = thermal_dark_rate(
                &config.thermal, base.transition_freq, temperature);
        Ok(Self {
            basis,
            scenario,
            omega,
            delta,
            v,
            laser_detuning,
            field,
            temperature,
            zeeman_primary: modifier.zeeman_shift(config.field.g_primary),
            zeeman_secondary: modifier.zeeman_shift(config.field.g_secondary),
            dark_rate,
        })
    }

    /// Zero-field parameters at the default temperature of 4 K.
    pub fn zero_field(
        nsites: usize,
        scenario: Scenario,
        config: &ModelConfig,
    ) -> AvalancheResult<Self>
    {
        Self::new(nsites, scenario, 0.0, 4.0, config)
    }

    /// Return a copy with the chain couplings replaced by explicit values.
    ///
    /// The field, temperature, and dark rate are kept; the laser detuning is
    /// taken to be `delta` itself.
    pub fn with_couplings(self, omega: f64, delta: f64, v: f64)
        -> AvalancheResult<Self>
    {
        if !omega.is_finite() || omega <= 0.0 {
            return Err(AvalancheError::config(
                "omega", omega, "must be finite and > 0"));
        }
        if !delta.is_finite() || !v.is_finite() {
            return Err(AvalancheError::config(
                "delta/v", (delta, v), "must be finite"));
        }
        Ok(Self { omega, delta, v, laser_detuning: delta, ..self })
    }

    /// Number of sites N.
    pub fn nsites(&self) -> usize { self.basis.nsites() }

    /// Product basis of the chain.
    pub fn basis(&self) -> &ChainBasis { &self.basis }

    /// Scenario the parameters were derived from.
    pub fn scenario(&self) -> Scenario { self.scenario }

    /// Drive strength Ω (rad/μs).
    pub fn omega(&self) -> f64 { self.omega }

    /// Effective detuning Δ (rad/μs), including any uncompensated Zeeman
    /// shift.
    pub fn delta(&self) -> f64 { self.delta }

    /// Nearest-neighbor interaction V (rad/μs).
    pub fn v(&self) -> f64 { self.v }

    /// Detuning of the amplification laser (rad/μs).
    pub fn laser_detuning(&self) -> f64 { self.laser_detuning }

    /// Magnetic field (T).
    pub fn field(&self) -> f64 { self.field }

    /// Temperature (K).
    pub fn temperature(&self) -> f64 { self.temperature }

    /// Zeeman shifts (rad/μs) of the primary and secondary levels.
    pub fn zeeman_shifts(&self) -> (f64, f64) {
        (self.zeeman_primary, self.zeeman_secondary)
    }

    /// Thermal dark-excitation rate (Hz).
    pub fn dark_rate(&self) -> f64 { self.dark_rate }

    /// Lattice spacing (μm) of the scenario.
    pub fn spacing(&self) -> f64 { self.scenario.constants().spacing }

    /// Frequency (GHz) of the detected transition.
    pub fn transition_freq(&self) -> f64 {
        self.scenario.constants().transition_freq
    }

    /// Facilitation residual Δ + V (rad/μs).
    pub fn facilitation_residual(&self) -> f64 { self.delta + self.v }

    /// Optimal amplification time T_opt = N / Ω (μs).
    pub fn optimal_time(&self) -> f64 { self.nsites() as f64 / self.omega }

    /// Check the facilitation condition against `tolerance`, logging and
    /// returning a warning if it is violated.
    pub fn check_facilitation(&self, tolerance: f64)
        -> Option<FacilitationWarning>
    {
        let residual = self.facilitation_residual();
        (residual.abs() > tolerance)
            .then(|| {
                let warning = FacilitationWarning { residual, tolerance };
                tracing::warn!(
                    nsites = self.nsites(),
                    field = self.field,
                    residual,
                    "{}", warning,
                );
                warning
            })
    }
}
