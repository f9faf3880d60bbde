//! Tunable model coefficients, numerical tolerances, and resource limits.
//!
//! Everything here is plain data, built once and passed by reference into
//! each stage of a run. A [`ModelConfig`] can be read from TOML; any section
//! or key left out of the file takes its default value, e.g.
//! ```toml
//! [field]
//! v_alpha = 0.08
//! b_max = 3.0
//!
//! [limits]
//! max_sites = 12
//! ```

use std::{ f64::consts::TAU, path::Path };
use serde::{ Deserialize, Serialize };
use crate::error::{ AvalancheError, AvalancheResult };

/// Empirical magnetic field dependence of the chain couplings.
///
/// The quadratic suppression coefficients are fitted values quoted only up to
/// a few Tesla; fields above [`Self::b_max`] are rejected rather than
/// extrapolated.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldModel {
    /// Quadratic suppression coefficient α of the interaction V.
    pub v_alpha: f64,
    /// Reference field B₀ (T).
    pub b_ref: f64,
    /// Field (T) below which V is left unmodified.
    pub v_onset: f64,
    /// Lower bound on V(B) / V₀.
    pub v_floor: f64,
    /// Quadratic suppression coefficient of the drive Ω from state mixing.
    pub omega_alpha: f64,
    /// Lower bound on Ω(B) / Ω₀.
    pub omega_floor: f64,
    /// Landé factor of the primary (S) Rydberg level.
    pub g_primary: f64,
    /// Landé factor of the secondary (P) Rydberg level.
    pub g_secondary: f64,
    /// Fraction of the differential Zeeman shift absorbed into the laser
    /// detuning. `0.0` is a laser locked at zero field, so the full shift
    /// detunes the chain; `1.0` restores the facilitation condition exactly.
    pub zeeman_compensation: f64,
    /// Largest field (T) for which the model is considered valid.
    pub b_max: f64,
}

impl Default for FieldModel {
    fn default() -> Self {
        Self {
            v_alpha: 0.1,
            b_ref: 1.0,
            v_onset: 0.5,
            v_floor: 0.5,
            omega_alpha: 0.05,
            omega_floor: 0.7,
            g_primary: 2.0,
            g_secondary: 1.5,
            zeeman_compensation: 0.0,
            b_max: 5.0,
        }
    }
}

/// Closed-form thermal dark-excitation model.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalModel {
    /// Spontaneous rate scale Γ₀ (Hz).
    pub gamma0: f64,
}

impl Default for ThermalModel {
    fn default() -> Self { Self { gamma0: 1e3 } }
}

/// Numerical tolerances.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Largest |Δ + V| (rad/μs) accepted without a facilitation warning.
    pub facilitation: f64,
    /// Largest elementwise |A - A†| accepted for a local term or operator,
    /// relative to the magnitude of its largest element.
    pub hermiticity: f64,
    /// Largest accepted deviation of the state norm from 1.
    pub norm: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            facilitation: TAU * 0.1,
            hermiticity: 1e-9,
            norm: 1e-6,
        }
    }
}

/// Hard bounds on the size of a single run.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Largest accepted number of sites.
    pub max_sites: usize,
    /// Memory budget (bytes) for one run.
    pub memory_budget: u64,
    /// Largest number of sites evolved by full diagonalization; larger chains
    /// use the Krylov propagator.
    pub dense_max_sites: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_sites: 14,
            memory_budget: 4 << 30,
            dense_max_sites: 11,
        }
    }
}

/// Detection decision applied to the signal at the gate time.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorModel {
    /// Minimum number of excited sites counted as a detection.
    pub threshold: f64,
}

impl Default for DetectorModel {
    fn default() -> Self { Self { threshold: 3.0 } }
}

/// Complete configuration for a simulation run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub field: FieldModel,
    pub thermal: ThermalModel,
    pub tolerances: Tolerances,
    pub limits: Limits,
    pub detector: DetectorModel,
}

impl ModelConfig {
    /// Parse a configuration from a TOML string and validate it.
    pub fn from_toml_str(src: &str) -> AvalancheResult<Self> {
        let config: Self
            = toml::from_str(src)
            .map_err(|err| {
                AvalancheError::Configuration {
                    param: "config",
                    value: "<toml>".to_string(),
                    reason: err.to_string(),
                }
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration from a TOML file and validate it.
    pub fn load<P>(path: P) -> AvalancheResult<Self>
    where P: AsRef<Path>
    {
        let path = path.as_ref();
        let src
            = std::fs::read_to_string(path)
            .map_err(|err| {
                AvalancheError::config("config", path, &err.to_string())
            })?;
        Self::from_toml_str(&src)
    }

    /// Check that all coefficients lie in their meaningful ranges.
    pub fn validate(&self) -> AvalancheResult<()> {
        let FieldModel {
            v_alpha,
            b_ref,
            v_onset,
            v_floor,
            omega_alpha,
            omega_floor,
            zeeman_compensation,
            b_max,
            ..
        } = self.field;
        if !(b_ref > 0.0) {
            return Err(AvalancheError::config(
                "field.b_ref", b_ref, "must be positive"));
        }
        if v_alpha < 0.0 || omega_alpha < 0.0 {
            return Err(AvalancheError::config(
                "field.v_alpha/omega_alpha",
                (v_alpha, omega_alpha),
                "suppression coefficients must be non-negative",
            ));
        }
        for (name, floor) in [
            ("field.v_floor", v_floor),
            ("field.omega_floor", omega_floor),
        ] {
            if !(floor > 0.0 && floor <= 1.0) {
                return Err(AvalancheError::config(
                    name, floor, "must lie in (0, 1]"));
            }
        }
        if !(0.0..=1.0).contains(&zeeman_compensation) {
            return Err(AvalancheError::config(
                "field.zeeman_compensation",
                zeeman_compensation,
                "must lie in [0, 1]",
            ));
        }
        if v_onset < 0.0 || !(b_max >= 0.0) {
            return Err(AvalancheError::config(
                "field.v_onset/b_max",
                (v_onset, b_max),
                "must be non-negative",
            ));
        }
        if !(self.thermal.gamma0 >= 0.0) {
            return Err(AvalancheError::config(
                "thermal.gamma0", self.thermal.gamma0, "must be non-negative"));
        }
        let Tolerances { facilitation, hermiticity, norm } = self.tolerances;
        if [facilitation, hermiticity, norm].iter()
            .any(|tol| !(*tol > 0.0))
        {
            return Err(AvalancheError::config(
                "tolerances",
                self.tolerances,
                "all tolerances must be positive",
            ));
        }
        if self.limits.max_sites < 2 {
            return Err(AvalancheError::config(
                "limits.max_sites", self.limits.max_sites, "must be >= 2"));
        }
        if self.limits.max_sites >= usize::BITS as usize - 8 {
            return Err(AvalancheError::config(
                "limits.max_sites",
                self.limits.max_sites,
                "state dimension would overflow",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ModelConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ModelConfig::from_toml_str(
            "[field]\n\
            v_alpha = 0.08\n\
            b_max = 3.0\n\
            \n\
            [limits]\n\
            max_sites = 12\n"
        ).unwrap();
        assert_eq!(config.field.v_alpha, 0.08);
        assert_eq!(config.field.b_max, 3.0);
        assert_eq!(config.field.g_primary, 2.0);
        assert_eq!(config.limits.max_sites, 12);
        assert_eq!(config.limits.dense_max_sites, 11);
        assert_eq!(config.tolerances, Tolerances::default());
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(
            ModelConfig::from_toml_str("").unwrap(),
            ModelConfig::default(),
        );
    }

    #[test]
    fn rejects_bad_coefficients() {
        let err = ModelConfig::from_toml_str("[field]\nv_floor = 1.5\n")
            .unwrap_err();
        assert!(matches!(
            err,
            AvalancheError::Configuration { param: "field.v_floor", .. }
        ));
        assert!(ModelConfig::from_toml_str("[tolerances]\nnorm = 0.0\n")
            .is_err());
        assert!(ModelConfig::from_toml_str("[field]\nv_alpha = \"x\"\n")
            .is_err());
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = ModelConfig::load("/nonexistent/avalanche.toml")
            .unwrap_err();
        assert!(err.is_preflight());
    }
}
