//! Initial states of the chain after absorption of a single photon.

use ndarray as nd;
use num_complex::Complex64 as C64;
use serde::{ Deserialize, Serialize };
use crate::{
    error::{ AvalancheError, AvalancheResult },
    hilbert::ChainBasis,
};

/// Excitation protocol selector, as given in a run request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExcitationMode {
    /// The photon is absorbed by one known site.
    Local,
    /// The photon is absorbed collectively by the whole chain.
    Collective,
}

/// Descriptions of the t = 0 state, convertible to the standard 1D
/// complex-valued array representation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Initializer {
    /// A single excitation on one site, all others in the ground state.
    ///
    /// `None` selects the central site `⌊N/2⌋`.
    Local { site: Option<usize> },
    /// Equal-amplitude superposition of all single-excitation states, i.e. the
    /// W state.
    Collective,
}

impl Initializer {
    /// Create the initializer for a given protocol.
    pub fn new(mode: ExcitationMode, site: Option<usize>) -> Self {
        match mode {
            ExcitationMode::Local => Self::Local { site },
            ExcitationMode::Collective => Self::Collective,
        }
    }

    /// Return the number of excited sites in the initial state.
    pub fn excitation_count(&self) -> usize { 1 }

    /// Return the excited site of a local excitation in an `nsites`-site
    /// chain.
    pub fn site(&self, nsites: usize) -> Option<usize> {
        match self {
            Self::Local { site } => Some(site.unwrap_or(nsites / 2)),
            Self::Collective => None,
        }
    }

    /// Construct the state vector in the chain basis `basis`.
    ///
    /// Fails if the designated site does not exist.
    pub fn into_array(self, basis: &ChainBasis)
        -> AvalancheResult<nd::Array1<C64>>
    {
        let nsites = basis.nsites();
        let mut psi: nd::Array1<C64> = nd::Array1::zeros(basis.dim());
        match self {
            Self::Local { .. } => {
                let site = self.site(nsites).unwrap_or(nsites / 2);
                if site >= nsites {
                    return Err(AvalancheError::config(
                        "site",
                        site,
                        &format!("must be < N = {}", nsites),
                    ));
                }
                let idx = basis.mask(site);
                tracing::debug!(state = %basis.label(idx), "local excitation");
                psi[idx] = C64::from(1.0);
            },
            Self::Collective => {
                let amp = C64::from((nsites as f64).recip().sqrt());
                basis.with_excitations(1)
                    .for_each(|idx| { psi[idx] = amp; });
            },
        }
        Ok(psi)
    }
}

impl From<ExcitationMode> for Initializer {
    fn from(mode: ExcitationMode) -> Self { Self::new(mode, None) }
}
