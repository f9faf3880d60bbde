//! Definitions to describe configurations of the detector chain and the
//! product basis they span.
//!
//! Every site is a two-level system, so an `N`-site chain lives in a `2^N`
//! dimensional space whose basis vectors are labeled by the integers
//! `0..2^N`. Site `j` corresponds to bit `N - 1 - j` of the index, i.e. site
//! 0 is the leftmost factor of the Kronecker product and the most significant
//! bit.

use std::fmt;
use itertools::Itertools;
use crate::{
    config::Limits,
    error::{ AvalancheError, AvalancheResult },
};

/// State of a single site.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SiteState {
    /// Ground state.
    G,
    /// Rydberg (excited) state.
    R,
}

impl fmt::Display for SiteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::G => write!(f, "g"),
            Self::R => write!(f, "r"),
        }
    }
}

/// The computational basis of an `N`-site chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChainBasis {
    nsites: usize,
}

impl ChainBasis {
    /// Create a new basis for `nsites` sites.
    ///
    /// Fails if the chain has fewer than two sites, or more than
    /// `limits.max_sites` or than a single state vector can address.
    pub fn new(nsites: usize, limits: &Limits) -> AvalancheResult<Self> {
        if nsites < 2 {
            return Err(AvalancheError::config("N", nsites, "must be >= 2"));
        }
        let state_bytes
            = u32::try_from(nsites).ok()
            .and_then(|shift| 1_u64.checked_shl(shift))
            .filter(|dim| *dim <= usize::MAX as u64)
            .and_then(|dim| dim.checked_mul(16));
        match state_bytes {
            Some(_) if nsites <= limits.max_sites => {
                Ok(Self { nsites })
            },
            _ => Err(AvalancheError::Capacity {
                nsites,
                required_bytes: state_bytes.unwrap_or(u64::MAX),
                budget_bytes: limits.memory_budget,
                reason: format!(
                    "N exceeds the maximum of {} sites", limits.max_sites),
            }),
        }
    }

    /// Return the number of sites.
    pub fn nsites(&self) -> usize { self.nsites }

    /// Return the dimension `2^N` of the space.
    pub fn dim(&self) -> usize { 1_usize << self.nsites }

    /// Return the bit mask selecting site `site` in a basis index.
    pub fn mask(&self, site: usize) -> usize {
        1_usize << (self.nsites - 1 - site)
    }

    /// Return `true` if `site` is excited in the basis state `index`.
    pub fn occupied(&self, index: usize, site: usize) -> bool {
        index & self.mask(site) != 0
    }

    /// Return the state of `site` in the basis state `index`.
    pub fn site_state(&self, index: usize, site: usize) -> SiteState {
        if self.occupied(index, site) { SiteState::R } else { SiteState::G }
    }

    /// Return the total number of excitations in basis state `index`.
    pub fn excitation_count(&self, index: usize) -> usize {
        index.count_ones() as usize
    }

    /// Return the chain configuration of basis state `index`.
    pub fn states_of(&self, index: usize) -> Vec<SiteState> {
        (0..self.nsites).map(|j| self.site_state(index, j)).collect()
    }

    /// Iterate over all basis indices with exactly `k` excitations, in
    /// increasing order.
    pub fn with_excitations(&self, k: usize)
        -> impl Iterator<Item = usize> + '_
    {
        (0..self.dim()).filter(move |idx| self.excitation_count(*idx) == k)
    }

    /// Render basis state `index` as a ket, e.g. `|grrg⟩`.
    pub fn label(&self, index: usize) -> String {
        format!("|{}⟩", self.states_of(index).iter().join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basis(n: usize) -> ChainBasis {
        ChainBasis::new(n, &Limits::default()).unwrap()
    }

    #[test]
    fn site_zero_is_most_significant() {
        let basis = basis(4);
        assert_eq!(basis.dim(), 16);
        assert_eq!(basis.mask(0), 0b1000);
        assert_eq!(basis.mask(3), 0b0001);
        assert!(basis.occupied(0b1000, 0));
        assert!(!basis.occupied(0b1000, 3));
        assert_eq!(basis.label(0b1001), "|rggr⟩");
        assert_eq!(basis.states_of(0b0110)[1], SiteState::R);
    }

    #[test]
    fn single_excitation_sector() {
        let basis = basis(5);
        let single: Vec<usize> = basis.with_excitations(1).collect();
        assert_eq!(single, vec![1, 2, 4, 8, 16]);
        assert_eq!(basis.with_excitations(2).count(), 10);
    }

    #[test]
    fn size_is_bounded() {
        let limits = Limits::default();
        assert!(matches!(
            ChainBasis::new(1, &limits),
            Err(AvalancheError::Configuration { param: "N", .. })
        ));
        assert!(ChainBasis::new(limits.max_sites, &limits).is_ok());
        assert!(matches!(
            ChainBasis::new(limits.max_sites + 1, &limits),
            Err(AvalancheError::Capacity { .. })
        ));
        let unbounded = Limits { max_sites: usize::MAX, ..limits };
        for n in [64, 200, usize::MAX] {
            assert!(matches!(
                ChainBasis::new(n, &unbounded),
                Err(AvalancheError::Capacity {
                    required_bytes: u64::MAX, ..
                })
            ));
        }
    }
}
