//! A linear chain of two-level sites under the facilitation (anti-blockade)
//! Hamiltonian.

use ndarray::{ self as nd };
use num_complex::Complex64 as C64;
use num_traits::Zero;
use crate::{
    config::Tolerances,
    dynamics::{ LocalTerm, Operator },
    error::{ AvalancheError, AvalancheResult },
    hilbert::ChainBasis,
    params::PhysicalParameters,
};

/// Specialized Hamiltonian builder for an `N`-site open chain of two-level
/// sites with nearest-neighbor interactions.
///
/// This builder produces
/// ```math
/// H = \Omega \sum_j \sigma^x_j
///     + \Delta \sum_j n_j
///     + V \sum_j n_j n_{j + 1}
/// ```
/// where `n_j = |r⟩⟨r|` on site `j` and the last sum runs over the `N - 1`
/// bonds of the chain. Each sum is made of labeled local terms, to which any
/// number of custom terms may be added.
#[derive(Clone, Debug)]
pub struct HBuilderChain {
    pub(crate) basis: ChainBasis,
    pub(crate) omega: f64,
    pub(crate) delta: f64,
    pub(crate) v: f64,
    pub(crate) extra: Vec<LocalTerm>,
}

impl HBuilderChain {
    /// Create a new `HBuilderChain` from a parameter set.
    pub fn new(params: &PhysicalParameters) -> Self {
        Self {
            basis: *params.basis(),
            omega: params.omega(),
            delta: params.delta(),
            v: params.v(),
            extra: Vec::new(),
        }
    }

    /// Add a custom local term.
    pub fn with_term(mut self, term: LocalTerm) -> Self {
        self.extra.push(term);
        self
    }

    /// Return a reference to the chain basis.
    pub fn basis(&self) -> &ChainBasis { &self.basis }

    /// Generate all labeled local terms of the Hamiltonian, including custom
    /// ones.
    pub fn local_terms(&self) -> Vec<LocalTerm> {
        let n = self.basis.nsites();
        let zero = C64::zero();
        let drive: nd::Array2<C64> = nd::array![
            [zero, C64::from(self.omega)],
            [C64::from(self.omega), zero],
        ];
        let detuning: nd::Array2<C64> = nd::array![
            [zero, zero],
            [zero, C64::from(self.delta)],
        ];
        let mut interaction: nd::Array2<C64> = nd::Array2::zeros((4, 4));
        interaction[[3, 3]] = C64::from(self.v);

        let drives
            = (0..n).map(|j| {
                LocalTerm::new_unchecked(
                    format!("drive[{}]", j), vec![j], drive.clone())
            });
        let detunings
            = (0..n).map(|j| {
                LocalTerm::new_unchecked(
                    format!("detuning[{}]", j), vec![j], detuning.clone())
            });
        let interactions
            = (0..n.saturating_sub(1)).map(|j| {
                LocalTerm::new_unchecked(
                    format!("interaction[{},{}]", j, j + 1),
                    vec![j, j + 1],
                    interaction.clone(),
                )
            });
        drives.chain(detunings)
            .chain(interactions)
            .chain(self.extra.iter().cloned())
            .collect()
    }

    /// Assemble the Hamiltonian.
    ///
    /// Each local term is checked against `tol.hermiticity` and then
    /// symmetrized; diagonal terms are folded into a single diagonal vector.
    /// Fails with a construction error naming the first term that refers to a
    /// missing site or is not Hermitian.
    pub fn build(&self, tol: &Tolerances) -> AvalancheResult<Hamiltonian> {
        let n = self.basis.nsites();
        let mut diag: nd::Array1<f64> = nd::Array1::zeros(self.basis.dim());
        let mut terms: Vec<LocalTerm> = Vec::new();
        for term in self.local_terms().into_iter() {
            if let Some(j) = term.sites().iter().find(|j| **j >= n) {
                return Err(AvalancheError::construction(
                    term.label(),
                    format!("site {} does not exist in a {}-site chain", j, n),
                ));
            }
            let defect = term.hermiticity_defect();
            if !(defect <= tol.hermiticity) {
                return Err(AvalancheError::construction(
                    term.label(),
                    format!(
                        "not Hermitian: relative defect {:.3e} exceeds {:.1e}",
                        defect,
                        tol.hermiticity,
                    ),
                ));
            }
            let term = term.symmetrized();
            if term.is_diagonal() {
                let op = term.op();
                diag.indexed_iter_mut()
                    .for_each(|(idx, d)| {
                        let l = term.local_index(&self.basis, idx);
                        *d += op[[l, l]].re;
                    });
            } else {
                terms.push(term);
            }
        }
        tracing::debug!(
            nsites = n,
            dim = self.basis.dim(),
            offdiag_terms = terms.len(),
            "built chain Hamiltonian",
        );
        Ok(Hamiltonian { basis: self.basis, diag, terms })
    }
}

/// An assembled chain Hamiltonian.
///
/// Stored as the sum of all diagonal terms folded into one vector plus a list
/// of symmetrized off-diagonal local terms. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct Hamiltonian {
    basis: ChainBasis,
    diag: nd::Array1<f64>,
    terms: Vec<LocalTerm>,
}

impl Hamiltonian {
    /// Return the chain basis.
    pub fn basis(&self) -> &ChainBasis { &self.basis }

    /// Return the number of sites.
    pub fn nsites(&self) -> usize { self.basis.nsites() }

    /// Return the folded diagonal.
    pub fn diagonal(&self) -> &nd::Array1<f64> { &self.diag }

    /// Return the off-diagonal local terms.
    pub fn offdiag_terms(&self) -> &[LocalTerm] { &self.terms }

    /// Return the matrix element `⟨row| H |col⟩`.
    pub fn matrix_element(&self, row: usize, col: usize) -> C64 {
        let offdiag: C64
            = self.terms.iter()
            .map(|term| term.element(&self.basis, row, col))
            .sum();
        if row == col { offdiag + self.diag[row] } else { offdiag }
    }
}

impl Operator for Hamiltonian {
    fn shape(&self) -> (usize, usize) {
        (self.basis.dim(), self.basis.dim())
    }

    // the diagonal is real and embedding preserves Hermiticity, so the defect
    // of the whole operator is the largest defect among its local terms
    fn hermiticity_defect(&self) -> f64 {
        let diag_defect
            = if self.diag.iter().all(|d| d.is_finite()) {
                0.0
            } else {
                f64::INFINITY
            };
        self.terms.iter()
            .map(|t| t.hermiticity_defect())
            .fold(diag_defect, f64::max)
    }

    fn apply_into(
        &self,
        psi: nd::ArrayView1<C64>,
        mut out: nd::ArrayViewMut1<C64>,
    ) {
        nd::Zip::from(&mut out)
            .and(&self.diag)
            .and(&psi)
            .for_each(|o, d, p| { *o = *p * *d; });
        self.terms.iter()
            .for_each(|term| term.apply_add(&self.basis, psi, &mut out));
    }

    fn to_dense(&self) -> nd::Array2<C64> {
        let dim = self.basis.dim();
        let mut H: nd::Array2<C64> = nd::Array2::zeros((dim, dim));
        H.diag_mut().iter_mut().zip(self.diag.iter())
            .for_each(|(h, d)| { *h = C64::from(*d); });
        for term in self.terms.iter() {
            term.for_each_element(&self.basis, |r, c, a| { H[[r, c]] += a; });
        }
        H
    }

    fn spectral_bounds(&self) -> (f64, f64) {
        let mut center: nd::Array1<f64> = self.diag.clone();
        let mut radius: nd::Array1<f64> = nd::Array1::zeros(self.diag.len());
        for term in self.terms.iter() {
            term.for_each_element(&self.basis, |r, c, a| {
                if r == c { center[r] += a.re; } else { radius[r] += a.norm(); }
            });
        }
        center.iter().zip(radius.iter())
            .fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), (c, r)| (lo.min(c - r), hi.max(c + r)),
            )
    }
}
