//! Tools for building and applying operators on the chain Hilbert space.
//!
//! Operators here are never built by Kronecker-expanding identity factors.
//! Every [`LocalTerm`] acts on one or two sites, and its action on the full
//! `2^N` dimensional space is computed directly from the bits of the basis
//! indices, so that applying a term costs `O(2^N)`.

use ndarray::{ self as nd };
use num_complex::Complex64 as C64;
use num_traits::Zero;
use crate::{
    error::{ AvalancheError, AvalancheResult },
    hilbert::ChainBasis,
};

pub mod chain;
pub use chain::{ HBuilderChain, Hamiltonian };

/// Label used for defects in an assembled operator rather than in any one
/// local term.
pub const ASSEMBLED: &str = "<assembled>";

/// Relative Hermiticity defect of a square matrix: the largest elementwise
/// `|A - A†|`, divided by the largest `|A|`.
///
/// Returns `f64::INFINITY` for non-square input and `0.0` for a zero matrix.
pub fn hermiticity_defect(A: nd::ArrayView2<C64>) -> f64 {
    if !A.is_square() { return f64::INFINITY; }
    let scale: f64 = A.iter().map(|a| a.norm()).fold(0.0, f64::max);
    if scale == 0.0 { return 0.0; }
    let n = A.nrows();
    let mut defect: f64 = 0.0;
    for i in 0..n {
        for j in i..n {
            defect = defect.max((A[[i, j]] - A[[j, i]].conj()).norm());
        }
    }
    defect / scale
}

/// Gershgorin bounds `(lo, hi)` on the real spectrum of a Hermitian matrix.
pub fn gershgorin(A: nd::ArrayView2<C64>) -> (f64, f64) {
    A.outer_iter().enumerate()
        .map(|(i, row)| {
            let radius: f64
                = row.iter().enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, a)| a.norm())
                .sum();
            (row[i].re - radius, row[i].re + radius)
        })
        .fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), (l, h)| (lo.min(l), hi.max(h)),
        )
}

/// A Hermitian operator on the state space that can act on state vectors.
///
/// This is the single operator abstraction consumed by the propagators; it is
/// implemented by the structured [`Hamiltonian`] and by plain dense matrices.
pub trait Operator {
    /// Return the `(rows, columns)` shape of the operator.
    fn shape(&self) -> (usize, usize);

    /// Return the dimension of the space the operator acts on.
    fn dim(&self) -> usize { self.shape().0 }

    /// Return the relative Hermiticity defect of the operator.
    fn hermiticity_defect(&self) -> f64;

    /// Compute `out = self · psi`.
    fn apply_into(&self, psi: nd::ArrayView1<C64>, out: nd::ArrayViewMut1<C64>);

    /// Compute `self · psi`.
    fn apply(&self, psi: &nd::Array1<C64>) -> nd::Array1<C64> {
        let mut out: nd::Array1<C64> = nd::Array1::zeros(self.dim());
        self.apply_into(psi.view(), out.view_mut());
        out
    }

    /// Render the operator as a dense matrix.
    fn to_dense(&self) -> nd::Array2<C64>;

    /// Return bounds `(lo, hi)` on the spectrum of the operator.
    fn spectral_bounds(&self) -> (f64, f64);
}

impl Operator for nd::Array2<C64> {
    fn shape(&self) -> (usize, usize) { self.dim() }

    fn dim(&self) -> usize { self.nrows() }

    fn hermiticity_defect(&self) -> f64 { hermiticity_defect(self.view()) }

    fn apply_into(
        &self,
        psi: nd::ArrayView1<C64>,
        mut out: nd::ArrayViewMut1<C64>,
    ) {
        nd::linalg::general_mat_vec_mul(
            C64::from(1.0), self, &psi, C64::zero(), &mut out);
    }

    fn to_dense(&self) -> nd::Array2<C64> { self.clone() }

    fn spectral_bounds(&self) -> (f64, f64) { gershgorin(self.view()) }
}

/// A labeled operator acting non-trivially on one or two sites.
///
/// The local matrix is written in the basis of the listed sites, with the
/// first listed site as the most significant bit, so a two-site term on sites
/// `[a, b]` is the usual `A ⊗ B` ordering.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalTerm {
    label: String,
    sites: Vec<usize>,
    op: nd::Array2<C64>,
}

impl LocalTerm {
    /// Create a new local term.
    ///
    /// Fails if the number of sites is not 1 or 2, the sites are repeated, or
    /// the matrix shape does not match the number of sites.
    pub fn new<L>(label: L, sites: &[usize], op: nd::Array2<C64>)
        -> AvalancheResult<Self>
    where L: Into<String>
    {
        let label = label.into();
        if sites.is_empty() || sites.len() > 2 {
            return Err(AvalancheError::construction(
                label,
                format!("must act on 1 or 2 sites, got {}", sites.len()),
            ));
        }
        if sites.len() == 2 && sites[0] == sites[1] {
            return Err(AvalancheError::construction(
                label, format!("repeated site {}", sites[0])));
        }
        let n = 1_usize << sites.len();
        if op.dim() != (n, n) {
            return Err(AvalancheError::construction(
                label,
                format!(
                    "local matrix has shape {:?}, expected ({n}, {n})",
                    op.dim(),
                ),
            ));
        }
        Ok(Self { label, sites: sites.to_vec(), op })
    }

    pub(crate) fn new_unchecked(
        label: String,
        sites: Vec<usize>,
        op: nd::Array2<C64>,
    ) -> Self
    {
        Self { label, sites, op }
    }

    /// Return the label of the term.
    pub fn label(&self) -> &str { &self.label }

    /// Return the sites the term acts on.
    pub fn sites(&self) -> &[usize] { &self.sites }

    /// Return the local matrix.
    pub fn op(&self) -> &nd::Array2<C64> { &self.op }

    /// Return `true` if the local matrix has no off-diagonal elements.
    pub fn is_diagonal(&self) -> bool {
        self.op.indexed_iter()
            .all(|((i, j), a)| i == j || *a == C64::zero())
    }

    /// Return the relative Hermiticity defect of the local matrix.
    pub fn hermiticity_defect(&self) -> f64 {
        hermiticity_defect(self.op.view())
    }

    /// Return `(A + A†) / 2`.
    pub fn symmetrized(&self) -> Self {
        let op: nd::Array2<C64>
            = (&self.op + &self.op.t().mapv(|a| a.conj())) * 0.5;
        Self { label: self.label.clone(), sites: self.sites.clone(), op }
    }

    /// Return the index in the local basis of the sites' states in global
    /// basis state `index`.
    pub(crate) fn local_index(&self, basis: &ChainBasis, index: usize)
        -> usize
    {
        self.sites.iter()
            .fold(0, |acc, j| (acc << 1) | basis.occupied(index, *j) as usize)
    }

    /// Return global basis state `index` with the sites' states replaced by
    /// those encoded in the local index `local`.
    pub(crate) fn replace_local(
        &self,
        basis: &ChainBasis,
        index: usize,
        local: usize,
    ) -> usize
    {
        let k = self.sites.len();
        self.sites.iter().enumerate()
            .fold(index, |acc, (p, j)| {
                let mask = basis.mask(*j);
                if (local >> (k - 1 - p)) & 1 == 1 {
                    acc | mask
                } else {
                    acc & !mask
                }
            })
    }

    /// Call `f(row, col, value)` for every non-zero element of the term
    /// embedded in the full space of `basis`.
    pub(crate) fn for_each_element<F>(&self, basis: &ChainBasis, mut f: F)
    where F: FnMut(usize, usize, C64)
    {
        let n = self.op.nrows();
        for col in 0..basis.dim() {
            let c = self.local_index(basis, col);
            for r in 0..n {
                let a = self.op[[r, c]];
                if a == C64::zero() { continue; }
                f(self.replace_local(basis, col, r), col, a);
            }
        }
    }

    /// Return the matrix element `⟨row| A |col⟩` of the embedded term.
    pub(crate) fn element(&self, basis: &ChainBasis, row: usize, col: usize)
        -> C64
    {
        let r = self.local_index(basis, row);
        let c = self.local_index(basis, col);
        if self.replace_local(basis, row, c) == col {
            self.op[[r, c]]
        } else {
            C64::zero()
        }
    }

    /// Accumulate `out += A · psi` for the embedded term.
    pub(crate) fn apply_add(
        &self,
        basis: &ChainBasis,
        psi: nd::ArrayView1<C64>,
        out: &mut nd::ArrayViewMut1<C64>,
    ) {
        self.for_each_element(basis, |row, col, a| { out[row] += a * psi[col]; });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::linalg::kron;
    use crate::config::Limits;

    fn sigma_x() -> nd::Array2<C64> {
        nd::array![
            [C64::zero(), C64::from(1.0)],
            [C64::from(1.0), C64::zero()],
        ]
    }

    fn arraykron(nsites: usize, site: usize, a: &nd::Array2<C64>)
        -> nd::Array2<C64>
    {
        let eye1: nd::Array2<C64> = nd::Array2::eye(1 << site);
        let eye2: nd::Array2<C64> = nd::Array2::eye(1 << (nsites - site - 1));
        kron(&kron(&eye1, a), &eye2)
    }

    fn embed(term: &LocalTerm, basis: &ChainBasis) -> nd::Array2<C64> {
        let mut H: nd::Array2<C64>
            = nd::Array2::zeros((basis.dim(), basis.dim()));
        term.for_each_element(basis, |r, c, a| { H[[r, c]] += a; });
        H
    }

    #[test]
    fn single_site_embedding_matches_kron() {
        let basis = ChainBasis::new(4, &Limits::default()).unwrap();
        for site in 0..4 {
            let term = LocalTerm::new("x", &[site], sigma_x()).unwrap();
            assert_eq!(embed(&term, &basis), arraykron(4, site, &sigma_x()));
        }
    }

    #[test]
    fn pair_embedding_matches_kron() {
        let basis = ChainBasis::new(4, &Limits::default()).unwrap();
        let op: nd::Array2<C64> = kron(&sigma_x(), &nd::Array2::eye(2));
        let term = LocalTerm::new("xi", &[1, 2], op).unwrap();
        assert_eq!(embed(&term, &basis), arraykron(4, 1, &sigma_x()));
        let op: nd::Array2<C64> = kron(&nd::Array2::eye(2), &sigma_x());
        let term = LocalTerm::new("ix", &[1, 2], op).unwrap();
        assert_eq!(embed(&term, &basis), arraykron(4, 2, &sigma_x()));
    }

    #[test]
    fn elements_agree_with_embedding() {
        let basis = ChainBasis::new(3, &Limits::default()).unwrap();
        let op: nd::Array2<C64>
            = nd::Array2::from_shape_fn((4, 4), |(i, j)| {
                C64::new((i * 4 + j) as f64, (i as f64) - (j as f64))
            });
        let term = LocalTerm::new("t", &[2, 0], op).unwrap();
        let H = embed(&term, &basis);
        for ((r, c), a) in H.indexed_iter() {
            assert_eq!(term.element(&basis, r, c), *a);
        }
    }

    #[test]
    fn symmetrization_removes_defect() {
        let op: nd::Array2<C64> = nd::array![
            [C64::from(1.0), C64::new(0.0, 1.0)],
            [C64::zero(), C64::from(2.0)],
        ];
        let term = LocalTerm::new("bad", &[0], op).unwrap();
        assert!(term.hermiticity_defect() > 0.1);
        assert_eq!(term.symmetrized().hermiticity_defect(), 0.0);
        assert!(!term.is_diagonal());
    }

    #[test]
    fn rejects_malformed_terms() {
        assert!(LocalTerm::new("a", &[], sigma_x()).is_err());
        assert!(LocalTerm::new("b", &[1, 1], nd::Array2::eye(4)).is_err());
        assert!(LocalTerm::new("c", &[0, 1], sigma_x()).is_err());
    }

    #[test]
    fn dense_operator_bounds() {
        let A: nd::Array2<C64> = nd::array![
            [C64::from(1.0), C64::from(0.5)],
            [C64::from(0.5), C64::from(-1.0)],
        ];
        assert_eq!(Operator::hermiticity_defect(&A), 0.0);
        assert_eq!(A.spectral_bounds(), (-1.5, 1.5));
        let psi = nd::array![C64::from(1.0), C64::zero()];
        assert_eq!(A.apply(&psi), nd::array![C64::from(1.0), C64::from(0.5)]);
    }
}
