//! Evolution by full diagonalization.

use ndarray::{ self as nd, linalg::general_mat_vec_mul };
use ndarray_linalg::{ EighInto, UPLO };
use num_complex::Complex64 as C64;
use num_traits::{ One, Zero };
use crate::{
    dynamics::{ ASSEMBLED, Operator },
    error::{ AvalancheError, AvalancheResult },
};

/// Propagator holding the eigendecomposition `H = V E V†` and the initial
/// state in the eigenbasis.
#[derive(Clone, Debug)]
pub struct EigenPropagator {
    E: nd::Array1<f64>,
    V: nd::Array2<C64>,
    c: nd::Array1<C64>,
    // e^{-iEt} c, reused at every grid point
    phased: nd::Array1<C64>,
}

impl EigenPropagator {
    /// Diagonalize `H` and project `psi0` onto its eigenbasis.
    pub fn new<O>(psi0: &nd::Array1<C64>, H: &O) -> AvalancheResult<Self>
    where O: Operator + ?Sized
    {
        let (E, V): (nd::Array1<f64>, nd::Array2<C64>)
            = H.to_dense()
            .eigh_into(UPLO::Lower)
            .map_err(|err| {
                AvalancheError::construction(
                    ASSEMBLED, format!("diagonalization error: {}", err))
            })?;
        let c: nd::Array1<C64> = V.t().mapv(|v| v.conj()).dot(psi0);
        let phased: nd::Array1<C64> = nd::Array1::zeros(c.len());
        Ok(Self { E, V, c, phased })
    }

    /// Return the eigenvalues of the Hamiltonian, in ascending order.
    pub fn energies(&self) -> &nd::Array1<f64> { &self.E }

    /// Write `ψ(t) = V e^{-iEt} V† ψ₀` into `out`.
    pub fn state_into(&mut self, t: f64, mut out: nd::ArrayViewMut1<C64>) {
        nd::Zip::from(&mut self.phased)
            .and(&self.c)
            .and(&self.E)
            .for_each(|p, ck, ek| { *p = *ck * (-C64::i() * *ek * t).exp(); });
        general_mat_vec_mul(
            C64::one(), &self.V, &self.phased, C64::zero(), &mut out);
    }

    /// Return `ψ(t)` in a newly allocated array.
    pub fn state(&mut self, t: f64) -> nd::Array1<C64> {
        let mut psi: nd::Array1<C64> = nd::Array1::zeros(self.c.len());
        self.state_into(t, psi.view_mut());
        psi
    }
}
