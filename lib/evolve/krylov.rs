//! Evolution by Lanczos approximation of the matrix exponential.
//!
//! Each step of length `τ` builds an orthonormal basis of the Krylov space
//! `span{ψ, Hψ, ..., H^{m-1}ψ}` with full reorthogonalization, diagonalizes
//! the projected tridiagonal matrix `T`, and sets
//! `ψ(τ) ≈ |ψ| Q e^{-iTτ} e₀`. The Hamiltonian is shifted to the center of its
//! Gershgorin interval, and steps are split so that `ρτ` stays below
//! [`MAX_PHASE`] for spectral half-width `ρ`, which keeps the truncation
//! error far below the norm tolerance for `m = `[`KRYLOV_DIM`].

use ndarray::{ self as nd };
use ndarray_linalg::{ EighInto, UPLO };
use num_complex::Complex64 as C64;
use num_traits::Zero;
use crate::{
    dynamics::{ ASSEMBLED, Operator },
    error::{ AvalancheError, AvalancheResult },
    evolve::{ StateNorm, inner },
};

/// Maximum dimension of the Krylov space.
pub const KRYLOV_DIM: usize = 30;

/// Largest accepted product of the spectral half-width and sub-step length.
pub const MAX_PHASE: f64 = 6.0;

/// Relative size of a new Lanczos vector below which the Krylov space is
/// taken to be invariant.
const BREAKDOWN: f64 = 1e-12;

/// Stepping propagator using only operator-vector products.
///
/// All buffers are allocated once, on creation.
pub struct KrylovPropagator<'a, O>
where O: Operator + ?Sized
{
    H: &'a O,
    m: usize,
    shift: f64,
    max_tau: f64,
    rho: f64,
    psi: nd::Array1<C64>,
    // Lanczos vectors as rows
    Q: nd::Array2<C64>,
    w: nd::Array1<C64>,
    alpha: Vec<f64>,
    beta: Vec<f64>,
}

impl<'a, O> KrylovPropagator<'a, O>
where O: Operator + ?Sized
{
    /// Create a new propagator starting from `psi0`.
    pub fn new(psi0: &nd::Array1<C64>, H: &'a O) -> AvalancheResult<Self> {
        let dim = H.dim();
        let m = KRYLOV_DIM.min(dim).max(1);
        let (lo, hi) = H.spectral_bounds();
        if !(lo.is_finite() && hi.is_finite()) {
            return Err(AvalancheError::construction(
                ASSEMBLED,
                format!("non-finite spectral bounds [{}, {}]", lo, hi),
            ));
        }
        let shift = (lo + hi) / 2.0;
        let rho = (hi - lo) / 2.0;
        let max_tau = if rho > 0.0 { MAX_PHASE / rho } else { f64::INFINITY };
        Ok(Self {
            H,
            m,
            shift,
            max_tau,
            rho,
            psi: psi0.clone(),
            Q: nd::Array2::zeros((m, dim)),
            w: nd::Array1::zeros(dim),
            alpha: Vec::with_capacity(m),
            beta: Vec::with_capacity(m),
        })
    }

    /// Return the current state.
    pub fn state(&self) -> nd::ArrayView1<'_, C64> { self.psi.view() }

    /// Advance the state by time `dt`, split into equal sub-steps no longer
    /// than the accuracy bound allows.
    pub fn advance(&mut self, dt: f64) -> AvalancheResult<()> {
        if dt == 0.0 { return Ok(()); }
        let nsub = (dt.abs() / self.max_tau).ceil().max(1.0) as usize;
        let tau = dt / nsub as f64;
        (0..nsub).try_for_each(|_| self.substep(tau))
    }

    /// Build the Lanczos basis for the current state and return its
    /// dimension.
    fn lanczos(&mut self, beta0: f64) -> usize {
        self.alpha.clear();
        self.beta.clear();
        self.Q.row_mut(0)
            .zip_mut_with(&self.psi, |q, a| { *q = *a / beta0; });
        let threshold = BREAKDOWN * self.rho.max(self.shift.abs());
        for j in 0..self.m {
            self.H.apply_into(self.Q.row(j), self.w.view_mut());
            self.w.scaled_add(C64::from(-self.shift), &self.Q.row(j));
            let a = inner(self.Q.row(j), self.w.view()).re;
            self.alpha.push(a);
            self.w.scaled_add(C64::from(-a), &self.Q.row(j));
            if j > 0 {
                let b = C64::from(-self.beta[j - 1]);
                self.w.scaled_add(b, &self.Q.row(j - 1));
            }
            for i in 0..=j {
                let proj = inner(self.Q.row(i), self.w.view());
                self.w.scaled_add(-proj, &self.Q.row(i));
            }
            let b = self.w.norm();
            if j + 1 == self.m || b <= threshold {
                return j + 1;
            }
            self.beta.push(b);
            self.Q.row_mut(j + 1)
                .zip_mut_with(&self.w, |q, w| { *q = *w / b; });
        }
        self.m
    }

    fn substep(&mut self, tau: f64) -> AvalancheResult<()> {
        let beta0 = self.psi.norm();
        if beta0 == 0.0 { return Ok(()); }
        let k = self.lanczos(beta0);
        let mut T: nd::Array2<f64> = nd::Array2::zeros((k, k));
        for j in 0..k {
            T[[j, j]] = self.alpha[j];
            if j + 1 < k {
                T[[j, j + 1]] = self.beta[j];
                T[[j + 1, j]] = self.beta[j];
            }
        }
        let (theta, S): (nd::Array1<f64>, nd::Array2<f64>)
            = T.eigh_into(UPLO::Lower)
            .map_err(|err| {
                AvalancheError::construction(
                    ASSEMBLED,
                    format!("Lanczos diagonalization error: {}", err),
                )
            })?;
        // y = |ψ| S e^{-iθτ} Sᵀ e₀, with the shift restored as a global phase
        let global = (-C64::i() * self.shift * tau).exp() * beta0;
        let weights: nd::Array1<C64>
            = nd::Zip::from(&theta)
            .and(S.row(0))
            .map_collect(|th, s0| (-C64::i() * *th * tau).exp() * *s0);
        self.psi.fill(C64::zero());
        for j in 0..k {
            let yj: C64
                = S.row(j).iter().zip(weights.iter())
                .map(|(sjl, wl)| *wl * *sjl)
                .sum::<C64>()
                * global;
            self.psi.scaled_add(yj, &self.Q.row(j));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolve::dense::EigenPropagator;

    fn random_hermitian(n: usize) -> nd::Array2<C64> {
        let mut H: nd::Array2<C64> = nd::Array2::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let x = ((i * 7 + j * 13) as f64).sin();
                let y = if i == j { 0.0 } else { ((i * 3 + j) as f64).cos() };
                H[[i, j]] = C64::new(x, y);
                H[[j, i]] = C64::new(x, -y);
            }
        }
        H
    }

    #[test]
    fn matches_diagonalization() {
        let H = random_hermitian(64);
        let mut psi0: nd::Array1<C64> = nd::Array1::zeros(64);
        psi0[3] = C64::from(1.0);
        let mut exact = EigenPropagator::new(&psi0, &H).unwrap();
        let mut prop = KrylovPropagator::new(&psi0, &H).unwrap();
        let mut t_prev = 0.0;
        for t in [0.5, 1.0, 2.5, 7.0] {
            prop.advance(t - t_prev).unwrap();
            t_prev = t;
            let diff = &prop.state() - &exact.state(t);
            assert!(diff.iter().all(|a| a.norm() < 1e-9));
            assert!((prop.state().norm() - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn buffers_reused_across_steps() {
        let H = random_hermitian(40);
        let mut psi0: nd::Array1<C64> = nd::Array1::zeros(40);
        psi0[0] = C64::from(1.0);
        let mut exact = EigenPropagator::new(&psi0, &H).unwrap();
        let mut prop = KrylovPropagator::new(&psi0, &H).unwrap();
        let basis = prop.Q.as_ptr();
        let work = prop.w.as_ptr();
        for k in 1..=5 {
            prop.advance(0.4).unwrap();
            let diff = &prop.state() - &exact.state(0.4 * k as f64);
            assert!(diff.iter().all(|a| a.norm() < 1e-9));
        }
        assert_eq!(prop.Q.as_ptr(), basis);
        assert_eq!(prop.w.as_ptr(), work);
        let k = prop.alpha.len();
        for i in 0..k {
            for j in 0..k {
                let overlap = inner(prop.Q.row(i), prop.Q.row(j));
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((overlap - C64::from(expected)).norm() < 1e-10);
            }
        }
    }

    #[test]
    fn invariant_subspace_breakdown() {
        // ψ₀ is an eigenvector, so the Krylov space is one-dimensional
        let H: nd::Array2<C64> = nd::Array2::from_diag(
            &nd::array![C64::from(1.0), C64::from(-2.0), C64::from(0.5)]);
        let psi0 = nd::array![C64::zero(), C64::from(1.0), C64::zero()];
        let mut prop = KrylovPropagator::new(&psi0, &H).unwrap();
        prop.advance(0.7).unwrap();
        let expected = (C64::i() * 2.0 * 0.7).exp();
        assert!((prop.state()[1] - expected).norm() < 1e-12);
        assert!(prop.state()[0].norm() < 1e-12);
    }
}
