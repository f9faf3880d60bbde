//! Propagation of a pure state under a time-independent Hamiltonian.
//!
//! Where unspecified, the last index of a 2D array corresponds to time and
//! all Hamiltonians should be in units of angular frequency. Two propagators
//! are available and selected internally by the size of the problem:
//! - [`dense::EigenPropagator`] diagonalizes the full matrix once and
//!   evaluates `V e^{-iEt} V† ψ₀` at every grid point;
//! - [`krylov::KrylovPropagator`] steps between grid points with a Lanczos
//!   approximation of the matrix exponential, using only sparse products.
//!
//! Both are exactly unitary up to roundoff; the state is never renormalized.
//! A norm drift beyond tolerance is reported as an error instead.

use ndarray::{ self as nd, s };
use num_complex::Complex64 as C64;
use crate::{
    config::{ Limits, ModelConfig, Tolerances },
    dynamics::{ ASSEMBLED, Operator },
    error::{ AvalancheError, AvalancheResult },
};

pub mod dense;
pub mod krylov;

use dense::EigenPropagator;
use krylov::{ KrylovPropagator, KRYLOV_DIM };

const C64_BYTES: u64 = 16;
const F64_BYTES: u64 = 8;

/// Simple trait to compute the norm of a state vector.
pub trait StateNorm {
    fn norm(&self) -> f64;
}

/// The norm of a 1D array of `Complex64` is the quadrature sum of its
/// elements.
impl<S> StateNorm for nd::ArrayBase<S, nd::Ix1>
where S: nd::Data<Elem = C64>
{
    fn norm(&self) -> f64 {
        self.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt()
    }
}

/// Compute the inner product `⟨a|b⟩`.
pub fn inner(a: nd::ArrayView1<C64>, b: nd::ArrayView1<C64>) -> C64 {
    a.iter().zip(b.iter()).map(|(ak, bk)| ak.conj() * bk).sum()
}

/// Available propagation methods.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Propagator {
    /// Full diagonalization.
    Dense,
    /// Lanczos steps with a fixed Krylov dimension.
    Krylov,
}

impl Propagator {
    /// Select the method for an operator of dimension `dim`.
    pub fn select(dim: usize, limits: &Limits) -> Self {
        let dense_max = 1_usize
            .checked_shl(limits.dense_max_sites as u32)
            .unwrap_or(usize::MAX);
        if dim <= dense_max { Self::Dense } else { Self::Krylov }
    }

    /// Estimate the peak memory (bytes) used by the method itself for an
    /// operator of dimension `dim`.
    pub fn memory_estimate(&self, dim: usize) -> u64 {
        let d = dim as u64;
        match self {
            Self::Dense => 2 * d * d * C64_BYTES + 4 * d * C64_BYTES,
            Self::Krylov => d * C64_BYTES * (KRYLOV_DIM as u64 + 4),
        }
    }
}

/// Estimate the peak memory (bytes) of a full run over an `nsites`-site chain
/// recorded at `ntimes` grid points.
///
/// Fails if `nsites` exceeds the configured site limit or the estimate
/// exceeds the memory budget.
pub fn check_capacity(nsites: usize, ntimes: usize, limits: &Limits)
    -> AvalancheResult<u64>
{
    if nsites > limits.max_sites {
        return Err(AvalancheError::Capacity {
            nsites,
            required_bytes: 0,
            budget_bytes: limits.memory_budget,
            reason: format!(
                "N exceeds the maximum of {} sites", limits.max_sites),
        });
    }
    let dim = 1_usize << nsites;
    let method = Propagator::select(dim, limits);
    let trajectory = dim as u64 * ntimes as u64 * C64_BYTES;
    let signal = (nsites as u64 + 2) * ntimes as u64 * F64_BYTES;
    let required
        = method.memory_estimate(dim)
        .saturating_add(trajectory)
        .saturating_add(signal);
    if required > limits.memory_budget {
        return Err(AvalancheError::Capacity {
            nsites,
            required_bytes: required,
            budget_bytes: limits.memory_budget,
            reason: format!("{:?} propagation exceeds the memory budget",
                method),
        });
    }
    Ok(required)
}

/// Check that `times` is a non-empty, finite, strictly increasing grid
/// starting at 0.
pub fn check_time_grid(times: &[f64]) -> AvalancheResult<()> {
    match times.first() {
        None => {
            return Err(AvalancheError::config(
                "time_grid", times, "must not be empty"));
        },
        Some(t0) if *t0 != 0.0 => {
            return Err(AvalancheError::config(
                "time_grid", *t0, "must start at t = 0"));
        },
        _ => { },
    }
    if let Some(t) = times.iter().find(|t| !t.is_finite()) {
        return Err(AvalancheError::config(
            "time_grid", *t, "must contain only finite values"));
    }
    if let Some(k) = (1..times.len()).find(|k| times[*k] <= times[k - 1]) {
        return Err(AvalancheError::config(
            "time_grid",
            (times[k - 1], times[k]),
            &format!("must be strictly increasing (at index {})", k),
        ));
    }
    Ok(())
}

/// Check that `H` can propagate `psi0` over `times`.
///
/// This is the only failure mode before evolution starts: a non-square
/// operator or one whose dimension does not match the state is rejected, as
/// is an operator failing the Hermiticity check or a non-normalized state.
pub fn preflight<O>(
    psi0: &nd::Array1<C64>,
    H: &O,
    times: &nd::Array1<f64>,
    tol: &Tolerances,
) -> AvalancheResult<()>
where O: Operator + ?Sized
{
    let (rows, cols) = H.shape();
    if rows != cols {
        return Err(AvalancheError::construction(
            ASSEMBLED, format!("operator is not square: {}x{}", rows, cols)));
    }
    if rows != psi0.len() {
        return Err(AvalancheError::construction(
            ASSEMBLED,
            format!(
                "dimension mismatch: operator is {}x{}, state has length {}",
                rows, cols, psi0.len(),
            ),
        ));
    }
    let defect = H.hermiticity_defect();
    if !(defect <= tol.hermiticity) {
        return Err(AvalancheError::construction(
            ASSEMBLED,
            format!(
                "not Hermitian: relative defect {:.3e} exceeds {:.1e}",
                defect, tol.hermiticity,
            ),
        ));
    }
    let norm = psi0.norm();
    if !((norm - 1.0).abs() <= tol.norm) {
        return Err(AvalancheError::config(
            "psi0", norm, "initial state must be normalized"));
    }
    match times.as_slice() {
        Some(t) => check_time_grid(t),
        None => check_time_grid(&times.to_vec()),
    }
}

fn check_norm(
    step: usize,
    time: f64,
    psi: nd::ArrayView1<C64>,
    tol: &Tolerances,
) -> AvalancheResult<()>
{
    let norm = psi.norm();
    if (norm - 1.0).abs() <= tol.norm {
        Ok(())
    } else {
        tracing::debug!(step, time, norm, "norm drift");
        Err(AvalancheError::NumericalDivergence {
            step,
            time,
            norm,
            tolerance: tol.norm,
        })
    }
}

/// Sequence of states recorded over a time grid.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    times: nd::Array1<f64>,
    states: nd::Array2<C64>,
}

impl Trajectory {
    /// Return the time grid.
    pub fn times(&self) -> &nd::Array1<f64> { &self.times }

    /// Return all states, with time along the last axis.
    pub fn states(&self) -> &nd::Array2<C64> { &self.states }

    /// Return the number of recorded grid points.
    pub fn len(&self) -> usize { self.times.len() }

    pub fn is_empty(&self) -> bool { self.times.is_empty() }

    /// Return the state at grid index `k`.
    pub fn state_at(&self, k: usize) -> Option<nd::ArrayView1<C64>> {
        (k < self.len()).then(|| self.states.slice(s![.., k]))
    }

    /// Iterate over `(time, state)` pairs.
    pub fn iter(&self)
        -> impl Iterator<Item = (f64, nd::ArrayView1<'_, C64>)> + '_
    {
        self.times.iter().copied()
            .zip(self.states.axis_iter(nd::Axis(1)))
    }
}

fn propagate<O, F>(
    method: Propagator,
    psi0: &nd::Array1<C64>,
    H: &O,
    times: &nd::Array1<f64>,
    config: &ModelConfig,
    mut sink: F,
) -> AvalancheResult<()>
where
    O: Operator + ?Sized,
    F: FnMut(usize, nd::ArrayView1<C64>),
{
    preflight(psi0, H, times, &config.tolerances)?;
    tracing::debug!(dim = H.dim(), ntimes = times.len(), ?method, "evolving");
    let tol = &config.tolerances;
    match method {
        Propagator::Dense => {
            let mut prop = EigenPropagator::new(psi0, H)?;
            let mut psi: nd::Array1<C64> = nd::Array1::zeros(psi0.len());
            for (k, &tk) in times.iter().enumerate() {
                prop.state_into(tk, psi.view_mut());
                check_norm(k, tk, psi.view(), tol)?;
                sink(k, psi.view());
            }
        },
        Propagator::Krylov => {
            let mut prop = KrylovPropagator::new(psi0, H)?;
            let mut t_prev: f64 = 0.0;
            for (k, &tk) in times.iter().enumerate() {
                prop.advance(tk - t_prev)?;
                t_prev = tk;
                check_norm(k, tk, prop.state(), tol)?;
                sink(k, prop.state());
            }
        },
    }
    Ok(())
}

/// Compute the coherent evolution of the initial state `psi0` under `H` with
/// an explicitly chosen method.
pub fn evolve_using<O>(
    method: Propagator,
    psi0: &nd::Array1<C64>,
    H: &O,
    times: &nd::Array1<f64>,
    config: &ModelConfig,
) -> AvalancheResult<Trajectory>
where O: Operator + ?Sized
{
    let mut states: nd::Array2<C64>
        = nd::Array2::zeros((psi0.len(), times.len()));
    propagate(method, psi0, H, times, config, |k, psi| {
        states.slice_mut(s![.., k]).assign(&psi);
    })?;
    Ok(Trajectory { times: times.clone(), states })
}

/// Compute the coherent evolution of the initial state `psi0` under `H`.
///
/// Note: `psi0` is the state at `t = 0`, which must be the first element of
/// `times`.
pub fn evolve<O>(
    psi0: &nd::Array1<C64>,
    H: &O,
    times: &nd::Array1<f64>,
    config: &ModelConfig,
) -> AvalancheResult<Trajectory>
where O: Operator + ?Sized
{
    let method = Propagator::select(H.dim(), &config.limits);
    evolve_using(method, psi0, H, times, config)
}

/// Like [`evolve`], but mapping each state through `x` instead of recording
/// it.
pub fn evolve_reduced<O, F, T>(
    psi0: &nd::Array1<C64>,
    H: &O,
    times: &nd::Array1<f64>,
    config: &ModelConfig,
    mut x: F,
) -> AvalancheResult<Vec<T>>
where
    O: Operator + ?Sized,
    F: FnMut(nd::ArrayView1<C64>) -> T,
{
    let method = Propagator::select(H.dim(), &config.limits);
    let mut acc: Vec<T> = Vec::with_capacity(times.len());
    propagate(method, psi0, H, times, config, |_, psi| { acc.push(x(psi)); })?;
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::Zero;
    use crate::{
        dynamics::HBuilderChain,
        excitation::Initializer,
        hilbert::ChainBasis,
        params::{ PhysicalParameters, Scenario },
    };

    fn basis(n: usize) -> ChainBasis {
        ChainBasis::new(n, &Limits::default()).unwrap()
    }

    fn chain(n: usize) -> crate::dynamics::Hamiltonian {
        let config = ModelConfig::default();
        let params
            = PhysicalParameters::zero_field(n, Scenario::A, &config)
            .unwrap()
            .with_couplings(1.0, -4.0, 4.0)
            .unwrap();
        HBuilderChain::new(&params).build(&config.tolerances).unwrap()
    }

    fn grid(tmax: f64, n: usize) -> nd::Array1<f64> {
        nd::Array1::linspace(0.0, tmax, n)
    }

    #[test]
    fn rabi_oscillation_single_site() {
        // H = Ω σx on one isolated two-level system, written as a raw matrix
        let omega = 1.3;
        let H: nd::Array2<C64> = nd::array![
            [C64::zero(), C64::from(omega)],
            [C64::from(omega), C64::zero()],
        ];
        let psi0 = nd::array![C64::from(1.0), C64::zero()];
        let t = grid(3.0, 31);
        let config = ModelConfig::default();
        for method in [Propagator::Dense, Propagator::Krylov] {
            let traj = evolve_using(method, &psi0, &H, &t, &config).unwrap();
            for (tk, psi) in traj.iter() {
                let p_excited = psi[1].norm_sqr();
                assert!((p_excited - (omega * tk).sin().powi(2)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn dense_and_krylov_agree() {
        let H = chain(7);
        let psi0
            = Initializer::Local { site: None }
            .into_array(&basis(7))
            .unwrap();
        let t = grid(4.0, 21);
        let config = ModelConfig::default();
        let dense
            = evolve_using(Propagator::Dense, &psi0, &H, &t, &config).unwrap();
        let krylov
            = evolve_using(Propagator::Krylov, &psi0, &H, &t, &config).unwrap();
        let diff = dense.states() - krylov.states();
        assert!(diff.iter().all(|a| a.norm() < 1e-8));
    }

    #[test]
    fn norm_is_preserved() {
        let H = chain(6);
        let psi0 = Initializer::Collective.into_array(&basis(6)).unwrap();
        let t = grid(10.0, 41);
        let traj = evolve(&psi0, &H, &t, &ModelConfig::default()).unwrap();
        assert_eq!(traj.len(), 41);
        for (_, psi) in traj.iter() {
            assert!((psi.norm() - 1.0).abs() < 1e-9);
        }
        let first = traj.state_at(0).unwrap();
        assert!((&first - &psi0).iter().all(|a| a.norm() < 1e-12));
        assert!(traj.state_at(41).is_none());
    }

    #[test]
    fn reduced_matches_full() {
        let H = chain(5);
        let psi0
            = Initializer::Local { site: Some(1) }
            .into_array(&basis(5))
            .unwrap();
        let t = grid(2.0, 11);
        let config = ModelConfig::default();
        let full = evolve(&psi0, &H, &t, &config).unwrap();
        let amps: Vec<C64>
            = evolve_reduced(&psi0, &H, &t, &config, |psi| psi[0]).unwrap();
        assert_eq!(amps.len(), 11);
        for (k, a) in amps.iter().enumerate() {
            assert!((a - full.states()[[0, k]]).norm() < 1e-14);
        }
    }

    #[test]
    fn norm_drift_is_divergence() {
        let tol = Tolerances::default();
        let mut psi: nd::Array1<C64> = nd::Array1::zeros(4);
        psi[2] = C64::from(1.0 + 1e-8);
        assert!(check_norm(0, 0.0, psi.view(), &tol).is_ok());

        psi[2] = C64::from(1.0 + 1e-5);
        let err = check_norm(3, 0.75, psi.view(), &tol).unwrap_err();
        assert!(!err.is_preflight());
        match err {
            AvalancheError::NumericalDivergence {
                step, time, norm, tolerance,
            } => {
                assert_eq!(step, 3);
                assert_eq!(time, 0.75);
                assert!((norm - (1.0 + 1e-5)).abs() < 1e-12);
                assert_eq!(tolerance, tol.norm);
            },
            other => panic!("unexpected error: {}", other),
        }

        psi[2] = C64::new(f64::NAN, 0.0);
        assert!(matches!(
            check_norm(5, 1.25, psi.view(), &tol),
            Err(AvalancheError::NumericalDivergence { step: 5, .. })
        ));
    }

    #[test]
    fn rejects_mismatched_dimension() {
        let H = chain(4);
        let psi0 = Initializer::Collective.into_array(&basis(5)).unwrap();
        let err = evolve(&psi0, &H, &grid(1.0, 3), &ModelConfig::default())
            .unwrap_err();
        assert!(matches!(err, AvalancheError::Construction { .. }));
    }

    #[test]
    fn rejects_non_hermitian_matrix() {
        let H: nd::Array2<C64> = nd::array![
            [C64::zero(), C64::from(1.0)],
            [C64::from(2.0), C64::zero()],
        ];
        let psi0 = nd::array![C64::from(1.0), C64::zero()];
        let err = evolve(&psi0, &H, &grid(1.0, 3), &ModelConfig::default())
            .unwrap_err();
        match err {
            AvalancheError::Construction { term, .. } => {
                assert_eq!(term, ASSEMBLED);
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_grids() {
        assert!(check_time_grid(&[]).is_err());
        assert!(check_time_grid(&[0.1, 0.2]).is_err());
        assert!(check_time_grid(&[0.0, 0.2, 0.2]).is_err());
        assert!(check_time_grid(&[0.0, f64::NAN]).is_err());
        assert!(check_time_grid(&[0.0]).is_ok());
        assert!(check_time_grid(&[0.0, 1e-3, 2.0]).is_ok());
    }

    #[test]
    fn capacity_limits() {
        let limits = Limits::default();
        assert!(check_capacity(11, 100, &limits).is_ok());
        assert!(check_capacity(14, 100, &limits).is_ok());
        let err = check_capacity(15, 100, &limits).unwrap_err();
        assert!(matches!(err, AvalancheError::Capacity { nsites: 15, .. }));
        let tight = Limits { memory_budget: 1 << 20, ..limits };
        let err = check_capacity(11, 100, &tight).unwrap_err();
        assert!(err.is_preflight());
    }

    #[test]
    fn method_selection() {
        let limits = Limits::default();
        assert_eq!(Propagator::select(1 << 11, &limits), Propagator::Dense);
        assert_eq!(Propagator::select(1 << 12, &limits), Propagator::Krylov);
    }
}
