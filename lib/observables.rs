//! Population observables computed from a recorded trajectory.

use ndarray::{ self as nd, s };
use num_complex::Complex64 as C64;
use serde::{ Deserialize, Serialize, ser::SerializeStruct };
use crate::{
    error::{ AvalancheError, AvalancheResult },
    evolve::Trajectory,
    hilbert::ChainBasis,
};

/// Compute the occupation `⟨ψ| n_j |ψ⟩` of every site for a single state.
///
/// `n_j` is diagonal in the product basis, so the expectation value is the sum
/// of `|ψ_i|²` over basis states with site `j` occupied and is real by
/// construction.
pub fn site_occupations(basis: &ChainBasis, psi: nd::ArrayView1<C64>)
    -> nd::Array1<f64>
{
    let mut acc: nd::Array1<f64> = nd::Array1::zeros(basis.nsites());
    for (idx, a) in psi.iter().enumerate() {
        let p = a.norm_sqr();
        acc.iter_mut().enumerate()
            .filter(|(j, _)| basis.occupied(idx, *j))
            .for_each(|(_, s)| { *s += p; });
    }
    acc
}

/// Least-squares line `S(t) ≈ slope · t + intercept`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination.
    pub r_squared: f64,
}

impl LinearFit {
    /// Fit a line to `(x, y)` pairs.
    ///
    /// Returns `None` for fewer than two points or degenerate `x`.
    pub fn fit(x: &[f64], y: &[f64]) -> Option<Self> {
        let n = x.len().min(y.len());
        if n < 2 { return None; }
        let nf = n as f64;
        let mx = x[..n].iter().sum::<f64>() / nf;
        let my = y[..n].iter().sum::<f64>() / nf;
        let (sxx, sxy, syy)
            = x[..n].iter().zip(&y[..n])
            .fold((0.0, 0.0, 0.0), |(sxx, sxy, syy), (xk, yk)| {
                let dx = xk - mx;
                let dy = yk - my;
                (sxx + dx * dx, sxy + dx * dy, syy + dy * dy)
            });
        if sxx == 0.0 { return None; }
        let slope = sxy / sxx;
        let r_squared = if syy == 0.0 { 1.0 } else { sxy * sxy / (sxx * syy) };
        Some(Self { slope, intercept: my - slope * mx, r_squared })
    }
}

/// Total and per-site excitation number over a time grid.
///
/// Serializes as `times`, `signal_total`, and `signal_per_site` (a list of
/// rows, one per grid point).
#[derive(Clone, Debug, PartialEq)]
pub struct Signal {
    times: nd::Array1<f64>,
    total: nd::Array1<f64>,
    // time × site
    per_site: nd::Array2<f64>,
}

impl Signal {
    /// Compute the signal of a trajectory over the chain spanned by `basis`.
    ///
    /// Fails if the trajectory's states do not live in the chain's space.
    pub fn extract(traj: &Trajectory, basis: &ChainBasis)
        -> AvalancheResult<Self>
    {
        let nsites = basis.nsites();
        if traj.states().nrows() != basis.dim() {
            return Err(AvalancheError::construction(
                "<trajectory>",
                format!(
                    "states have dimension {}, expected {} for N = {}",
                    traj.states().nrows(), basis.dim(), nsites,
                ),
            ));
        }
        let mut per_site: nd::Array2<f64>
            = nd::Array2::zeros((traj.len(), nsites));
        for ((_, psi), row) in traj.iter().zip(per_site.outer_iter_mut()) {
            site_occupations(basis, psi).move_into(row);
        }
        let total = per_site.sum_axis(nd::Axis(1));
        Ok(Self { times: traj.times().clone(), total, per_site })
    }

    /// Return the time grid.
    pub fn times(&self) -> &nd::Array1<f64> { &self.times }

    /// Return the total excitation number S(t).
    pub fn total(&self) -> &nd::Array1<f64> { &self.total }

    /// Return the per-site occupations S_j(t), with time along the first
    /// axis.
    pub fn per_site(&self) -> &nd::Array2<f64> { &self.per_site }

    /// Return the number of sites.
    pub fn nsites(&self) -> usize { self.per_site.ncols() }

    /// Return the index of the grid point nearest to `t`.
    pub fn index_nearest(&self, t: f64) -> Option<usize> {
        self.times.iter().enumerate()
            .min_by(|(_, a), (_, b)| {
                (*a - t).abs().total_cmp(&(*b - t).abs())
            })
            .map(|(k, _)| k)
    }

    /// Return S at the grid point nearest to `t`.
    pub fn value_at(&self, t: f64) -> Option<f64> {
        self.index_nearest(t).map(|k| self.total[k])
    }

    /// Return the occupation profile of the chain at the grid point nearest
    /// to `t`.
    pub fn profile_at(&self, t: f64) -> Option<nd::ArrayView1<'_, f64>> {
        self.index_nearest(t).map(|k| self.per_site.slice(s![k, ..]))
    }

    /// Fit a line to S(t) over all grid points with `t` in `[t0, t1]`.
    pub fn linear_fit(&self, t0: f64, t1: f64) -> Option<LinearFit> {
        let (x, y): (Vec<f64>, Vec<f64>)
            = self.times.iter().zip(self.total.iter())
            .filter(|(t, _)| (t0..=t1).contains(*t))
            .map(|(t, s)| (*t, *s))
            .unzip();
        LinearFit::fit(&x, &y)
    }

    /// Fit a line to the middle half of the grid, where growth is ballistic.
    pub fn ballistic_fit(&self) -> Option<LinearFit> {
        let n = self.times.len();
        let x = self.times.slice(s![n / 4..3 * n / 4]).to_vec();
        let y = self.total.slice(s![n / 4..3 * n / 4]).to_vec();
        LinearFit::fit(&x, &y)
    }

    /// Estimate the exponent `p` in `S(t) - S(0) ∝ t^p` between two times.
    ///
    /// Returns `None` if either time is not positive or the growth above the
    /// initial value is not positive at both.
    pub fn growth_exponent(&self, t1: f64, t2: f64) -> Option<f64> {
        let s0 = *self.total.get(0)?;
        let k1 = self.index_nearest(t1)?;
        let k2 = self.index_nearest(t2)?;
        let (ta, tb) = (self.times[k1], self.times[k2]);
        let (ga, gb) = (self.total[k1] - s0, self.total[k2] - s0);
        (ta > 0.0 && tb > 0.0 && ta != tb && ga > 0.0 && gb > 0.0)
            .then(|| (gb / ga).ln() / (tb / ta).ln())
    }
}

impl Serialize for Signal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where S: serde::Serializer
    {
        let per_site: Vec<Vec<f64>>
            = self.per_site.outer_iter().map(|row| row.to_vec()).collect();
        let mut state = serializer.serialize_struct("Signal", 3)?;
        state.serialize_field("times", &self.times.to_vec())?;
        state.serialize_field("signal_total", &self.total.to_vec())?;
        state.serialize_field("signal_per_site", &per_site)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ Limits, ModelConfig },
        dynamics::HBuilderChain,
        evolve::evolve,
        excitation::Initializer,
        params::{ PhysicalParameters, Scenario },
    };

    fn signal(n: usize, init: Initializer) -> Signal {
        let config = ModelConfig::default();
        let params
            = PhysicalParameters::zero_field(n, Scenario::A, &config)
            .unwrap()
            .with_couplings(1.0, -20.0, 20.0)
            .unwrap();
        let H = HBuilderChain::new(&params).build(&config.tolerances).unwrap();
        let psi0 = init.into_array(params.basis()).unwrap();
        let t = nd::Array1::linspace(0.0, 2.0, 21);
        let traj = evolve(&psi0, &H, &t, &config).unwrap();
        Signal::extract(&traj, params.basis()).unwrap()
    }

    #[test]
    fn occupations_of_basis_state() {
        let basis = ChainBasis::new(3, &Limits::default()).unwrap();
        let mut psi: nd::Array1<C64> = nd::Array1::zeros(8);
        psi[0b101] = C64::from(1.0);
        let occ = site_occupations(&basis, psi.view());
        assert_eq!(occ.to_vec(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn occupations_ignore_phases() {
        let basis = ChainBasis::new(2, &Limits::default()).unwrap();
        // (|gr⟩ + i|rg⟩ - |rr⟩) / √3
        let a = 1.0 / 3.0_f64.sqrt();
        let psi = nd::array![
            C64::from(0.0),
            C64::new(a, 0.0),
            C64::new(0.0, a),
            C64::new(-a, 0.0),
        ];
        let occ = site_occupations(&basis, psi.view());
        assert!((occ[0] - 2.0 / 3.0).abs() < 1e-15);
        assert!((occ[1] - 2.0 / 3.0).abs() < 1e-15);
    }

    #[test]
    fn initial_signal_is_one_and_bounded() {
        for init in [Initializer::Local { site: None }, Initializer::Collective]
        {
            let sig = signal(5, init);
            assert!((sig.total()[0] - 1.0).abs() < 1e-10);
            assert!(sig.total().iter()
                .all(|s| *s >= -1e-10 && *s <= 5.0 + 1e-10));
            assert!(sig.per_site().iter()
                .all(|s| *s >= -1e-10 && *s <= 1.0 + 1e-10));
            assert_eq!(sig.per_site().dim(), (21, 5));
        }
    }

    #[test]
    fn total_is_sum_of_sites() {
        let sig = signal(4, Initializer::Local { site: Some(0) });
        for (k, row) in sig.per_site().outer_iter().enumerate() {
            assert!((row.sum() - sig.total()[k]).abs() < 1e-12);
        }
        let profile = sig.profile_at(0.0).unwrap();
        assert!((profile[0] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn nearest_grid_point() {
        let sig = signal(3, Initializer::Collective);
        assert_eq!(sig.index_nearest(0.0), Some(0));
        assert_eq!(sig.index_nearest(0.51), Some(5));
        assert_eq!(sig.index_nearest(100.0), Some(20));
        assert_eq!(sig.value_at(0.0), Some(sig.total()[0]));
    }

    #[test]
    fn fits_exact_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let fit = LinearFit::fit(&x, &y).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert!(LinearFit::fit(&[1.0], &[1.0]).is_none());
        assert!(LinearFit::fit(&[1.0, 1.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn rejects_wrong_chain_length() {
        let config = ModelConfig::default();
        let params
            = PhysicalParameters::zero_field(3, Scenario::A, &config).unwrap();
        let H = HBuilderChain::new(&params).build(&config.tolerances).unwrap();
        let psi0 = Initializer::Collective.into_array(params.basis()).unwrap();
        let traj
            = evolve(&psi0, &H, &nd::array![0.0, 1.0], &config).unwrap();
        let longer = ChainBasis::new(4, &config.limits).unwrap();
        assert!(Signal::extract(&traj, &longer).is_err());
    }
}
