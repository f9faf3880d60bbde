use avalanche_sim::{
    ModelConfig,
    dynamics::{ HBuilderChain, Operator },
    evolve::{ Propagator, StateNorm, evolve_using },
    excitation::Initializer,
    observables::Signal,
    params::{ PhysicalParameters, Scenario },
};
use ndarray as nd;
use proptest::prelude::*;

fn parameters(nsites: usize, omega: f64, delta: f64, v: f64)
    -> PhysicalParameters
{
    PhysicalParameters::zero_field(nsites, Scenario::A, &ModelConfig::default())
        .unwrap()
        .with_couplings(omega, delta, v)
        .unwrap()
}

fn initializer(collective: bool, site: usize, nsites: usize) -> Initializer {
    if collective {
        Initializer::Collective
    } else {
        Initializer::Local { site: Some(site % nsites) }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn hamiltonian_is_hermitian(
        nsites in 2usize..7,
        omega in 0.01f64..5.0,
        delta in -30.0f64..30.0,
        v in 0.0f64..30.0,
    ) {
        let config = ModelConfig::default();
        let H = HBuilderChain::new(&parameters(nsites, omega, delta, v))
            .build(&config.tolerances)
            .unwrap();
        let dense = H.to_dense();
        let adj = dense.t().mapv(|a| a.conj());
        prop_assert!((&dense - &adj).iter().all(|a| a.norm() < 1e-12));
        prop_assert!(H.hermiticity_defect() <= config.tolerances.hermiticity);
        let (lo, hi) = H.spectral_bounds();
        prop_assert!(lo <= hi);
    }

    #[test]
    fn evolution_preserves_norm(
        nsites in 2usize..7,
        omega in 0.01f64..3.0,
        delta in -20.0f64..20.0,
        v in 0.0f64..20.0,
        collective in any::<bool>(),
        site in 0usize..8,
        krylov in any::<bool>(),
    ) {
        let config = ModelConfig::default();
        let params = parameters(nsites, omega, delta, v);
        let H = HBuilderChain::new(&params)
            .build(&config.tolerances)
            .unwrap();
        let psi0 = initializer(collective, site, nsites)
            .into_array(params.basis())
            .unwrap();
        let t: nd::Array1<f64> = nd::Array1::linspace(0.0, 3.0, 13);
        let method = if krylov { Propagator::Krylov } else { Propagator::Dense };
        let traj = evolve_using(method, &psi0, &H, &t, &config).unwrap();
        for (_, psi) in traj.iter() {
            prop_assert!((psi.norm() - 1.0).abs() < 1e-6);
        }

        let signal = Signal::extract(&traj, params.basis()).unwrap();
        prop_assert!((signal.total()[0] - 1.0).abs() < 1e-9);
        let n = nsites as f64;
        prop_assert!(
            signal.total().iter().all(|s| *s >= -1e-9 && *s <= n + 1e-9));
    }
}
