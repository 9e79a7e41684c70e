use gwpop::vamana::{CHIRP_MASS_MAXIMUM, CHIRP_MASS_MINIMUM};
use gwpop::{
    ArrayBackend, BinarySamples, CpuBackend, DensityError, HyperParameters,
    MixtureOfPowerLawsAndGaussians, MixtureSettings, RayonBackend, Vamana,
};
use ndarray::{Array1, array};
use std::sync::Arc;

fn three_component_parameters() -> HyperParameters {
    let mut params = HyperParameters::from([
        ("weight_0", 0.5),
        ("weight_1", 0.3),
        ("mu_m_0", 0.2),
        ("mu_m_1", 0.25),
    ]);
    for (ii, (sigma_m, mu_sz, alpha_q, qmin)) in
        [(0.08, 0.0, 1.0, 0.1), (0.1, 0.1, 2.0, 0.3), (0.15, -0.05, -1.0, 0.2)]
            .into_iter()
            .enumerate()
    {
        params.insert(format!("sigma_m_{ii}"), sigma_m);
        params.insert(format!("mu_sz_{ii}"), mu_sz);
        params.insert(format!("sigma_sz_{ii}"), 0.2);
        params.insert(format!("alpha_q_{ii}"), alpha_q);
        params.insert(format!("qmin_{ii}"), qmin);
    }
    params
}

fn fixed_binaries(grid: &Array1<f64>, chi_1: f64, chi_2: f64, q: f64) -> [Array1<f64>; 3] {
    [
        Array1::from_elem(grid.len(), chi_1),
        Array1::from_elem(grid.len(), chi_2),
        Array1::from_elem(grid.len(), q),
    ]
}

#[test]
fn chirp_mass_marginal_recovers_component_weights() {
    let backend = CpuBackend;
    let model = Vamana::new(3, Arc::new(CpuBackend)).unwrap();
    let params = three_component_parameters();

    let grid = backend.linspace(CHIRP_MASS_MINIMUM, CHIRP_MASS_MAXIMUM, 40_001);
    let (chi_1, chi_2, q) = (0.1, -0.2, 0.6);
    let [c1, c2, mass_ratio] = fixed_binaries(&grid, chi_1, chi_2, q);
    let samples = BinarySamples::new(grid.view(), c1.view(), c2.view(), mass_ratio.view()).unwrap();
    let density = model.evaluate(&samples, &params).unwrap();
    let marginal = backend.trapz(density.view(), grid.view());

    let mut expected = 0.0;
    for (index, weight) in [(0, 0.5), (1, 0.3), (2, 0.2)] {
        let p_chi_1 = model.p_chi(array![chi_1].view(), &params, index).unwrap()[0];
        let p_chi_2 = model.p_chi(array![chi_2].view(), &params, index).unwrap()[0];
        let p_q = model.p_mass_ratio(array![q].view(), &params, index).unwrap()[0];
        expected += weight * p_chi_1 * p_chi_2 * p_q;
    }
    assert!(
        (marginal - expected).abs() <= 1e-6 * expected,
        "marginal {marginal} vs {expected}"
    );
}

#[test]
fn components_are_ordered_in_chirp_mass() {
    let model = Vamana::new(3, Arc::new(CpuBackend)).unwrap();
    let locations = model
        .component_mass_locations(&three_component_parameters())
        .unwrap();
    assert!(locations.windows(2).into_iter().all(|w| w[0] < w[1]));
    assert!((locations[2] - CHIRP_MASS_MAXIMUM).abs() < 1e-9);
}

#[test]
fn overweight_points_evaluate_to_zero_with_reference_model() {
    let base = Arc::new(MixtureOfPowerLawsAndGaussians::new(
        MixtureSettings::new(1, 0),
        Arc::new(CpuBackend),
    ));
    let model = Vamana::new(3, Arc::new(CpuBackend))
        .unwrap()
        .with_reference_model(base, None);
    let mut params = three_component_parameters();
    params.insert("weight_1", 0.6);

    let mass = array![5.0, 12.0, 40.0, 70.0];
    let [c1, c2, q] = fixed_binaries(&mass, 0.0, 0.0, 0.5);
    let samples = BinarySamples::new(mass.view(), c1.view(), c2.view(), q.view()).unwrap();
    assert_eq!(model.evaluate(&samples, &params).unwrap(), Array1::<f64>::zeros(4));
    assert_eq!(
        model.reference_model(mass.view()),
        Err(DensityError::MissingReferenceParameters)
    );
}

#[test]
fn mismatched_sample_lengths_are_rejected() {
    let mass = array![5.0, 12.0];
    let spin = array![0.0];
    assert!(matches!(
        BinarySamples::new(mass.view(), spin.view(), mass.view(), mass.view()),
        Err(DensityError::MismatchedSampleLength { name: "chi_1", found: 1, expected: 2 })
    ));
}

#[test]
fn parallel_backend_matches_serial() {
    let params = three_component_parameters();
    let serial = Vamana::new(3, Arc::new(CpuBackend)).unwrap();
    let parallel = Vamana::new(3, Arc::new(RayonBackend::new(16))).unwrap();

    let grid = CpuBackend.linspace(1.0, 110.0, 5_000);
    let [c1, c2, q] = fixed_binaries(&grid, 0.3, 0.05, 0.9);
    let samples = BinarySamples::new(grid.view(), c1.view(), c2.view(), q.view()).unwrap();
    let expected = serial.evaluate(&samples, &params).unwrap();
    let found = parallel.evaluate(&samples, &params).unwrap();
    assert_eq!(expected, found);
    assert_eq!(expected[0], 0.0);
}
