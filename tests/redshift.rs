use gwpop::cosmology::FlatLambdaCdm;
use gwpop::redshift::SplineRedshiftSettings;
use gwpop::{
    ArrayBackend, CpuBackend, DensityError, HyperParameters, InterpolationKind, PopulationDensity,
    RayonBackend, SplineRedshift,
};
use ndarray::array;
use std::sync::Arc;

fn node_parameters(locations: &[f64], values: &[f64]) -> HyperParameters {
    let mut params = HyperParameters::new();
    for (ii, (&x, &f)) in locations.iter().zip(values).enumerate() {
        params.insert(format!("redshift{ii}"), x);
        params.insert(format!("fredshift{ii}"), f);
    }
    params
}

#[test]
fn every_interpolation_variant_is_normalised() {
    let locations = [0.01, 0.4, 1.1, 1.9, 2.3];
    let values = [0.0, 1.2, 1.5, 0.2, -1.0];
    for kind in [InterpolationKind::Linear, InterpolationKind::Cubic] {
        for log_nodes in [false, true] {
            let settings = SplineRedshiftSettings::new(2.3)
                .with_nodes(5)
                .with_kind(kind)
                .with_log_nodes(log_nodes);
            let model = SplineRedshift::new(&settings, Arc::new(CpuBackend)).unwrap();
            let params = node_parameters(&locations, &values);

            let zs = model.volume().zs().to_owned();
            let density = model.probability(zs.view(), &params).unwrap();
            let integral = CpuBackend.trapz(density.view(), zs.view());
            assert!(
                (integral - 1.0).abs() < 1e-9,
                "{kind:?} log_nodes={log_nodes} integrates to {integral}"
            );
        }
    }
}

#[test]
fn regularisation_scales_node_values() {
    let settings = SplineRedshiftSettings::new(2.0).with_nodes(3);
    let plain = SplineRedshift::new(&settings, Arc::new(CpuBackend)).unwrap();
    let regularised =
        SplineRedshift::new(&settings.clone().with_regularize(true), Arc::new(CpuBackend)).unwrap();
    assert_eq!(
        regularised.variable_names().last().map(String::as_str),
        Some("rmsredshift")
    );

    let params = node_parameters(&[0.0, 1.0, 2.0], &[0.5, 1.0, 0.5]);
    let doubled = node_parameters(&[0.0, 1.0, 2.0], &[1.0, 2.0, 1.0]);
    let z = array![0.3, 1.0, 1.7];

    let scaled = regularised
        .psi_of_z(z.view(), &params.clone().with("rmsredshift", 2.0))
        .unwrap();
    let reference = plain.psi_of_z(z.view(), &doubled).unwrap();
    for (a, b) in scaled.iter().zip(reference.iter()) {
        assert!((a - b).abs() <= 1e-12 * b, "{a} != {b}");
    }

    assert_eq!(
        regularised.psi_of_z(z.view(), &params),
        Err(DensityError::MissingParameter("rmsredshift".to_string()))
    );
}

#[test]
fn parallel_backend_and_custom_cosmology() {
    let settings = SplineRedshiftSettings::new(1.5).with_nodes(4);
    let params = node_parameters(&[0.0, 0.5, 1.0, 1.5], &[0.0, 0.3, 0.6, 0.9]);

    let serial = SplineRedshift::new(&settings, Arc::new(CpuBackend)).unwrap();
    let parallel = SplineRedshift::new(&settings, Arc::new(RayonBackend::new(32))).unwrap();
    let a = serial.normalisation(&params).unwrap();
    let b = parallel.normalisation(&params).unwrap();
    assert!((a - b).abs() <= 1e-10 * a);

    // A larger Hubble constant shrinks every distance and hence the volume.
    let fast = FlatLambdaCdm::new(80.0, 0.3075);
    let shrunk = SplineRedshift::with_cosmology(&settings, &fast, Arc::new(CpuBackend)).unwrap();
    assert!(shrunk.normalisation(&params).unwrap() < a);
}

#[test]
fn density_trait_object_evaluates_probability() {
    let settings = SplineRedshiftSettings::new(1.0).with_nodes(2);
    let model = SplineRedshift::new(&settings, Arc::new(CpuBackend)).unwrap();
    let params = node_parameters(&[0.0, 1.0], &[0.0, 0.0]);
    let z = array![0.2, 0.8, 1.2];

    let density: Arc<dyn PopulationDensity> = Arc::new(model.clone());
    assert_eq!(density.variable_names(), model.variable_names());
    assert_eq!(
        density.evaluate(z.view(), &params).unwrap(),
        model.probability(z.view(), &params).unwrap()
    );
}

#[test]
fn invalid_maximum_redshift_is_rejected() {
    let settings = SplineRedshiftSettings::new(-0.5);
    assert!(matches!(
        SplineRedshift::new(&settings, Arc::new(CpuBackend)),
        Err(DensityError::InvalidMaximumRedshift(..))
    ));
}
