// tests/kl_integration_tests.rs

use approx::{assert_abs_diff_eq, assert_relative_eq};
use karhunen_loeve::settings;
use karhunen_loeve::{
    CovarianceModel, GaussProductExperiment, Interval, KarhunenLoeveAlgorithm, KarhunenLoeveFunction,
    KarhunenLoeveResult, Mesh, OrthonormalProductBasis, P1Factory, QuadratureConfig, QuadratureFactory,
    StationaryCovarianceModel, UniformBox, UserDefinedCovarianceModel,
};
use ndarray::{array, Array1};

fn legendre_factory_on_unit_cube(dimension: usize, nodes_per_axis: usize, basis_size: usize) -> QuadratureFactory {
    let domain = Interval::cube(dimension, 0.0, 1.0).unwrap();
    let reference = UniformBox::new(Interval::cube(dimension, -1.0, 1.0).unwrap()).unwrap();
    let experiment = GaussProductExperiment::uniform(reference, &vec![nodes_per_axis; dimension]).unwrap();
    let basis = OrthonormalProductBasis::legendre(dimension).unwrap();
    let config = QuadratureConfig { basis_size, must_scale: true, threshold: 1e-6, max_modes: None };
    QuadratureFactory::with_regularization(&domain, &experiment, &basis, config, 0.0).unwrap()
}

#[test]
fn p1_and_quadrature_agree_on_the_unit_interval() {
    let model = StationaryCovarianceModel::squared_exponential(array![0.3], array![1.0]).unwrap();

    let p1 = P1Factory::with_regularization(Mesh::interval(0.0, 1.0, 400).unwrap(), 1e-6, 0.0).unwrap();
    let p1_result = p1.build(&model).unwrap();
    let quadrature_result = legendre_factory_on_unit_cube(1, 40, 12).build(&model).unwrap();

    assert!(p1_result.mode_count() >= 3);
    assert!(quadrature_result.mode_count() >= 3);
    for k in 0..3 {
        assert_relative_eq!(p1_result.eigenvalues()[k], quadrature_result.eigenvalues()[k], max_relative = 1e-2);
    }
    // The spectrum of a unit-variance field on a unit-length domain sums to 1.
    assert_relative_eq!(p1_result.eigenvalues().sum(), 1.0, max_relative = 1e-3);

    // Leading modes agree up to discretization error.
    let x = array![0.25];
    let p1_value = p1_result.modes()[0].evaluate(x.view()).unwrap();
    let quadrature_value = quadrature_result.modes()[0].evaluate(x.view()).unwrap();
    assert_abs_diff_eq!(p1_value[0].abs(), quadrature_value[0].abs(), epsilon = 1e-2);
}

#[test]
fn p1_and_quadrature_agree_on_the_unit_square() {
    let model = StationaryCovarianceModel::squared_exponential(array![0.5, 0.5], array![1.0]).unwrap();

    let mesh = Mesh::rectangle([0.0, 0.0], [1.0, 1.0], 30, 30).unwrap();
    let p1_result = P1Factory::with_regularization(mesh, 1e-4, 0.0).unwrap().build(&model).unwrap();
    let quadrature_result = legendre_factory_on_unit_cube(2, 12, 21).build(&model).unwrap();

    assert_relative_eq!(p1_result.eigenvalues()[0], quadrature_result.eigenvalues()[0], max_relative = 2e-2);
    assert_relative_eq!(p1_result.eigenvalues()[1], quadrature_result.eigenvalues()[1], max_relative = 2e-2);
}

#[test]
fn vector_valued_quadrature_spectrum_factorizes() {
    let factory = legendre_factory_on_unit_cube(1, 30, 8);
    let scalar = StationaryCovarianceModel::squared_exponential(array![0.4], array![1.0]).unwrap();
    let vector = StationaryCovarianceModel::squared_exponential(array![0.4], array![1.0, 1.0])
        .unwrap()
        .with_output_correlation(array![[1.0, 0.5], [0.5, 1.0]])
        .unwrap();
    let scalar_result = factory.build(&scalar).unwrap();
    let vector_result = factory.build(&vector).unwrap();

    // Output covariance [[1, 0.5], [0.5, 1]] has eigenvalues 1.5 and 0.5.
    let leading = scalar_result.eigenvalues()[0];
    assert_relative_eq!(vector_result.eigenvalues()[0], 1.5 * leading, max_relative = 1e-8);
    assert!(vector_result
        .eigenvalues()
        .iter()
        .any(|&lambda| (lambda - 0.5 * leading).abs() <= 1e-8 * leading));

    let mode = &vector_result.modes()[0];
    assert_eq!(mode.output_dimension(), 2);
    assert_eq!(mode.coefficients().dim(), (8, 2));
    // The leading mode is carried equally by both components.
    let value = mode.evaluate(array![0.5].view()).unwrap();
    assert_abs_diff_eq!(value[0], value[1], epsilon = 1e-8);
    assert_eq!(vector_result.projection_matrix().dim(), (vector_result.mode_count(), 2 * factory.nodes().nrows()));
}

#[test]
fn algorithm_dispatches_to_its_factory() {
    let model = StationaryCovarianceModel::absolute_exponential(array![0.5], array![2.0]).unwrap();
    let p1 = P1Factory::with_regularization(Mesh::interval(0.0, 1.0, 50).unwrap(), 1e-2, 0.0).unwrap();
    let direct = p1.build(&model).unwrap();
    let algorithm = KarhunenLoeveAlgorithm::from(p1);
    assert_eq!(algorithm.threshold(), 1e-2);
    let dispatched = algorithm.build(&model).unwrap();
    assert_abs_diff_eq!(direct.eigenvalues().clone(), dispatched.eigenvalues().clone(), epsilon = 1e-12);

    let quadrature = KarhunenLoeveAlgorithm::from(legendre_factory_on_unit_cube(1, 20, 6));
    assert_eq!(quadrature.threshold(), 1e-6);
    let result = quadrature.build(&model).unwrap();
    assert!(result.mode_count() > 0);
}

#[test]
fn lifted_coordinates_reproduce_the_field() {
    let model = StationaryCovarianceModel::squared_exponential(array![0.2], array![1.0]).unwrap();
    let factory = P1Factory::with_regularization(Mesh::interval(-1.0, 1.0, 60).unwrap(), 1e-3, 0.0).unwrap();
    let result = factory.build(&model).unwrap();
    let k = result.mode_count();
    let xi = Array1::from_shape_fn(k, |i| {
        let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
        sign / (1.0 + i as f64)
    });
    let lifted = result.lift(xi.view()).unwrap();

    // Direct sum Σ √λ_k ξ_k φ_k at an interior point.
    let point = array![0.123];
    let mut expected = 0.0;
    for (j, mode) in result.modes().iter().enumerate() {
        expected += result.eigenvalues()[j].sqrt() * xi[j] * mode.evaluate(point.view()).unwrap()[0];
    }
    assert_abs_diff_eq!(lifted.evaluate(point.view()).unwrap()[0], expected, epsilon = 1e-12);

    let recovered = result.project(lifted.coefficients().view()).unwrap();
    assert_abs_diff_eq!(recovered, xi, epsilon = 1e-6);
}

#[test]
fn mesh_and_interval_survive_json() {
    let mesh = Mesh::rectangle([0.0, 0.0], [1.0, 2.0], 3, 2).unwrap();
    let encoded = serde_json::to_string(&mesh).unwrap();
    let decoded: Mesh = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, mesh);

    let interval = Interval::new(array![-1.0, 0.0], array![1.0, 3.0]).unwrap();
    let decoded: Interval = serde_json::from_str(&serde_json::to_string(&interval).unwrap()).unwrap();
    assert_eq!(decoded, interval);
}

#[test]
fn factories_read_regularization_settings_at_construction() {
    settings::set_scalar(settings::P1_REGULARIZATION_FACTOR, 1e-3);
    settings::set_scalar(settings::QUADRATURE_REGULARIZATION_FACTOR, 1e-5);
    settings::set_scalar(settings::IMAGINARY_PART_TOLERANCE, 1e-3);
    let p1 = P1Factory::new(Mesh::interval(0.0, 1.0, 4).unwrap(), 0.0).unwrap();
    let domain = Interval::cube(1, -1.0, 1.0).unwrap();
    let experiment = GaussProductExperiment::uniform(UniformBox::new(domain.clone()).unwrap(), &[6]).unwrap();
    let basis = OrthonormalProductBasis::legendre(1).unwrap();
    let config = QuadratureConfig { basis_size: 4, ..QuadratureConfig::default() };
    let quadrature = QuadratureFactory::new(&domain, &experiment, &basis, config).unwrap();
    settings::reset();

    assert_eq!(p1.regularization_factor(), 1e-3);
    assert_eq!(p1.imaginary_part_tolerance(), 1e-3);
    assert_eq!(quadrature.regularization_factor(), 1e-5);
    // Later changes do not leak into existing factories.
    assert_eq!(settings::get_scalar(settings::P1_REGULARIZATION_FACTOR), 0.0);
    assert_eq!(p1.regularization_factor(), 1e-3);
    assert_eq!(settings::get_scalar(settings::IMAGINARY_PART_TOLERANCE), 1e-8);
    assert_eq!(p1.imaginary_part_tolerance(), 1e-3);
    // Building does not consult the settings again.
    let model = StationaryCovarianceModel::squared_exponential(array![0.5], array![1.0]).unwrap();
    assert!(p1.build(&model).unwrap().mode_count() > 0);
    assert_eq!(p1.imaginary_part_tolerance(), 1e-3);
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn factories_and_their_outputs_are_send_and_sync() {
    assert_send_sync::<P1Factory>();
    assert_send_sync::<QuadratureFactory>();
    assert_send_sync::<KarhunenLoeveAlgorithm>();
    assert_send_sync::<KarhunenLoeveResult>();
    assert_send_sync::<KarhunenLoeveFunction>();
}

fn assert_same_decomposition(concurrent: &KarhunenLoeveResult, sequential: &KarhunenLoeveResult) {
    assert_eq!(concurrent.mode_count(), sequential.mode_count());
    assert_relative_eq!(concurrent.eigenvalues().clone(), sequential.eigenvalues().clone(), max_relative = 1e-10);
    assert_eq!(concurrent.projection_matrix().dim(), sequential.projection_matrix().dim());
}

#[test]
fn concurrent_builds_on_a_shared_factory_match_sequential_builds() {
    let squared = StationaryCovarianceModel::squared_exponential(array![0.3], array![1.0]).unwrap();
    let brownian = UserDefinedCovarianceModel::scalar(1, |s, t| s[0].min(t[0]));
    let models: [&dyn CovarianceModel; 2] = [&squared, &brownian];

    let p1 = P1Factory::with_regularization(Mesh::interval(0.0, 1.0, 80).unwrap(), 1e-4, 0.0).unwrap();
    let quadrature = legendre_factory_on_unit_cube(1, 30, 10);
    let sequential: Vec<(KarhunenLoeveResult, KarhunenLoeveResult)> = models
        .iter()
        .map(|model| (p1.build(*model).unwrap(), quadrature.build(*model).unwrap()))
        .collect();

    let concurrent: Vec<(KarhunenLoeveResult, KarhunenLoeveResult)> = std::thread::scope(|scope| {
        let handles: Vec<_> = models
            .iter()
            .map(|model| {
                let (p1, quadrature) = (&p1, &quadrature);
                scope.spawn(move || (p1.build(*model).unwrap(), quadrature.build(*model).unwrap()))
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    for ((p1_concurrent, quadrature_concurrent), (p1_sequential, quadrature_sequential)) in
        concurrent.iter().zip(sequential.iter())
    {
        assert!(p1_sequential.mode_count() > 0);
        assert!(quadrature_sequential.mode_count() > 0);
        assert_same_decomposition(p1_concurrent, p1_sequential);
        assert_same_decomposition(quadrature_concurrent, quadrature_sequential);
    }
    // The two models give different spectra, so results were not mixed up between threads.
    assert!((concurrent[0].0.eigenvalues()[0] - concurrent[1].0.eigenvalues()[0]).abs() > 1e-3);

    // Modes built on one thread are evaluated on another.
    let mode = sequential[0].1.modes()[0].clone();
    let expected = mode.evaluate(array![0.4].view()).unwrap();
    let value = std::thread::scope(|scope| scope.spawn(|| mode.evaluate(array![0.4].view()).unwrap()).join().unwrap());
    assert_eq!(value, expected);
}
