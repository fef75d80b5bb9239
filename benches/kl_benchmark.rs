use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use karhunen_loeve::{
    GaussProductExperiment, Interval, Mesh, OrthonormalProductBasis, P1Factory, QuadratureConfig, QuadratureFactory,
    StationaryCovarianceModel, UniformBox,
};
use ndarray::array;

// Benchmark for P1Factory::build on regular square meshes
fn bench_p1_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("P1_build");
    group.sample_size(10);
    let model = StationaryCovarianceModel::squared_exponential(array![0.3, 0.3], array![1.0]).unwrap();

    for &cells in [8usize, 16, 24].iter() {
        let mesh = Mesh::rectangle([0.0, 0.0], [1.0, 1.0], cells, cells).unwrap();
        let vertex_count = mesh.vertex_count();
        let factory = P1Factory::with_regularization(mesh, 1e-4, 0.0).unwrap();
        group.throughput(Throughput::Elements(vertex_count as u64));
        group.bench_with_input(BenchmarkId::new("build", format!("{}x{}", cells, cells)), &factory, |b, factory| {
            b.iter(|| factory.build(&model).unwrap());
        });
    }
    group.finish();
}

// Benchmark for QuadratureFactory construction and build
fn bench_quadrature(c: &mut Criterion) {
    let mut group = c.benchmark_group("Quadrature");
    group.sample_size(10);
    let model = StationaryCovarianceModel::absolute_exponential(array![0.5, 0.5], array![1.0]).unwrap();
    let domain = Interval::cube(2, 0.0, 1.0).unwrap();
    let basis = OrthonormalProductBasis::legendre(2).unwrap();

    for &(nodes_per_axis, basis_size) in [(10usize, 15usize), (20, 28), (30, 45)].iter() {
        let reference = UniformBox::new(Interval::cube(2, -1.0, 1.0).unwrap()).unwrap();
        let experiment = GaussProductExperiment::uniform(reference, &[nodes_per_axis, nodes_per_axis]).unwrap();
        let config = QuadratureConfig { basis_size, must_scale: true, threshold: 1e-6, max_modes: None };
        let label = format!("{}nodes_{}basis", nodes_per_axis * nodes_per_axis, basis_size);
        group.throughput(Throughput::Elements((nodes_per_axis * nodes_per_axis) as u64));

        group.bench_with_input(BenchmarkId::new("new", &label), &config, |b, config| {
            b.iter(|| QuadratureFactory::with_regularization(&domain, &experiment, &basis, config.clone(), 0.0).unwrap());
        });

        let factory = QuadratureFactory::with_regularization(&domain, &experiment, &basis, config, 0.0).unwrap();
        group.bench_with_input(BenchmarkId::new("build", &label), &factory, |b, factory| {
            b.iter(|| factory.build(&model).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_p1_build, bench_quadrature);
criterion_main!(benches);
