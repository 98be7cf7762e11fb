/// Benchmarks for the batched 1-D executors and the pencil decomposition.
///
/// Host executors run their blocks sequentially, device executors as one
/// data-parallel batch, so the groups below compare the two locations on the
/// same boxes along every axis.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pencil_fft::{
    make_pencils, make_procgrid, Box3d, Complex, DeviceBuffer, DeviceFftExecutor,
    DeviceFftExecutorR2c, HostFftExecutor, HostFftExecutorR2c,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::time::Duration;

const BENCHMARK_EDGES: &[i32] = &[16, 32, 64];
const MEASUREMENT_TIME: Duration = Duration::from_secs(5);

fn cube(edge: i32) -> Box3d {
    Box3d::new([0, 0, 0], [edge - 1, edge - 1, edge - 1]).unwrap()
}

fn random_complex(count: usize, rng: &mut impl Rng) -> Vec<Complex<f64>> {
    (0..count)
        .map(|_| Complex::new(rng.gen::<f64>(), rng.gen::<f64>()))
        .collect()
}

fn bench_c2c_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("c2c_forward");
    group.measurement_time(MEASUREMENT_TIME);
    let mut rng = ChaCha20Rng::seed_from_u64(12345);

    for &edge in BENCHMARK_EDGES {
        let geometry = cube(edge);
        let input = random_complex(geometry.count().unwrap(), &mut rng);
        group.throughput(Throughput::Elements(geometry.volume() as u64));

        for axis in 0..3 {
            let label = format!("{}^3/axis{}", edge, axis);

            group.bench_with_input(BenchmarkId::new("host", &label), &axis, |b, &axis| {
                let mut fft = HostFftExecutor::<f64>::new(geometry, axis).unwrap();
                let mut data = input.clone();
                b.iter(|| fft.forward(black_box(&mut data[..])).unwrap());
            });

            group.bench_with_input(BenchmarkId::new("device", &label), &axis, |b, &axis| {
                let mut fft = DeviceFftExecutor::<f64>::new(geometry, axis).unwrap();
                let mut data = DeviceBuffer::load(&input).unwrap();
                b.iter(|| fft.forward(black_box(&mut data)).unwrap());
            });
        }
    }

    group.finish();
}

fn bench_r2c_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("r2c_forward");
    group.measurement_time(MEASUREMENT_TIME);
    let mut rng = ChaCha20Rng::seed_from_u64(23456);

    for &edge in BENCHMARK_EDGES {
        let geometry = cube(edge);
        let input: Vec<f64> = (0..geometry.count().unwrap()).map(|_| rng.gen()).collect();
        group.throughput(Throughput::Elements(geometry.volume() as u64));

        group.bench_with_input(BenchmarkId::new("host", edge), &edge, |b, _| {
            let mut fft = HostFftExecutorR2c::<f64>::new(geometry, 0).unwrap();
            let mut output = vec![Complex::new(0.0, 0.0); fft.complex_size()];
            b.iter(|| fft.forward(black_box(&input[..]), &mut output[..]).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("device", edge), &edge, |b, _| {
            let mut fft = DeviceFftExecutorR2c::<f64>::new(geometry, 0).unwrap();
            let device_input = DeviceBuffer::load(&input).unwrap();
            let mut output = DeviceBuffer::with_len(fft.complex_size()).unwrap();
            b.iter(|| fft.forward(black_box(&device_input), &mut output).unwrap());
        });
    }

    group.finish();
}

fn bench_make_pencils(c: &mut Criterion) {
    let mut group = c.benchmark_group("make_pencils");
    let world = Box3d::new([0, 0, 0], [1023, 1023, 1023]).unwrap();

    for &ranks in &[16usize, 64, 256] {
        let grid = make_procgrid(ranks).unwrap();
        let previous = make_pencils(&world, grid, 0, &[]).unwrap();

        group.bench_with_input(BenchmarkId::new("canonical", ranks), &ranks, |b, _| {
            b.iter(|| make_pencils(black_box(&world), grid, 1, &[]).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("reordered", ranks), &ranks, |b, _| {
            b.iter(|| make_pencils(black_box(&world), grid, 1, &previous).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_c2c_forward, bench_r2c_forward, bench_make_pencils);
criterion_main!(benches);
