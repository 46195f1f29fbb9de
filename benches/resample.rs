use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use upscalefx::input::SyntheticSource;
use upscalefx::{resize, Kernel, ResizeTarget, Resolution};

fn bench_kernels(c: &mut Criterion) {
    let frame = SyntheticSource::render(Resolution::new(640, 360), 0);
    let mut group = c.benchmark_group("resize_360p_2x");

    for kernel in Kernel::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(kernel), &kernel, |b, &kernel| {
            b.iter(|| resize(black_box(&frame), ResizeTarget::Factor(2.0), kernel))
        });
    }

    group.finish();
}

fn bench_exact_1080p(c: &mut Criterion) {
    let frame = SyntheticSource::render(Resolution::HD_720P, 0);
    c.bench_function("resize_720p_to_1080p_lanczos", |b| {
        b.iter(|| {
            resize(
                black_box(&frame),
                ResizeTarget::Exact(Resolution::FHD_1080P),
                Kernel::Lanczos,
            )
        })
    });
}

criterion_group!(benches, bench_kernels, bench_exact_1080p);
criterion_main!(benches);
