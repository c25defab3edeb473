//! Throughput of the effect units on one 512-frame stereo block.

use cadenza_core::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const SR: f32 = 48_000.0;
const FRAMES: usize = 512;

fn units() -> Vec<(&'static str, DspUnit)> {
    vec![
        ("lowpass", BiquadUnit::low_pass(SR, 0.707, 1200.0).into()),
        ("bitcrush", BitCrusher::new(SR).into()),
        ("flanger", Flanger::new(SR).into()),
        ("gate", Gate::new(SR).into()),
        ("phaser", Phaser::new(SR).into()),
        ("retrigger", Retrigger::new(SR).into()),
        ("sidechain", SideChain::new(SR).into()),
        ("tapestop", TapeStop::new(SR).into()),
        ("wobble", Wobble::new(SR).into()),
    ]
}

fn bench_units(c: &mut Criterion) {
    let input: Vec<f32> = (0..FRAMES * CHANNELS).map(|i| ((i as f32) * 0.013).sin() * 0.5).collect();
    let mut group = c.benchmark_group("unit_block");
    for (name, mut unit) in units() {
        let mut buf = input.clone();
        group.bench_with_input(BenchmarkId::from_parameter(name), &input, |b, input| {
            b.iter(|| {
                buf.copy_from_slice(input);
                unit.process(black_box(&mut buf));
            });
        });
    }
    group.finish();
}

fn bench_parallel(c: &mut Criterion) {
    let input = vec![0.25_f32; FRAMES * CHANNELS];
    let mut par = DspParallel::new(SR)
        .with(Phaser::new(SR))
        .with(Flanger::new(SR))
        .with(Wobble::new(SR));
    let mut buf = input.clone();
    c.bench_function("parallel_three", |b| {
        b.iter(|| {
            buf.copy_from_slice(&input);
            par.process(black_box(&mut buf));
        });
    });
}

criterion_group!(benches, bench_units, bench_parallel);
criterion_main!(benches);
