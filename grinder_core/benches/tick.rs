use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use grinder_core::filter::{Estimator, SimpleKalman};
use grinder_core::mocks::SpyActuator;
use grinder_core::{FilteredWeight, GrindCfg, GrindMachine};

// Cup placed, then a 4 g/s ramp sampled at 80 Hz, with xorshift noise
fn synth_grind(n: usize, noise_amp: f32, seed: u32) -> Vec<f32> {
    let mut state = seed.max(1);
    let mut next_f32 = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        (x as f32) / (u32::MAX as f32 + 1.0)
    };
    (0..n)
        .map(|i| {
            let t = i as f32 / 80.0;
            let noise = (next_f32() * 2.0 - 1.0) * noise_amp;
            20.2 + 4.0 * t + noise
        })
        .collect()
}

fn sample_size_from_env(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    // BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p grinder_core --bench tick
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE")
        && let Ok(n) = ss.parse::<usize>()
    {
        g.sample_size(n.max(10));
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }
}

pub fn bench_kalman(c: &mut Criterion) {
    let mut g = c.benchmark_group("kalman");
    sample_size_from_env(&mut g);
    let trace = synth_grind(10_000, 0.02, 0xC0FFEE);
    g.bench_function("update_10k", |b| {
        b.iter_batched(
            || SimpleKalman::new(0.2, 0.2, 0.05),
            |mut k| {
                for &z in &trace {
                    black_box(k.update(black_box(z)));
                }
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

pub fn bench_machine_tick(c: &mut Criterion) {
    let mut g = c.benchmark_group("machine");
    sample_size_from_env(&mut g);
    // one decision per 4 samples, as at 80 Hz with a 50 ms period
    let ticks: Vec<(f32, u64)> = synth_grind(400, 0.02, 7)
        .into_iter()
        .step_by(4)
        .enumerate()
        .map(|(i, g)| (g, i as u64 * 50))
        .collect();
    g.bench_function("grind_cycle", |b| {
        b.iter_batched(
            || GrindMachine::new(SpyActuator::default(), GrindCfg::default()),
            |mut m| {
                for &(grams, now) in &ticks {
                    let w = FilteredWeight::ready(grams, now);
                    black_box(m.tick(&w, now).ok());
                }
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(tick, bench_kalman, bench_machine_tick);
criterion_main!(tick);
