use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simutrial::cohort::{PatientRecord, Population};
use simutrial::{ConsentPolicy, NoopSimulationProgress, SimulationOptions, run_simulations};

const RUNS: usize = 200;

fn random_population(size: usize) -> Population {
    let mut rng = StdRng::seed_from_u64(0x5EED_C0DE + size as u64);
    Population::from_records(
        (0..size)
            .map(|id| PatientRecord {
                id,
                willingness_score: Some(rng.gen_range(0.0..0.5)),
                ..PatientRecord::default()
            })
            .collect(),
    )
}

fn benchmark_simulation(c: &mut Criterion) {
    let sizes = [1_000_usize, 10_000, 50_000];
    let populations: Vec<_> = sizes
        .iter()
        .map(|&size| (size, random_population(size)))
        .collect();
    let range = ConsentPolicy::Range { min: 0.1, max: 0.4 };

    let mut group = c.benchmark_group("consent_simulation");
    group.sample_size(10);
    for (size, population) in populations.iter() {
        group.throughput(Throughput::Elements((*size * RUNS) as u64));

        for (label, parallel) in [("sequential", false), ("parallel", true)] {
            let mut options = SimulationOptions::new(RUNS, 42);
            if !parallel {
                options = options.sequential();
            }
            group.bench_with_input(
                BenchmarkId::new(format!("score_{label}"), size),
                population,
                |b, input| {
                    b.iter(|| {
                        let counts = run_simulations(
                            black_box(input),
                            &ConsentPolicy::PerPatientScore,
                            &options,
                            &NoopSimulationProgress,
                            None,
                        );
                        black_box(counts)
                    });
                },
            );
        }

        group.bench_with_input(BenchmarkId::new("range_parallel", size), population, |b, input| {
            b.iter(|| {
                let counts = run_simulations(
                    black_box(input),
                    &range,
                    &SimulationOptions::new(RUNS, 42),
                    &NoopSimulationProgress,
                    None,
                );
                black_box(counts)
            });
        });
    }
    group.finish();
}

criterion_group!(consent_simulation, benchmark_simulation);
criterion_main!(consent_simulation);
