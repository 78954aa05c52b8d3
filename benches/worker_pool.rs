use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use snapcompress::engine::pool::{JobPool, Priority};
use std::hint::black_box;

fn run_jobs(pool: &JobPool, jobs: usize) {
    let handles: Vec<_> = (0..jobs)
        .map(|i| {
            let priority = match i % 3 {
                0 => Priority::High,
                1 => Priority::Normal,
                _ => Priority::Low,
            };
            pool.submit(priority, || Ok(vec![0u8; 64]))
                .expect("queue has headroom")
        })
        .collect();

    for handle in handles {
        black_box(handle.wait().expect("job does not panic"));
    }
}

fn bench_submit_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker_pool_submit");

    for &jobs in &[8usize, 32, 64] {
        group.bench_function(format!("jobs_{jobs}"), |b| {
            b.iter_batched(
                || JobPool::new(4, 8),
                |pool| run_jobs(&pool, jobs),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_pool_growth(c: &mut Criterion) {
    // Saturates the normal-sized pool so maybe_expand() has to grow it
    // toward max_size on every iteration.
    c.bench_function("worker_pool_expand_under_backlog", |b| {
        b.iter_batched(
            || JobPool::new(2, 8),
            |pool| run_jobs(&pool, 48),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(worker_pool, bench_submit_throughput, bench_pool_growth);
criterion_main!(worker_pool);
