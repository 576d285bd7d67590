use blockq_lib::{BoundedBlockingQueue, CancellationToken};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::thread::spawn;

const ITEMS: u64 = 10000;

fn producers_consumers(threads: u64, capacity: usize) {
    let queue = Arc::new(BoundedBlockingQueue::with_capacity(capacity).unwrap());
    let token = CancellationToken::new();
    let per_thread = ITEMS / threads;
    let mut handles = Vec::new();
    for _ in 0..threads {
        let queue = queue.clone();
        let token = token.clone();
        handles.push(spawn(move || {
            for i in 0..per_thread {
                queue.put(i, &token).unwrap();
            }
        }));
    }
    for _ in 0..threads {
        let queue = queue.clone();
        let token = token.clone();
        handles.push(spawn(move || {
            for _ in 0..per_thread {
                black_box(queue.take(&token).unwrap());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("Contention");
    group.sample_size(20);
    for capacity in [1, 16, 1024] {
        for threads in [1, 2, 4] {
            group.bench_with_input(
                BenchmarkId::new(format!("Capacity{}", capacity), threads),
                &threads,
                |b, threads| b.iter(|| producers_consumers(*threads, capacity)),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_contention);
criterion_main!(benches);
