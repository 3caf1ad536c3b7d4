// Stream-id allocator benchmarks: pop/push throughput under contention and
// the page-growth path that kicks in once the active page is exhausted.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ringql::connection::StreamIdStack;
use std::sync::Arc;
use std::time::Duration;

fn bench_pop_push_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_id_pop_push_cycle");

    for max_streams in [128usize, 2048, 32_768] {
        group.bench_with_input(BenchmarkId::from_parameter(max_streams), &max_streams, |b, &max_streams| {
            let stack = StreamIdStack::new(max_streams, Duration::from_secs(10));
            b.iter(|| {
                let id = stack.pop().unwrap();
                black_box(id);
                stack.push(id);
            });
        });
    }

    group.finish();
}

fn bench_page_growth(c: &mut Criterion) {
    c.bench_function("stream_id_page_growth_to_32768", |b| {
        b.iter(|| {
            let stack = StreamIdStack::new(32_768, Duration::from_secs(10));
            let ids: Vec<_> = std::iter::from_fn(|| stack.pop()).take(500).collect();
            black_box(&ids);
            for id in ids {
                stack.push(id);
            }
        });
    });
}

fn bench_concurrent_pop_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_id_concurrent_pop_push");

    for thread_count in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(thread_count), &thread_count, |b, &thread_count| {
            let stack = Arc::new(StreamIdStack::new(32_768, Duration::from_secs(10)));
            b.iter(|| {
                let handles: Vec<_> = (0..thread_count)
                    .map(|_| {
                        let stack = Arc::clone(&stack);
                        std::thread::spawn(move || {
                            for _ in 0..100 {
                                if let Some(id) = stack.pop() {
                                    stack.push(id);
                                }
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().ok();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pop_push_cycle, bench_page_growth, bench_concurrent_pop_push);
criterion_main!(benches);
