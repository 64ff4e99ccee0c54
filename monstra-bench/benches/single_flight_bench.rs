use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use monstra_task::{Executor, RetryPolicy, SingleFlightTask};

fn coalesced_execute_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let executor: Executor<u64, String> = Arc::new(|completion| completion(Ok(1)));
    let task: SingleFlightTask<u64, String> =
        SingleFlightTask::new(f64::INFINITY, RetryPolicy::never(), executor);

    c.bench_function("single-flight execute (100 coalesced callers)", |b| {
        b.to_async(&runtime).iter(|| {
            let task = task.clone();
            async move {
                task.clear_result(monstra_task::OngoingStrategy::AllowComplete, false);
                let mut handles = Vec::with_capacity(100);
                for _ in 0..100 {
                    handles.push(task.async_execute(false));
                }
                for h in handles {
                    black_box(h.await.unwrap());
                }
            }
        });
    });
}

criterion_group!(benches, coalesced_execute_benchmark);
criterion_main!(benches);
