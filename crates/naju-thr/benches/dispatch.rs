use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use naju_thr::{RingQueue, Scheduler, SchedulerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

fn bench_ring_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_queue");

    for batch in [16usize, 256, 4096] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("put_get", batch), &batch, |b, &batch| {
            let mut queue = RingQueue::new();
            b.iter(|| {
                for i in 0..batch {
                    queue.put(black_box(i));
                }
                while let Ok(value) = queue.get() {
                    black_box(value);
                }
            });
        });
    }

    group.finish();
}

fn bench_submit_barrier(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_barrier");

    for workers in [1usize, 3] {
        let scheduler =
            Scheduler::new(SchedulerConfig::default().thread_capacity(workers + 1)).unwrap();
        let (ready_tx, ready_rx) = mpsc::channel();
        let main = {
            let scheduler = scheduler.clone();
            thread::spawn(move || {
                scheduler.init().unwrap();
                ready_tx.send(()).unwrap();
                scheduler.run_main_loop(workers).unwrap();
            })
        };
        ready_rx.recv().unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::new("tasks_1000", workers), &workers, |b, _| {
            b.iter(|| {
                for _ in 0..1000 {
                    let counter = counter.clone();
                    scheduler.submit(move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                    });
                }
                scheduler.barrier().unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("run_and_wait", workers), &workers, |b, _| {
            b.iter(|| scheduler.run_and_wait(|| {}).unwrap());
        });

        scheduler.shutdown();
        main.join().unwrap();
    }

    group.finish();
}

criterion_group!(benches, bench_ring_queue, bench_submit_barrier);
criterion_main!(benches);
