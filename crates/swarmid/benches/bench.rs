use core::hint::black_box;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use swarmid::SwarmId;

// Number of ids packed/unpacked per benchmark iteration.
const TOTAL_IDS: usize = 4096;

fn bench_pack(c: &mut Criterion) {
    let mut group = c.benchmark_group("swarm_id/pack");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter(|| {
            for i in 0..TOTAL_IDS as u64 {
                let id = SwarmId::from_parts(
                    black_box(1_722_000_000_000 + i),
                    (i % 1024) as u16,
                    black_box(42),
                );
                black_box(id);
            }
        });
    });
    group.finish();
}

fn bench_unpack(c: &mut Criterion) {
    let mut group = c.benchmark_group("swarm_id/unpack");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    let ids: Vec<SwarmId> = (0..TOTAL_IDS as u64)
        .map(|i| SwarmId::from_parts(1_722_000_000_000 + i, (i % 1024) as u16, 42))
        .collect();

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter(|| {
            for id in &ids {
                black_box((id.timestamp(), id.counter(), id.node_id()));
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_pack, bench_unpack);
criterion_main!(benches);
