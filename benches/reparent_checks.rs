use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use uuid::Uuid;

use ticket_tree::invariants::TreeSnapshot;
use ticket_tree::models::TicketId;

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

/// A forest of `root_count` chains, each `depth` tickets deep. Deep chains
/// are the worst case for the ancestor walk.
fn synthetic_forest(root_count: usize, depth: usize) -> (TreeSnapshot, Vec<TicketId>) {
    let mut pairs = Vec::with_capacity(root_count * depth);
    let mut ids = Vec::with_capacity(root_count * depth);
    for root_idx in 0..root_count {
        let mut parent: Option<TicketId> = None;
        for level in 0..depth {
            let id = TicketId(Uuid::from_u128((root_idx * depth + level + 1) as u128));
            pairs.push((id, parent));
            ids.push(id);
            parent = Some(id);
        }
    }
    (TreeSnapshot::from_pairs(pairs), ids)
}

fn bench_reparent_checks(c: &mut Criterion) {
    let mut group = c.benchmark_group("reparent_checks");
    for (roots, depth) in [(100usize, 10usize), (100usize, 100usize)] {
        let (snapshot, ids) = synthetic_forest(roots, depth);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("validate_parent_assignment", format!("{roots}r_{depth}d")),
            &(snapshot, ids),
            |b, (snapshot, ids)| {
                let mut seed = 42u64;
                b.iter(|| {
                    let child = ids[(lcg_next(&mut seed) as usize) % ids.len()];
                    let parent = ids[(lcg_next(&mut seed) as usize) % ids.len()];
                    black_box(snapshot.validate_parent_assignment(child, Some(parent)))
                });
            },
        );
    }
    group.finish();
}

fn bench_bulk_plans(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_plans");
    for (roots, depth, batch) in [(100usize, 10usize, 32usize), (100usize, 100usize, 256usize)] {
        let (snapshot, ids) = synthetic_forest(roots, depth);

        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(
            BenchmarkId::new("plan_child_assignments", format!("{roots}r_{depth}d_{batch}c")),
            &(snapshot, ids),
            |b, (snapshot, ids)| {
                let mut seed = 7u64;
                b.iter(|| {
                    let parent = ids[(lcg_next(&mut seed) as usize) % ids.len()];
                    let children: Vec<_> = (0..batch)
                        .map(|_| ids[(lcg_next(&mut seed) as usize) % ids.len()])
                        .collect();
                    black_box(snapshot.plan_child_assignments(parent, &children))
                });
            },
        );
    }
    group.finish();
}

criterion_group!(reparent_checks, bench_reparent_checks, bench_bulk_plans);
criterion_main!(reparent_checks);
