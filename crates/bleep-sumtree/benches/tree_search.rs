use bleep_sumtree::{SumTree, U256};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn populated_tree(leaves: u64) -> SumTree {
    let mut tree = SumTree::new();
    for i in 0..leaves {
        tree.insert(i / 64, U256::from(1_000 + (i * 7919) % 5_000)).expect("insert");
    }
    tree
}

fn spread_targets(total: U256, count: u64) -> Vec<U256> {
    (0..count).map(|i| total * U256::from(i) / U256::from(count)).collect()
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_search");
    for leaves in [256u64, 4_096, 65_536] {
        let tree = populated_tree(leaves);
        let time = leaves / 64;
        let targets = spread_targets(tree.total(), 32);

        group.bench_with_input(BenchmarkId::from_parameter(leaves), &targets, |b, targets| {
            b.iter(|| criterion::black_box(tree.search(targets, time).expect("search")));
        });
    }
    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_update");
    for leaves in [256u64, 65_536] {
        group.bench_function(BenchmarkId::from_parameter(leaves), |b| {
            b.iter_batched(
                || populated_tree(leaves),
                |mut tree| {
                    let time = leaves / 64 + 1;
                    for key in (0..leaves).step_by(97) {
                        tree.update(key, time, U256::from(3u64), true).expect("update");
                    }
                    criterion::black_box(tree.total());
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_search, bench_update);
criterion_main!(benches);
