use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use massive_revtree::RevTree;

/// Linear history of `depth` revisions with `branches` conflicting leaves on top
fn build(depth: u32, branches: u32) -> RevTree {
    let ids: Vec<Vec<u8>> = (1..=depth)
        .rev()
        .map(|g| format!("{}-{:040x}", g, g).into_bytes())
        .collect();
    let history: Vec<&[u8]> = ids.iter().map(Vec::as_slice).collect();
    let mut tree = RevTree::new();
    tree.insert_history(&history, &[b'x'; 256], false).unwrap();
    for b in 0..branches {
        let id = format!("{}-{:040x}", depth, 0xb000 + b);
        tree.insert(id.as_bytes(), b"{}", false, Some(ids[1].as_slice()), true)
            .unwrap();
    }
    tree
}

fn encoded(depth: u32, branches: u32) -> Bytes {
    let raw = build(depth, branches).encode().unwrap();
    RevTree::decode(raw, 1, 1).unwrap().encode().unwrap()
}

fn decode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for depth in [20u32, 100, 1000] {
        let raw = encoded(depth, 2);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &raw, |b, raw| {
            b.iter(|| RevTree::decode(black_box(raw.clone()), 7, 1).unwrap())
        });
    }
    group.finish();
}

fn encode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for depth in [20u32, 100, 1000] {
        let tree = RevTree::decode(encoded(depth, 2), 7, 1).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(depth), &tree, |b, tree| {
            b.iter(|| black_box(tree.clone()).encode().unwrap())
        });
    }
    group.finish();
}

fn insert_benchmark(c: &mut Criterion) {
    let base = RevTree::decode(encoded(20, 0), 7, 1).unwrap();
    let tip = format!("{}-{:040x}", 20, 20);
    c.bench_function("insert_child", |b| {
        b.iter(|| {
            let mut tree = base.clone();
            tree.insert(b"21-feed", b"{}", false, Some(tip.as_bytes()), false)
                .unwrap()
        })
    });
    c.bench_function("has_conflict_unsorted", |b| {
        let mut tree = base.clone();
        tree.insert(b"21-feed", b"{}", false, Some(tip.as_bytes()), false)
            .unwrap();
        b.iter(|| black_box(&tree).has_conflict())
    });
}

criterion_group!(benches, decode_benchmark, encode_benchmark, insert_benchmark);
criterion_main!(benches);
