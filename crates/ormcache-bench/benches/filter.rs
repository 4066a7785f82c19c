//! Operation algebra and filter evaluation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ormcache_bench::fixtures::{generate_trades, Scale};
use ormcache_bench::TradeAttributes;
use ormcache_core::StoreFilterEvaluator;
use ormcache_proto::Value;

fn bench_shape_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter/shape_match");
    let a = TradeAttributes::new();

    group.bench_function("range_in_range", |b| {
        let cached = a.quantity.greater_than(100);
        let new = a.quantity.greater_than(100).and(&a.quantity.less_than(300));
        b.iter(|| black_box(new.shape_match(&cached).is_super_match()));
    });

    group.bench_function("and_in_and", |b| {
        let cached = a.account.eq(3).and(&a.state.eq("new"));
        let new = a
            .account
            .eq(3)
            .and(&a.state.eq("new"))
            .and(&a.price.greater_than(10.0));
        b.iter(|| black_box(new.shape_match(&cached).is_super_match()));
    });

    group.bench_function("and_in_or", |b| {
        let cached = a.account.eq(1).or(&a.account.eq(2));
        let new = a.account.eq(1).and(&a.quantity.greater_than(5));
        b.iter(|| black_box(new.shape_match(&cached).is_super_match()));
    });

    group.finish();
}

fn bench_simplify(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter/simplify");
    let a = TradeAttributes::new();

    group.bench_function("merge_ranges", |b| {
        let op = a
            .quantity
            .greater_than(10)
            .and(&a.quantity.greater_than(50))
            .and(&a.quantity.less_than(400))
            .and(&a.quantity.less_than(900));
        b.iter(|| black_box(op.simplify()));
    });

    group.bench_function("or_to_in", |b| {
        let op = a.state.eq("new").or(&a.state.eq("filled")).or(&a.state.eq("partial"));
        b.iter(|| black_box(op.simplify()));
    });

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter/evaluate");
    let a = TradeAttributes::new();
    let trades = generate_trades(Scale::Small, 11);

    let op = a
        .price
        .greater_than(100.0)
        .and(&a.state.in_(["new".to_string(), "partial".to_string()]));

    group.bench_function("in_memory", |b| {
        b.iter(|| black_box(trades.iter().filter(|t| op.matches(t) == Some(true)).count()));
    });

    let compiled = op.compile("Trade", None).unwrap();
    let rows: Vec<Vec<(String, Value)>> = trades
        .iter()
        .map(|t| {
            vec![
                ("price".to_string(), Value::from(t.price)),
                ("state".to_string(), Value::from(t.state.clone())),
            ]
        })
        .collect();
    group.bench_function("store_ir", |b| {
        b.iter(|| {
            black_box(
                rows.iter()
                    .filter(|row| StoreFilterEvaluator::evaluate(&compiled.filter, row).unwrap())
                    .count(),
            )
        });
    });

    let memo = a.memo.full_text("block desk");
    let compiled = memo.compile("Trade", None).unwrap();
    let rows: Vec<Vec<(String, Value)>> = trades
        .iter()
        .map(|t| vec![("memo".to_string(), Value::from(t.memo.clone()))])
        .collect();
    group.bench_function("full_text", |b| {
        b.iter(|| {
            black_box(
                rows.iter()
                    .filter(|row| StoreFilterEvaluator::evaluate(&compiled.filter, row).unwrap())
                    .count(),
            )
        });
    });

    group.finish();
}

criterion_group!(benches, bench_shape_match, bench_simplify, bench_evaluate);
criterion_main!(benches);
