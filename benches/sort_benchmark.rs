use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use fake::{Fake, Faker};
use std::fs;
use std::hint::black_box;
use std::time::Duration;

use mergedb::db::{Attribute, Condition, Config, Context, Schema, Type};
use mergedb::vm::{BufferManager, Direction, Operator, OrderBy, Plan, Scan, SortMergeJoin};
use mergedb::Tuple;

const PAGE_SIZE: usize = 512;

fn random_tuples(count: usize) -> Vec<Tuple> {
    (0..count)
        .map(|id| {
            let key: i32 = (0..1000).fake();
            let payload: i32 = Faker.fake();
            Tuple::new(vec![(id as i32).into(), key.into(), payload.into()])
        })
        .collect()
}

fn scan(table: &str, tuples: &[Tuple], ctx: &Context) -> Plan<fs::File> {
    let schema = Schema::new(vec![
        Attribute::new(table, "id", Type::Int),
        Attribute::new(table, "key", Type::Int),
        Attribute::new(table, "payload", Type::Int),
    ]);

    Plan::from(Scan::new(table, schema, tuples.to_vec(), ctx))
}

fn consume(plan: &mut impl Operator) -> usize {
    plan.open().unwrap();
    let mut count = 0;
    while let Some(page) = plan.next().unwrap() {
        count += page.len();
    }
    plan.close().unwrap();

    count
}

fn benchmark_external_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("External Sort");
    group.warm_up_time(Duration::from_millis(200));
    group.measurement_time(Duration::from_secs(5));

    let work_dir = std::env::temp_dir().join("mergedb-bench-sort");
    let tuples = random_tuples(20_000);

    for buffers in [3, 8, 32, 128].iter() {
        let config = Config::default()
            .with_page_size(PAGE_SIZE)
            .with_buffers(*buffers)
            .with_work_dir(&work_dir);
        let ctx = Context::new(config);

        group.bench_with_input(BenchmarkId::new("buffers", buffers), buffers, |b, _| {
            b.iter(|| {
                let keys = vec![Attribute::new("r", "key", Type::Int)];
                let mut order =
                    OrderBy::new(scan("r", &tuples, &ctx), keys, Direction::Asc, &ctx).unwrap();
                black_box(consume(&mut order));
            });
        });
    }

    group.finish();
    let _ = fs::remove_dir_all(&work_dir);
}

fn benchmark_sort_merge_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sort-Merge Join");
    group.warm_up_time(Duration::from_millis(200));
    group.measurement_time(Duration::from_secs(5));

    let work_dir = std::env::temp_dir().join("mergedb-bench-join");

    for size in [1000, 5000, 10_000].iter() {
        let left = random_tuples(*size);
        let right = random_tuples(*size / 10);
        let config = Config::default()
            .with_page_size(PAGE_SIZE)
            .with_buffers(16)
            .with_work_dir(&work_dir);
        let ctx = Context::new(config);

        group.bench_with_input(BenchmarkId::new("tuples", size), size, |b, _| {
            b.iter(|| {
                let condition = Condition::equals(
                    Attribute::new("l", "key", Type::Int),
                    Attribute::new("r", "key", Type::Int),
                );
                let join = SortMergeJoin::new(
                    scan("l", &left, &ctx),
                    scan("r", &right, &ctx),
                    vec![condition],
                    &ctx,
                )
                .unwrap();

                let mut plan = Plan::from(join);
                BufferManager::allocate(ctx.config(), &mut plan);
                black_box(consume(&mut plan));
            });
        });
    }

    group.finish();
    let _ = fs::remove_dir_all(&work_dir);
}

criterion_group!(benches, benchmark_external_sort, benchmark_sort_merge_join);
criterion_main!(benches);
