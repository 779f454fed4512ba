//! Benchmarks for the value codec
//!
//! Run with: cargo bench
//!
//! Every import call decodes its arguments and encodes its results, so the
//! codec and the reference table sit on the hot path of all guest/host
//! traffic.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gowasm::value::{codec, Object, RefTable, Value};

fn table() -> RefTable {
    RefTable::new(
        Value::object(Object::new("global")),
        Value::object(Object::new("go")),
    )
}

/// Benchmark: numbers travel inline and never touch the table
fn bench_numbers(c: &mut Criterion) {
    let mut table = table();
    c.bench_function("encode_number", |b| {
        b.iter(|| codec::encode(&mut table, black_box(&Value::Number(3.25))).unwrap())
    });
    let cell = 3.25f64.to_bits();
    c.bench_function("decode_number", |b| {
        b.iter(|| codec::decode(&table, black_box(cell)).unwrap())
    });
}

/// Benchmark: repeated encoding of the same reference hits the identity index
fn bench_references(c: &mut Criterion) {
    let mut group = c.benchmark_group("references");

    group.bench_function("encode_known_object", |b| {
        let mut table = table();
        let obj = Value::object(Object::new("o"));
        codec::encode(&mut table, &obj).unwrap();
        b.iter(|| codec::encode(&mut table, black_box(&obj)).unwrap())
    });

    group.bench_function("encode_known_string", |b| {
        let mut table = table();
        let s = Value::string("syscall/js");
        codec::encode(&mut table, &s).unwrap();
        b.iter(|| codec::encode(&mut table, black_box(&Value::string("syscall/js"))).unwrap())
    });

    group.bench_function("decode_global", |b| {
        let table = table();
        let cell = codec::boxed(5, codec::TYPE_FLAG_OBJECT);
        b.iter(|| codec::decode(&table, black_box(cell)).unwrap())
    });

    group.finish();
}

/// Benchmark: first-time encoding allocates a fresh id
fn bench_allocation(c: &mut Criterion) {
    c.bench_function("encode_new_objects", |b| {
        b.iter_batched(
            table,
            |mut table| {
                for _ in 0..100 {
                    codec::encode(&mut table, &Value::object(Object::new("o"))).unwrap();
                }
                table
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_numbers, bench_references, bench_allocation);
criterion_main!(benches);
