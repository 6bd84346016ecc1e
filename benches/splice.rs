//! Benchmarks for decompilation and splicing.
//!
//! Covers the three costs a query provider pays:
//! - Reading and interpreting a member body (cold cache)
//! - Looking up an already decompiled member (warm cache)
//! - Rewriting a query that calls computed members

extern crate dotinline;

#[path = "../tests/common/mod.rs"]
mod common;

use common::Model;
use criterion::{criterion_group, criterion_main, Criterion};
use dotinline::{
    disassembler::read_method,
    expression::{BinaryOp, Expr, Query},
    metadata::MethodBodyProvider,
    splicer::Splicer,
};
use std::hint::black_box;

/// Benchmark decoding and resolving the body of a string concatenation getter.
fn bench_read_method(c: &mut Criterion) {
    let m = Model::build().unwrap();
    let body = m.table.method_body(&m.method("FullName")).unwrap();

    c.bench_function("read_method_full_name", |b| {
        b.iter(|| {
            let instructions = read_method(black_box(&body.code), m.table.as_ref()).unwrap();
            black_box(instructions)
        });
    });
}

/// Benchmark decompiling members on an empty cache.
fn bench_decompile_cold(c: &mut Criterion) {
    let m = Model::build().unwrap();

    c.bench_function("decompile_cold_band", |b| {
        b.iter(|| {
            let entry = m.decompiler().decompile(&m.method("Band")).unwrap();
            black_box(entry)
        });
    });

    // Two levels of inlining
    c.bench_function("decompile_cold_too_deep_name", |b| {
        b.iter(|| {
            let entry = m.decompiler().decompile(&m.method("TooDeepName")).unwrap();
            black_box(entry)
        });
    });
}

/// Benchmark cache hits.
fn bench_decompile_warm(c: &mut Criterion) {
    let m = Model::build().unwrap();
    let decompiler = m.decompiler();
    let full_name = m.method("FullName");
    decompiler.decompile(&full_name).unwrap();

    c.bench_function("decompile_warm_full_name", |b| {
        b.iter(|| {
            let entry = decompiler.decompile(black_box(&full_name)).unwrap();
            black_box(entry)
        });
    });
}

/// Benchmark splicing a filtered and ordered query over a warm cache.
/// Query: Where(e => e.FullName == "Test User" AndAlso e.IsSenior).OrderBy(e => e.Band)
fn bench_splice_query(c: &mut Criterion) {
    let m = Model::build().unwrap();
    let decompiler = m.decompiler();
    let _ = decompiler.warm();
    let splicer = Splicer::new(&decompiler);

    let e = m.param("e");
    let query = Query::source(m.employee.clone())
        .filter(
            e.clone(),
            Expr::binary(
                BinaryOp::AndAlso,
                Expr::binary(
                    BinaryOp::Equal,
                    m.property(&e, "FullName"),
                    Expr::string("Test User"),
                ),
                m.property(&e, "IsSenior"),
            ),
        )
        .order_by(e.clone(), m.property(&e, "Band"));

    c.bench_function("splice_query_filter_order", |b| {
        b.iter(|| {
            let spliced = splicer.splice_query(black_box(&query)).unwrap();
            black_box(spliced)
        });
    });
}

criterion_group!(
    benches,
    bench_read_method,
    bench_decompile_cold,
    bench_decompile_warm,
    bench_splice_query
);
criterion_main!(benches);
