//! Benchmarks for shared-state encoding and parameter decoding.
//!
//! Run with: cargo bench -p csync-codec --bench codec_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use csync_codec::{BeanType, BeanValue, JsonCodec, NoConnectors, TypeDescriptor};
use std::hint::black_box;

/// A state type with `props` string properties.
fn wide_state(props: usize) -> BeanType {
    (0..props).fold(BeanType::new("bench.WideState"), |ty, i| {
        ty.property(format!("p{i}"), TypeDescriptor::String)
    })
}

/// A bean where only `pct` percent of properties differ from the default.
fn make_bean(props: usize, change_pct: f64) -> BeanValue {
    let to_change = ((props as f64) * change_pct / 100.0) as usize;
    (0..to_change).fold(BeanValue::new(), |bean, i| {
        let idx = (i * 7 + 3) % props;
        bean.with(format!("p{idx}"), format!("value-{i}"))
    })
}

fn bench_encode_full(c: &mut Criterion) {
    let codec = JsonCodec::default();
    let mut group = c.benchmark_group("encode/full");

    for props in [8, 32, 128] {
        group.throughput(Throughput::Elements(props as u64));
        let ty = wide_state(props);
        let bean = make_bean(props, 50.0);
        group.bench_with_input(BenchmarkId::new("bean", props), &(), |b, _| {
            b.iter(|| black_box(codec.encode_bean(&bean, None, &ty, &NoConnectors)))
        });
    }

    group.finish();
}

fn bench_encode_diff(c: &mut Criterion) {
    let codec = JsonCodec::default();
    let mut group = c.benchmark_group("encode/diff");

    for (props, pct) in [(32, 0.0), (32, 5.0), (128, 5.0), (128, 50.0)] {
        group.throughput(Throughput::Elements(props as u64));
        let ty = wide_state(props);
        let bean = make_bean(props, pct);
        let reference = ty.default_value();
        group.bench_with_input(
            BenchmarkId::new("bean", format!("{props}p_{pct}pct")),
            &(),
            |b, _| {
                b.iter(|| {
                    black_box(codec.encode_bean(&bean, Some(&reference), &ty, &NoConnectors))
                })
            },
        );
    }

    group.finish();
}

fn bench_decode_params(c: &mut Criterion) {
    let codec = JsonCodec::default();
    let mut group = c.benchmark_group("decode/params");

    for len in [16, 256, 4096] {
        group.throughput(Throughput::Elements(len as u64));
        let ty = TypeDescriptor::list(TypeDescriptor::Int);
        let json = serde_json::Value::Array((0..len).map(serde_json::Value::from).collect());
        group.bench_with_input(BenchmarkId::new("int_list", len), &(), |b, _| {
            b.iter(|| black_box(codec.decode(&ty, &json, &NoConnectors)))
        });
    }

    let uidl = serde_json::json!(["m", {"text": ["s", "hello"], "pos": ["i", 5]}]);
    group.bench_function("uidl_map", |b| {
        b.iter(|| black_box(codec.decode(&TypeDescriptor::Uidl, &uidl, &NoConnectors)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_encode_full,
    bench_encode_diff,
    bench_decode_params,
);

criterion_main!(benches);
