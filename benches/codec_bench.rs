use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ifgen::channel::Channel;
use ifgen::header::{CallContext, Header, HeaderSpec};
use ifgen::variant::registry;

// Headers of increasing width. Every scenario supports d0, d1 and d2.

fn spec(name: &str, in_dim: usize, out_dim: usize) -> HeaderSpec {
    let inputs: Vec<String> = (0..in_dim).map(|i| format!("double x{}", i)).collect();
    let outputs: Vec<String> = (0..out_dim).map(|o| format!("double y{}", o)).collect();
    // First derivatives of y0 are runtime, the rest constant or zero.
    let derivatives: Vec<String> = (0..in_dim)
        .map(|i| {
            if i % 2 == 0 {
                format!("D_y0_D_x{}", i)
            } else {
                format!("D_y0_D_x{} = {}.5", i, i)
            }
        })
        .collect();
    HeaderSpec {
        name: name.to_string(),
        inputs: inputs.join(", "),
        outputs: outputs.join(", "),
        derivatives: derivatives.join(", "),
        variants: vec!["d0".to_string(), "d1".to_string(), "d2".to_string()],
    }
}

fn scenarios() -> Vec<(&'static str, Header)> {
    [("small", 2, 1), ("medium", 6, 3), ("wide", 16, 4)]
        .into_iter()
        .map(|(name, i, o)| {
            let header = Header::from_spec(&spec("Bench", i, o))
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            (name, header)
        })
        .collect()
}

fn bench_print(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/print");
    for (name, header) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &header, |b, header| {
            b.iter(|| black_box(header.print().unwrap()));
        });
    }
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/parse");
    for (name, header) in scenarios() {
        let text = header.print().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &text, |b, text| {
            b.iter(|| black_box(Header::parse(text).unwrap()));
        });
    }
    group.finish();
}

fn bench_from_spec(c: &mut Criterion) {
    let mut group = c.benchmark_group("header/from_spec");
    for (name, i, o) in [("small", 2, 1), ("medium", 6, 3), ("wide", 16, 4)] {
        let spec = spec("Bench", i, o);
        group.bench_with_input(BenchmarkId::from_parameter(name), &spec, |b, spec| {
            b.iter(|| black_box(Header::from_spec(spec).unwrap()));
        });
    }
    group.finish();
}

fn bench_call_site(c: &mut Criterion) {
    let mut group = c.benchmark_group("callsite/generate");
    let d2 = registry().widest();
    for (name, header) in scenarios() {
        let ctx = CallContext::new(header.input_names().into_iter().map(|n| format!("in_{}", n)))
            .bind(Channel::Value(0), "out");
        group.bench_with_input(BenchmarkId::from_parameter(name), &ctx, |b, ctx| {
            b.iter(|| black_box(header.generate_call_site(&d2, ctx).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_print, bench_parse, bench_from_spec, bench_call_site);
criterion_main!(benches);
