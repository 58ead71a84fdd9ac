//! Scanner + extractor micro-benchmarks: the per-record hot path.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use caggs::json::fields::{parse_path, FieldTree};
use caggs::json::{extract, JsonParser};

fn bench_extract(c: &mut Criterion) {
    let record = br#"{"ts":1700000000,"level":"info","metrics":{"latency_ms":12.5,"bytes":40960},"tags":["a","b","c"],"msg":"request served"}"#;
    let paths = vec![
        parse_path("metrics.latency_ms").unwrap(),
        parse_path("metrics.bytes").unwrap(),
    ];
    let mut tree = FieldTree::build(&paths).unwrap();

    let mut group = c.benchmark_group("extract");
    group.throughput(Throughput::Bytes(record.len() as u64));
    group.bench_function("two_numeric_fields", |b| {
        b.iter(|| {
            tree.reset_tokens();
            let mut parser = JsonParser::new(black_box(record));
            extract(&mut parser, tree.root_mut()).unwrap();
            black_box(tree.leaf(&paths[0]).map(|leaf| leaf.token));
        })
    });
    group.bench_function("tokenize_only", |b| {
        b.iter(|| {
            let mut parser = JsonParser::new(black_box(record));
            let mut count = 0usize;
            loop {
                let token = parser.next_token().unwrap();
                if token.kind == caggs::json::TokenKind::Eof {
                    break;
                }
                count += 1;
            }
            black_box(count)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_extract);
criterion_main!(benches);
