//! Benchmarks for the dump rewrite engine.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dump_patch_core::{patch_dump, patch_line, walk, PatchConfig, ReplaceMap};

fn site_map() -> ReplaceMap {
    ReplaceMap::from_pairs([
        ("https://www.example.com", "http://localhost:8080"),
        ("www.example.com", "localhost"),
    ])
    .unwrap()
}

fn buffers(c: &mut Criterion) {
    let mut group = c.benchmark_group("walk");
    let map = site_map();

    // Plain text, no match
    let plain = "lorem ipsum dolor sit amet ".repeat(400);
    group.throughput(Throughput::Bytes(plain.len() as u64));
    group.bench_function("plain_miss_10kb", |b| {
        b.iter(|| walk(black_box(plain.as_bytes()), &map))
    });

    // Plain text, one match per sentence
    let urls = "see https://www.example.com/page for details. ".repeat(200);
    group.throughput(Throughput::Bytes(urls.len() as u64));
    group.bench_function("plain_hits_10kb", |b| {
        b.iter(|| walk(black_box(urls.as_bytes()), &map))
    });

    // Array of 100 URL strings
    let array: String = {
        let items: String = (0..100)
            .map(|i| {
                let url = format!("https://www.example.com/p/{}", i);
                format!("i:{};s:{}:\"{}\";", i, url.len(), url)
            })
            .collect();
        format!("a:100:{{{}}}", items)
    };
    group.throughput(Throughput::Bytes(array.len() as u64));
    group.bench_function("array_100", |b| {
        b.iter(|| walk(black_box(array.as_bytes()), &map))
    });

    // Nested array (depth 50)
    let nested: String = {
        let mut s = String::from("s:23:\"https://www.example.com\";");
        for i in 0..50 {
            let key = format!("k{}", i % 10);
            s = format!("a:1:{{s:{}:\"{}\";{}}}", key.len(), key, s);
        }
        s
    };
    group.throughput(Throughput::Bytes(nested.len() as u64));
    group.bench_function("depth_50", |b| {
        b.iter(|| walk(black_box(nested.as_bytes()), &map))
    });

    // Malformed container, falls back to plain text
    let broken = format!("a:3:{{{}}}", "s:5:\"hello\";".repeat(100));
    group.throughput(Throughput::Bytes(broken.len() as u64));
    group.bench_function("abandoned_container", |b| {
        b.iter(|| walk(black_box(broken.as_bytes()), &map))
    });

    group.finish();
}

fn dump_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("dump");
    let map = site_map();

    let row = r#"(7,'widget_text','a:2:{i:2;a:1:{s:4:\"text\";s:41:\"<a href=\\\"https://www.example.com\\\">x</a>\";}s:12:\"_multiwidget\";i:1;}','yes')"#;
    let line = format!("INSERT INTO `wp_options` VALUES {};", vec![row; 50].join(","));
    group.throughput(Throughput::Bytes(line.len() as u64));
    group.bench_function("insert_50_rows", |b| {
        b.iter(|| patch_line(black_box(line.as_bytes()), &map))
    });

    let dump: String = (0..200).map(|_| format!("{}\n", line)).collect();
    let config = PatchConfig::default();
    group.throughput(Throughput::Bytes(dump.len() as u64));
    group.bench_function("stream_200_lines", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(dump.len());
            patch_dump(black_box(dump.as_bytes()), &mut out, &map, &config).unwrap();
            out
        })
    });

    group.finish();
}

criterion_group!(benches, buffers, dump_lines);
criterion_main!(benches);
