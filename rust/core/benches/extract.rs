// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Extraction throughput on synthetic IFC text.
//!
//! Run with: cargo bench -p ifc-catalog-core --bench extract

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ifc_catalog_core::{extract_from_reader, Catalog, ExtractOptions};
use std::io::Cursor;

/// Generate an IFC DATA section with `entities` lines, roughly a third of
/// which carry a tag, and `duplicate_ratio` of those repeating earlier tags.
fn generate_ifc(entities: usize, duplicate_ratio: f32) -> String {
    let mut out = String::with_capacity(entities * 80);
    out.push_str("ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('IFC4'));\nENDSEC;\nDATA;\n");
    let unique = ((entities / 3) as f32 * (1.0 - duplicate_ratio)).max(1.0) as usize;

    for i in 0..entities {
        match i % 3 {
            0 => {
                let n = (i / 3) % unique;
                out.push_str(&format!(
                    "#{}=IFCFLOWSEGMENT('2N1qJ7$1z3Ax{:010}',$,'P{}-A{:04}',$,$,$,$,$);\n",
                    i + 1,
                    i,
                    n % 9 + 1,
                    n % 10_000
                ));
            }
            1 => out.push_str(&format!("#{}=IFCCARTESIANPOINT(({}.,0.,0.));\n", i + 1, i)),
            _ => out.push_str(&format!(
                "#{}=IFCWALLSTANDARDCASE('3vB2YO$MX4xv{:010}',$,'Basic Wall:Generic 200mm',$,$,$,$,$);\n",
                i + 1,
                i
            )),
        }
    }

    out.push_str("ENDSEC;\nEND-ISO-10303-21;\n");
    out
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");

    for &(entities, dup) in &[(10_000usize, 0.0f32), (100_000, 0.0), (100_000, 0.8)] {
        let content = generate_ifc(entities, dup);
        group.throughput(Throughput::Bytes(content.len() as u64));
        group.bench_with_input(
            BenchmarkId::new(format!("dup_{}", dup), entities),
            &content,
            |b, content| {
                b.iter(|| {
                    let extraction =
                        extract_from_reader(Cursor::new(content.as_bytes()), &ExtractOptions::default())
                            .unwrap();
                    black_box(extraction.components.len())
                })
            },
        );
    }

    group.finish();
}

fn bench_catalog(c: &mut Criterion) {
    let content = generate_ifc(150_000, 0.0);
    let extraction = extract_from_reader(Cursor::new(content.as_bytes()), &ExtractOptions::default()).unwrap();

    c.bench_function("catalog_build_50k", |b| {
        b.iter(|| black_box(Catalog::build(extraction.components.clone()).len()))
    });
}

criterion_group!(benches, bench_extract, bench_catalog);
criterion_main!(benches);
