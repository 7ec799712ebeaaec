use criterion::{black_box, criterion_group, criterion_main, Criterion};

use lotbuild::geometry::{aggregate, GeometrySource, MergeMode};
use lotbuild::key::{derive_keys, KeyRule};
use lotbuild::processing::{group_by_key, AttributeTable, ColumnRule, ColumnSpec};
use lotbuild::types::{DataSet, DataType, Field, Schema, Value};

fn parcels(n: usize) -> DataSet {
    let schema = Schema::new(vec![
        Field::new("pin", DataType::Utf8),
        Field::new("geometry", DataType::Geometry),
    ]);
    let rows = (0..n)
        .map(|i| {
            // Two fragments per parcel.
            let pin = format!("{:06}", i / 2);
            let x0 = i as f64;
            let x1 = x0 + 0.5;
            let geom = format!(
                r#"{{"type":"Polygon","coordinates":[[[{x0},0],[{x1},0],[{x1},1],[{x0},1],[{x0},0]]]}}"#
            );
            vec![Value::Utf8(pin), Value::Geometry(geom.into_bytes())]
        })
        .collect();
    DataSet::new(schema, rows)
}

fn addresses(n: usize) -> DataSet {
    let schema = Schema::new(vec![
        Field::new("pin", DataType::Utf8),
        Field::new("street", DataType::Utf8),
    ]);
    let streets = ["Oak St", "Elm St", "Birch St", "Main St"];
    let rows = (0..n)
        .map(|i| {
            vec![
                Value::Utf8(format!("{:06}", i / 3)),
                Value::Utf8(streets[i % streets.len()].to_string()),
            ]
        })
        .collect();
    DataSet::new(schema, rows)
}

fn bench_aggregate(c: &mut Criterion) {
    let ds = parcels(10_000);
    let key = KeyRule::Column("pin".to_string());
    let geometry = GeometrySource::Column("geometry".to_string());

    c.bench_function("aggregate_collect_10k", |b| {
        b.iter(|| aggregate("parcels", black_box(&ds), &key, &geometry, MergeMode::Collect).unwrap())
    });
}

fn bench_dedup(c: &mut Criterion) {
    let ds = addresses(30_000);
    let keys = derive_keys(&ds, &KeyRule::Column("pin".to_string())).unwrap();
    let columns = [ColumnSpec {
        name: "address".to_string(),
        rule: ColumnRule::Concat {
            column: "street".to_string(),
            order_by: vec![],
        },
        redact: None,
    }];

    c.bench_function("concat_table_30k", |b| {
        b.iter(|| {
            let (groups, _) = group_by_key("addresses", black_box(&ds), &keys);
            AttributeTable::from_groups("addresses", &ds.schema, &groups, &columns, &[]).unwrap()
        })
    });
}

criterion_group!(benches, bench_aggregate, bench_dedup);
criterion_main!(benches);
