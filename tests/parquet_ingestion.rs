use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use parquet::column::writer::ColumnWriter;
use parquet::data_type::ByteArray;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;

use lotbuild::geometry::{aggregate, Centroid, GeometrySource, MergeMode};
use lotbuild::ingestion::parquet::ingest_parquet_from_path;
use lotbuild::key::KeyRule;
use lotbuild::types::{DataType, Field, Schema, Value};

fn stop_schema() -> Schema {
    Schema::new(vec![
        Field::new("stop_code", DataType::Utf8),
        Field::new("geom", DataType::Geometry),
    ])
}

fn wkb_point(x: f64, y: f64) -> Vec<u8> {
    let mut out = vec![1u8];
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&x.to_le_bytes());
    out.extend_from_slice(&y.to_le_bytes());
    out
}

/// GeoParquet-style file: a text key column and a WKB geometry column.
fn write_stops_parquet(path: &Path, include_geom: bool) {
    let schema_str = if include_geom {
        r#"
        message schema {
          REQUIRED BINARY stop_code (UTF8);
          REQUIRED BINARY geom;
        }
        "#
    } else {
        r#"
        message schema {
          REQUIRED BINARY stop_code (UTF8);
        }
        "#
    };

    let schema = Arc::new(parse_message_type(schema_str).unwrap());
    let props = Arc::new(WriterProperties::builder().build());
    let file = File::create(path).unwrap();
    let mut writer = SerializedFileWriter::new(file, schema, props).unwrap();

    let mut rg = writer.next_row_group().unwrap();
    let mut col_idx: usize = 0;
    while let Some(mut col) = rg.next_column().unwrap() {
        match col.untyped() {
            ColumnWriter::ByteArrayColumnWriter(w) if col_idx == 0 => {
                let codes = ["7", "7", "8"].map(ByteArray::from);
                w.write_batch(&codes, None, None).unwrap();
            }
            ColumnWriter::ByteArrayColumnWriter(w) => {
                let geoms = [wkb_point(0.0, 0.0), wkb_point(2.0, 2.0), wkb_point(-78.5, 38.0)]
                    .map(ByteArray::from);
                w.write_batch(&geoms, None, None).unwrap();
            }
            _ => panic!("unexpected column writer in test"),
        }
        col.close().unwrap();
        col_idx += 1;
    }
    rg.close().unwrap();
    writer.close().unwrap();
}

#[test]
fn ingest_parquet_wkb_geometry_and_aggregate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stops.parquet");
    write_stops_parquet(&path, true);

    let ds = ingest_parquet_from_path(&path, &stop_schema()).unwrap();
    assert_eq!(ds.row_count(), 3);
    assert_eq!(ds.rows[0][0], Value::Utf8("7".to_string()));
    assert_eq!(ds.rows[2][1], Value::Geometry(wkb_point(-78.5, 38.0)));

    let out = aggregate(
        "stops",
        &ds,
        &KeyRule::Column("stop_code".to_string()),
        &GeometrySource::Column("geom".to_string()),
        MergeMode::Collect,
    )
    .unwrap();
    assert!(out.issues.is_empty());
    assert_eq!(out.groups.len(), 2);
    assert_eq!(out.groups[0].centroid, Some(Centroid { lon: 1.0, lat: 1.0 }));
    assert_eq!(out.groups[1].centroid, Some(Centroid { lon: -78.5, lat: 38.0 }));
}

#[test]
fn ingest_parquet_errors_on_missing_required_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stops.parquet");
    write_stops_parquet(&path, false);

    let err = ingest_parquet_from_path(&path, &stop_schema()).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("schema mismatch"));
    assert!(msg.contains("missing required column 'geom'"));
}
