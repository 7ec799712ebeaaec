use std::fs;

use lotbuild::ingestion::{load_from_path, LoadOptions, SourceFormat};
use lotbuild::types::{DataType, Field, Schema, Value};

fn stop_schema() -> Schema {
    Schema::new(vec![
        Field::new("stop_code", DataType::Int64),
        Field::new("stop_name", DataType::Utf8),
        Field::new("stop_lon", DataType::Float64),
        Field::new("stop_lat", DataType::Float64),
    ])
}

#[test]
fn load_csv_auto_by_extension() {
    let ds = load_from_path("stops", "tests/fixtures/stops.csv", &stop_schema(), &LoadOptions::default()).unwrap();
    assert_eq!(ds.row_count(), 3);
    assert_eq!(ds.rows[0][0], Value::Int64(42));
    assert_eq!(ds.rows[2][3], Value::Float64(38.02));
}

#[test]
fn load_geojson_auto_by_extension() {
    let schema = Schema::new(vec![Field::new("properties.PIN", DataType::Utf8)]);
    let ds = load_from_path("parcels", "tests/fixtures/parcels.geojson", &schema, &LoadOptions::default())
        .unwrap();
    assert_eq!(ds.row_count(), 5);
}

#[test]
fn explicit_format_overrides_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stops.export");
    fs::copy("tests/fixtures/stops.csv", &path).unwrap();

    let err = load_from_path("stops", &path, &stop_schema(), &LoadOptions::default()).unwrap_err();
    assert!(err.to_string().contains("cannot infer format from extension 'export'"));

    let opts = LoadOptions {
        format: Some(SourceFormat::Csv),
        ..Default::default()
    };
    let ds = load_from_path("stops", &path, &stop_schema(), &opts).unwrap();
    assert_eq!(ds.row_count(), 3);
}

#[test]
fn wrong_format_fails_instead_of_guessing() {
    let opts = LoadOptions {
        format: Some(SourceFormat::Json),
        ..Default::default()
    };
    assert!(load_from_path("stops", "tests/fixtures/stops.csv", &stop_schema(), &opts).is_err());
}
