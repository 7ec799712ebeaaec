use lotbuild::ingestion::csv::{ingest_csv_from_path, ingest_csv_from_reader};
use lotbuild::types::{DataType, Field, Schema, Value};

fn address_schema() -> Schema {
    Schema::new(vec![
        Field::new("pin", DataType::Utf8),
        Field::new("street", DataType::Utf8),
        Field::new("number", DataType::Int64),
    ])
}

#[test]
fn ingest_csv_from_path_happy_path() {
    let ds = ingest_csv_from_path("tests/fixtures/addresses.csv", &address_schema()).unwrap();

    assert_eq!(ds.row_count(), 6);
    assert_eq!(
        ds.rows[0],
        vec![
            Value::Utf8("42".to_string()),
            Value::Utf8("Oak St".to_string()),
            Value::Int64(10),
        ]
    );
    // Blank key cell.
    assert_eq!(ds.rows[5][0], Value::Null);
}

#[test]
fn ingest_csv_allows_reordered_and_extra_columns() {
    let input = "number,unit,street,pin\n10,B,Oak St,42\n";
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let ds = ingest_csv_from_reader(&mut rdr, &address_schema()).unwrap();
    assert_eq!(ds.row_count(), 1);
    assert_eq!(ds.rows[0][0], Value::Utf8("42".to_string()));
    assert_eq!(ds.rows[0][2], Value::Int64(10));
}

#[test]
fn ingest_csv_errors_on_missing_required_column() {
    let input = "pin,street\n42,Oak St\n";
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let err = ingest_csv_from_reader(&mut rdr, &address_schema()).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("schema mismatch"));
    assert!(msg.contains("missing required column 'number'"));
}

#[test]
fn ingest_csv_errors_on_type_parse() {
    let input = "pin,street,number\n42,Oak St,ten\n";
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let err = ingest_csv_from_reader(&mut rdr, &address_schema()).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("failed to parse value"));
    assert!(msg.contains("column 'number'"));
}
