//! Sample record ↔ storage row conversion through the public API.

use purpleair_datautil::models::{AnswerValue, SampleModel, StorageLocation};
use purpleair_datautil::{FieldMap, SampleRows, SchemaConverter, SchemaError};
use serde_json::{json, Value};

fn create_test_input(name: &str) -> Value {
    // ---
    json!({
        "kind": "samplerecord",
        "source": "survey-plugin",
        "timestamp": "2025-03-26T18:45:00Z",
        "plugin_id": "creek-survey",
        "plugin_version": "1.4.0",
        "name": name,
        "sample_date": "2025-03-26",
        "latitude": 32.7767,
        "longitude": -96.797,
        "city": "Dallas",
        "country_code": "US",
        "collector_name": "J. Rivera",
        "attributes": {"weather": "clear"},
        "answers": [
            {"key": " q1_depth ", "question_text": "Depth (m)?", "value_numeric": 1.25, "answer_order": 1},
            {"key": "q2_notes", "value_text": "Murky water", "answer_order": 2},
            {"key": "q3_meter", "value_json": {"ph": 7.1, "do": 6.4}, "answer_order": 3}
        ],
        "attachments": [
            {"filename": "site.jpg", "mime_type": "image/jpeg", "storage_type": "s3",
             "storage_bucket": "samples", "storage_object_key": "2025/site.jpg", "file_size_bytes": 48213},
            {"filename": "notes.txt", "storage_type": "local", "storage_path": "/var/samples/notes.txt"}
        ]
    })
}

/// Stand-in for the database assigning identifiers and loading children.
fn store_and_reload(converter: &SchemaConverter, rows: SampleRows, row_id: i64) -> SampleModel {
    // ---
    let SampleRows {
        mut sample,
        mut answers,
        mut attachments,
    } = rows;
    sample.row_id = Some(row_id);
    converter
        .attach_children(&sample, &mut answers, &mut attachments)
        .unwrap();
    sample.answers = Some(answers);
    sample.attachments = Some(attachments);
    converter.row_to_domain(&sample).unwrap()
}

#[test]
fn sample_survives_round_trip_through_rows() {
    // ---
    let sample = SampleModel::parse(create_test_input("Creek outfall")).unwrap();
    assert_eq!(sample.answers[0].key, "q1_depth");
    assert!(matches!(
        sample.attachments[0].storage,
        Some(StorageLocation::S3 { .. })
    ));

    let converter = SchemaConverter::new(FieldMap::standard());
    let rows = converter.domain_to_rows(&sample).unwrap();
    assert_eq!(rows.answers.len(), 3);
    assert_eq!(rows.attachments.len(), 2);
    assert_eq!(rows.answers[2].value_json, Some(json!({"ph": 7.1, "do": 6.4})));
    assert_eq!(rows.attachments[0].storage_bucket.as_deref(), Some("samples"));

    let back = store_and_reload(&converter, rows, 17);
    assert_eq!(back.extra.get("row_id"), Some(&json!(17)));
    assert_eq!(back.timestamp, sample.timestamp);
    assert_eq!(back.sample_date, sample.sample_date);
    assert_eq!(back.answers, sample.answers);
    assert_eq!(back.attachments, sample.attachments);
    assert_eq!(back.attributes, sample.attributes);
    assert_eq!(back.answers[1].value, Some(AnswerValue::Text("Murky water".into())));
}

#[test]
fn omitted_sample_date_uses_placeholder() {
    // ---
    let sample = SampleModel::parse(json!({
        "source": "manual",
        "timestamp": 1700000000
    }))
    .unwrap();
    assert_eq!(sample.sample_date.to_rfc3339(), "1900-01-01T00:00:00+00:00");
    assert!(sample.answers.is_empty());
    assert!(sample.attributes.is_empty());
}

#[test]
fn timestamps_beyond_year_9999_fail_at_parse_time() {
    // ---
    let err = SampleModel::parse(json!({"source": "manual", "timestamp": 253402300800_i64})).unwrap_err();
    assert!(
        matches!(err, SchemaError::Validation { ref field, .. } if field == "timestamp"),
        "expected a timestamp validation error, got {err:?}"
    );

    // The last accepted second still converts and reloads.
    let sample = SampleModel::parse(json!({"source": "manual", "timestamp": 253402300799_i64})).unwrap();
    let converter = SchemaConverter::new(FieldMap::standard());
    let rows = converter.domain_to_rows(&sample).unwrap();
    let back = store_and_reload(&converter, rows, 3);
    assert_eq!(back.timestamp, sample.timestamp);
}

#[test]
fn unmapped_timestamp_is_lost_without_standard_renames() {
    // ---
    let sample = SampleModel::parse(create_test_input("No renames")).unwrap();
    let converter = SchemaConverter::new(FieldMap::default());

    let rows = converter.domain_to_rows(&sample).unwrap();
    assert_eq!(rows.sample.recorded_at, None);

    let err = converter.row_to_domain(&rows.sample).unwrap_err();
    assert_eq!(
        err,
        SchemaError::Validation {
            field: "timestamp".to_string(),
            constraint: "field required".to_string(),
        }
    );
}

#[test]
fn custom_rename_moves_field_to_another_column() {
    // ---
    let converter = SchemaConverter::new(FieldMap::standard().with("collector_name", "collector_id"));
    let sample = SampleModel::parse(create_test_input("Renamed collector")).unwrap();

    let rows = converter.domain_to_rows(&sample).unwrap();
    assert_eq!(rows.sample.collector_id.as_deref(), Some("J. Rivera"));
    assert_eq!(rows.sample.collector_name, None);

    let back = converter.row_to_domain(&rows.sample).unwrap();
    assert_eq!(back.collector_name.as_deref(), Some("J. Rivera"));
}

#[test]
fn batch_stops_at_first_failure() {
    // ---
    let mut samples: Vec<SampleModel> = (0..4)
        .map(|i| SampleModel::parse(create_test_input(&format!("Sample {i}"))).unwrap())
        .collect();
    samples[2]
        .extra
        .insert("organization_id".to_string(), json!("acme"));
    samples[2].organization_id = None;

    let converter = SchemaConverter::new(FieldMap::standard());
    let err = converter.batch_convert(&samples).unwrap_err();
    assert!(matches!(
        err,
        SchemaError::ColumnType { table: "sample", ref column, .. } if column == "organization_id"
    ));

    let ok = converter.batch_convert(&samples[..2]).unwrap();
    assert_eq!(ok.len(), 2);
    assert_eq!(ok[1].sample.name.as_deref(), Some("Sample 1"));
}

#[test]
fn validation_errors_name_nested_fields() {
    // ---
    let mut input = create_test_input("Bad answer");
    input["answers"][1]["value_boolean"] = json!(true);
    let err = SampleModel::parse(input).unwrap_err();
    assert!(matches!(err, SchemaError::Validation { ref field, .. } if field == "answers[1].value"));

    let mut input = create_test_input("Bad attachment");
    input["attachments"][1]["storage_bucket"] = json!("oops");
    let err = SampleModel::parse(input).unwrap_err();
    assert!(
        matches!(err, SchemaError::Validation { ref field, .. } if field == "attachments[1].storage_bucket")
    );

    let mut input = create_test_input("Wrong kind");
    input["kind"] = json!("platformrecord");
    assert!(SampleModel::parse(input).is_err());
}
